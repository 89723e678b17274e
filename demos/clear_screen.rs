//! Minimal frame graph demo: a depth prepass feeding a composition pass that
//! presents to the window surface.
//!
//! Run with:
//!   cargo run --example clear_screen

use frame_graph::backend::types::*;
use frame_graph::backend::vulkan::{VulkanBackend, VulkanConfig};
use frame_graph::backend::RenderBackend;
use frame_graph::render_graph::*;
use std::sync::Arc;
use winit::{
    dpi::PhysicalSize,
    event::{Event, WindowEvent},
    event_loop::EventLoop,
    window::WindowBuilder,
};

fn main() {
    env_logger::init();

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Frame Graph Demo")
            .with_inner_size(PhysicalSize::new(1280, 720))
            .build(&event_loop)
            .expect("Failed to create window"),
    );

    let mut backend = VulkanBackend::new(window.clone(), VulkanConfig::default())
        .expect("Failed to create Vulkan backend");

    let mut graph = RenderGraph::new();
    graph.add_surface_resource("surface", &backend);
    graph.add_resource(ResourceNode::image(
        "depth",
        ImageDescriptor {
            format: backend.depth_format(),
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::SAMPLED,
            sampler: Some(SamplerDescriptor::default()),
            ..Default::default()
        },
    ));

    let extent = backend.surface_extent();
    graph.add_pass(
        PassNode::graphics("depth-prepass", extent, |ctx| {
            log::info!("depth prepass recorded for frame {}", ctx.frame_index);
        })
        .writes(
            ResourceAccess::new("depth", ImageLayout::DepthStencilAttachment)
                .load_op(LoadOp::DontCare),
        ),
    );
    graph.add_present_pass(
        PassNode::graphics("composition", extent, |ctx| {
            log::info!("composition recorded for frame {}", ctx.frame_index);
        })
        .reads(ResourceAccess::new("depth", ImageLayout::ShaderReadOnly).load_op(LoadOp::Load))
        .writes(
            ResourceAccess::new("surface", ImageLayout::ColorAttachment)
                .load_op(LoadOp::DontCare),
        ),
    );

    graph.compile().expect("Failed to compile frame graph");

    event_loop
        .run(move |event, elwt| match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => elwt.exit(),
                WindowEvent::Resized(size) => backend.resize(size.width, size.height),
                WindowEvent::RedrawRequested => {
                    graph.execute(&mut backend).expect("Frame execution failed");
                }
                _ => {}
            },
            Event::AboutToWait => {
                window.request_redraw();
            }
            Event::LoopExiting => {
                graph.destroy(&mut backend);
            }
            _ => {}
        })
        .expect("Event loop error");
}
