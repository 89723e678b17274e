//! Frame Graph - a declarative GPU pass scheduling and resource runtime
//!
//! Rendering code declares *what* a frame needs — named resources and passes
//! with read/write accesses — and the graph decides execution order, realizes
//! transient GPU resources on first use, and inserts the minimal layout and
//! memory transitions between producers and consumers.
//!
//! # Usage
//!
//! Populate a [`RenderGraph`] once with [`ResourceNode`] and [`PassNode`]
//! declarations, designate exactly one present pass, call
//! [`RenderGraph::compile`], then call [`RenderGraph::execute`] every frame
//! against a [`backend::RenderBackend`]. Call [`RenderGraph::destroy`] before
//! dropping the backend.
//!
//! ```no_run
//! use frame_graph::backend::vulkan::{VulkanBackend, VulkanConfig};
//! use frame_graph::backend::*;
//! use frame_graph::render_graph::*;
//! # fn demo(window: std::sync::Arc<winit::window::Window>) -> Result<(), Box<dyn std::error::Error>> {
//! let mut backend = VulkanBackend::new(window, VulkanConfig::default())?;
//! let mut graph = RenderGraph::new();
//!
//! graph.add_surface_resource("surface", &backend);
//! graph.add_resource(ResourceNode::image(
//!     "depth",
//!     ImageDescriptor {
//!         format: backend.depth_format(),
//!         usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::SAMPLED,
//!         ..Default::default()
//!     },
//! ));
//!
//! let extent = backend.surface_extent();
//! graph.add_pass(
//!     PassNode::graphics("depth-prepass", extent, |_ctx| {})
//!         .writes(ResourceAccess::new("depth", ImageLayout::DepthStencilAttachment)),
//! );
//! graph.add_present_pass(
//!     PassNode::graphics("composition", extent, |_ctx| {})
//!         .reads(ResourceAccess::new("depth", ImageLayout::ShaderReadOnly))
//!         .writes(ResourceAccess::new("surface", ImageLayout::ColorAttachment)),
//! );
//!
//! graph.compile()?;
//! graph.execute(&mut backend)?;
//! graph.destroy(&mut backend);
//! # Ok(()) }
//! ```

pub mod backend;
pub mod render_graph;

pub use backend::traits::{BackendError, BackendResult, RenderBackend};
pub use render_graph::{
    DeclarationError, GraphError, PassNode, RenderGraph, ResourceAccess, ResourceHandle,
    ResourceNode,
};
