//! Integration tests driving the frame graph against a recording backend

use frame_graph::backend::traits::*;
use frame_graph::backend::types::*;
use frame_graph::render_graph::*;
use std::cell::RefCell;
use std::rc::Rc;

/// Backend that records every call the graph makes instead of touching a GPU
struct RecordingBackend {
    frames_in_flight: u32,
    extent: Extent2d,
    /// Frame index handed out by the next `begin_frame`.
    current_frame: u32,
    /// When false, `begin_frame` reports no available frame slot.
    available: bool,

    next_id: u64,

    frames_begun: u32,
    frames_ended: u32,
    buffer_creates: u32,
    image_creates: u32,
    image_extents: Vec<Extent2d>,
    view_creates: u32,
    sampler_creates: u32,

    image_barriers: Vec<ImageBarrier>,
    buffer_barriers: Vec<BufferBarrier>,
    render_scopes: Vec<RenderScopeDesc>,
    framebuffer_views: Vec<usize>,
    scopes_begun: u32,
    scopes_ended: u32,
    present_scopes_begun: u32,
    present_clear_values: Vec<ClearValue>,

    destroyed_buffers: Vec<BufferHandle>,
    destroyed_images: Vec<ImageHandle>,
    destroyed_views: Vec<ImageViewHandle>,
    destroyed_samplers: Vec<SamplerHandle>,
    destroyed_render_passes: Vec<RenderPassHandle>,
    destroyed_framebuffers: Vec<FramebufferHandle>,
}

/// Surface image handle ids live outside the allocation counter's range so
/// tests can tell them apart from graph-realized objects.
const SURFACE_ID_BASE: u64 = 9000;

impl RecordingBackend {
    fn new(frames_in_flight: u32) -> Self {
        Self {
            frames_in_flight,
            extent: Extent2d::new(1280, 720),
            current_frame: 0,
            available: true,
            next_id: 1,
            frames_begun: 0,
            frames_ended: 0,
            buffer_creates: 0,
            image_creates: 0,
            image_extents: Vec::new(),
            view_creates: 0,
            sampler_creates: 0,
            image_barriers: Vec::new(),
            buffer_barriers: Vec::new(),
            render_scopes: Vec::new(),
            framebuffer_views: Vec::new(),
            scopes_begun: 0,
            scopes_ended: 0,
            present_scopes_begun: 0,
            present_clear_values: Vec::new(),
            destroyed_buffers: Vec::new(),
            destroyed_images: Vec::new(),
            destroyed_views: Vec::new(),
            destroyed_samplers: Vec::new(),
            destroyed_render_passes: Vec::new(),
            destroyed_framebuffers: Vec::new(),
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn barriers_for_image(&self, image: ImageHandle) -> Vec<&ImageBarrier> {
        self.image_barriers
            .iter()
            .filter(|barrier| barrier.image == image)
            .collect()
    }
}

impl RenderBackend for RecordingBackend {
    fn frames_in_flight(&self) -> u32 {
        self.frames_in_flight
    }

    fn surface_extent(&self) -> Extent2d {
        self.extent
    }

    fn surface_format(&self) -> TextureFormat {
        TextureFormat::Bgra8UnormSrgb
    }

    fn depth_format(&self) -> TextureFormat {
        TextureFormat::Depth32Float
    }

    fn surface_images(&self) -> Vec<SurfaceImage> {
        (0..self.frames_in_flight as u64)
            .map(|slot| SurfaceImage {
                image: ImageHandle::from_raw(SURFACE_ID_BASE + slot * 2),
                view: ImageViewHandle::from_raw(SURFACE_ID_BASE + slot * 2 + 1),
                layout: ImageLayout::Undefined,
            })
            .collect()
    }

    fn begin_frame(&mut self) -> BackendResult<Option<FrameContext>> {
        if !self.available {
            return Ok(None);
        }
        self.frames_begun += 1;
        Ok(Some(FrameContext {
            frame_index: self.current_frame,
        }))
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.frames_ended += 1;
        Ok(())
    }

    fn begin_present_pass(&mut self, clear_values: &[ClearValue]) {
        self.present_scopes_begun += 1;
        self.present_clear_values = clear_values.to_vec();
    }

    fn create_buffer(&mut self, _desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        self.buffer_creates += 1;
        let id = self.next_id();
        Ok(BufferHandle::from_raw(id))
    }

    fn create_image(
        &mut self,
        _desc: &ImageDescriptor,
        extent: Extent2d,
    ) -> BackendResult<ImageHandle> {
        self.image_creates += 1;
        self.image_extents.push(extent);
        let id = self.next_id();
        Ok(ImageHandle::from_raw(id))
    }

    fn create_image_view(&mut self, _image: ImageHandle) -> BackendResult<ImageViewHandle> {
        self.view_creates += 1;
        let id = self.next_id();
        Ok(ImageViewHandle::from_raw(id))
    }

    fn create_sampler(&mut self, _desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        self.sampler_creates += 1;
        let id = self.next_id();
        Ok(SamplerHandle::from_raw(id))
    }

    fn cmd_image_barrier(&mut self, barrier: &ImageBarrier) {
        self.image_barriers.push(*barrier);
    }

    fn cmd_buffer_barrier(&mut self, barrier: &BufferBarrier) {
        self.buffer_barriers.push(*barrier);
    }

    fn create_render_pass(&mut self, desc: &RenderScopeDesc) -> BackendResult<RenderPassHandle> {
        self.render_scopes.push(desc.clone());
        let id = self.next_id();
        Ok(RenderPassHandle::from_raw(id))
    }

    fn create_framebuffer(
        &mut self,
        _render_pass: RenderPassHandle,
        views: &[ImageViewHandle],
        _extent: Extent2d,
        _layers: u32,
    ) -> BackendResult<FramebufferHandle> {
        self.framebuffer_views.push(views.len());
        let id = self.next_id();
        Ok(FramebufferHandle::from_raw(id))
    }

    fn begin_render_pass(
        &mut self,
        _render_pass: RenderPassHandle,
        _framebuffer: FramebufferHandle,
        _extent: Extent2d,
        _clear_values: &[ClearValue],
    ) {
        self.scopes_begun += 1;
    }

    fn end_render_pass(&mut self) {
        self.scopes_ended += 1;
    }

    fn set_viewport(&mut self, _x: f32, _y: f32, _width: f32, _height: f32) {}

    fn set_scissor(&mut self, _x: u32, _y: u32, _width: u32, _height: u32) {}

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.destroyed_buffers.push(buffer);
    }

    fn destroy_image(&mut self, image: ImageHandle) {
        self.destroyed_images.push(image);
    }

    fn destroy_image_view(&mut self, view: ImageViewHandle) {
        self.destroyed_views.push(view);
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        self.destroyed_samplers.push(sampler);
    }

    fn destroy_render_pass(&mut self, render_pass: RenderPassHandle) {
        self.destroyed_render_passes.push(render_pass);
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.destroyed_framebuffers.push(framebuffer);
    }
}

fn color_image() -> ImageDescriptor {
    ImageDescriptor {
        format: TextureFormat::Rgba8Unorm,
        usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::SAMPLED,
        ..Default::default()
    }
}

fn depth_image() -> ImageDescriptor {
    ImageDescriptor {
        format: TextureFormat::Depth32Float,
        usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::SAMPLED,
        ..Default::default()
    }
}

fn storage_buffer() -> BufferDescriptor {
    BufferDescriptor {
        element_size: 64,
        element_count: 128,
        usage: BufferUsage::STORAGE,
        memory: MemoryLocation::GpuOnly,
        min_alignment: 0,
    }
}

/// Graph with an external surface node and a present pass writing it
fn graph_with_present(
    backend: &RecordingBackend,
) -> RenderGraph<RecordingBackend> {
    let mut graph = RenderGraph::new();
    graph.add_surface_resource("surface", backend);
    graph.add_present_pass(
        PassNode::graphics("composition", backend.surface_extent(), |_| {})
            .writes(ResourceAccess::new("surface", ImageLayout::ColorAttachment)),
    );
    graph
}

#[test]
fn compile_fails_without_present_pass() {
    let backend = RecordingBackend::new(2);
    let mut graph: RenderGraph<RecordingBackend> = RenderGraph::new();
    graph.add_pass(
        PassNode::graphics("lone", backend.surface_extent(), |_| {})
            .writes(ResourceAccess::new("target", ImageLayout::ColorAttachment)),
    );
    graph.add_resource(ResourceNode::image("target", color_image()));

    let err = graph.compile().unwrap_err();
    assert!(matches!(
        err,
        GraphError::Declaration(DeclarationError::MissingPresentPass)
    ));
}

#[test]
fn compile_fails_with_two_present_passes() {
    let backend = RecordingBackend::new(2);
    let mut graph = graph_with_present(&backend);
    graph.add_present_pass(
        PassNode::graphics("second-composition", backend.surface_extent(), |_| {})
            .writes(ResourceAccess::new("surface", ImageLayout::ColorAttachment)),
    );

    let err = graph.compile().unwrap_err();
    assert!(matches!(
        err,
        GraphError::Declaration(DeclarationError::DuplicatePresentPass { .. })
    ));
}

#[test]
fn compile_fails_with_two_depth_writes_in_one_pass() {
    let backend = RecordingBackend::new(2);
    let mut graph = graph_with_present(&backend);
    graph.add_resource(ResourceNode::image("shadow", depth_image()));
    graph.add_resource(ResourceNode::image("depth", depth_image()));
    graph.add_pass(
        PassNode::graphics("prepass", backend.surface_extent(), |_| {})
            .writes(ResourceAccess::new("shadow", ImageLayout::DepthStencilAttachment))
            .writes(ResourceAccess::new("depth", ImageLayout::DepthStencilAttachment)),
    );

    let err = graph.compile().unwrap_err();
    assert!(matches!(
        err,
        GraphError::Declaration(DeclarationError::MultipleDepthWrites { .. })
    ));
}

#[test]
fn compile_fails_on_unregistered_resource() {
    let backend = RecordingBackend::new(2);
    let mut graph = graph_with_present(&backend);
    graph.add_pass(
        PassNode::graphics("prepass", backend.surface_extent(), |_| {})
            .writes(ResourceAccess::new("missing", ImageLayout::ColorAttachment)),
    );

    let err = graph.compile().unwrap_err();
    assert!(matches!(
        err,
        GraphError::Declaration(DeclarationError::UnknownResource { resource, .. })
            if resource == "missing"
    ));
}

#[test]
fn compile_fails_on_depth_layout_with_color_format() {
    let backend = RecordingBackend::new(2);
    let mut graph = graph_with_present(&backend);
    graph.add_resource(ResourceNode::image("target", color_image()));
    graph.add_pass(
        PassNode::graphics("prepass", backend.surface_extent(), |_| {})
            .writes(ResourceAccess::new("target", ImageLayout::DepthStencilAttachment)),
    );

    let err = graph.compile().unwrap_err();
    assert!(matches!(
        err,
        GraphError::Declaration(DeclarationError::FormatLayoutMismatch { .. })
    ));
}

#[test]
fn external_resources_are_never_realized() {
    let mut backend = RecordingBackend::new(2);
    let mut graph = graph_with_present(&backend);
    graph.compile().unwrap();
    graph.execute(&mut backend).unwrap();

    assert_eq!(backend.image_creates, 0);
    assert_eq!(backend.view_creates, 0);
    assert_eq!(backend.buffer_creates, 0);
    assert_eq!(backend.present_scopes_begun, 1);
    // The surface write still resolves its layout transition and clear value.
    assert_eq!(backend.image_barriers.len(), 1);
    assert_eq!(
        backend.present_clear_values,
        vec![ClearValue::Color([0.0, 0.0, 0.0, 0.0])]
    );
}

#[test]
fn unwritten_resources_are_never_realized_or_destroyed() {
    let mut backend = RecordingBackend::new(2);
    let mut graph = graph_with_present(&backend);
    // Declared but never written by any pass.
    graph.add_resource(ResourceNode::image("a", color_image()));
    graph.compile().unwrap();
    graph.execute(&mut backend).unwrap();

    assert_eq!(backend.image_creates, 0);

    graph.destroy(&mut backend);
    assert!(backend.destroyed_images.is_empty());
    assert!(backend.destroyed_views.is_empty());
}

#[test]
fn unavailable_frame_slot_skips_execution() {
    let mut backend = RecordingBackend::new(2);
    let executed = Rc::new(RefCell::new(0u32));
    let counter = executed.clone();

    let mut graph: RenderGraph<RecordingBackend> = RenderGraph::new();
    graph.add_surface_resource("surface", &backend);
    graph.add_present_pass(
        PassNode::graphics("composition", backend.surface_extent(), move |_| {
            *counter.borrow_mut() += 1;
        })
        .writes(ResourceAccess::new("surface", ImageLayout::ColorAttachment)),
    );
    graph.compile().unwrap();

    backend.available = false;
    graph.execute(&mut backend).unwrap();
    assert_eq!(*executed.borrow(), 0);
    assert_eq!(backend.frames_ended, 0);

    backend.available = true;
    graph.execute(&mut backend).unwrap();
    assert_eq!(*executed.borrow(), 1);
    assert_eq!(backend.frames_begun, 1);
    assert_eq!(backend.frames_ended, 1);
}

#[test]
fn depth_producer_consumer_gets_exactly_one_transition() {
    let mut backend = RecordingBackend::new(2);
    let extent = backend.surface_extent();
    let mut graph: RenderGraph<RecordingBackend> = RenderGraph::new();
    graph.add_surface_resource("surface", &backend);
    let depth_handle = graph.add_resource(ResourceNode::image("depth", depth_image()));
    graph.add_resource(ResourceNode::image("lit", color_image()));
    graph.add_resource(ResourceNode::image("fog", color_image()));

    graph.add_pass(
        PassNode::graphics("depth-prepass", extent, |_| {})
            .writes(ResourceAccess::new("depth", ImageLayout::DepthStencilAttachment)),
    );
    graph.add_pass(
        PassNode::graphics("lighting", extent, |_| {})
            .reads(ResourceAccess::new("depth", ImageLayout::ShaderReadOnly))
            .writes(ResourceAccess::new("lit", ImageLayout::ColorAttachment)),
    );
    graph.add_pass(
        PassNode::graphics("fog", extent, |_| {})
            .reads(ResourceAccess::new("depth", ImageLayout::ShaderReadOnly))
            .writes(ResourceAccess::new("fog", ImageLayout::ColorAttachment)),
    );
    graph.add_present_pass(
        PassNode::graphics("composition", extent, |_| {})
            .reads(ResourceAccess::new("lit", ImageLayout::ShaderReadOnly))
            .writes(ResourceAccess::new("surface", ImageLayout::ColorAttachment)),
    );

    graph.compile().unwrap();
    graph.execute(&mut backend).unwrap();

    let depth_image_handle = graph
        .resource(depth_handle)
        .unwrap()
        .reference(0)
        .as_image()
        .unwrap()
        .image;
    let barriers = backend.barriers_for_image(depth_image_handle);

    // First write initializes, the first read transitions; the second read
    // with the same required layout adds nothing.
    assert_eq!(barriers.len(), 2);
    assert_eq!(barriers[0].old_layout, ImageLayout::Undefined);
    assert_eq!(barriers[0].new_layout, ImageLayout::DepthStencilAttachment);
    assert_eq!(barriers[1].old_layout, ImageLayout::DepthStencilAttachment);
    assert_eq!(barriers[1].new_layout, ImageLayout::ShaderReadOnly);

    // Three graph-owned scopes plus the presentation scope, all closed.
    assert_eq!(backend.scopes_begun, 3);
    assert_eq!(backend.present_scopes_begun, 1);
    assert_eq!(backend.scopes_ended, 4);
}

#[test]
fn buffered_resources_track_layout_per_frame() {
    let mut backend = RecordingBackend::new(2);
    let extent = backend.surface_extent();
    let mut graph: RenderGraph<RecordingBackend> = RenderGraph::new();
    graph.add_surface_resource("surface", &backend);
    let target = graph.add_resource(ResourceNode::image("target", color_image()));

    graph.add_pass(
        PassNode::graphics("draw", extent, |_| {})
            .writes(ResourceAccess::new("target", ImageLayout::ColorAttachment)),
    );
    graph.add_present_pass(
        PassNode::graphics("composition", extent, |_| {})
            .reads(ResourceAccess::new("target", ImageLayout::ShaderReadOnly))
            .writes(ResourceAccess::new("surface", ImageLayout::ColorAttachment)),
    );
    graph.compile().unwrap();

    backend.current_frame = 0;
    graph.execute(&mut backend).unwrap();
    backend.current_frame = 1;
    graph.execute(&mut backend).unwrap();

    // Both frames realized their own instance and transitioned it from
    // scratch: a transition applied while processing frame 0 does not leak
    // into frame 1's tracked state.
    let node = graph.resource(target).unwrap();
    assert_eq!(node.refs.len(), 2);
    let frame0 = node.reference(0).as_image().unwrap();
    let frame1 = node.reference(1).as_image().unwrap();
    assert_ne!(frame0.image, frame1.image);

    let from_undefined = |image| {
        backend
            .barriers_for_image(image)
            .iter()
            .filter(|barrier| barrier.old_layout == ImageLayout::Undefined)
            .count()
    };
    assert_eq!(from_undefined(frame0.image), 1);
    assert_eq!(from_undefined(frame1.image), 1);
}

#[test]
fn attachments_match_image_write_accesses() {
    let mut backend = RecordingBackend::new(2);
    let extent = backend.surface_extent();
    let mut graph: RenderGraph<RecordingBackend> = RenderGraph::new();
    graph.add_surface_resource("surface", &backend);
    graph.add_resource(ResourceNode::image("albedo", color_image()));
    graph.add_resource(ResourceNode::image("normal", color_image()));
    graph.add_resource(ResourceNode::image("depth", depth_image()));
    graph.add_resource(ResourceNode::buffer("visibility", storage_buffer()));

    graph.add_pass(
        PassNode::graphics("gbuffer", extent, |_| {})
            .writes(ResourceAccess::new("albedo", ImageLayout::ColorAttachment))
            .writes(ResourceAccess::new("visibility", ImageLayout::Undefined))
            .writes(ResourceAccess::new("normal", ImageLayout::ColorAttachment))
            .writes(ResourceAccess::new("depth", ImageLayout::DepthStencilAttachment)),
    );
    graph.add_present_pass(
        PassNode::graphics("composition", extent, |_| {})
            .reads(ResourceAccess::new("albedo", ImageLayout::ShaderReadOnly))
            .writes(ResourceAccess::new("surface", ImageLayout::ColorAttachment)),
    );

    graph.compile().unwrap();
    graph.execute(&mut backend).unwrap();

    // The buffer write contributes no attachment.
    assert_eq!(backend.render_scopes.len(), 1);
    let scope = &backend.render_scopes[0];
    assert_eq!(scope.attachments.len(), 3);
    assert_eq!(scope.color_refs, vec![0, 1]);
    assert_eq!(scope.depth_ref, Some(2));
    assert_eq!(scope.dependencies.len(), 2);

    // One framebuffer per frame in flight, one view per image write.
    assert_eq!(backend.framebuffer_views, vec![3, 3]);
}

#[test]
fn buffer_write_then_read_emits_one_memory_barrier() {
    let mut backend = RecordingBackend::new(2);
    let extent = backend.surface_extent();
    let mut graph: RenderGraph<RecordingBackend> = RenderGraph::new();
    graph.add_surface_resource("surface", &backend);
    graph.add_resource(ResourceNode::buffer("lights", storage_buffer()));
    graph.add_resource(ResourceNode::image("lit", color_image()));
    graph.add_resource(ResourceNode::image("fog", color_image()));

    graph.add_pass(
        PassNode::compute("cull", extent, |_| {})
            .writes(ResourceAccess::new("lights", ImageLayout::Undefined))
            .writes(ResourceAccess::new("lit", ImageLayout::ColorAttachment)),
    );
    graph.add_pass(
        PassNode::graphics("shade", extent, |_| {})
            .reads(ResourceAccess::new("lights", ImageLayout::Undefined))
            .writes(ResourceAccess::new("fog", ImageLayout::ColorAttachment)),
    );
    graph.add_present_pass(
        PassNode::graphics("composition", extent, |_| {})
            .reads(ResourceAccess::new("lights", ImageLayout::Undefined))
            .writes(ResourceAccess::new("surface", ImageLayout::ColorAttachment)),
    );

    graph.compile().unwrap();
    graph.execute(&mut backend).unwrap();

    // The write marks the instance; the first read consumes the mark with a
    // single barrier and the second read sees clean state.
    assert_eq!(backend.buffer_barriers.len(), 1);
    assert!(backend.buffer_barriers[0]
        .src_access
        .contains(AccessFlags::MEMORY_WRITE));
}

#[test]
fn reading_an_unrealized_resource_is_a_declaration_error() {
    let mut backend = RecordingBackend::new(2);
    let extent = backend.surface_extent();
    let mut graph: RenderGraph<RecordingBackend> = RenderGraph::new();
    graph.add_surface_resource("surface", &backend);
    graph.add_resource(ResourceNode::image("never-written", color_image()));
    graph.add_present_pass(
        PassNode::graphics("composition", extent, |_| {})
            .reads(ResourceAccess::new("never-written", ImageLayout::ShaderReadOnly))
            .writes(ResourceAccess::new("surface", ImageLayout::ColorAttachment)),
    );

    graph.compile().unwrap();
    let err = graph.execute(&mut backend).unwrap_err();
    assert!(matches!(
        err,
        GraphError::Declaration(DeclarationError::ReadBeforeWrite { resource, .. })
            if resource == "never-written"
    ));
}

#[test]
fn barrier_apply_is_tracked_until_layout_changes() {
    let mut backend = RecordingBackend::new(1);
    let mut node = ResourceNode::image("target", color_image()).single_instance();
    node.refs.push(ResourceRef::Image(ImageRef {
        image: ImageHandle::from_raw(1),
        view: ImageViewHandle::from_raw(2),
        sampler: None,
        current_layout: ImageLayout::Undefined,
    }));

    let access = ResourceAccess::new("target", ImageLayout::ColorAttachment);
    let mut barrier = Barrier::new(&mut node, &access, 0);
    assert!(barrier.is_needed());
    barrier.apply(&mut backend);

    // Without an intervening layout change a second apply has no
    // precondition: the tracked layout already matches.
    let barrier = Barrier::new(&mut node, &access, 0);
    assert!(!barrier.is_needed());
    assert_eq!(backend.image_barriers.len(), 1);
}

#[test]
fn custom_ordering_strategy_is_honored() {
    struct ReverseOrder;
    impl PassOrdering for ReverseOrder {
        fn order(&self, passes: &[PassInfo<'_>]) -> Vec<usize> {
            (0..passes.len()).rev().collect()
        }
    }

    let mut backend = RecordingBackend::new(2);
    let extent = backend.surface_extent();
    let executed = Rc::new(RefCell::new(Vec::new()));

    let mut graph: RenderGraph<RecordingBackend> = RenderGraph::new();
    graph.set_ordering(Box::new(ReverseOrder));
    graph.add_surface_resource("surface", &backend);
    graph.add_resource(ResourceNode::image("scratch", color_image()));

    let log = executed.clone();
    graph.add_pass(
        PassNode::graphics("scratch-pass", extent, move |_| {
            log.borrow_mut().push("scratch-pass");
        })
        .writes(ResourceAccess::new("scratch", ImageLayout::ColorAttachment)),
    );
    let log = executed.clone();
    graph.add_present_pass(
        PassNode::graphics("composition", extent, move |_| {
            log.borrow_mut().push("composition");
        })
        .writes(ResourceAccess::new("surface", ImageLayout::ColorAttachment)),
    );

    graph.compile().unwrap();
    graph.execute(&mut backend).unwrap();

    assert_eq!(*executed.borrow(), vec!["composition", "scratch-pass"]);
}

#[test]
fn destroy_releases_graph_owned_objects_only() {
    let mut backend = RecordingBackend::new(2);
    let extent = backend.surface_extent();
    let mut graph: RenderGraph<RecordingBackend> = RenderGraph::new();
    graph.add_surface_resource("surface", &backend);
    graph.add_resource(ResourceNode::image(
        "filtered",
        ImageDescriptor {
            sampler: Some(SamplerDescriptor::default()),
            ..color_image()
        },
    ));
    graph.add_resource(ResourceNode::buffer("lights", storage_buffer()).single_instance());

    graph.add_pass(
        PassNode::graphics("draw", extent, |_| {})
            .writes(ResourceAccess::new("filtered", ImageLayout::ColorAttachment))
            .writes(ResourceAccess::new("lights", ImageLayout::Undefined)),
    );
    graph.add_present_pass(
        PassNode::graphics("composition", extent, |_| {})
            .writes(ResourceAccess::new("surface", ImageLayout::ColorAttachment)),
    );

    graph.compile().unwrap();
    graph.execute(&mut backend).unwrap();

    // Buffered image: two instances. Single-instance buffer: one.
    assert_eq!(backend.image_creates, 2);
    assert_eq!(backend.sampler_creates, 2);
    assert_eq!(backend.buffer_creates, 1);

    graph.destroy(&mut backend);

    assert_eq!(backend.destroyed_images.len(), 2);
    assert_eq!(backend.destroyed_views.len(), 2);
    assert_eq!(backend.destroyed_samplers.len(), 2);
    assert_eq!(backend.destroyed_buffers.len(), 1);
    // One render scope for `draw` (the present pass uses the platform's),
    // with a framebuffer per frame in flight.
    assert_eq!(backend.destroyed_render_passes.len(), 1);
    assert_eq!(backend.destroyed_framebuffers.len(), 2);

    // The external surface images stayed untouched.
    assert!(backend
        .destroyed_images
        .iter()
        .all(|image| image.raw() < SURFACE_ID_BASE));
    assert!(backend
        .destroyed_views
        .iter()
        .all(|view| view.raw() < SURFACE_ID_BASE));
}

#[test]
fn relative_sized_images_resolve_against_surface_at_realization() {
    let mut backend = RecordingBackend::new(2);
    let extent = backend.surface_extent();
    let mut graph: RenderGraph<RecordingBackend> = RenderGraph::new();
    graph.add_surface_resource("surface", &backend);
    let half = graph.add_resource(ResourceNode::image(
        "half-res",
        ImageDescriptor {
            size: TextureSize::SurfaceRelative {
                width_scale: 0.5,
                height_scale: 0.5,
            },
            ..color_image()
        },
    ));
    graph.add_pass(
        PassNode::graphics("downsample", extent, |_| {})
            .writes(ResourceAccess::new("half-res", ImageLayout::ColorAttachment)),
    );
    graph.add_present_pass(
        PassNode::graphics("composition", extent, |_| {})
            .writes(ResourceAccess::new("surface", ImageLayout::ColorAttachment)),
    );

    graph.compile().unwrap();
    graph.execute(&mut backend).unwrap();

    assert!(graph.resource(half).unwrap().is_realized());
    assert_eq!(backend.image_creates, 2);
    assert!(backend
        .image_extents
        .iter()
        .all(|&extent| extent == Extent2d::new(640, 360)));
}
