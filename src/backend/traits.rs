//! Backend abstraction
//!
//! The frame graph drives the GPU exclusively through [`RenderBackend`]: a
//! narrow surface covering frame acquisition/presentation, resource
//! creation/destruction, barrier emission and render scopes. Everything else
//! (pipelines, descriptor contents, draw calls) happens inside pass callbacks
//! against the concrete backend type.

use crate::backend::types::*;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to create swapchain: {0}")]
    SwapchainCreationFailed(String),
    #[error("Failed to acquire next image: {0}")]
    AcquireImageFailed(String),
    #[error("Failed to present: {0}")]
    PresentFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create image: {0}")]
    ImageCreationFailed(String),
    #[error("Failed to create render pass: {0}")]
    RenderPassCreationFailed(String),
    #[error("Failed to create framebuffer: {0}")]
    FramebufferCreationFailed(String),
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a GPU image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(pub(crate) u64);

/// Handle to an image view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageViewHandle(pub(crate) u64);

/// Handle to a sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerHandle(pub(crate) u64);

/// Handle to a realized render pass object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPassHandle(pub(crate) u64);

/// Handle to a framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub(crate) u64);

impl BufferHandle {
    /// Wrap a backend-assigned id. Intended for [`RenderBackend`]
    /// implementations; the graph never inspects raw values.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl ImageHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl ImageViewHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl SamplerHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl RenderPassHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl FramebufferHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Frame context returned when a frame slot was acquired
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    /// Index of the frame in flight; selects buffered resource instances.
    pub frame_index: u32,
}

/// One pre-populated presentation image, per frame in flight
#[derive(Debug, Clone, Copy)]
pub struct SurfaceImage {
    pub image: ImageHandle,
    pub view: ImageViewHandle,
    pub layout: ImageLayout,
}

/// A single image layout transition
#[derive(Debug, Clone, Copy)]
pub struct ImageBarrier {
    pub image: ImageHandle,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub src_stages: StageFlags,
    pub dst_stages: StageFlags,
    /// Depth or color aspect, from the resource's format class.
    pub is_depth: bool,
    pub mip_count: u32,
    pub layer_count: u32,
}

/// A single buffer memory barrier
#[derive(Debug, Clone, Copy)]
pub struct BufferBarrier {
    pub buffer: BufferHandle,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub src_stages: StageFlags,
    pub dst_stages: StageFlags,
}

/// One attachment of a render scope, derived from a write access
#[derive(Debug, Clone, Copy)]
pub struct AttachmentDescription {
    pub format: TextureFormat,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub initial_layout: ImageLayout,
    pub final_layout: ImageLayout,
}

/// Execution dependency between a subpass and its surroundings
#[derive(Debug, Clone, Copy)]
pub struct SubpassDependency {
    /// None = external
    pub src_subpass: Option<u32>,
    pub dst_subpass: Option<u32>,
    pub src_stages: StageFlags,
    pub dst_stages: StageFlags,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub by_region: bool,
}

/// Everything needed to realize a single-subpass render scope
#[derive(Debug, Clone)]
pub struct RenderScopeDesc {
    pub attachments: Vec<AttachmentDescription>,
    /// Indices into `attachments`, in declaration order.
    pub color_refs: Vec<u32>,
    pub depth_ref: Option<u32>,
    pub dependencies: Vec<SubpassDependency>,
}

/// Narrow GPU interface the frame graph executes against.
///
/// Command-recording methods record into the frame implicitly begun by
/// [`RenderBackend::begin_frame`]; the graph never sees a raw command buffer.
pub trait RenderBackend {
    // Frames and presentation

    /// Number of frames the device may work on concurrently. Buffered
    /// resources keep one live instance per frame in flight.
    fn frames_in_flight(&self) -> u32;

    /// Current presentation surface extent
    fn surface_extent(&self) -> Extent2d;

    /// Format of the presentation images
    fn surface_format(&self) -> TextureFormat;

    /// Depth format the surface's presentation scope pairs with
    fn depth_format(&self) -> TextureFormat;

    /// Pre-populated presentation image references, one per frame in flight.
    /// These are externally owned; the graph never realizes or destroys them.
    fn surface_images(&self) -> Vec<SurfaceImage>;

    /// Begin a new frame. `Ok(None)` means no frame slot is currently
    /// available (e.g. the surface is out of date) and the caller should skip
    /// this frame and retry next tick.
    fn begin_frame(&mut self) -> BackendResult<Option<FrameContext>>;

    /// Submit the recorded frame and present it
    fn end_frame(&mut self) -> BackendResult<()>;

    /// Open the platform-owned presentation scope for the present pass
    fn begin_present_pass(&mut self, clear_values: &[ClearValue]);

    // Resource creation

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle>;

    /// Create an image with its size already resolved against the surface
    fn create_image(&mut self, desc: &ImageDescriptor, extent: Extent2d)
        -> BackendResult<ImageHandle>;

    /// Create a full-range view over an image
    fn create_image_view(&mut self, image: ImageHandle) -> BackendResult<ImageViewHandle>;

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle>;

    // Synchronization and render scopes

    /// Record a single image layout transition
    fn cmd_image_barrier(&mut self, barrier: &ImageBarrier);

    /// Record a single buffer memory barrier
    fn cmd_buffer_barrier(&mut self, barrier: &BufferBarrier);

    fn create_render_pass(&mut self, desc: &RenderScopeDesc) -> BackendResult<RenderPassHandle>;

    fn create_framebuffer(
        &mut self,
        render_pass: RenderPassHandle,
        views: &[ImageViewHandle],
        extent: Extent2d,
        layers: u32,
    ) -> BackendResult<FramebufferHandle>;

    fn begin_render_pass(
        &mut self,
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        extent: Extent2d,
        clear_values: &[ClearValue],
    );

    fn end_render_pass(&mut self);

    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32);

    fn set_scissor(&mut self, x: u32, y: u32, width: u32, height: u32);

    // Resource cleanup

    fn destroy_buffer(&mut self, buffer: BufferHandle);

    fn destroy_image(&mut self, image: ImageHandle);

    fn destroy_image_view(&mut self, view: ImageViewHandle);

    fn destroy_sampler(&mut self, sampler: SamplerHandle);

    fn destroy_render_pass(&mut self, render_pass: RenderPassHandle);

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);
}
