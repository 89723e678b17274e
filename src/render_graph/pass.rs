//! Pass nodes of the frame graph

use crate::backend::traits::{FramebufferHandle, RenderPassHandle};
use crate::backend::types::*;

/// Kind of scheduled GPU work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Draws into one or more attachments
    Graphics,
    /// Dispatches compute work
    Compute,
    /// Moves data between locations (host <-> device, device <-> device)
    Transfer,
}

/// A pass's declared intent to touch a named resource.
///
/// Pure declaration; describes what the pass needs, not the resource itself.
#[derive(Debug, Clone)]
pub struct ResourceAccess {
    pub resource: String,
    pub layout: ImageLayout,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub stages: StageFlags,
}

impl ResourceAccess {
    pub fn new(resource: impl Into<String>, layout: ImageLayout) -> Self {
        Self {
            resource: resource.into(),
            layout,
            load_op: LoadOp::Clear,
            store_op: StoreOp::Store,
            stages: StageFlags::ALL_COMMANDS,
        }
    }

    pub fn load_op(mut self, load_op: LoadOp) -> Self {
        self.load_op = load_op;
        self
    }

    pub fn store_op(mut self, store_op: StoreOp) -> Self {
        self.store_op = store_op;
        self
    }

    pub fn stages(mut self, stages: StageFlags) -> Self {
        self.stages = stages;
        self
    }
}

/// Context handed to a pass callback while its render scope is open.
///
/// The callback may record any draw/dispatch/transfer commands through the
/// backend but must not change resource layouts outside its declared
/// accesses; the graph has already set a full-extent viewport and scissor.
pub struct PassContext<'a, B> {
    pub backend: &'a mut B,
    pub frame_index: u32,
    pub extent: Extent2d,
}

/// Opaque execution callback supplied by the caller
pub type PassCallback<B> = Box<dyn FnMut(&mut PassContext<'_, B>)>;

/// A named graph vertex declaring ordered resource accesses and an execution
/// callback.
///
/// The render-pass object and per-frame framebuffers are realized lazily on
/// the first execution that draws through the pass and destroyed exactly once
/// at graph teardown.
pub struct PassNode<B> {
    pub name: String,
    pub kind: PassKind,
    pub extent: Extent2d,
    /// Read accesses, barrier-resolved before writes.
    pub reads: Vec<ResourceAccess>,
    /// Write accesses, barrier-resolved in declaration order.
    pub writes: Vec<ResourceAccess>,
    pub callback: PassCallback<B>,
    pub(crate) render_pass: Option<RenderPassHandle>,
    pub(crate) framebuffers: Vec<FramebufferHandle>,
    /// Resolved at compile time: dense resource indices matching `reads` /
    /// `writes`, so execution never hashes names.
    pub(crate) read_indices: Vec<usize>,
    pub(crate) write_indices: Vec<usize>,
}

impl<B> PassNode<B> {
    pub fn new(
        name: impl Into<String>,
        kind: PassKind,
        extent: Extent2d,
        callback: impl FnMut(&mut PassContext<'_, B>) + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            extent,
            reads: Vec::new(),
            writes: Vec::new(),
            callback: Box::new(callback),
            render_pass: None,
            framebuffers: Vec::new(),
            read_indices: Vec::new(),
            write_indices: Vec::new(),
        }
    }

    pub fn graphics(
        name: impl Into<String>,
        extent: Extent2d,
        callback: impl FnMut(&mut PassContext<'_, B>) + 'static,
    ) -> Self {
        Self::new(name, PassKind::Graphics, extent, callback)
    }

    pub fn compute(
        name: impl Into<String>,
        extent: Extent2d,
        callback: impl FnMut(&mut PassContext<'_, B>) + 'static,
    ) -> Self {
        Self::new(name, PassKind::Compute, extent, callback)
    }

    pub fn transfer(
        name: impl Into<String>,
        extent: Extent2d,
        callback: impl FnMut(&mut PassContext<'_, B>) + 'static,
    ) -> Self {
        Self::new(name, PassKind::Transfer, extent, callback)
    }

    /// Declare that this pass reads a resource
    pub fn reads(mut self, access: ResourceAccess) -> Self {
        self.reads.push(access);
        self
    }

    /// Declare that this pass writes a resource
    pub fn writes(mut self, access: ResourceAccess) -> Self {
        self.writes.push(access);
        self
    }

    pub fn reads_resource(&self, name: &str) -> bool {
        self.reads.iter().any(|access| access.resource == name)
    }

    pub fn writes_resource(&self, name: &str) -> bool {
        self.writes.iter().any(|access| access.resource == name)
    }
}

impl<B> std::fmt::Debug for PassNode<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassNode")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("extent", &self.extent)
            .field("reads", &self.reads)
            .field("writes", &self.writes)
            .field("render_pass", &self.render_pass)
            .finish_non_exhaustive()
    }
}
