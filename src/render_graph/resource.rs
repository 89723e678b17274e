//! Resource nodes of the frame graph

use crate::backend::traits::{BufferHandle, ImageHandle, ImageViewHandle, SamplerHandle, SurfaceImage};
use crate::backend::types::*;

/// Kind tag packed into a [`ResourceHandle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResourceKind {
    Invalid = 0,
    Buffer = 1,
    Image = 2,
}

/// Opaque identifier naming a graph resource: a kind tag in the top byte and
/// a dense index below. Carries no ownership; only used for lookup. The
/// zero value is always invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle(u64);

const KIND_SHIFT: u64 = 56;
const INDEX_MASK: u64 = (1 << KIND_SHIFT) - 1;

impl ResourceHandle {
    pub const INVALID: Self = Self(0);

    pub(crate) fn new(kind: ResourceKind, index: u64) -> Self {
        Self(((kind as u64) << KIND_SHIFT) | (index & INDEX_MASK))
    }

    pub fn kind(&self) -> ResourceKind {
        match (self.0 >> KIND_SHIFT) as u8 {
            1 => ResourceKind::Buffer,
            2 => ResourceKind::Image,
            _ => ResourceKind::Invalid,
        }
    }

    pub fn index(&self) -> u64 {
        self.0 & INDEX_MASK
    }

    pub fn is_valid(&self) -> bool {
        self.0 != 0 && self.kind() != ResourceKind::Invalid
    }
}

impl Default for ResourceHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Immutable creation configuration for a resource
#[derive(Debug, Clone)]
pub enum ResourceDescriptor {
    Buffer(BufferDescriptor),
    Image(ImageDescriptor),
}

/// Live reference to a realized buffer instance
#[derive(Debug, Clone, Copy)]
pub struct BufferRef {
    pub buffer: BufferHandle,
    /// Stage scope of the last write whose results have not yet been made
    /// visible by a barrier. `None` when the buffer has no outstanding write.
    pub pending_write: Option<StageFlags>,
}

/// Live reference to a realized image instance
#[derive(Debug, Clone, Copy)]
pub struct ImageRef {
    pub image: ImageHandle,
    pub view: ImageViewHandle,
    pub sampler: Option<SamplerHandle>,
    /// Layout the image is currently in, updated by every applied barrier.
    pub current_layout: ImageLayout,
}

impl From<SurfaceImage> for ImageRef {
    fn from(surface: SurfaceImage) -> Self {
        Self {
            image: surface.image,
            view: surface.view,
            sampler: None,
            current_layout: surface.layout,
        }
    }
}

/// Live reference to one realized instance of a resource
#[derive(Debug, Clone, Copy)]
pub enum ResourceRef {
    Buffer(BufferRef),
    Image(ImageRef),
}

impl ResourceRef {
    pub fn as_image(&self) -> Option<&ImageRef> {
        match self {
            ResourceRef::Image(image) => Some(image),
            ResourceRef::Buffer(_) => None,
        }
    }

    pub fn as_image_mut(&mut self) -> Option<&mut ImageRef> {
        match self {
            ResourceRef::Image(image) => Some(image),
            ResourceRef::Buffer(_) => None,
        }
    }

    pub fn as_buffer_mut(&mut self) -> Option<&mut BufferRef> {
        match self {
            ResourceRef::Buffer(buffer) => Some(buffer),
            ResourceRef::Image(_) => None,
        }
    }
}

/// A named graph vertex binding a descriptor to its per-frame-in-flight live
/// references.
///
/// References start empty and are populated exactly once, the first time any
/// pass writes to the node — except for externally owned nodes (e.g. the
/// presentation surface), which are supplied with pre-populated references
/// and are never realized or destroyed by the graph.
#[derive(Debug)]
pub struct ResourceNode {
    pub name: String,
    pub desc: ResourceDescriptor,
    /// One entry per frame in flight when buffered, exactly one otherwise.
    pub refs: Vec<ResourceRef>,
    /// Lives only as long as the graph; destroyed at teardown.
    pub is_transient: bool,
    /// One live instance per frame in flight instead of a single shared one.
    pub is_buffered: bool,
    /// Owned outside the graph; never realized or destroyed here.
    pub is_external: bool,
}

impl ResourceNode {
    /// Transient, buffered, graph-owned image node
    pub fn image(name: impl Into<String>, desc: ImageDescriptor) -> Self {
        Self {
            name: name.into(),
            desc: ResourceDescriptor::Image(desc),
            refs: Vec::new(),
            is_transient: true,
            is_buffered: true,
            is_external: false,
        }
    }

    /// Transient, buffered, graph-owned buffer node
    pub fn buffer(name: impl Into<String>, desc: BufferDescriptor) -> Self {
        Self {
            name: name.into(),
            desc: ResourceDescriptor::Buffer(desc),
            refs: Vec::new(),
            is_transient: true,
            is_buffered: true,
            is_external: false,
        }
    }

    /// Externally owned image node with pre-populated per-frame references
    pub fn external_image(
        name: impl Into<String>,
        desc: ImageDescriptor,
        refs: impl IntoIterator<Item = ImageRef>,
    ) -> Self {
        Self {
            name: name.into(),
            desc: ResourceDescriptor::Image(desc),
            refs: refs.into_iter().map(ResourceRef::Image).collect(),
            is_transient: false,
            is_buffered: true,
            is_external: true,
        }
    }

    /// Keep the resource alive across graph rebuilds
    pub fn persistent(mut self) -> Self {
        self.is_transient = false;
        self
    }

    /// One shared instance instead of one per frame in flight
    pub fn single_instance(mut self) -> Self {
        self.is_buffered = false;
        self
    }

    pub fn kind(&self) -> ResourceKind {
        match self.desc {
            ResourceDescriptor::Buffer(_) => ResourceKind::Buffer,
            ResourceDescriptor::Image(_) => ResourceKind::Image,
        }
    }

    pub fn is_realized(&self) -> bool {
        !self.refs.is_empty()
    }

    /// Index into `refs` for a given frame in flight. Single-instance nodes
    /// share their only reference across frames.
    pub fn ref_index(&self, frame_index: u32) -> usize {
        if self.is_buffered {
            frame_index as usize
        } else {
            0
        }
    }

    pub fn reference(&self, frame_index: u32) -> &ResourceRef {
        &self.refs[self.ref_index(frame_index)]
    }

    pub fn reference_mut(&mut self, frame_index: u32) -> &mut ResourceRef {
        let index = self.ref_index(frame_index);
        &mut self.refs[index]
    }

    /// Format of the image descriptor; `None` for buffers
    pub fn image_format(&self) -> Option<TextureFormat> {
        match &self.desc {
            ResourceDescriptor::Image(desc) => Some(desc.format),
            ResourceDescriptor::Buffer(_) => None,
        }
    }

    /// Marks an outstanding write on a buffer instance so the next access
    /// through it resolves a barrier first. No-op for images, whose hazards
    /// are tracked through layouts.
    pub fn note_buffer_write(&mut self, frame_index: u32, stages: StageFlags) {
        if let Some(buffer) = self.reference_mut(frame_index).as_buffer_mut() {
            buffer.pending_write = Some(stages);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_handle_is_invalid() {
        assert!(!ResourceHandle::INVALID.is_valid());
        assert_eq!(ResourceHandle::INVALID.kind(), ResourceKind::Invalid);
        assert_eq!(ResourceHandle::default(), ResourceHandle::INVALID);
    }

    #[test]
    fn handle_packs_kind_and_index() {
        let handle = ResourceHandle::new(ResourceKind::Image, 42);
        assert!(handle.is_valid());
        assert_eq!(handle.kind(), ResourceKind::Image);
        assert_eq!(handle.index(), 42);

        let buffer = ResourceHandle::new(ResourceKind::Buffer, 0);
        assert!(buffer.is_valid());
        assert_eq!(buffer.index(), 0);
    }

    #[test]
    fn handle_equality_is_identity() {
        let a = ResourceHandle::new(ResourceKind::Buffer, 7);
        let b = ResourceHandle::new(ResourceKind::Buffer, 7);
        let c = ResourceHandle::new(ResourceKind::Image, 7);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn single_instance_node_collapses_ref_index() {
        let node = ResourceNode::buffer(
            "staging",
            BufferDescriptor {
                element_size: 4,
                element_count: 16,
                usage: BufferUsage::STORAGE,
                memory: MemoryLocation::GpuOnly,
                min_alignment: 0,
            },
        )
        .single_instance();

        assert_eq!(node.ref_index(0), 0);
        assert_eq!(node.ref_index(1), 0);

        let buffered = ResourceNode::image("color", ImageDescriptor::default());
        assert_eq!(buffered.ref_index(1), 1);
    }

    #[test]
    fn constructors_set_lifetime_flags() {
        let image = ResourceNode::image("gbuffer", ImageDescriptor::default());
        assert!(image.is_transient && image.is_buffered && !image.is_external);
        assert_eq!(image.kind(), ResourceKind::Image);
        assert!(!image.is_realized());

        let persistent = ResourceNode::image("history", ImageDescriptor::default()).persistent();
        assert!(!persistent.is_transient);
    }
}
