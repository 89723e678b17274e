//! Barrier resolution between producers and consumers
//!
//! A [`Barrier`] wraps one (resource, access) pair for the frame being
//! recorded and decides whether a synchronization transition is required. For
//! images that is a layout transition; for buffers it is a memory barrier
//! covering the last unconsumed write.

use crate::backend::traits::{BufferBarrier, ImageBarrier, RenderBackend};
use crate::backend::types::*;
use crate::render_graph::pass::ResourceAccess;
use crate::render_graph::resource::{ResourceDescriptor, ResourceNode, ResourceRef};

/// Source access mask implied by the layout an image is leaving.
///
/// Unrecognized layouts map to no access, which may over-synchronize but
/// never under-synchronizes.
pub fn src_access_for_layout(layout: ImageLayout) -> AccessFlags {
    match layout {
        ImageLayout::Undefined => AccessFlags::NONE,
        ImageLayout::TransferDst => AccessFlags::TRANSFER_WRITE,
        ImageLayout::ShaderReadOnly => AccessFlags::SHADER_READ,
        ImageLayout::ColorAttachment => AccessFlags::COLOR_ATTACHMENT_WRITE,
        ImageLayout::DepthStencilAttachment => AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        _ => AccessFlags::NONE,
    }
}

/// Destination access mask implied by the layout an image is entering
pub fn dst_access_for_layout(layout: ImageLayout) -> AccessFlags {
    match layout {
        ImageLayout::TransferDst => AccessFlags::TRANSFER_WRITE,
        ImageLayout::ShaderReadOnly => AccessFlags::SHADER_READ,
        ImageLayout::ColorAttachment => AccessFlags::COLOR_ATTACHMENT_WRITE,
        ImageLayout::DepthStencilAttachment => AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        _ => AccessFlags::NONE,
    }
}

/// Computes and applies the transition for one resource access
pub struct Barrier<'a> {
    node: &'a mut ResourceNode,
    access: &'a ResourceAccess,
    frame_index: u32,
}

impl<'a> Barrier<'a> {
    pub fn new(node: &'a mut ResourceNode, access: &'a ResourceAccess, frame_index: u32) -> Self {
        Self {
            node,
            access,
            frame_index,
        }
    }

    /// Whether the resource needs a transition for this access.
    ///
    /// Images: the tracked layout for this frame differs from the required
    /// layout. Buffers: the instance carries an outstanding write that no
    /// barrier has made visible yet.
    pub fn is_needed(&self) -> bool {
        match self.node.reference(self.frame_index) {
            ResourceRef::Image(image) => image.current_layout != self.access.layout,
            ResourceRef::Buffer(buffer) => buffer.pending_write.is_some(),
        }
    }

    /// Records the transition and updates the tracked state.
    ///
    /// Calling this when [`Barrier::is_needed`] is false is a programming
    /// error: the tracked state would be applied twice.
    pub fn apply<B: RenderBackend>(&mut self, backend: &mut B) {
        assert!(
            self.is_needed(),
            "redundant barrier applied to resource `{}`",
            self.node.name
        );

        let (mips, layers, is_depth) = match &self.node.desc {
            ResourceDescriptor::Image(desc) => (desc.mips, desc.layers, desc.format.is_depth()),
            ResourceDescriptor::Buffer(_) => (0, 0, false),
        };

        match self.node.reference_mut(self.frame_index) {
            ResourceRef::Image(image) => {
                backend.cmd_image_barrier(&ImageBarrier {
                    image: image.image,
                    old_layout: image.current_layout,
                    new_layout: self.access.layout,
                    src_access: src_access_for_layout(image.current_layout),
                    dst_access: dst_access_for_layout(self.access.layout),
                    src_stages: self.access.stages,
                    dst_stages: self.access.stages,
                    is_depth,
                    mip_count: mips,
                    layer_count: layers,
                });
                image.current_layout = self.access.layout;
            }
            ResourceRef::Buffer(buffer) => {
                // Conservative: make the pending write visible to any kind of
                // subsequent access.
                let src_stages = buffer.pending_write.take().unwrap_or(StageFlags::ALL_COMMANDS);
                backend.cmd_buffer_barrier(&BufferBarrier {
                    buffer: buffer.buffer,
                    src_access: AccessFlags::MEMORY_WRITE,
                    dst_access: AccessFlags::MEMORY_READ | AccessFlags::MEMORY_WRITE,
                    src_stages,
                    dst_stages: self.access.stages,
                });
            }
        }
    }
}
