//! Frame graph: registries, compilation and per-frame execution
//!
//! A [`RenderGraph`] is populated once with resource and pass declarations,
//! compiled once, then executed every frame. Execution walks the compiled
//! pass order, resolves barriers for reads then writes, realizes resources
//! and render scopes the first time they are written, and invokes each pass
//! callback inside its scope.
//!
//! Known gap: resizing the presentation surface does not re-realize
//! relative-sized resources; they keep the dimensions resolved at first
//! write.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::barrier::Barrier;
use crate::render_graph::pass::{PassContext, PassKind, PassNode, ResourceAccess};
use crate::render_graph::resource::*;
use std::collections::HashMap;
use thiserror::Error;

/// Malformed graph declarations. These are caller programming mistakes; the
/// graph reports them once and they are not recoverable or retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("no pass was designated as the present pass")]
    MissingPresentPass,
    #[error("present pass designated more than once (`{first}`, then `{second}`)")]
    DuplicatePresentPass { first: String, second: String },
    #[error("pass `{pass}` references unregistered resource `{resource}`")]
    UnknownResource { pass: String, resource: String },
    #[error("pass `{pass}` declares more than one depth/stencil write")]
    MultipleDepthWrites { pass: String },
    #[error("pass `{pass}` requires layout {layout:?} but resource `{resource}` has an incompatible format")]
    FormatLayoutMismatch {
        pass: String,
        resource: String,
        layout: ImageLayout,
    },
    #[error("pass `{pass}` reads resource `{resource}` before any pass wrote it")]
    ReadBeforeWrite { pass: String, resource: String },
}

/// Errors surfaced by [`RenderGraph::compile`] and [`RenderGraph::execute`]
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("graph declaration error: {0}")]
    Declaration(#[from] DeclarationError),
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Borrowed pass metadata handed to an ordering strategy
#[derive(Debug, Clone, Copy)]
pub struct PassInfo<'a> {
    pub name: &'a str,
    pub kind: PassKind,
    pub reads: &'a [ResourceAccess],
    pub writes: &'a [ResourceAccess],
}

/// Strategy producing the execution order as a permutation of pass indices.
///
/// The default keeps submission order; a dependency-analyzing scheduler can
/// be injected here without touching execution.
pub trait PassOrdering {
    fn order(&self, passes: &[PassInfo<'_>]) -> Vec<usize>;
}

/// Identity permutation: passes run in the order they were added
#[derive(Debug, Default)]
pub struct SubmissionOrder;

impl PassOrdering for SubmissionOrder {
    fn order(&self, passes: &[PassInfo<'_>]) -> Vec<usize> {
        (0..passes.len()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GraphState {
    Setup,
    Compiled,
}

/// The frame graph
pub struct RenderGraph<B: RenderBackend> {
    resources: Vec<ResourceNode>,
    resource_lookup: HashMap<String, usize>,
    passes: Vec<PassNode<B>>,
    /// Permutation over pass indices produced at compile time.
    order: Vec<usize>,
    /// Every name handed to `add_present_pass`, checked at compile.
    present_designations: Vec<String>,
    present_pass: Option<usize>,
    ordering: Box<dyn PassOrdering>,
    state: GraphState,
}

impl<B: RenderBackend> RenderGraph<B> {
    pub fn new() -> Self {
        Self {
            resources: Vec::new(),
            resource_lookup: HashMap::new(),
            passes: Vec::new(),
            order: Vec::new(),
            present_designations: Vec::new(),
            present_pass: None,
            ordering: Box::new(SubmissionOrder),
            state: GraphState::Setup,
        }
    }

    /// Replace the execution-order strategy. Only valid before compilation.
    pub fn set_ordering(&mut self, ordering: Box<dyn PassOrdering>) {
        assert_eq!(
            self.state,
            GraphState::Setup,
            "ordering can only be changed before compile()"
        );
        self.ordering = ordering;
    }

    /// Register a resource node. Re-adding an existing name silently
    /// overwrites the previous node, including its references; callers
    /// re-declaring realized resources leak them.
    pub fn add_resource(&mut self, node: ResourceNode) -> ResourceHandle {
        assert_eq!(
            self.state,
            GraphState::Setup,
            "resources can only be added before compile()"
        );
        let kind = node.kind();
        let index = match self.resource_lookup.get(&node.name) {
            Some(&index) => {
                self.resources[index] = node;
                index
            }
            None => {
                let index = self.resources.len();
                self.resource_lookup.insert(node.name.clone(), index);
                self.resources.push(node);
                index
            }
        };
        ResourceHandle::new(kind, index as u64)
    }

    /// Register the presentation surface as an externally owned image node,
    /// with one pre-populated reference per frame in flight.
    pub fn add_surface_resource(&mut self, name: impl Into<String>, backend: &B) -> ResourceHandle {
        let extent = backend.surface_extent();
        let desc = ImageDescriptor {
            size: TextureSize::Absolute {
                width: extent.width,
                height: extent.height,
            },
            format: backend.surface_format(),
            usage: TextureUsage::RENDER_ATTACHMENT,
            ..Default::default()
        };
        let refs = backend.surface_images().into_iter().map(ImageRef::from);
        self.add_resource(ResourceNode::external_image(name, desc, refs))
    }

    /// Add a pass to the graph
    pub fn add_pass(&mut self, pass: PassNode<B>) {
        assert_eq!(
            self.state,
            GraphState::Setup,
            "passes can only be added before compile()"
        );
        self.passes.push(pass);
    }

    /// Add a pass and designate it as the terminal pass presenting to the
    /// surface. Exactly one pass must be designated; violations are reported
    /// by [`RenderGraph::compile`].
    pub fn add_present_pass(&mut self, pass: PassNode<B>) {
        self.present_designations.push(pass.name.clone());
        self.add_pass(pass);
    }

    pub fn resource(&self, handle: ResourceHandle) -> Option<&ResourceNode> {
        self.resources.get(handle.index() as usize)
    }

    pub fn resource_by_name(&self, name: &str) -> Option<&ResourceNode> {
        self.resource_lookup
            .get(name)
            .map(|&index| &self.resources[index])
    }

    pub fn passes(&self) -> &[PassNode<B>] {
        &self.passes
    }

    /// Validates the declarations, resolves access names to dense resource
    /// indices and fixes the execution order.
    pub fn compile(&mut self) -> Result<(), GraphError> {
        assert_eq!(self.state, GraphState::Setup, "graph is already compiled");

        match self.present_designations.as_slice() {
            [] => return Err(DeclarationError::MissingPresentPass.into()),
            [_single] => {}
            [first, second, ..] => {
                return Err(DeclarationError::DuplicatePresentPass {
                    first: first.clone(),
                    second: second.clone(),
                }
                .into())
            }
        }

        for pass in &mut self.passes {
            pass.read_indices = resolve_accesses(&pass.name, &pass.reads, &self.resource_lookup)?;
            pass.write_indices = resolve_accesses(&pass.name, &pass.writes, &self.resource_lookup)?;

            check_format_compatibility(&pass.name, &pass.reads, &pass.read_indices, &self.resources)?;
            check_format_compatibility(&pass.name, &pass.writes, &pass.write_indices, &self.resources)?;

            let depth_writes = pass
                .write_indices
                .iter()
                .filter(|&&index| {
                    self.resources[index]
                        .image_format()
                        .is_some_and(|format| format.is_depth())
                })
                .count();
            if depth_writes > 1 {
                return Err(DeclarationError::MultipleDepthWrites {
                    pass: pass.name.clone(),
                }
                .into());
            }
        }

        let present_name = &self.present_designations[0];
        self.present_pass = self.passes.iter().position(|pass| &pass.name == present_name);
        debug_assert!(self.present_pass.is_some());

        let infos: Vec<PassInfo<'_>> = self
            .passes
            .iter()
            .map(|pass| PassInfo {
                name: &pass.name,
                kind: pass.kind,
                reads: &pass.reads,
                writes: &pass.writes,
            })
            .collect();
        self.order = self.ordering.order(&infos);
        assert_permutation(&self.order, self.passes.len());

        self.state = GraphState::Compiled;
        log::debug!(
            "compiled frame graph: {} passes, {} resources, present pass `{}`",
            self.passes.len(),
            self.resources.len(),
            present_name
        );
        Ok(())
    }

    /// Records and submits one frame.
    ///
    /// Skips silently (returning `Ok`) when the platform layer has no frame
    /// slot available; every other failure is fatal to the graph.
    pub fn execute(&mut self, backend: &mut B) -> Result<(), GraphError> {
        assert_eq!(
            self.state,
            GraphState::Compiled,
            "execute() requires a compiled graph"
        );
        debug_assert_eq!(self.order.len(), self.passes.len());

        let frame = match backend.begin_frame()? {
            Some(frame) => frame,
            None => {
                log::trace!("no frame slot available, skipping frame");
                return Ok(());
            }
        };
        let frame_index = frame.frame_index;
        let frames_in_flight = backend.frames_in_flight();

        for &pass_index in &self.order {
            let pass = &mut self.passes[pass_index];

            // Transitions for inputs. Input resources are never created on
            // the fly; reading an unrealized resource is a declaration error.
            for (access, &resource_index) in pass.reads.iter().zip(&pass.read_indices) {
                let node = &mut self.resources[resource_index];
                if !node.is_realized() {
                    return Err(DeclarationError::ReadBeforeWrite {
                        pass: pass.name.clone(),
                        resource: node.name.clone(),
                    }
                    .into());
                }
                let mut barrier = Barrier::new(node, access, frame_index);
                if barrier.is_needed() {
                    barrier.apply(backend);
                }
            }

            // Transitions for outputs, realizing resources on first write
            // and collecting clear values for the scope.
            let mut clear_values = Vec::new();
            for (access, &resource_index) in pass.writes.iter().zip(&pass.write_indices) {
                let node = &mut self.resources[resource_index];
                if !node.is_realized() {
                    realize_resource(node, backend, frames_in_flight)?;
                }

                let mut barrier = Barrier::new(node, access, frame_index);
                if barrier.is_needed() {
                    barrier.apply(backend);
                }
                node.note_buffer_write(frame_index, access.stages);

                if let Some(format) = node.image_format() {
                    clear_values.push(clear_value_for(format));
                }
            }

            if Some(pass_index) == self.present_pass {
                // The terminal pass draws into the platform-owned
                // presentation scope.
                backend.begin_present_pass(&clear_values);
            } else {
                if pass.render_pass.is_none() {
                    realize_pass_targets(pass, &self.resources, backend, frames_in_flight)?;
                }
                let framebuffer = pass.framebuffers[frame_index as usize];
                backend.begin_render_pass(
                    pass.render_pass.expect("render scope just realized"),
                    framebuffer,
                    pass.extent,
                    &clear_values,
                );
            }

            backend.set_viewport(0.0, 0.0, pass.extent.width as f32, pass.extent.height as f32);
            backend.set_scissor(0, 0, pass.extent.width, pass.extent.height);

            let mut context = PassContext {
                backend: &mut *backend,
                frame_index,
                extent: pass.extent,
            };
            (pass.callback)(&mut context);

            backend.end_render_pass();
        }

        backend.end_frame()?;
        Ok(())
    }

    /// Tears down everything the graph created: live references of
    /// graph-owned resources, then realized render scopes. Externally owned
    /// resources are left untouched.
    pub fn destroy(&mut self, backend: &mut B) {
        for node in &mut self.resources {
            if node.is_external {
                continue;
            }
            for reference in node.refs.drain(..) {
                match reference {
                    ResourceRef::Buffer(buffer) => backend.destroy_buffer(buffer.buffer),
                    ResourceRef::Image(image) => {
                        backend.destroy_image_view(image.view);
                        if let Some(sampler) = image.sampler {
                            backend.destroy_sampler(sampler);
                        }
                        backend.destroy_image(image.image);
                    }
                }
            }
        }

        for pass in &mut self.passes {
            if let Some(render_pass) = pass.render_pass.take() {
                for framebuffer in pass.framebuffers.drain(..) {
                    backend.destroy_framebuffer(framebuffer);
                }
                backend.destroy_render_pass(render_pass);
            }
        }
    }
}

impl<B: RenderBackend> Default for RenderGraph<B> {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_accesses(
    pass_name: &str,
    accesses: &[ResourceAccess],
    lookup: &HashMap<String, usize>,
) -> Result<Vec<usize>, DeclarationError> {
    accesses
        .iter()
        .map(|access| {
            lookup
                .get(&access.resource)
                .copied()
                .ok_or_else(|| DeclarationError::UnknownResource {
                    pass: pass_name.to_string(),
                    resource: access.resource.clone(),
                })
        })
        .collect()
}

fn check_format_compatibility(
    pass_name: &str,
    accesses: &[ResourceAccess],
    indices: &[usize],
    resources: &[ResourceNode],
) -> Result<(), DeclarationError> {
    for (access, &index) in accesses.iter().zip(indices) {
        let Some(format) = resources[index].image_format() else {
            continue;
        };
        let compatible = match access.layout {
            ImageLayout::DepthStencilAttachment => format.is_depth(),
            ImageLayout::ColorAttachment => !format.is_depth(),
            _ => true,
        };
        if !compatible {
            return Err(DeclarationError::FormatLayoutMismatch {
                pass: pass_name.to_string(),
                resource: access.resource.clone(),
                layout: access.layout,
            });
        }
    }
    Ok(())
}

fn assert_permutation(order: &[usize], count: usize) {
    assert_eq!(order.len(), count, "ordering strategy changed the pass count");
    let mut seen = vec![false; count];
    for &index in order {
        assert!(
            index < count && !seen[index],
            "ordering strategy did not return a permutation"
        );
        seen[index] = true;
    }
}

/// Allocates the physical objects backing a node: one instance per frame in
/// flight for buffered nodes, one shared instance otherwise. Called exactly
/// once per node, on its first write. Allocation failure is fatal.
fn realize_resource<B: RenderBackend>(
    node: &mut ResourceNode,
    backend: &mut B,
    frames_in_flight: u32,
) -> Result<(), GraphError> {
    debug_assert!(!node.is_external, "external resources are never realized");
    debug_assert!(!node.is_realized());

    let instances = if node.is_buffered { frames_in_flight } else { 1 };

    match &node.desc {
        ResourceDescriptor::Buffer(desc) => {
            log::debug!(
                "realizing buffer `{}` ({} bytes x{})",
                node.name,
                desc.total_size(),
                instances
            );
            for _ in 0..instances {
                let buffer = backend.create_buffer(desc)?;
                node.refs.push(ResourceRef::Buffer(BufferRef {
                    buffer,
                    pending_write: None,
                }));
            }
        }
        ResourceDescriptor::Image(desc) => {
            // Relative sizes resolve against the surface extent now, not at
            // declaration time.
            let extent = desc.size.resolve(backend.surface_extent());
            log::debug!(
                "realizing image `{}` ({}x{} x{})",
                node.name,
                extent.width,
                extent.height,
                instances
            );
            for _ in 0..instances {
                let image = backend.create_image(desc, extent)?;
                let view = backend.create_image_view(image)?;
                let sampler = match &desc.sampler {
                    Some(sampler_desc) => Some(backend.create_sampler(sampler_desc)?),
                    None => None,
                };
                node.refs.push(ResourceRef::Image(ImageRef {
                    image,
                    view,
                    sampler,
                    current_layout: ImageLayout::Undefined,
                }));
            }
        }
    }
    Ok(())
}

/// The two fixed dependencies every graph-owned render scope carries:
/// external -> subpass at color output, and the mirror back out. Depth
/// hazards across passes are handled by the barrier mechanism, not here.
fn scope_dependencies() -> Vec<SubpassDependency> {
    vec![
        SubpassDependency {
            src_subpass: None,
            dst_subpass: Some(0),
            src_stages: StageFlags::BOTTOM_OF_PIPE,
            dst_stages: StageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access: AccessFlags::MEMORY_READ,
            dst_access: AccessFlags::COLOR_ATTACHMENT_READ | AccessFlags::COLOR_ATTACHMENT_WRITE,
            by_region: true,
        },
        SubpassDependency {
            src_subpass: Some(0),
            dst_subpass: None,
            src_stages: StageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stages: StageFlags::BOTTOM_OF_PIPE,
            src_access: AccessFlags::COLOR_ATTACHMENT_READ | AccessFlags::COLOR_ATTACHMENT_WRITE,
            dst_access: AccessFlags::MEMORY_READ,
            by_region: true,
        },
    ]
}

/// Builds the render pass and per-frame framebuffers for a pass from its
/// image write accesses, in declaration order. Buffer writes contribute no
/// attachments.
fn realize_pass_targets<B: RenderBackend>(
    pass: &mut PassNode<B>,
    resources: &[ResourceNode],
    backend: &mut B,
    frames_in_flight: u32,
) -> Result<(), GraphError> {
    assert!(
        !pass.writes.is_empty(),
        "pass `{}` opens a render scope without write accesses",
        pass.name
    );

    let mut attachments = Vec::new();
    let mut color_refs = Vec::new();
    let mut depth_ref = None;
    let mut max_layers = 1;

    for (access, &resource_index) in pass.writes.iter().zip(&pass.write_indices) {
        let node = &resources[resource_index];
        let ResourceDescriptor::Image(desc) = &node.desc else {
            continue;
        };

        let attachment_index = attachments.len() as u32;
        attachments.push(AttachmentDescription {
            format: desc.format,
            load_op: access.load_op,
            store_op: access.store_op,
            initial_layout: access.layout,
            final_layout: access.layout,
        });

        if desc.format.is_depth() {
            debug_assert!(depth_ref.is_none(), "multiple depth writes past compile()");
            depth_ref = Some(attachment_index);
        } else {
            color_refs.push(attachment_index);
        }
        max_layers = max_layers.max(desc.layers);
    }

    let render_pass = backend.create_render_pass(&RenderScopeDesc {
        attachments,
        color_refs,
        depth_ref,
        dependencies: scope_dependencies(),
    })?;

    let mut framebuffers = Vec::with_capacity(frames_in_flight as usize);
    for frame in 0..frames_in_flight {
        let views: Vec<ImageViewHandle> = pass
            .writes
            .iter()
            .zip(&pass.write_indices)
            .filter_map(|(_, &resource_index)| {
                let node = &resources[resource_index];
                node.reference(frame).as_image().map(|image| image.view)
            })
            .collect();
        framebuffers.push(backend.create_framebuffer(render_pass, &views, pass.extent, max_layers)?);
    }

    pass.render_pass = Some(render_pass);
    pass.framebuffers = framebuffers;
    Ok(())
}

fn clear_value_for(format: TextureFormat) -> ClearValue {
    if format.is_depth() {
        ClearValue::DepthStencil {
            depth: 1.0,
            stencil: 0,
        }
    } else {
        ClearValue::Color([0.0, 0.0, 0.0, 0.0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_order_is_identity() {
        let infos: Vec<PassInfo<'_>> = Vec::new();
        assert!(SubmissionOrder.order(&infos).is_empty());

        let reads: Vec<ResourceAccess> = Vec::new();
        let writes: Vec<ResourceAccess> = Vec::new();
        let infos = vec![
            PassInfo {
                name: "a",
                kind: PassKind::Graphics,
                reads: &reads,
                writes: &writes,
            },
            PassInfo {
                name: "b",
                kind: PassKind::Compute,
                reads: &reads,
                writes: &writes,
            },
        ];
        assert_eq!(SubmissionOrder.order(&infos), vec![0, 1]);
    }

    #[test]
    fn clear_values_follow_format_class() {
        assert_eq!(
            clear_value_for(TextureFormat::Depth32Float),
            ClearValue::DepthStencil {
                depth: 1.0,
                stencil: 0
            }
        );
        assert_eq!(
            clear_value_for(TextureFormat::Rgba8Unorm),
            ClearValue::Color([0.0, 0.0, 0.0, 0.0])
        );
    }

    #[test]
    #[should_panic(expected = "permutation")]
    fn non_permutation_order_is_rejected() {
        assert_permutation(&[0, 0], 2);
    }
}
