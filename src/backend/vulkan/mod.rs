//! Vulkan backend implementation using ash
//!
//! Owns instance/device/swapchain bootstrap, per-frame-in-flight command
//! buffers and synchronization, and the presentation render pass the graph's
//! present pass draws into.

use crate::backend::traits::*;
use crate::backend::types::*;
use ash::khr::{surface, swapchain};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation as AllocatorMemoryLocation;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::collections::HashMap;
use std::ffi::CString;
use std::sync::Arc;

/// Backend configuration
#[derive(Debug, Clone)]
pub struct VulkanConfig {
    pub app_name: String,
    pub vsync: bool,
    /// Number of frames the device may work on concurrently.
    pub frames_in_flight: u32,
}

impl Default for VulkanConfig {
    fn default() -> Self {
        Self {
            app_name: "frame-graph".to_string(),
            vsync: true,
            frames_in_flight: 2,
        }
    }
}

struct VkBuffer {
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
}

struct VkImage {
    image: vk::Image,
    /// None for swapchain images, which are not allocator-backed.
    allocation: Option<Allocation>,
    format: vk::Format,
    mips: u32,
    layers: u32,
    view_type: vk::ImageViewType,
}

/// Per-frame-in-flight recording and synchronization state
struct FrameSlot {
    command_buffer: vk::CommandBuffer,
    image_available: vk::Semaphore,
    render_finished: vk::Semaphore,
    in_flight: vk::Fence,
}

/// Vulkan backend implementation
pub struct VulkanBackend {
    _entry: ash::Entry,
    instance: ash::Instance,
    surface_fn: surface::Instance,
    swapchain_fn: swapchain::Device,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    graphics_queue: vk::Queue,
    allocator: Option<Arc<Mutex<Allocator>>>,

    // Swapchain
    swapchain: vk::SwapchainKHR,
    swapchain_images: Vec<vk::Image>,
    swapchain_image_views: Vec<vk::ImageView>,
    swapchain_format: vk::Format,
    depth_vk_format: vk::Format,
    swapchain_extent: vk::Extent2D,
    current_image_index: u32,

    // Presentation scope
    present_render_pass: vk::RenderPass,
    present_framebuffers: Vec<vk::Framebuffer>,

    // Frame slots
    command_pool: vk::CommandPool,
    frames: Vec<FrameSlot>,
    frame_index: u32,
    is_recording: bool,

    // Resource storage
    buffers: HashMap<u64, VkBuffer>,
    images: HashMap<u64, VkImage>,
    image_views: HashMap<u64, vk::ImageView>,
    samplers: HashMap<u64, vk::Sampler>,
    render_passes: HashMap<u64, vk::RenderPass>,
    framebuffers: HashMap<u64, vk::Framebuffer>,

    // Stable handle ids for the presentation images; swapchain recreation
    // updates the mapped objects in place so graph-held handles stay valid.
    surface_image_ids: Vec<u64>,
    surface_view_ids: Vec<u64>,

    // Handle counters
    next_buffer_id: u64,
    next_image_id: u64,
    next_view_id: u64,
    next_sampler_id: u64,
    next_render_pass_id: u64,
    next_framebuffer_id: u64,

    config: VulkanConfig,
}

impl VulkanBackend {
    pub fn new(window: Arc<winit::window::Window>, config: VulkanConfig) -> BackendResult<Self> {
        assert!(config.frames_in_flight >= 1);
        unsafe {
            let entry = ash::Entry::load()
                .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

            let app_name = CString::new(config.app_name.as_str())
                .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;
            let app_info = vk::ApplicationInfo {
                p_application_name: app_name.as_ptr(),
                application_version: vk::make_api_version(0, 1, 0, 0),
                p_engine_name: app_name.as_ptr(),
                engine_version: vk::make_api_version(0, 1, 0, 0),
                api_version: vk::API_VERSION_1_2,
                ..Default::default()
            };

            let display_handle = window
                .display_handle()
                .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;
            let window_handle = window
                .window_handle()
                .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

            let extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| BackendError::InitializationFailed(e.to_string()))?
                .to_vec();

            let instance_info = vk::InstanceCreateInfo {
                p_application_info: &app_info,
                enabled_extension_count: extensions.len() as u32,
                pp_enabled_extension_names: extensions.as_ptr(),
                ..Default::default()
            };

            let instance = entry
                .create_instance(&instance_info, None)
                .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

            let surface_fn = surface::Instance::new(&entry, &instance);
            let surface = ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;

            let physical_devices = instance
                .enumerate_physical_devices()
                .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

            let physical_device = physical_devices
                .into_iter()
                .find(|&pd| Self::find_queue_family(&instance, pd, &surface_fn, surface).is_some())
                .ok_or_else(|| {
                    BackendError::InitializationFailed("No suitable physical device".into())
                })?;

            let graphics_queue_family =
                Self::find_queue_family(&instance, physical_device, &surface_fn, surface)
                    .ok_or_else(|| {
                        BackendError::InitializationFailed("No suitable queue family".into())
                    })?;

            let queue_priorities = [1.0f32];
            let queue_info = vk::DeviceQueueCreateInfo {
                queue_family_index: graphics_queue_family,
                queue_count: 1,
                p_queue_priorities: queue_priorities.as_ptr(),
                ..Default::default()
            };

            let device_extensions = [swapchain::NAME.as_ptr()];
            let device_features = vk::PhysicalDeviceFeatures::default();

            let device_info = vk::DeviceCreateInfo {
                queue_create_info_count: 1,
                p_queue_create_infos: &queue_info,
                enabled_extension_count: device_extensions.len() as u32,
                pp_enabled_extension_names: device_extensions.as_ptr(),
                p_enabled_features: &device_features,
                ..Default::default()
            };

            let device = instance
                .create_device(physical_device, &device_info, None)
                .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

            let graphics_queue = device.get_device_queue(graphics_queue_family, 0);

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

            let swapchain_fn = swapchain::Device::new(&instance, &device);

            let pool_info = vk::CommandPoolCreateInfo {
                queue_family_index: graphics_queue_family,
                flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
                ..Default::default()
            };
            let command_pool = device
                .create_command_pool(&pool_info, None)
                .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

            let alloc_info = vk::CommandBufferAllocateInfo {
                command_pool,
                level: vk::CommandBufferLevel::PRIMARY,
                command_buffer_count: config.frames_in_flight,
                ..Default::default()
            };
            let command_buffers = device
                .allocate_command_buffers(&alloc_info)
                .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

            let semaphore_info = vk::SemaphoreCreateInfo::default();
            let fence_info = vk::FenceCreateInfo {
                flags: vk::FenceCreateFlags::SIGNALED,
                ..Default::default()
            };

            let mut frames = Vec::with_capacity(config.frames_in_flight as usize);
            for &command_buffer in &command_buffers {
                let image_available = device
                    .create_semaphore(&semaphore_info, None)
                    .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;
                let render_finished = device
                    .create_semaphore(&semaphore_info, None)
                    .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;
                let in_flight = device
                    .create_fence(&fence_info, None)
                    .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;
                frames.push(FrameSlot {
                    command_buffer,
                    image_available,
                    render_finished,
                    in_flight,
                });
            }

            let depth_vk_format = Self::find_depth_format(&instance, physical_device);

            let mut backend = Self {
                _entry: entry,
                instance,
                surface_fn,
                swapchain_fn,
                surface,
                physical_device,
                device,
                graphics_queue,
                allocator: Some(Arc::new(Mutex::new(allocator))),
                swapchain: vk::SwapchainKHR::null(),
                swapchain_images: Vec::new(),
                swapchain_image_views: Vec::new(),
                swapchain_format: vk::Format::B8G8R8A8_SRGB,
                depth_vk_format,
                swapchain_extent: vk::Extent2D {
                    width: 0,
                    height: 0,
                },
                current_image_index: 0,
                present_render_pass: vk::RenderPass::null(),
                present_framebuffers: Vec::new(),
                command_pool,
                frames,
                frame_index: 0,
                is_recording: false,
                buffers: HashMap::new(),
                images: HashMap::new(),
                image_views: HashMap::new(),
                samplers: HashMap::new(),
                render_passes: HashMap::new(),
                framebuffers: HashMap::new(),
                surface_image_ids: Vec::new(),
                surface_view_ids: Vec::new(),
                next_buffer_id: 1,
                next_image_id: 1,
                next_view_id: 1,
                next_sampler_id: 1,
                next_render_pass_id: 1,
                next_framebuffer_id: 1,
                config,
            };

            let size = window.inner_size();
            backend.create_swapchain(size.width.max(1), size.height.max(1))?;
            backend.present_render_pass =
                Self::create_present_render_pass(&backend.device, backend.swapchain_format)?;
            backend.create_present_framebuffers()?;
            backend.register_surface_images();

            Ok(backend)
        }
    }

    /// Get the Vulkan device for pass callbacks that record raw commands
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Command buffer of the frame currently being recorded
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.frames[self.frame_index as usize].command_buffer
    }

    /// Recreate the swapchain after a resize. Resources sized relative to the
    /// surface are not re-realized by the graph; see the render graph docs.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            if let Err(e) = self.recreate_swapchain(width, height) {
                log::warn!("swapchain recreation failed: {e}");
            }
        }
    }

    fn find_queue_family(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        surface_fn: &surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Option<u32> {
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        for (index, family) in queue_families.iter().enumerate() {
            let supports_graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let supports_surface = unsafe {
                surface_fn
                    .get_physical_device_surface_support(physical_device, index as u32, surface)
                    .unwrap_or(false)
            };
            if supports_graphics && supports_surface {
                return Some(index as u32);
            }
        }
        None
    }

    fn find_depth_format(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> vk::Format {
        for format in [vk::Format::D32_SFLOAT, vk::Format::D24_UNORM_S8_UINT] {
            let props =
                unsafe { instance.get_physical_device_format_properties(physical_device, format) };
            if props
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
            {
                return format;
            }
        }
        vk::Format::D32_SFLOAT
    }

    fn create_swapchain(&mut self, width: u32, height: u32) -> BackendResult<()> {
        unsafe {
            self.device.device_wait_idle().ok();

            for &view in &self.swapchain_image_views {
                self.device.destroy_image_view(view, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_fn.destroy_swapchain(self.swapchain, None);
            }

            let capabilities = self
                .surface_fn
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)
                .map_err(|e| BackendError::SwapchainCreationFailed(e.to_string()))?;

            let formats = self
                .surface_fn
                .get_physical_device_surface_formats(self.physical_device, self.surface)
                .map_err(|e| BackendError::SwapchainCreationFailed(e.to_string()))?;

            let present_modes = self
                .surface_fn
                .get_physical_device_surface_present_modes(self.physical_device, self.surface)
                .map_err(|e| BackendError::SwapchainCreationFailed(e.to_string()))?;

            let format = formats
                .iter()
                .find(|f| {
                    f.format == vk::Format::B8G8R8A8_SRGB
                        && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
                })
                .unwrap_or(&formats[0]);

            let present_mode = if self.config.vsync {
                vk::PresentModeKHR::FIFO
            } else {
                present_modes
                    .iter()
                    .copied()
                    .find(|&m| m == vk::PresentModeKHR::MAILBOX)
                    .unwrap_or(vk::PresentModeKHR::FIFO)
            };

            let extent = if capabilities.current_extent.width != u32::MAX {
                capabilities.current_extent
            } else {
                vk::Extent2D {
                    width: width.clamp(
                        capabilities.min_image_extent.width,
                        capabilities.max_image_extent.width,
                    ),
                    height: height.clamp(
                        capabilities.min_image_extent.height,
                        capabilities.max_image_extent.height,
                    ),
                }
            };

            let image_count = (capabilities.min_image_count + 1).min(
                if capabilities.max_image_count > 0 {
                    capabilities.max_image_count
                } else {
                    u32::MAX
                },
            );

            let swapchain_info = vk::SwapchainCreateInfoKHR {
                surface: self.surface,
                min_image_count: image_count,
                image_format: format.format,
                image_color_space: format.color_space,
                image_extent: extent,
                image_array_layers: 1,
                image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
                image_sharing_mode: vk::SharingMode::EXCLUSIVE,
                pre_transform: capabilities.current_transform,
                composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                present_mode,
                clipped: vk::TRUE,
                ..Default::default()
            };

            self.swapchain = self
                .swapchain_fn
                .create_swapchain(&swapchain_info, None)
                .map_err(|e| BackendError::SwapchainCreationFailed(e.to_string()))?;

            self.swapchain_images = self
                .swapchain_fn
                .get_swapchain_images(self.swapchain)
                .map_err(|e| BackendError::SwapchainCreationFailed(e.to_string()))?;

            self.swapchain_format = format.format;
            self.swapchain_extent = extent;

            self.swapchain_image_views = self
                .swapchain_images
                .iter()
                .map(|&image| {
                    let view_info = vk::ImageViewCreateInfo {
                        image,
                        view_type: vk::ImageViewType::TYPE_2D,
                        format: format.format,
                        components: vk::ComponentMapping::default(),
                        subresource_range: vk::ImageSubresourceRange {
                            aspect_mask: vk::ImageAspectFlags::COLOR,
                            base_mip_level: 0,
                            level_count: 1,
                            base_array_layer: 0,
                            layer_count: 1,
                        },
                        ..Default::default()
                    };
                    self.device.create_image_view(&view_info, None)
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| BackendError::SwapchainCreationFailed(e.to_string()))?;

            Ok(())
        }
    }

    fn recreate_swapchain(&mut self, width: u32, height: u32) -> BackendResult<()> {
        unsafe {
            for &framebuffer in &self.present_framebuffers {
                self.device.destroy_framebuffer(framebuffer, None);
            }
            self.present_framebuffers.clear();
        }
        self.create_swapchain(width, height)?;
        self.create_present_framebuffers()?;
        self.register_surface_images();
        Ok(())
    }

    /// Color-only presentation scope: clear on load, transition to present on
    /// store.
    fn create_present_render_pass(
        device: &ash::Device,
        format: vk::Format,
    ) -> BackendResult<vk::RenderPass> {
        let attachment = vk::AttachmentDescription {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        };

        let attachment_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };

        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 1,
            p_color_attachments: &attachment_ref,
            ..Default::default()
        };

        let dependency = vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ..Default::default()
        };

        let render_pass_info = vk::RenderPassCreateInfo {
            attachment_count: 1,
            p_attachments: &attachment,
            subpass_count: 1,
            p_subpasses: &subpass,
            dependency_count: 1,
            p_dependencies: &dependency,
            ..Default::default()
        };

        unsafe {
            device
                .create_render_pass(&render_pass_info, None)
                .map_err(|e| BackendError::RenderPassCreationFailed(e.to_string()))
        }
    }

    fn create_present_framebuffers(&mut self) -> BackendResult<()> {
        if self.present_render_pass == vk::RenderPass::null() {
            return Ok(());
        }
        for &view in &self.swapchain_image_views {
            let framebuffer_info = vk::FramebufferCreateInfo {
                render_pass: self.present_render_pass,
                attachment_count: 1,
                p_attachments: &view,
                width: self.swapchain_extent.width,
                height: self.swapchain_extent.height,
                layers: 1,
                ..Default::default()
            };
            let framebuffer = unsafe {
                self.device
                    .create_framebuffer(&framebuffer_info, None)
                    .map_err(|e| BackendError::FramebufferCreationFailed(e.to_string()))?
            };
            self.present_framebuffers.push(framebuffer);
        }
        Ok(())
    }

    /// (Re)expose the swapchain images under stable handle ids, one per frame
    /// in flight.
    fn register_surface_images(&mut self) {
        if self.surface_image_ids.is_empty() {
            for _ in 0..self.config.frames_in_flight {
                self.surface_image_ids.push(self.next_image_id);
                self.next_image_id += 1;
                self.surface_view_ids.push(self.next_view_id);
                self.next_view_id += 1;
            }
        }
        for slot in 0..self.config.frames_in_flight as usize {
            let source = slot % self.swapchain_images.len();
            self.images.insert(
                self.surface_image_ids[slot],
                VkImage {
                    image: self.swapchain_images[source],
                    allocation: None,
                    format: self.swapchain_format,
                    mips: 1,
                    layers: 1,
                    view_type: vk::ImageViewType::TYPE_2D,
                },
            );
            self.image_views
                .insert(self.surface_view_ids[slot], self.swapchain_image_views[source]);
        }
    }

    fn convert_format(format: TextureFormat) -> vk::Format {
        match format {
            TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
            TextureFormat::Rgba8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
            TextureFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
            TextureFormat::Bgra8UnormSrgb => vk::Format::B8G8R8A8_SRGB,
            TextureFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
            TextureFormat::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
            TextureFormat::Depth32Float => vk::Format::D32_SFLOAT,
            TextureFormat::Depth24PlusStencil8 => vk::Format::D24_UNORM_S8_UINT,
            TextureFormat::R32Float => vk::Format::R32_SFLOAT,
            TextureFormat::Rg32Float => vk::Format::R32G32_SFLOAT,
        }
    }

    fn convert_format_back(format: vk::Format) -> TextureFormat {
        match format {
            vk::Format::R8G8B8A8_UNORM => TextureFormat::Rgba8Unorm,
            vk::Format::R8G8B8A8_SRGB => TextureFormat::Rgba8UnormSrgb,
            vk::Format::B8G8R8A8_UNORM => TextureFormat::Bgra8Unorm,
            vk::Format::B8G8R8A8_SRGB => TextureFormat::Bgra8UnormSrgb,
            vk::Format::R16G16B16A16_SFLOAT => TextureFormat::Rgba16Float,
            vk::Format::R32G32B32A32_SFLOAT => TextureFormat::Rgba32Float,
            vk::Format::D32_SFLOAT => TextureFormat::Depth32Float,
            vk::Format::D24_UNORM_S8_UINT => TextureFormat::Depth24PlusStencil8,
            vk::Format::R32_SFLOAT => TextureFormat::R32Float,
            vk::Format::R32G32_SFLOAT => TextureFormat::Rg32Float,
            _ => TextureFormat::Bgra8UnormSrgb,
        }
    }

    fn convert_layout(layout: ImageLayout) -> vk::ImageLayout {
        match layout {
            ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
            ImageLayout::General => vk::ImageLayout::GENERAL,
            ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ImageLayout::DepthStencilAttachment => {
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
            }
            ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            ImageLayout::Present => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }

    fn convert_stages(stages: StageFlags) -> vk::PipelineStageFlags {
        let mut flags = vk::PipelineStageFlags::empty();
        if stages.contains(StageFlags::TOP_OF_PIPE) {
            flags |= vk::PipelineStageFlags::TOP_OF_PIPE;
        }
        if stages.contains(StageFlags::VERTEX_SHADER) {
            flags |= vk::PipelineStageFlags::VERTEX_SHADER;
        }
        if stages.contains(StageFlags::EARLY_FRAGMENT_TESTS) {
            flags |= vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        }
        if stages.contains(StageFlags::FRAGMENT_SHADER) {
            flags |= vk::PipelineStageFlags::FRAGMENT_SHADER;
        }
        if stages.contains(StageFlags::LATE_FRAGMENT_TESTS) {
            flags |= vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        }
        if stages.contains(StageFlags::COLOR_ATTACHMENT_OUTPUT) {
            flags |= vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        }
        if stages.contains(StageFlags::COMPUTE_SHADER) {
            flags |= vk::PipelineStageFlags::COMPUTE_SHADER;
        }
        if stages.contains(StageFlags::TRANSFER) {
            flags |= vk::PipelineStageFlags::TRANSFER;
        }
        if stages.contains(StageFlags::BOTTOM_OF_PIPE) {
            flags |= vk::PipelineStageFlags::BOTTOM_OF_PIPE;
        }
        if stages.contains(StageFlags::ALL_COMMANDS) || flags.is_empty() {
            flags |= vk::PipelineStageFlags::ALL_COMMANDS;
        }
        flags
    }

    fn convert_access(access: AccessFlags) -> vk::AccessFlags {
        let mut flags = vk::AccessFlags::empty();
        if access.contains(AccessFlags::SHADER_READ) {
            flags |= vk::AccessFlags::SHADER_READ;
        }
        if access.contains(AccessFlags::SHADER_WRITE) {
            flags |= vk::AccessFlags::SHADER_WRITE;
        }
        if access.contains(AccessFlags::COLOR_ATTACHMENT_READ) {
            flags |= vk::AccessFlags::COLOR_ATTACHMENT_READ;
        }
        if access.contains(AccessFlags::COLOR_ATTACHMENT_WRITE) {
            flags |= vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
        }
        if access.contains(AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE) {
            flags |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
        }
        if access.contains(AccessFlags::TRANSFER_READ) {
            flags |= vk::AccessFlags::TRANSFER_READ;
        }
        if access.contains(AccessFlags::TRANSFER_WRITE) {
            flags |= vk::AccessFlags::TRANSFER_WRITE;
        }
        if access.contains(AccessFlags::MEMORY_READ) {
            flags |= vk::AccessFlags::MEMORY_READ;
        }
        if access.contains(AccessFlags::MEMORY_WRITE) {
            flags |= vk::AccessFlags::MEMORY_WRITE;
        }
        flags
    }

    fn convert_load_op(load_op: LoadOp) -> vk::AttachmentLoadOp {
        match load_op {
            LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
            LoadOp::Load => vk::AttachmentLoadOp::LOAD,
            LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        }
    }

    fn convert_store_op(store_op: StoreOp) -> vk::AttachmentStoreOp {
        match store_op {
            StoreOp::Store => vk::AttachmentStoreOp::STORE,
            StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
        }
    }

    fn convert_filter(mode: FilterMode) -> vk::Filter {
        match mode {
            FilterMode::Nearest => vk::Filter::NEAREST,
            FilterMode::Linear => vk::Filter::LINEAR,
        }
    }

    fn convert_address_mode(mode: AddressMode) -> vk::SamplerAddressMode {
        match mode {
            AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
            AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
            AddressMode::MirrorRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        }
    }

    fn convert_clear_value(value: &ClearValue) -> vk::ClearValue {
        match value {
            ClearValue::Color(color) => vk::ClearValue {
                color: vk::ClearColorValue { float32: *color },
            },
            ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: *depth,
                    stencil: *stencil,
                },
            },
        }
    }
}

impl RenderBackend for VulkanBackend {
    fn frames_in_flight(&self) -> u32 {
        self.config.frames_in_flight
    }

    fn surface_extent(&self) -> Extent2d {
        Extent2d::new(self.swapchain_extent.width, self.swapchain_extent.height)
    }

    fn surface_format(&self) -> TextureFormat {
        Self::convert_format_back(self.swapchain_format)
    }

    fn depth_format(&self) -> TextureFormat {
        Self::convert_format_back(self.depth_vk_format)
    }

    fn surface_images(&self) -> Vec<SurfaceImage> {
        self.surface_image_ids
            .iter()
            .zip(&self.surface_view_ids)
            .map(|(&image_id, &view_id)| SurfaceImage {
                image: ImageHandle(image_id),
                view: ImageViewHandle(view_id),
                layout: ImageLayout::Undefined,
            })
            .collect()
    }

    fn begin_frame(&mut self) -> BackendResult<Option<FrameContext>> {
        unsafe {
            let slot = &self.frames[self.frame_index as usize];

            self.device
                .wait_for_fences(&[slot.in_flight], true, u64::MAX)
                .map_err(|e| BackendError::AcquireImageFailed(e.to_string()))?;

            let acquired = self.swapchain_fn.acquire_next_image(
                self.swapchain,
                u64::MAX,
                slot.image_available,
                vk::Fence::null(),
            );

            let image_index = match acquired {
                Ok((image_index, false)) => image_index,
                // Surface temporarily unavailable: recreate and skip this
                // frame rather than fail.
                Ok((_, true)) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                    let extent = self.swapchain_extent;
                    self.recreate_swapchain(extent.width, extent.height)?;
                    return Ok(None);
                }
                Err(e) => return Err(BackendError::AcquireImageFailed(e.to_string())),
            };

            self.current_image_index = image_index;

            let slot = &self.frames[self.frame_index as usize];
            self.device
                .reset_fences(&[slot.in_flight])
                .map_err(|e| BackendError::AcquireImageFailed(e.to_string()))?;

            self.device
                .reset_command_buffer(slot.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| BackendError::AcquireImageFailed(e.to_string()))?;

            let begin_info = vk::CommandBufferBeginInfo::default();
            self.device
                .begin_command_buffer(slot.command_buffer, &begin_info)
                .map_err(|e| BackendError::AcquireImageFailed(e.to_string()))?;

            self.is_recording = true;

            Ok(Some(FrameContext {
                frame_index: self.frame_index,
            }))
        }
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        unsafe {
            let slot = &self.frames[self.frame_index as usize];

            if self.is_recording {
                self.device
                    .end_command_buffer(slot.command_buffer)
                    .map_err(|e| BackendError::PresentFailed(e.to_string()))?;
                self.is_recording = false;
            }

            let wait_semaphores = [slot.image_available];
            let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
            let signal_semaphores = [slot.render_finished];
            let command_buffers = [slot.command_buffer];

            let submit_info = vk::SubmitInfo {
                wait_semaphore_count: 1,
                p_wait_semaphores: wait_semaphores.as_ptr(),
                p_wait_dst_stage_mask: wait_stages.as_ptr(),
                command_buffer_count: 1,
                p_command_buffers: command_buffers.as_ptr(),
                signal_semaphore_count: 1,
                p_signal_semaphores: signal_semaphores.as_ptr(),
                ..Default::default()
            };

            self.device
                .queue_submit(self.graphics_queue, &[submit_info], slot.in_flight)
                .map_err(|e| BackendError::PresentFailed(e.to_string()))?;

            let swapchains = [self.swapchain];
            let image_indices = [self.current_image_index];

            let present_info = vk::PresentInfoKHR {
                wait_semaphore_count: 1,
                p_wait_semaphores: signal_semaphores.as_ptr(),
                swapchain_count: 1,
                p_swapchains: swapchains.as_ptr(),
                p_image_indices: image_indices.as_ptr(),
                ..Default::default()
            };

            let _ = self
                .swapchain_fn
                .queue_present(self.graphics_queue, &present_info);

            self.frame_index = (self.frame_index + 1) % self.config.frames_in_flight;

            Ok(())
        }
    }

    fn begin_present_pass(&mut self, clear_values: &[ClearValue]) {
        // Single color attachment; take the first color clear declared for
        // this pass, default to opaque black.
        let clear_color = clear_values
            .iter()
            .find_map(|value| match value {
                ClearValue::Color(color) => Some(*color),
                ClearValue::DepthStencil { .. } => None,
            })
            .unwrap_or([0.0, 0.0, 0.0, 1.0]);
        let vk_clear = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        }];

        let render_pass_info = vk::RenderPassBeginInfo {
            render_pass: self.present_render_pass,
            framebuffer: self.present_framebuffers[self.current_image_index as usize],
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.swapchain_extent,
            },
            clear_value_count: vk_clear.len() as u32,
            p_clear_values: vk_clear.as_ptr(),
            ..Default::default()
        };

        unsafe {
            self.device.cmd_begin_render_pass(
                self.command_buffer(),
                &render_pass_info,
                vk::SubpassContents::INLINE,
            );
        }
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        unsafe {
            let mut usage = vk::BufferUsageFlags::empty();
            if desc.usage.contains(BufferUsage::COPY_SRC) {
                usage |= vk::BufferUsageFlags::TRANSFER_SRC;
            }
            if desc.usage.contains(BufferUsage::COPY_DST) {
                usage |= vk::BufferUsageFlags::TRANSFER_DST;
            }
            if desc.usage.contains(BufferUsage::INDEX) {
                usage |= vk::BufferUsageFlags::INDEX_BUFFER;
            }
            if desc.usage.contains(BufferUsage::VERTEX) {
                usage |= vk::BufferUsageFlags::VERTEX_BUFFER;
            }
            if desc.usage.contains(BufferUsage::UNIFORM) {
                usage |= vk::BufferUsageFlags::UNIFORM_BUFFER;
            }
            if desc.usage.contains(BufferUsage::STORAGE) {
                usage |= vk::BufferUsageFlags::STORAGE_BUFFER;
            }
            if desc.usage.contains(BufferUsage::INDIRECT) {
                usage |= vk::BufferUsageFlags::INDIRECT_BUFFER;
            }

            let buffer_info = vk::BufferCreateInfo {
                size: desc.total_size(),
                usage,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                ..Default::default()
            };

            let buffer = self
                .device
                .create_buffer(&buffer_info, None)
                .map_err(|e| BackendError::BufferCreationFailed(e.to_string()))?;

            let requirements = self.device.get_buffer_memory_requirements(buffer);

            let location = match desc.memory {
                MemoryLocation::GpuOnly => AllocatorMemoryLocation::GpuOnly,
                MemoryLocation::CpuToGpu => AllocatorMemoryLocation::CpuToGpu,
                MemoryLocation::GpuToCpu => AllocatorMemoryLocation::GpuToCpu,
            };

            let allocation = self
                .allocator
                .as_ref()
                .ok_or_else(|| BackendError::BufferCreationFailed("Allocator not available".into()))?
                .lock()
                .allocate(&AllocationCreateDesc {
                    name: "graph buffer",
                    requirements,
                    location,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| BackendError::BufferCreationFailed(e.to_string()))?;

            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .map_err(|e| BackendError::BufferCreationFailed(e.to_string()))?;

            let id = self.next_buffer_id;
            self.next_buffer_id += 1;
            self.buffers.insert(
                id,
                VkBuffer {
                    buffer,
                    allocation: Some(allocation),
                },
            );

            Ok(BufferHandle(id))
        }
    }

    fn create_image(
        &mut self,
        desc: &ImageDescriptor,
        extent: Extent2d,
    ) -> BackendResult<ImageHandle> {
        unsafe {
            let format = Self::convert_format(desc.format);
            let is_depth = desc.format.is_depth();

            let mut usage = vk::ImageUsageFlags::empty();
            if desc.usage.contains(TextureUsage::COPY_SRC) {
                usage |= vk::ImageUsageFlags::TRANSFER_SRC;
            }
            if desc.usage.contains(TextureUsage::COPY_DST) {
                usage |= vk::ImageUsageFlags::TRANSFER_DST;
            }
            if desc.usage.contains(TextureUsage::SAMPLED) {
                usage |= vk::ImageUsageFlags::SAMPLED;
            }
            if desc.usage.contains(TextureUsage::STORAGE) {
                usage |= vk::ImageUsageFlags::STORAGE;
            }
            if desc.usage.contains(TextureUsage::RENDER_ATTACHMENT) {
                if is_depth {
                    usage |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
                } else {
                    usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
                }
            }

            let flags = if desc.kind == ImageKind::Cube {
                vk::ImageCreateFlags::CUBE_COMPATIBLE
            } else {
                vk::ImageCreateFlags::empty()
            };

            let image_info = vk::ImageCreateInfo {
                flags,
                image_type: if desc.depth > 1 {
                    vk::ImageType::TYPE_3D
                } else {
                    vk::ImageType::TYPE_2D
                },
                extent: vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: desc.depth,
                },
                mip_levels: desc.mips,
                array_layers: desc.layers,
                format,
                tiling: vk::ImageTiling::OPTIMAL,
                initial_layout: vk::ImageLayout::UNDEFINED,
                usage,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                samples: vk::SampleCountFlags::TYPE_1,
                ..Default::default()
            };

            let image = self
                .device
                .create_image(&image_info, None)
                .map_err(|e| BackendError::ImageCreationFailed(e.to_string()))?;

            let requirements = self.device.get_image_memory_requirements(image);

            let allocation = self
                .allocator
                .as_ref()
                .ok_or_else(|| BackendError::ImageCreationFailed("Allocator not available".into()))?
                .lock()
                .allocate(&AllocationCreateDesc {
                    name: "graph image",
                    requirements,
                    location: AllocatorMemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| BackendError::ImageCreationFailed(e.to_string()))?;

            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .map_err(|e| BackendError::ImageCreationFailed(e.to_string()))?;

            let view_type = match desc.kind {
                ImageKind::D2 => vk::ImageViewType::TYPE_2D,
                ImageKind::Cube => vk::ImageViewType::CUBE,
                ImageKind::Array => vk::ImageViewType::TYPE_2D_ARRAY,
            };

            let id = self.next_image_id;
            self.next_image_id += 1;
            self.images.insert(
                id,
                VkImage {
                    image,
                    allocation: Some(allocation),
                    format,
                    mips: desc.mips,
                    layers: desc.layers,
                    view_type,
                },
            );

            Ok(ImageHandle(id))
        }
    }

    fn create_image_view(&mut self, image: ImageHandle) -> BackendResult<ImageViewHandle> {
        let vk_image = self
            .images
            .get(&image.0)
            .ok_or_else(|| BackendError::ImageCreationFailed("Image not found".into()))?;

        let is_depth = matches!(
            vk_image.format,
            vk::Format::D32_SFLOAT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D16_UNORM
        );
        let aspect_mask = if is_depth {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        };

        let view_info = vk::ImageViewCreateInfo {
            image: vk_image.image,
            view_type: vk_image.view_type,
            format: vk_image.format,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: vk_image.mips,
                base_array_layer: 0,
                layer_count: vk_image.layers,
            },
            ..Default::default()
        };

        let view = unsafe {
            self.device
                .create_image_view(&view_info, None)
                .map_err(|e| BackendError::ImageCreationFailed(e.to_string()))?
        };

        let id = self.next_view_id;
        self.next_view_id += 1;
        self.image_views.insert(id, view);

        Ok(ImageViewHandle(id))
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        let address_mode = Self::convert_address_mode(desc.address_mode);
        let sampler_info = vk::SamplerCreateInfo {
            mag_filter: Self::convert_filter(desc.mag_filter),
            min_filter: Self::convert_filter(desc.min_filter),
            mipmap_mode: match desc.mipmap_filter {
                FilterMode::Nearest => vk::SamplerMipmapMode::NEAREST,
                FilterMode::Linear => vk::SamplerMipmapMode::LINEAR,
            },
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            min_lod: 0.0,
            max_lod: vk::LOD_CLAMP_NONE,
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
            ..Default::default()
        };

        let sampler = unsafe {
            self.device
                .create_sampler(&sampler_info, None)
                .map_err(|e| BackendError::ImageCreationFailed(e.to_string()))?
        };

        let id = self.next_sampler_id;
        self.next_sampler_id += 1;
        self.samplers.insert(id, sampler);

        Ok(SamplerHandle(id))
    }

    fn cmd_image_barrier(&mut self, barrier: &ImageBarrier) {
        let Some(vk_image) = self.images.get(&barrier.image.0) else {
            return;
        };

        let image_barrier = vk::ImageMemoryBarrier {
            old_layout: Self::convert_layout(barrier.old_layout),
            new_layout: Self::convert_layout(barrier.new_layout),
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image: vk_image.image,
            src_access_mask: Self::convert_access(barrier.src_access),
            dst_access_mask: Self::convert_access(barrier.dst_access),
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: if barrier.is_depth {
                    vk::ImageAspectFlags::DEPTH
                } else {
                    vk::ImageAspectFlags::COLOR
                },
                base_mip_level: 0,
                level_count: barrier.mip_count.max(1),
                base_array_layer: 0,
                layer_count: barrier.layer_count.max(1),
            },
            ..Default::default()
        };

        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer(),
                Self::convert_stages(barrier.src_stages),
                Self::convert_stages(barrier.dst_stages),
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[image_barrier],
            );
        }
    }

    fn cmd_buffer_barrier(&mut self, barrier: &BufferBarrier) {
        let Some(vk_buffer) = self.buffers.get(&barrier.buffer.0) else {
            return;
        };

        let buffer_barrier = vk::BufferMemoryBarrier {
            src_access_mask: Self::convert_access(barrier.src_access),
            dst_access_mask: Self::convert_access(barrier.dst_access),
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            buffer: vk_buffer.buffer,
            offset: 0,
            size: vk::WHOLE_SIZE,
            ..Default::default()
        };

        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer(),
                Self::convert_stages(barrier.src_stages),
                Self::convert_stages(barrier.dst_stages),
                vk::DependencyFlags::empty(),
                &[],
                &[buffer_barrier],
                &[],
            );
        }
    }

    fn create_render_pass(&mut self, desc: &RenderScopeDesc) -> BackendResult<RenderPassHandle> {
        let attachments: Vec<vk::AttachmentDescription> = desc
            .attachments
            .iter()
            .map(|attachment| vk::AttachmentDescription {
                format: Self::convert_format(attachment.format),
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: Self::convert_load_op(attachment.load_op),
                store_op: Self::convert_store_op(attachment.store_op),
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: Self::convert_layout(attachment.initial_layout),
                final_layout: Self::convert_layout(attachment.final_layout),
                ..Default::default()
            })
            .collect();

        let color_references: Vec<vk::AttachmentReference> = desc
            .color_refs
            .iter()
            .map(|&attachment| vk::AttachmentReference {
                attachment,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            })
            .collect();

        let depth_reference = desc.depth_ref.map(|attachment| vk::AttachmentReference {
            attachment,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        });

        let mut subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            ..Default::default()
        };
        if !color_references.is_empty() {
            subpass.color_attachment_count = color_references.len() as u32;
            subpass.p_color_attachments = color_references.as_ptr();
        }
        if let Some(ref depth) = depth_reference {
            subpass.p_depth_stencil_attachment = depth as *const vk::AttachmentReference;
        }

        let dependencies: Vec<vk::SubpassDependency> = desc
            .dependencies
            .iter()
            .map(|dependency| vk::SubpassDependency {
                src_subpass: dependency.src_subpass.unwrap_or(vk::SUBPASS_EXTERNAL),
                dst_subpass: dependency.dst_subpass.unwrap_or(vk::SUBPASS_EXTERNAL),
                src_stage_mask: Self::convert_stages(dependency.src_stages),
                dst_stage_mask: Self::convert_stages(dependency.dst_stages),
                src_access_mask: Self::convert_access(dependency.src_access),
                dst_access_mask: Self::convert_access(dependency.dst_access),
                dependency_flags: if dependency.by_region {
                    vk::DependencyFlags::BY_REGION
                } else {
                    vk::DependencyFlags::empty()
                },
            })
            .collect();

        let render_pass_info = vk::RenderPassCreateInfo {
            attachment_count: attachments.len() as u32,
            p_attachments: attachments.as_ptr(),
            subpass_count: 1,
            p_subpasses: &subpass,
            dependency_count: dependencies.len() as u32,
            p_dependencies: dependencies.as_ptr(),
            ..Default::default()
        };

        let render_pass = unsafe {
            self.device
                .create_render_pass(&render_pass_info, None)
                .map_err(|e| BackendError::RenderPassCreationFailed(e.to_string()))?
        };

        let id = self.next_render_pass_id;
        self.next_render_pass_id += 1;
        self.render_passes.insert(id, render_pass);

        Ok(RenderPassHandle(id))
    }

    fn create_framebuffer(
        &mut self,
        render_pass: RenderPassHandle,
        views: &[ImageViewHandle],
        extent: Extent2d,
        layers: u32,
    ) -> BackendResult<FramebufferHandle> {
        let vk_render_pass = self
            .render_passes
            .get(&render_pass.0)
            .copied()
            .ok_or_else(|| BackendError::FramebufferCreationFailed("Render pass not found".into()))?;

        let vk_views: Vec<vk::ImageView> = views
            .iter()
            .map(|view| {
                self.image_views.get(&view.0).copied().ok_or_else(|| {
                    BackendError::FramebufferCreationFailed("Image view not found".into())
                })
            })
            .collect::<Result<_, _>>()?;

        let framebuffer_info = vk::FramebufferCreateInfo {
            render_pass: vk_render_pass,
            attachment_count: vk_views.len() as u32,
            p_attachments: vk_views.as_ptr(),
            width: extent.width,
            height: extent.height,
            layers: layers.max(1),
            ..Default::default()
        };

        let framebuffer = unsafe {
            self.device
                .create_framebuffer(&framebuffer_info, None)
                .map_err(|e| BackendError::FramebufferCreationFailed(e.to_string()))?
        };

        let id = self.next_framebuffer_id;
        self.next_framebuffer_id += 1;
        self.framebuffers.insert(id, framebuffer);

        Ok(FramebufferHandle(id))
    }

    fn begin_render_pass(
        &mut self,
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        extent: Extent2d,
        clear_values: &[ClearValue],
    ) {
        let (Some(&vk_render_pass), Some(&vk_framebuffer)) = (
            self.render_passes.get(&render_pass.0),
            self.framebuffers.get(&framebuffer.0),
        ) else {
            return;
        };

        let vk_clear: Vec<vk::ClearValue> =
            clear_values.iter().map(Self::convert_clear_value).collect();

        let render_pass_info = vk::RenderPassBeginInfo {
            render_pass: vk_render_pass,
            framebuffer: vk_framebuffer,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D {
                    width: extent.width,
                    height: extent.height,
                },
            },
            clear_value_count: vk_clear.len() as u32,
            p_clear_values: vk_clear.as_ptr(),
            ..Default::default()
        };

        unsafe {
            self.device.cmd_begin_render_pass(
                self.command_buffer(),
                &render_pass_info,
                vk::SubpassContents::INLINE,
            );
        }
    }

    fn end_render_pass(&mut self) {
        unsafe {
            self.device.cmd_end_render_pass(self.command_buffer());
        }
    }

    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) {
        let viewport = vk::Viewport {
            x,
            y,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        unsafe {
            self.device
                .cmd_set_viewport(self.command_buffer(), 0, &[viewport]);
        }
    }

    fn set_scissor(&mut self, x: u32, y: u32, width: u32, height: u32) {
        let scissor = vk::Rect2D {
            offset: vk::Offset2D {
                x: x as i32,
                y: y as i32,
            },
            extent: vk::Extent2D { width, height },
        };
        unsafe {
            self.device
                .cmd_set_scissor(self.command_buffer(), 0, &[scissor]);
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(vk_buffer) = self.buffers.remove(&buffer.0) {
            unsafe {
                self.device.destroy_buffer(vk_buffer.buffer, None);
            }
            if let (Some(allocation), Some(allocator)) = (vk_buffer.allocation, &self.allocator) {
                let _ = allocator.lock().free(allocation);
            }
        }
    }

    fn destroy_image(&mut self, image: ImageHandle) {
        if let Some(vk_image) = self.images.remove(&image.0) {
            // Swapchain images carry no allocation and are owned by the
            // swapchain.
            if let Some(allocation) = vk_image.allocation {
                unsafe {
                    self.device.destroy_image(vk_image.image, None);
                }
                if let Some(allocator) = &self.allocator {
                    let _ = allocator.lock().free(allocation);
                }
            }
        }
    }

    fn destroy_image_view(&mut self, view: ImageViewHandle) {
        if let Some(vk_view) = self.image_views.remove(&view.0) {
            if !self.swapchain_image_views.contains(&vk_view) {
                unsafe {
                    self.device.destroy_image_view(vk_view, None);
                }
            }
        }
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        if let Some(vk_sampler) = self.samplers.remove(&sampler.0) {
            unsafe {
                self.device.destroy_sampler(vk_sampler, None);
            }
        }
    }

    fn destroy_render_pass(&mut self, render_pass: RenderPassHandle) {
        if let Some(vk_render_pass) = self.render_passes.remove(&render_pass.0) {
            unsafe {
                self.device.destroy_render_pass(vk_render_pass, None);
            }
        }
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if let Some(vk_framebuffer) = self.framebuffers.remove(&framebuffer.0) {
            unsafe {
                self.device.destroy_framebuffer(vk_framebuffer, None);
            }
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            if let Some(ref allocator) = self.allocator {
                for (_, buffer) in self.buffers.drain() {
                    self.device.destroy_buffer(buffer.buffer, None);
                    if let Some(allocation) = buffer.allocation {
                        let _ = allocator.lock().free(allocation);
                    }
                }

                for (_, image) in self.images.drain() {
                    if let Some(allocation) = image.allocation {
                        self.device.destroy_image(image.image, None);
                        let _ = allocator.lock().free(allocation);
                    }
                }
            }

            drop(self.allocator.take());

            // Swapchain image views are destroyed with the swapchain below.
            for (_, view) in self.image_views.drain() {
                if !self.swapchain_image_views.contains(&view) {
                    self.device.destroy_image_view(view, None);
                }
            }

            for (_, sampler) in self.samplers.drain() {
                self.device.destroy_sampler(sampler, None);
            }

            for (_, framebuffer) in self.framebuffers.drain() {
                self.device.destroy_framebuffer(framebuffer, None);
            }

            for (_, render_pass) in self.render_passes.drain() {
                self.device.destroy_render_pass(render_pass, None);
            }

            for &framebuffer in &self.present_framebuffers {
                self.device.destroy_framebuffer(framebuffer, None);
            }
            if self.present_render_pass != vk::RenderPass::null() {
                self.device.destroy_render_pass(self.present_render_pass, None);
            }

            for frame in &self.frames {
                self.device.destroy_semaphore(frame.image_available, None);
                self.device.destroy_semaphore(frame.render_finished, None);
                self.device.destroy_fence(frame.in_flight, None);
            }
            self.device.destroy_command_pool(self.command_pool, None);

            for &view in &self.swapchain_image_views {
                self.device.destroy_image_view(view, None);
            }
            self.swapchain_fn.destroy_swapchain(self.swapchain, None);

            self.device.destroy_device(None);
            self.surface_fn.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
    }
}
