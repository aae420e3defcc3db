use crate::ring::FRAME_MAX;
use crate::shaders;
use ash::khr::{surface, swapchain};
use ash::{Entry, Instance, vk};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Errors from one-time backend initialization. All fatal; nothing here is
/// retried.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("vulkan call failed: {0}")]
    Vk(#[from] vk::Result),
    #[error("window handle unavailable: {0}")]
    WindowHandle(String),
    #[error("no physical device with a graphics queue that can present")]
    NoDevice,
    #[error("swapchain returned {0} images, more than the ring supports")]
    TooManyImages(usize),
    #[error("no compatible memory type for a buffer allocation")]
    NoMemoryType,
    #[error("shader translation failed: {0}")]
    Shader(String),
}

/// One-time GPU object graph: instance, device, swapchain, render pass and
/// the fullscreen composite pipeline.
///
/// Everything created here is destroyed in reverse order in `Drop`, after a
/// device wait; per-slot resources live in the frame ring instead.
pub struct VulkanContext {
    pub(crate) entry: Entry,
    pub(crate) instance: Instance,
    #[cfg(debug_assertions)]
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,
    pub(crate) device: ash::Device,
    pub(crate) queue: vk::Queue,
    pub(crate) mem_props: vk::PhysicalDeviceMemoryProperties,
    pub(crate) swapchain_loader: swapchain::Device,
    pub(crate) swapchain: vk::SwapchainKHR,
    pub(crate) images: Vec<vk::Image>,
    pub(crate) format: vk::Format,
    pub(crate) extent: vk::Extent2D,
    pub(crate) render_pass: vk::RenderPass,
    pub(crate) set_layout: vk::DescriptorSetLayout,
    pub(crate) pipeline_layout: vk::PipelineLayout,
    pub(crate) pipeline: vk::Pipeline,
    pub(crate) command_pool: vk::CommandPool,
}

#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    _severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if !data.is_null() {
        let msg = unsafe { std::ffi::CStr::from_ptr((*data).p_message) };
        tracing::warn!(target: "vulkan", "{}", msg.to_string_lossy());
    }
    vk::FALSE
}

impl VulkanContext {
    /// Bring up the full object graph against the given window.
    ///
    /// `width`/`height` are only a hint; surfaces with a fixed current
    /// extent win, and the extent never changes afterwards.
    pub fn new(
        window: &(impl HasDisplayHandle + HasWindowHandle),
        width: u32,
        height: u32,
    ) -> Result<Self, SetupError> {
        let entry = Entry::linked();

        let display_raw = window
            .display_handle()
            .map_err(|e| SetupError::WindowHandle(e.to_string()))?
            .as_raw();
        let window_raw = window
            .window_handle()
            .map_err(|e| SetupError::WindowHandle(e.to_string()))?
            .as_raw();

        let instance = unsafe { create_instance(&entry, display_raw)? };

        // Only wired up when the validation layer (and with it the debug
        // utils extension) was enabled on the instance.
        #[cfg(debug_assertions)]
        let debug_messenger = if validation_available(&entry)? {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let info = vk::DebugUtilsMessengerCreateInfoEXT {
                s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
                message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                pfn_user_callback: Some(debug_callback),
                ..Default::default()
            };
            Some(unsafe { loader.create_debug_utils_messenger(&info, None)? })
        } else {
            None
        };

        let surface =
            unsafe { ash_window::create_surface(&entry, &instance, display_raw, window_raw, None)? };
        let surface_loader = surface::Instance::new(&entry, &instance);

        let (phys, queue_family) = unsafe { pick_device(&instance, &surface_loader, surface)? };
        let mem_props = unsafe { instance.get_physical_device_memory_properties(phys) };

        let device = unsafe { create_device(&instance, phys, queue_family)? };
        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        let caps = unsafe {
            surface_loader.get_physical_device_surface_capabilities(phys, surface)?
        };
        let extent = if caps.current_extent.width != u32::MAX {
            caps.current_extent
        } else {
            vk::Extent2D {
                width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
                height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
            }
        };

        let formats =
            unsafe { surface_loader.get_physical_device_surface_formats(phys, surface)? };
        let format = formats
            .iter()
            .find(|f| {
                f.format == vk::Format::B8G8R8A8_SRGB
                    && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .or_else(|| formats.first())
            .ok_or(SetupError::NoDevice)?
            .format;

        let modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(phys, surface)?
        };
        let present_mode = if modes.contains(&vk::PresentModeKHR::MAILBOX) {
            vk::PresentModeKHR::MAILBOX
        } else {
            vk::PresentModeKHR::FIFO
        };

        let image_count = negotiate_image_count(caps.min_image_count, caps.max_image_count);
        tracing::info!(
            ?present_mode,
            ?format,
            image_count,
            width = extent.width,
            height = extent.height,
            "surface negotiated"
        );

        let swapchain_loader = swapchain::Device::new(&instance, &device);
        let swapchain_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface,
            min_image_count: image_count,
            image_format: format,
            image_color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform: caps.current_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode,
            clipped: vk::TRUE,
            ..Default::default()
        };
        let swapchain = unsafe { swapchain_loader.create_swapchain(&swapchain_info, None)? };
        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain)? };
        if images.len() > FRAME_MAX {
            return Err(SetupError::TooManyImages(images.len()));
        }

        let render_pass = unsafe { create_render_pass(&device, format)? };
        let (set_layout, pipeline_layout, pipeline) =
            unsafe { create_pipeline(&device, render_pass, extent)? };

        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: queue_family,
            ..Default::default()
        };
        let command_pool = unsafe { device.create_command_pool(&pool_info, None)? };

        Ok(Self {
            entry,
            instance,
            #[cfg(debug_assertions)]
            debug_messenger,
            surface_loader,
            surface,
            device,
            queue,
            mem_props,
            swapchain_loader,
            swapchain,
            images,
            format,
            extent,
            render_pass,
            set_layout,
            pipeline_layout,
            pipeline,
            command_pool,
        })
    }

    pub fn extent(&self) -> (u32, u32) {
        (self.extent.width, self.extent.height)
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.pipeline_layout, None);
            self.device.destroy_descriptor_set_layout(self.set_layout, None);
            self.device.destroy_render_pass(self.render_pass, None);
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            #[cfg(debug_assertions)]
            if let Some(messenger) = self.debug_messenger {
                let loader = ash::ext::debug_utils::Instance::new(&self.entry, &self.instance);
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Double-buffering preferred, clamped into the surface's supported range
/// and the ring's hard cap. `max == 0` means no upper limit.
fn negotiate_image_count(min: u32, max: u32) -> u32 {
    let upper = if max == 0 { u32::MAX } else { max };
    2u32.clamp(min, upper).min(FRAME_MAX as u32)
}

const VALIDATION_LAYER: &std::ffi::CStr = c"VK_LAYER_KHRONOS_validation";

fn validation_available(entry: &Entry) -> Result<bool, SetupError> {
    let layers = unsafe { entry.enumerate_instance_layer_properties()? };
    Ok(layers
        .iter()
        .any(|l| unsafe { std::ffi::CStr::from_ptr(l.layer_name.as_ptr()) } == VALIDATION_LAYER))
}

unsafe fn create_instance(
    entry: &Entry,
    display_raw: raw_window_handle::RawDisplayHandle,
) -> Result<Instance, SetupError> {
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: c"wallcast".as_ptr(),
        application_version: vk::make_api_version(0, 0, 1, 0),
        p_engine_name: c"wallcast".as_ptr(),
        engine_version: vk::make_api_version(0, 0, 1, 0),
        api_version: vk::API_VERSION_1_2,
        ..Default::default()
    };

    let required = ash_window::enumerate_required_extensions(display_raw)?;
    let mut extensions = required.to_vec();

    let mut layers: Vec<*const std::ffi::c_char> = Vec::new();
    if cfg!(debug_assertions) {
        if validation_available(entry)? {
            layers.push(VALIDATION_LAYER.as_ptr());
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        } else {
            tracing::warn!("validation layer not available, continuing without it");
        }
    }
    let info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        ..Default::default()
    };
    Ok(unsafe { entry.create_instance(&info, None)? })
}

/// Prefer a discrete GPU; any device with a graphics queue that can present
/// to the surface is acceptable.
unsafe fn pick_device(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, u32), SetupError> {
    let mut fallback = None;
    for phys in unsafe { instance.enumerate_physical_devices()? } {
        let families = unsafe { instance.get_physical_device_queue_family_properties(phys) };
        for (i, family) in families.iter().enumerate() {
            let presentable = unsafe {
                surface_loader
                    .get_physical_device_surface_support(phys, i as u32, surface)
                    .unwrap_or(false)
            };
            if !family.queue_flags.contains(vk::QueueFlags::GRAPHICS) || !presentable {
                continue;
            }
            let props = unsafe { instance.get_physical_device_properties(phys) };
            if props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
                return Ok((phys, i as u32));
            }
            fallback.get_or_insert((phys, i as u32));
            break;
        }
    }
    fallback.ok_or(SetupError::NoDevice)
}

unsafe fn create_device(
    instance: &Instance,
    phys: vk::PhysicalDevice,
    queue_family: u32,
) -> Result<ash::Device, SetupError> {
    let priorities = [1.0f32];
    let queue_info = vk::DeviceQueueCreateInfo {
        s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
        queue_family_index: queue_family,
        queue_count: 1,
        p_queue_priorities: priorities.as_ptr(),
        ..Default::default()
    };
    let extensions = [swapchain::NAME.as_ptr()];
    let info = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: 1,
        p_queue_create_infos: &queue_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        ..Default::default()
    };
    Ok(unsafe { instance.create_device(phys, &info, None)? })
}

unsafe fn create_render_pass(
    device: &ash::Device,
    format: vk::Format,
) -> Result<vk::RenderPass, SetupError> {
    let attachment = vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::DONT_CARE,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
    };
    let color_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &color_ref,
        ..Default::default()
    };
    let info = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &attachment,
        subpass_count: 1,
        p_subpasses: &subpass,
        ..Default::default()
    };
    Ok(unsafe { device.create_render_pass(&info, None)? })
}

/// Fullscreen composite pipeline: no vertex input, one storage-buffer
/// descriptor visible to the fragment stage, fixed viewport.
unsafe fn create_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
) -> Result<(vk::DescriptorSetLayout, vk::PipelineLayout, vk::Pipeline), SetupError> {
    let vs_words = shaders::compile(shaders::COMPOSITE_SHADER, naga::ShaderStage::Vertex, "vs_main")?;
    let fs_words =
        shaders::compile(shaders::COMPOSITE_SHADER, naga::ShaderStage::Fragment, "fs_main")?;

    let vs_info = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        code_size: vs_words.len() * 4,
        p_code: vs_words.as_ptr(),
        ..Default::default()
    };
    let fs_info = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        code_size: fs_words.len() * 4,
        p_code: fs_words.as_ptr(),
        ..Default::default()
    };
    let vs = unsafe { device.create_shader_module(&vs_info, None)? };
    let fs = unsafe { device.create_shader_module(&fs_info, None)? };

    let bindings = [vk::DescriptorSetLayoutBinding {
        binding: 0,
        descriptor_type: vk::DescriptorType::STORAGE_BUFFER,
        descriptor_count: 1,
        stage_flags: vk::ShaderStageFlags::FRAGMENT,
        ..Default::default()
    }];
    let set_layout_info = vk::DescriptorSetLayoutCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
        binding_count: bindings.len() as u32,
        p_bindings: bindings.as_ptr(),
        ..Default::default()
    };
    let set_layout = unsafe { device.create_descriptor_set_layout(&set_layout_info, None)? };

    let layout_info = vk::PipelineLayoutCreateInfo {
        s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
        set_layout_count: 1,
        p_set_layouts: &set_layout,
        ..Default::default()
    };
    let pipeline_layout = unsafe { device.create_pipeline_layout(&layout_info, None)? };

    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: vs,
            p_name: c"vs_main".as_ptr(),
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: fs,
            p_name: c"fs_main".as_ptr(),
            ..Default::default()
        },
    ];

    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        ..Default::default()
    };
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        p_viewports: &viewport,
        scissor_count: 1,
        p_scissors: &scissor,
        ..Default::default()
    };
    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::NONE,
        front_face: vk::FrontFace::CLOCKWISE,
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        ..Default::default()
    };
    let blend_attachment = vk::PipelineColorBlendAttachmentState {
        color_write_mask: vk::ColorComponentFlags::RGBA,
        ..Default::default()
    };
    let blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &blend_attachment,
        ..Default::default()
    };

    let info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_color_blend_state: &blend,
        layout: pipeline_layout,
        render_pass,
        subpass: 0,
        ..Default::default()
    };
    let pipeline = match unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&info), None)
    } {
        Ok(pipelines) => pipelines[0],
        Err((_, e)) => {
            unsafe {
                device.destroy_shader_module(fs, None);
                device.destroy_shader_module(vs, None);
                device.destroy_pipeline_layout(pipeline_layout, None);
                device.destroy_descriptor_set_layout(set_layout, None);
            }
            return Err(e.into());
        }
    };

    unsafe {
        device.destroy_shader_module(fs, None);
        device.destroy_shader_module(vs, None);
    }
    Ok((set_layout, pipeline_layout, pipeline))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_count_prefers_double_buffering() {
        assert_eq!(negotiate_image_count(1, 3), 2);
        assert_eq!(negotiate_image_count(2, 8), 2);
    }

    #[test]
    fn image_count_clamps_into_supported_range() {
        assert_eq!(negotiate_image_count(3, 8), 3);
        assert_eq!(negotiate_image_count(1, 1), 1);
    }

    #[test]
    fn image_count_handles_unlimited_max() {
        assert_eq!(negotiate_image_count(1, 0), 2);
        assert_eq!(negotiate_image_count(32, 0), FRAME_MAX as u32);
    }
}
