//! Vulkan objects behind the render pass, shared attachments and per-image
//! render targets, plus a one-shot clear pass for the host loop.

use ash::vk;
use glam::Vec4;

use headset_core::runtime::{
    AttachmentDesc, ImageBufferDesc, ImageUsage, LoadOp, RenderPassDesc, RenderTargetDesc, StoreOp,
};
use headset_core::{Extent2D, ImageFormat, RuntimeError, RuntimeResult};

use crate::context::XrContext;

pub fn vk_format(format: ImageFormat) -> vk::Format {
    match format {
        ImageFormat::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
        ImageFormat::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
        ImageFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        ImageFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        ImageFormat::D32Sfloat => vk::Format::D32_SFLOAT,
    }
}

/// Maps a runtime-reported swapchain format; unknown formats are skipped.
pub fn image_format(format: vk::Format) -> Option<ImageFormat> {
    match format {
        vk::Format::R8G8B8A8_SRGB => Some(ImageFormat::Rgba8Srgb),
        vk::Format::B8G8R8A8_SRGB => Some(ImageFormat::Bgra8Srgb),
        vk::Format::R8G8B8A8_UNORM => Some(ImageFormat::Rgba8Unorm),
        vk::Format::B8G8R8A8_UNORM => Some(ImageFormat::Bgra8Unorm),
        vk::Format::D32_SFLOAT => Some(ImageFormat::D32Sfloat),
        _ => None,
    }
}

fn sample_flags(samples: u32) -> vk::SampleCountFlags {
    vk::SampleCountFlags::from_raw(samples.max(1))
}

fn load_op(op: LoadOp) -> vk::AttachmentLoadOp {
    match op {
        LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

fn store_op(op: StoreOp) -> vk::AttachmentStoreOp {
    match op {
        StoreOp::Store => vk::AttachmentStoreOp::STORE,
        StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

fn attachment(desc: &AttachmentDesc, final_layout: vk::ImageLayout) -> vk::AttachmentDescription {
    vk::AttachmentDescription::builder()
        .format(vk_format(desc.format))
        .samples(sample_flags(desc.samples))
        .load_op(load_op(desc.load))
        .store_op(store_op(desc.store))
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(final_layout)
        .build()
}

pub fn create_render_pass(ctx: &XrContext, desc: &RenderPassDesc) -> RuntimeResult<vk::RenderPass> {
    let attachments = [
        attachment(&desc.color, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        attachment(&desc.depth, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        attachment(&desc.resolve, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
    ];
    let color_ref = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };
    let resolve_ref = [vk::AttachmentReference {
        attachment: 2,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_ref)
        .depth_stencil_attachment(&depth_ref)
        .resolve_attachments(&resolve_ref);

    let view_masks = [desc.view_mask];
    let correlation_masks = [desc.correlation_mask];
    let mut multiview = vk::RenderPassMultiviewCreateInfo::builder()
        .view_masks(&view_masks)
        .correlation_masks(&correlation_masks);

    let create_info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(std::slice::from_ref(&subpass))
        .push_next(&mut multiview);

    unsafe { ctx.device.create_render_pass(&create_info, None) }
        .map_err(|e| RuntimeError::new("vkCreateRenderPass", e))
}

/// Multisampled image shared by every render target; one layer per eye.
#[derive(Debug)]
pub struct ImageBuffer {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
}

pub fn create_image_buffer(ctx: &XrContext, desc: &ImageBufferDesc) -> RuntimeResult<ImageBuffer> {
    let (usage, aspect) = match desc.usage {
        ImageUsage::ColorAttachment => (
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
            vk::ImageAspectFlags::COLOR,
        ),
        ImageUsage::DepthStencilAttachment => (
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
        ),
    };

    let image_info = vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .format(vk_format(desc.format))
        .extent(vk::Extent3D {
            width: desc.extent.width,
            height: desc.extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(desc.layers)
        .samples(sample_flags(desc.samples))
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    let device = &ctx.device;
    let image = unsafe { device.create_image(&image_info, None) }
        .map_err(|e| RuntimeError::new("vkCreateImage", e))?;

    let requirements = unsafe { device.get_image_memory_requirements(image) };
    let Some(memory_type) = ctx.find_memory_type(
        requirements.memory_type_bits,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    ) else {
        unsafe { device.destroy_image(image, None) };
        return Err(RuntimeError::new(
            "vkAllocateMemory",
            "no device-local memory type",
        ));
    };
    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type);
    let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
        Ok(memory) => memory,
        Err(e) => {
            unsafe { device.destroy_image(image, None) };
            return Err(RuntimeError::new("vkAllocateMemory", e));
        }
    };

    let view = unsafe { device.bind_image_memory(image, memory, 0) }
        .and_then(|()| unsafe {
            device.create_image_view(&array_view_info(image, desc.format, aspect, desc.layers), None)
        });
    match view {
        Ok(view) => Ok(ImageBuffer {
            image,
            memory,
            view,
        }),
        Err(e) => {
            unsafe {
                device.destroy_image(image, None);
                device.free_memory(memory, None);
            }
            Err(RuntimeError::new("vkCreateImageView", e))
        }
    }
}

pub fn destroy_image_buffer(ctx: &XrContext, buffer: ImageBuffer) {
    unsafe {
        ctx.device.destroy_image_view(buffer.view, None);
        ctx.device.destroy_image(buffer.image, None);
        ctx.device.free_memory(buffer.memory, None);
    }
}

fn array_view_info(
    image: vk::Image,
    format: ImageFormat,
    aspect: vk::ImageAspectFlags,
    layers: u32,
) -> vk::ImageViewCreateInfo {
    vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D_ARRAY)
        .format(vk_format(format))
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: layers,
        })
        .build()
}

/// Framebuffer wrapping one swapchain image together with the shared
/// attachments.
#[derive(Debug)]
pub struct RenderTarget {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub framebuffer: vk::Framebuffer,
    pub extent: Extent2D,
}

pub fn create_render_target(
    ctx: &XrContext,
    image: vk::Image,
    color: &ImageBuffer,
    depth: &ImageBuffer,
    render_pass: vk::RenderPass,
    desc: &RenderTargetDesc,
) -> RuntimeResult<RenderTarget> {
    let device = &ctx.device;
    let view_info = array_view_info(image, desc.format, vk::ImageAspectFlags::COLOR, desc.layers);
    let view = unsafe { device.create_image_view(&view_info, None) }
        .map_err(|e| RuntimeError::new("vkCreateImageView", e))?;

    let attachments = [color.view, depth.view, view];
    // Multiview framebuffers have a single layer; the view mask fans out.
    let framebuffer_info = vk::FramebufferCreateInfo::builder()
        .render_pass(render_pass)
        .attachments(&attachments)
        .width(desc.extent.width)
        .height(desc.extent.height)
        .layers(1);
    match unsafe { device.create_framebuffer(&framebuffer_info, None) } {
        Ok(framebuffer) => Ok(RenderTarget {
            image,
            view,
            framebuffer,
            extent: desc.extent,
        }),
        Err(e) => {
            unsafe { device.destroy_image_view(view, None) };
            Err(RuntimeError::new("vkCreateFramebuffer", e))
        }
    }
}

pub fn destroy_render_target(ctx: &XrContext, target: RenderTarget) {
    unsafe {
        ctx.device.destroy_framebuffer(target.framebuffer, None);
        ctx.device.destroy_image_view(target.view, None);
    }
}

/// Records and submits a render pass that only clears, used by the host when
/// it has nothing else to draw.
pub struct ClearPass {
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
}

impl ClearPass {
    pub fn new(ctx: &XrContext) -> RuntimeResult<Self> {
        let device = &ctx.device;
        let command_pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(ctx.queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { device.create_command_pool(&command_pool_info, None) }
            .map_err(|e| RuntimeError::new("vkCreateCommandPool", e))?;

        let command_buffer_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = match unsafe { device.allocate_command_buffers(&command_buffer_info) }
        {
            Ok(buffers) => buffers[0],
            Err(e) => {
                unsafe { device.destroy_command_pool(command_pool, None) };
                return Err(RuntimeError::new("vkAllocateCommandBuffers", e));
            }
        };

        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);
        let fence = match unsafe { device.create_fence(&fence_info, None) } {
            Ok(fence) => fence,
            Err(e) => {
                unsafe { device.destroy_command_pool(command_pool, None) };
                return Err(RuntimeError::new("vkCreateFence", e));
            }
        };

        Ok(Self {
            command_pool,
            command_buffer,
            fence,
        })
    }

    /// Clears every layer of `target` to `color` and waits for completion,
    /// so the swapchain image can be released right after.
    pub fn clear(
        &self,
        ctx: &XrContext,
        render_pass: vk::RenderPass,
        target: &RenderTarget,
        color: Vec4,
    ) -> RuntimeResult<()> {
        let device = &ctx.device;
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: color.to_array(),
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
            vk::ClearValue::default(),
        ];

        unsafe {
            device
                .wait_for_fences(&[self.fence], true, u64::MAX)
                .map_err(|e| RuntimeError::new("vkWaitForFences", e))?;
            device
                .reset_fences(&[self.fence])
                .map_err(|e| RuntimeError::new("vkResetFences", e))?;
            device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| RuntimeError::new("vkResetCommandBuffer", e))?;

            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(|e| RuntimeError::new("vkBeginCommandBuffer", e))?;

            let pass_begin = vk::RenderPassBeginInfo::builder()
                .render_pass(render_pass)
                .framebuffer(target.framebuffer)
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: vk::Extent2D {
                        width: target.extent.width,
                        height: target.extent.height,
                    },
                })
                .clear_values(&clear_values);
            device.cmd_begin_render_pass(
                self.command_buffer,
                &pass_begin,
                vk::SubpassContents::INLINE,
            );
            device.cmd_end_render_pass(self.command_buffer);
            device
                .end_command_buffer(self.command_buffer)
                .map_err(|e| RuntimeError::new("vkEndCommandBuffer", e))?;

            let command_buffers = [self.command_buffer];
            let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
            device
                .queue_submit(ctx.queue, std::slice::from_ref(&submit_info), self.fence)
                .map_err(|e| RuntimeError::new("vkQueueSubmit", e))?;
            device
                .wait_for_fences(&[self.fence], true, u64::MAX)
                .map_err(|e| RuntimeError::new("vkWaitForFences", e))?;
        }
        Ok(())
    }

    pub fn destroy(self, ctx: &XrContext) {
        unsafe {
            let _ = ctx.device.wait_for_fences(&[self.fence], true, u64::MAX);
            ctx.device.destroy_fence(self.fence, None);
            ctx.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
