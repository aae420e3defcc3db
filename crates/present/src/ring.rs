use crate::buffer::DeviceBuffer;
use crate::context::{SetupError, VulkanContext};
use ash::vk;
use wallcast_raster::Framebuffer;

/// Hard cap on frames in flight, independent of what the surface reports.
pub const FRAME_MAX: usize = 16;

/// Everything one in-flight frame owns.
///
/// The ring hands out slots by swapchain image index; the acquire semaphore
/// is taken from the ring cursor instead, since the image index is not known
/// until the acquire returns.
pub(crate) struct FrameSlot {
    pub view: vk::ImageView,
    pub framebuffer: vk::Framebuffer,
    /// Device-local storage buffer the composite pass reads.
    pub samples: DeviceBuffer,
    /// Host-visible source for the transfer, persistently mapped.
    pub staging: DeviceBuffer,
    pub staging_ptr: *mut u8,
    pub cmd_trans: vk::CommandBuffer,
    pub cmd_render: vk::CommandBuffer,
    pub desc_set: vk::DescriptorSet,
    /// Signaled when the staging copy has landed in `samples`.
    pub samples_ready: vk::Semaphore,
    /// Signaled by the acquire; waited by the composite submit.
    pub image_ready: vk::Semaphore,
    /// Signaled when the composite pass finished; waited by present.
    pub image_rendered: vk::Semaphore,
    /// Signaled when both submits for this slot retired on the GPU.
    pub rendered_fence: vk::Fence,
    /// A never-submitted slot must not wait its fence.
    pub submitted: bool,
}

/// Result of a swapchain acquire: which slot to reuse and the semaphore the
/// acquire will signal.
pub struct Acquired {
    pub index: usize,
    pub image_ready: vk::Semaphore,
}

/// N-slot frame ring, one slot per swapchain image.
pub struct FrameRing {
    slots: Vec<FrameSlot>,
    descriptor_pool: vk::DescriptorPool,
    cursor: usize,
    staging_len: usize,
    released: bool,
}

/// Staging layout: one `u32` column height, then `width * height` packed
/// pixels, column-major.
fn staging_len(width: u32, height: u32) -> usize {
    4 + (width as usize) * (height as usize) * 4
}

fn next_cursor(cursor: usize, len: usize) -> usize {
    (cursor + 1) % len
}

impl FrameRing {
    pub fn new(ctx: &VulkanContext) -> Result<Self, SetupError> {
        let n = ctx.images.len();
        let staging_len = staging_len(ctx.extent.width, ctx.extent.height);
        let buf_size = staging_len as vk::DeviceSize;
        tracing::debug!(slots = n, bytes_per_slot = staging_len, "building frame ring");

        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::STORAGE_BUFFER,
            descriptor_count: n as u32,
        }];
        let pool_info = vk::DescriptorPoolCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
            max_sets: n as u32,
            pool_size_count: pool_sizes.len() as u32,
            p_pool_sizes: pool_sizes.as_ptr(),
            ..Default::default()
        };
        let descriptor_pool = unsafe { ctx.device.create_descriptor_pool(&pool_info, None)? };

        let cmd_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: ctx.command_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: (n * 2) as u32,
            ..Default::default()
        };
        let cmds = unsafe { ctx.device.allocate_command_buffers(&cmd_info)? };

        let set_layouts = vec![ctx.set_layout; n];
        let set_info = vk::DescriptorSetAllocateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
            descriptor_pool,
            descriptor_set_count: n as u32,
            p_set_layouts: set_layouts.as_ptr(),
            ..Default::default()
        };
        let desc_sets = unsafe { ctx.device.allocate_descriptor_sets(&set_info)? };

        let mut slots = Vec::with_capacity(n);
        for (i, &image) in ctx.images.iter().enumerate() {
            let view_info = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format: ctx.format,
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            };
            let view = unsafe { ctx.device.create_image_view(&view_info, None)? };

            let fb_info = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass: ctx.render_pass,
                attachment_count: 1,
                p_attachments: &view,
                width: ctx.extent.width,
                height: ctx.extent.height,
                layers: 1,
                ..Default::default()
            };
            let framebuffer = unsafe { ctx.device.create_framebuffer(&fb_info, None)? };

            let samples = DeviceBuffer::new(
                &ctx.device,
                &ctx.mem_props,
                buf_size,
                vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )?;
            let staging = DeviceBuffer::new(
                &ctx.device,
                &ctx.mem_props,
                buf_size,
                vk::BufferUsageFlags::TRANSFER_SRC,
                vk::MemoryPropertyFlags::HOST_VISIBLE,
            )?;
            let staging_ptr = staging.map(&ctx.device)?;

            let sem_info = vk::SemaphoreCreateInfo {
                s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
                ..Default::default()
            };
            let fence_info = vk::FenceCreateInfo {
                s_type: vk::StructureType::FENCE_CREATE_INFO,
                ..Default::default()
            };
            let samples_ready = unsafe { ctx.device.create_semaphore(&sem_info, None)? };
            let image_ready = unsafe { ctx.device.create_semaphore(&sem_info, None)? };
            let image_rendered = unsafe { ctx.device.create_semaphore(&sem_info, None)? };
            let rendered_fence = unsafe { ctx.device.create_fence(&fence_info, None)? };

            let desc_set = desc_sets[i];
            let buffer_info = vk::DescriptorBufferInfo {
                buffer: samples.buffer,
                offset: 0,
                range: vk::WHOLE_SIZE,
            };
            let write = vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set: desc_set,
                dst_binding: 0,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::STORAGE_BUFFER,
                p_buffer_info: &buffer_info,
                ..Default::default()
            };
            unsafe { ctx.device.update_descriptor_sets(&[write], &[]) };

            slots.push(FrameSlot {
                view,
                framebuffer,
                samples,
                staging,
                staging_ptr,
                cmd_trans: cmds[i * 2],
                cmd_render: cmds[i * 2 + 1],
                desc_set,
                samples_ready,
                image_ready,
                image_rendered,
                rendered_fence,
                submitted: false,
            });
        }

        Ok(Self {
            slots,
            descriptor_pool,
            cursor: 0,
            staging_len,
            released: false,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }

    /// Acquire the next swapchain image, signalling the cursor slot's
    /// `image_ready` semaphore. The cursor advances every call; the returned
    /// slot index is the image index and may differ from the cursor.
    pub fn acquire(&mut self, ctx: &VulkanContext) -> Result<Acquired, vk::Result> {
        let image_ready = self.slots[self.cursor].image_ready;
        self.cursor = next_cursor(self.cursor, self.slots.len());
        let (index, _suboptimal) = unsafe {
            ctx.swapchain_loader.acquire_next_image(
                ctx.swapchain,
                u64::MAX,
                image_ready,
                vk::Fence::null(),
            )?
        };
        Ok(Acquired {
            index: index as usize,
            image_ready,
        })
    }

    /// Block until the slot's previous submission retired, then reset the
    /// fence. A slot that was never submitted passes straight through.
    pub fn wait_and_reset(&mut self, ctx: &VulkanContext, index: usize) -> Result<(), vk::Result> {
        let slot = &mut self.slots[index];
        if !slot.submitted {
            return Ok(());
        }
        unsafe {
            ctx.device
                .wait_for_fences(&[slot.rendered_fence], true, u64::MAX)?;
            ctx.device.reset_fences(&[slot.rendered_fence])?;
        }
        slot.submitted = false;
        Ok(())
    }

    /// Copy the framebuffer into the slot's staging buffer: the column
    /// height word, then the packed pixels, then a flush so the transfer
    /// sees the writes.
    ///
    /// Caller must have passed `wait_and_reset` for this slot.
    pub fn stage(
        &mut self,
        ctx: &VulkanContext,
        index: usize,
        fb: &Framebuffer,
    ) -> Result<(), vk::Result> {
        let slot = &self.slots[index];
        let bytes = fb.as_bytes();
        debug_assert_eq!(4 + bytes.len(), self.staging_len);
        unsafe {
            let header = fb.height();
            std::ptr::copy_nonoverlapping(
                header.to_le_bytes().as_ptr(),
                slot.staging_ptr,
                4,
            );
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), slot.staging_ptr.add(4), bytes.len());
            let range = vk::MappedMemoryRange {
                s_type: vk::StructureType::MAPPED_MEMORY_RANGE,
                memory: slot.staging.memory,
                offset: 0,
                size: vk::WHOLE_SIZE,
                ..Default::default()
            };
            ctx.device.flush_mapped_memory_ranges(&[range])?;
        }
        Ok(())
    }

    pub(crate) fn mark_submitted(&mut self, index: usize) {
        self.slots[index].submitted = true;
    }

    /// Tear down every slot. Must run before the context's device is
    /// destroyed; the caller waits the device idle first.
    pub fn release(&mut self, ctx: &VulkanContext) {
        if self.released {
            return;
        }
        self.released = true;
        unsafe {
            for slot in &self.slots {
                ctx.device.destroy_fence(slot.rendered_fence, None);
                ctx.device.destroy_semaphore(slot.image_rendered, None);
                ctx.device.destroy_semaphore(slot.image_ready, None);
                ctx.device.destroy_semaphore(slot.samples_ready, None);
                ctx.device.unmap_memory(slot.staging.memory);
                slot.staging.destroy(&ctx.device);
                slot.samples.destroy(&ctx.device);
                ctx.device.destroy_framebuffer(slot.framebuffer, None);
                ctx.device.destroy_image_view(slot.view, None);
            }
            ctx.device.destroy_descriptor_pool(self.descriptor_pool, None);
        }
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_holds_header_and_pixels() {
        assert_eq!(staging_len(800, 600), 4 + 800 * 600 * 4);
        assert_eq!(staging_len(1, 1), 8);
    }

    #[test]
    fn cursor_wraps_over_ring_length() {
        assert_eq!(next_cursor(0, 3), 1);
        assert_eq!(next_cursor(1, 3), 2);
        assert_eq!(next_cursor(2, 3), 0);
    }
}
