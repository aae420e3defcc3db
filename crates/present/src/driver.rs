use crate::context::{SetupError, VulkanContext};
use crate::ring::FrameRing;
use ash::vk;
use wallcast_raster::{Framebuffer, Rasterizer};
use wallcast_scene::{CameraPose, Scene};

/// Per-frame failures. All fatal: the driver makes no attempt to rebuild
/// the swapchain or retry a submit.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("swapchain acquire failed: {0}")]
    Acquire(#[source] vk::Result),
    #[error("fence wait failed: {0}")]
    FenceWait(#[source] vk::Result),
    #[error("staging flush failed: {0}")]
    Flush(#[source] vk::Result),
    #[error("command recording failed: {0}")]
    Record(#[source] vk::Result),
    #[error("queue submit failed: {0}")]
    Submit(#[source] vk::Result),
    #[error("present failed: {0}")]
    Present(#[source] vk::Result),
    #[error("device drain failed: {0}")]
    Drain(#[source] vk::Result),
}

/// What the caller wants from the next iteration of [`PipelineDriver::run`].
pub enum Tick {
    Continue(CameraPose),
    Stop,
}

/// Drives the rasterize → stage → transfer → composite → present cycle over
/// the frame ring.
pub struct PipelineDriver {
    ctx: VulkanContext,
    ring: FrameRing,
    rasterizer: Rasterizer,
    scene: Scene,
    framebuffer: Framebuffer,
    frame_index: u64,
}

impl PipelineDriver {
    pub fn new(
        ctx: VulkanContext,
        rasterizer: Rasterizer,
        scene: Scene,
    ) -> Result<Self, SetupError> {
        let ring = FrameRing::new(&ctx)?;
        let (width, height) = ctx.extent();
        tracing::info!(slots = ring.len(), width, height, "pipeline driver ready");
        Ok(Self {
            ctx,
            ring,
            rasterizer,
            scene,
            framebuffer: Framebuffer::new(width, height),
            frame_index: 0,
        })
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    /// Produce and present one frame from the given camera pose.
    pub fn frame(&mut self, pose: CameraPose) -> Result<(), SubmitError> {
        let acquired = self.ring.acquire(&self.ctx).map_err(SubmitError::Acquire)?;
        self.ring
            .wait_and_reset(&self.ctx, acquired.index)
            .map_err(SubmitError::FenceWait)?;

        self.rasterizer.render(&mut self.framebuffer, &self.scene, pose);
        self.ring
            .stage(&self.ctx, acquired.index, &self.framebuffer)
            .map_err(SubmitError::Flush)?;

        self.record(acquired.index).map_err(SubmitError::Record)?;
        self.submit(acquired.index, acquired.image_ready)
            .map_err(SubmitError::Submit)?;
        self.present(acquired.index).map_err(SubmitError::Present)?;

        self.frame_index += 1;
        tracing::trace!(frame = self.frame_index, slot = acquired.index, "frame presented");
        Ok(())
    }

    /// Blocking frame loop; `tick` decides each iteration's pose or stops
    /// the loop. Drains the device before returning.
    pub fn run(&mut self, mut tick: impl FnMut(u64) -> Tick) -> Result<(), SubmitError> {
        loop {
            match tick(self.frame_index) {
                Tick::Continue(pose) => self.frame(pose)?,
                Tick::Stop => break,
            }
        }
        unsafe { self.ctx.device.device_wait_idle() }.map_err(SubmitError::Drain)
    }

    fn record(&self, index: usize) -> Result<(), vk::Result> {
        let device = &self.ctx.device;
        let slot = self.ring.slot(index);
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };

        unsafe {
            device.begin_command_buffer(slot.cmd_trans, &begin)?;
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: slot.staging.size,
            };
            device.cmd_copy_buffer(slot.cmd_trans, slot.staging.buffer, slot.samples.buffer, &[
                region,
            ]);
            device.end_command_buffer(slot.cmd_trans)?;

            device.begin_command_buffer(slot.cmd_render, &begin)?;
            let pass = vk::RenderPassBeginInfo {
                s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
                render_pass: self.ctx.render_pass,
                framebuffer: slot.framebuffer,
                render_area: vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: self.ctx.extent,
                },
                ..Default::default()
            };
            device.cmd_begin_render_pass(slot.cmd_render, &pass, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(
                slot.cmd_render,
                vk::PipelineBindPoint::GRAPHICS,
                self.ctx.pipeline,
            );
            device.cmd_bind_descriptor_sets(
                slot.cmd_render,
                vk::PipelineBindPoint::GRAPHICS,
                self.ctx.pipeline_layout,
                0,
                &[slot.desc_set],
                &[],
            );
            device.cmd_draw(slot.cmd_render, 3, 1, 0, 0);
            device.cmd_end_render_pass(slot.cmd_render);
            device.end_command_buffer(slot.cmd_render)?;
        }
        Ok(())
    }

    /// Both submits go down in one call, fenced together: the transfer
    /// signals `samples_ready`; the composite waits on that and on the
    /// acquire, and signals `image_rendered` for the present.
    fn submit(&mut self, index: usize, image_ready: vk::Semaphore) -> Result<(), vk::Result> {
        let slot = self.ring.slot(index);
        let cmd_trans = slot.cmd_trans;
        let cmd_render = slot.cmd_render;
        let samples_ready = slot.samples_ready;
        let image_rendered = slot.image_rendered;
        let fence = slot.rendered_fence;

        let trans_submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            command_buffer_count: 1,
            p_command_buffers: &cmd_trans,
            signal_semaphore_count: 1,
            p_signal_semaphores: &samples_ready,
            ..Default::default()
        };

        let render_waits = [samples_ready, image_ready];
        let render_stages = [
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ];
        let render_submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: render_waits.len() as u32,
            p_wait_semaphores: render_waits.as_ptr(),
            p_wait_dst_stage_mask: render_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &cmd_render,
            signal_semaphore_count: 1,
            p_signal_semaphores: &image_rendered,
            ..Default::default()
        };

        unsafe {
            self.ctx
                .device
                .queue_submit(self.ctx.queue, &[trans_submit, render_submit], fence)?;
        }
        self.ring.mark_submitted(index);
        Ok(())
    }

    fn present(&self, index: usize) -> Result<(), vk::Result> {
        let image_rendered = self.ring.slot(index).image_rendered;
        let image_index = index as u32;
        let info = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &image_rendered,
            swapchain_count: 1,
            p_swapchains: &self.ctx.swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        // Suboptimal presents still count; only hard errors surface.
        unsafe { self.ctx.swapchain_loader.queue_present(self.ctx.queue, &info)? };
        Ok(())
    }
}

impl Drop for PipelineDriver {
    fn drop(&mut self) {
        unsafe { self.ctx.device.device_wait_idle().ok() };
        self.ring.release(&self.ctx);
    }
}
