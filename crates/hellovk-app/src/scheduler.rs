//! Swapchain-synchronized frame lifecycle.
//!
//! Every frame goes through the same five steps:
//!
//! 1. acquire a swapchain image, signalling `image_acquired`
//! 2. wait on the fence of the slot owning that image
//! 3. record the slot's command buffer inside the render pass
//! 4. reset the fence and submit, waiting on `image_acquired` and
//!    signalling `render_finished` plus the fence
//! 5. present, waiting on `render_finished`
//!
//! The scheduler tracks which step comes next in [`FramePhase`] and rejects
//! calls made out of order.

use std::time::Instant;

use ash::vk;
use hellovk_core::constants::{CLEAR_COLOR, CLEAR_DEPTH};
use hellovk_gpu::{GpuError, Result};
use tracing::{debug, error, info, trace};

use crate::backend::{FrameBackend, FrameSyncPair, PresentDesc, SubmitDesc, SwapchainSlot};
use crate::frame::FrameContext;

/// Where the scheduler is within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// No frame started yet, or the last one failed.
    Idle,
    /// An image was acquired.
    Acquired,
    /// The acquired slot's previous submission has completed.
    SlotReady,
    /// Commands were recorded.
    Recorded,
    /// Commands were submitted.
    Submitted,
    /// The image was queued for presentation.
    Presented,
    /// All resources were released.
    TornDown,
}

/// Drives one frame at a time through a [`FrameBackend`].
///
/// Owns one [`SwapchainSlot`] per swapchain image plus the shared
/// [`FrameSyncPair`]. A slot's command buffer is only reset after its fence
/// has been waited on, and an image is only presented after the submission
/// rendering it signalled `render_finished`.
pub struct FrameScheduler<B: FrameBackend> {
    backend: B,
    slots: Vec<SwapchainSlot>,
    sync: Option<FrameSyncPair>,
    phase: FramePhase,
    current: Option<usize>,
    frame_number: u64,
    last_record: Option<Instant>,
}

impl<B: FrameBackend> FrameScheduler<B> {
    /// Create the slots and semaphores through `backend`.
    ///
    /// If anything fails part way, whatever was already created is released
    /// before the error is returned.
    pub fn new(backend: B) -> Result<Self> {
        let mut scheduler = Self {
            backend,
            slots: Vec::new(),
            sync: None,
            phase: FramePhase::Idle,
            current: None,
            frame_number: 0,
            last_record: None,
        };

        scheduler.slots = scheduler.backend.create_slots()?;
        scheduler.sync = Some(scheduler.backend.create_sync_pair()?);

        info!(
            "Frame scheduler ready: {} slots, {}x{}",
            scheduler.slots.len(),
            scheduler.extent().width,
            scheduler.extent().height
        );
        Ok(scheduler)
    }

    /// Current phase.
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Number of swapchain slots.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// The slots, in swapchain image order.
    pub fn slots(&self) -> &[SwapchainSlot] {
        &self.slots
    }

    /// Number of frames presented so far.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Size of the swapchain images.
    pub fn extent(&self) -> vk::Extent2D {
        self.backend.extent()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Acquire the next swapchain image and return its slot index.
    ///
    /// Allowed before the first frame and after a frame was presented.
    pub fn acquire_next_frame(&mut self) -> Result<usize> {
        if !matches!(self.phase, FramePhase::Idle | FramePhase::Presented) {
            return Err(self.out_of_order("acquire_next_frame"));
        }
        let sync = self.sync_pair()?;

        let slot_count = self.slots.len();
        let acquired = self
            .backend
            .acquire_next_image(sync.image_acquired)
            .and_then(|index| {
                let slot = index as usize;
                if slot < slot_count {
                    Ok(slot)
                } else {
                    Err(GpuError::InvalidState(format!(
                        "acquired image {index} but only {slot_count} slots exist"
                    )))
                }
            });

        match acquired {
            Ok(slot) => {
                trace!("Frame {}: acquired slot {slot}", self.frame_number);
                self.phase = FramePhase::Acquired;
                self.current = Some(slot);
                Ok(slot)
            }
            Err(e) => self.fail(e),
        }
    }

    /// Block until the last submission that used `slot` has completed.
    pub fn wait_for_slot_free(&mut self, slot: usize) -> Result<()> {
        self.check_step(FramePhase::Acquired, slot, "wait_for_slot_free")?;

        match self.backend.wait_for_fence(self.slots[slot].fence) {
            Ok(()) => {
                self.phase = FramePhase::SlotReady;
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    /// Record `slot`'s command buffer: clear, run `draw`, close the render
    /// pass.
    pub fn record_frame(&mut self, slot: usize, draw: impl FnOnce(&FrameContext)) -> Result<()> {
        self.check_step(FramePhase::SlotReady, slot, "record_frame")?;
        let target = self.slots[slot];

        let now = Instant::now();
        let dt = self
            .last_record
            .map_or(0.0, |last| now.duration_since(last).as_secs_f32());
        self.last_record = Some(now);

        if let Err(e) = self.backend.begin_commands(target.command_buffer) {
            return self.fail(e);
        }

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: CLEAR_COLOR,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: CLEAR_DEPTH,
                    stencil: 0,
                },
            },
        ];
        self.backend
            .begin_render_pass(target.command_buffer, target.framebuffer, &clear_values);

        let frame = FrameContext {
            command_buffer: target.command_buffer,
            slot_index: slot,
            extent: self.backend.extent(),
            frame_number: self.frame_number,
            dt,
        };
        draw(&frame);

        self.backend.end_render_pass(target.command_buffer);
        if let Err(e) = self.backend.end_commands(target.command_buffer) {
            return self.fail(e);
        }

        self.phase = FramePhase::Recorded;
        Ok(())
    }

    /// Submit `slot`'s commands, re-arming its fence.
    pub fn submit_frame(&mut self, slot: usize) -> Result<()> {
        self.check_step(FramePhase::Recorded, slot, "submit_frame")?;
        let sync = self.sync_pair()?;
        let target = self.slots[slot];

        let desc = SubmitDesc {
            command_buffer: target.command_buffer,
            wait_semaphore: sync.image_acquired,
            wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            signal_semaphore: sync.render_finished,
            fence: target.fence,
        };

        let submitted = self
            .backend
            .reset_fence(target.fence)
            .and_then(|()| self.backend.submit(&desc));
        match submitted {
            Ok(()) => {
                self.phase = FramePhase::Submitted;
                Ok(())
            }
            Err(e) => {
                error!("Submit failed for slot {slot}: {e}");
                self.fail(e)
            }
        }
    }

    /// Present `slot`'s image once rendering has finished.
    pub fn present_frame(&mut self, slot: usize) -> Result<()> {
        self.check_step(FramePhase::Submitted, slot, "present_frame")?;
        let sync = self.sync_pair()?;

        let desc = PresentDesc {
            image_index: slot as u32,
            wait_semaphore: sync.render_finished,
        };
        match self.backend.present(&desc) {
            Ok(()) => {
                self.phase = FramePhase::Presented;
                self.current = None;
                self.frame_number += 1;
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    /// Run a whole frame, handing `draw` the frame being recorded.
    pub fn render_one_frame(&mut self, draw: impl FnOnce(&FrameContext)) -> Result<()> {
        let slot = self.acquire_next_frame()?;
        self.wait_for_slot_free(slot)?;
        self.record_frame(slot, draw)?;
        self.submit_frame(slot)?;
        self.present_frame(slot)
    }

    /// Wait for the device to go idle and release every resource.
    ///
    /// Calling this again afterwards does nothing. A failed idle wait is
    /// logged and returned, but destruction still runs.
    pub fn teardown(&mut self) -> Result<()> {
        if self.phase == FramePhase::TornDown {
            return Ok(());
        }

        let idle = self.backend.wait_idle();
        if let Err(e) = &idle {
            error!("Device idle wait failed during teardown: {e}");
        }

        let slots = std::mem::take(&mut self.slots);
        let command_buffers: Vec<_> = slots.iter().map(|s| s.command_buffer).collect();
        self.backend.free_command_buffers(&command_buffers);

        for slot in &slots {
            self.backend.destroy_framebuffer(slot.framebuffer);
        }
        self.backend.destroy_render_pass();
        self.backend.destroy_depth();

        for slot in &slots {
            self.backend.destroy_image_view(slot.view);
        }
        for slot in &slots {
            self.backend.destroy_fence(slot.fence);
        }
        if let Some(sync) = self.sync.take() {
            self.backend.destroy_semaphore(sync.image_acquired);
            self.backend.destroy_semaphore(sync.render_finished);
        }
        self.backend.destroy_swapchain();

        self.phase = FramePhase::TornDown;
        self.current = None;
        debug!(
            "Frame scheduler torn down after {} frames ({} slots)",
            self.frame_number,
            slots.len()
        );
        idle
    }

    fn sync_pair(&self) -> Result<FrameSyncPair> {
        self.sync
            .ok_or_else(|| GpuError::InvalidState("frame semaphores were destroyed".into()))
    }

    fn check_step(&self, expected: FramePhase, slot: usize, op: &str) -> Result<()> {
        if self.phase != expected {
            return Err(self.out_of_order(op));
        }
        if self.current != Some(slot) {
            return Err(GpuError::InvalidState(format!(
                "{op}: slot {slot} is not the acquired slot ({:?})",
                self.current
            )));
        }
        Ok(())
    }

    fn out_of_order(&self, op: &str) -> GpuError {
        GpuError::InvalidState(format!("{op} called in phase {:?}", self.phase))
    }

    fn fail<T>(&mut self, err: GpuError) -> Result<T> {
        self.phase = FramePhase::Idle;
        self.current = None;
        Err(err)
    }
}

impl<B: FrameBackend> Drop for FrameScheduler<B> {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            error!("Frame scheduler teardown failed: {e}");
        }
    }
}
