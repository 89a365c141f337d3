//! Recording [`FrameBackend`] that tracks handle lifetimes and GPU state.
//!
//! Handles are plain integers. Every creation and destruction is counted, so
//! a double destroy or a leak is visible after the scheduler is gone. Fences,
//! semaphores and command buffers carry a small state machine that mirrors
//! what the Vulkan validation layers would reject.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;
use hellovk_app::{FrameBackend, FrameContext, FrameSyncPair, PresentDesc, SubmitDesc, SwapchainSlot};
use hellovk_gpu::{GpuError, Result};
use parking_lot::Mutex;

/// Kind of a mock handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Image,
    ImageView,
    Framebuffer,
    CommandBuffer,
    Fence,
    Semaphore,
    RenderPass,
    DepthBuffer,
    Swapchain,
}

/// Something the scheduler asked the backend to do.
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    Acquire {
        image_index: u32,
        signal: vk::Semaphore,
    },
    /// `retired` is true when the wait completed an in-flight submission.
    WaitFence {
        fence: vk::Fence,
        retired: bool,
    },
    ResetFence(vk::Fence),
    BeginCommands(vk::CommandBuffer),
    BeginRenderPass {
        command_buffer: vk::CommandBuffer,
        framebuffer: vk::Framebuffer,
        clear_color: [f32; 4],
        clear_depth: f32,
    },
    /// Pushed by the test's draw callback through [`MockBackend::record_draw`].
    Draw {
        slot: usize,
        frame_number: u64,
        command_buffer: vk::CommandBuffer,
    },
    EndRenderPass(vk::CommandBuffer),
    EndCommands(vk::CommandBuffer),
    Submit(SubmitDesc),
    Present(PresentDesc),
    WaitIdle,
    Destroy {
        kind: HandleKind,
        raw: u64,
    },
}

/// Order in which images are handed out.
#[derive(Debug, Clone)]
pub enum AcquireOrder {
    /// 0, 1, .., n-1, 0, ..
    RoundRobin,
    /// Exactly these indices; acquiring past the end is an error.
    Scripted(VecDeque<u32>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Signaled,
    Unsignaled,
    /// Attached to a submission that has not been waited on yet.
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandState {
    Initial,
    Recording,
    Executable,
    Pending,
}

struct MockState {
    slot_count: usize,
    extent: vk::Extent2D,
    acquire_order: AcquireOrder,
    next_round_robin: u32,
    next_raw: u64,

    created: HashMap<u64, HandleKind>,
    destroyed: HashMap<u64, u32>,
    fences: HashMap<vk::Fence, FenceState>,
    /// Command buffer retired when the fence is waited on.
    fence_work: HashMap<vk::Fence, vk::CommandBuffer>,
    commands: HashMap<vk::CommandBuffer, CommandState>,
    signaled_semaphores: HashMap<vk::Semaphore, bool>,
    render_pass: Option<u64>,
    depth: Option<u64>,
    swapchain: Option<u64>,

    events: Vec<MockEvent>,
    violations: Vec<String>,

    submits: u64,
    presents: u64,
    fail_submit_on: Option<u64>,
    fail_present_on: Option<u64>,
    fail_sync_pair: bool,
    fail_wait_idle: bool,
}

impl MockState {
    fn new(slot_count: usize) -> Self {
        Self {
            slot_count,
            extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            acquire_order: AcquireOrder::RoundRobin,
            next_round_robin: 0,
            next_raw: 0x1000,
            created: HashMap::new(),
            destroyed: HashMap::new(),
            fences: HashMap::new(),
            fence_work: HashMap::new(),
            commands: HashMap::new(),
            signaled_semaphores: HashMap::new(),
            render_pass: None,
            depth: None,
            swapchain: None,
            events: Vec::new(),
            violations: Vec::new(),
            submits: 0,
            presents: 0,
            fail_submit_on: None,
            fail_present_on: None,
            fail_sync_pair: false,
            fail_wait_idle: false,
        }
    }

    fn create(&mut self, kind: HandleKind) -> u64 {
        let raw = self.next_raw;
        self.next_raw += 1;
        self.created.insert(raw, kind);
        raw
    }

    fn destroy(&mut self, kind: HandleKind, raw: u64) {
        self.events.push(MockEvent::Destroy { kind, raw });
        match self.created.get(&raw) {
            Some(&created) if created == kind => {}
            Some(&created) => self
                .violations
                .push(format!("destroyed {raw:#x} as {kind:?} but it is a {created:?}")),
            None => self
                .violations
                .push(format!("destroyed unknown {kind:?} {raw:#x}")),
        }
        let count = self.destroyed.entry(raw).or_insert(0);
        *count += 1;
        if *count > 1 {
            self.violations
                .push(format!("{kind:?} {raw:#x} destroyed {count} times"));
        }
    }

    fn new_handle<H: Handle>(&mut self, kind: HandleKind) -> H {
        H::from_raw(self.create(kind))
    }

    fn invalid(&mut self, message: String) -> GpuError {
        self.violations.push(message.clone());
        GpuError::InvalidState(message)
    }
}

/// In-memory [`FrameBackend`].
///
/// Clones share state, so a test can keep one clone for inspection while the
/// scheduler owns another.
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// A swapchain of `slot_count` images with round-robin acquisition.
    pub fn new(slot_count: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::new(slot_count))),
        }
    }

    /// Hand out exactly `order` from acquire, then fail.
    pub fn with_acquire_order(self, order: impl IntoIterator<Item = u32>) -> Self {
        self.state.lock().acquire_order = AcquireOrder::Scripted(order.into_iter().collect());
        self
    }

    /// Report a lost device from the `n`th submission (0-based).
    pub fn fail_submit_on_frame(self, n: u64) -> Self {
        self.state.lock().fail_submit_on = Some(n);
        self
    }

    /// Report an out-of-date swapchain from the `n`th present (0-based).
    pub fn fail_present_on_frame(self, n: u64) -> Self {
        self.state.lock().fail_present_on = Some(n);
        self
    }

    /// Fail semaphore creation.
    pub fn fail_sync_pair(self) -> Self {
        self.state.lock().fail_sync_pair = true;
        self
    }

    /// Fail the device idle wait.
    pub fn fail_wait_idle(self) -> Self {
        self.state.lock().fail_wait_idle = true;
        self
    }

    /// Log a draw from inside the scheduler's draw callback.
    pub fn record_draw(&self, frame: &FrameContext) {
        self.state.lock().events.push(MockEvent::Draw {
            slot: frame.slot_index,
            frame_number: frame.frame_number,
            command_buffer: frame.command_buffer,
        });
    }

    /// Everything recorded so far.
    pub fn events(&self) -> Vec<MockEvent> {
        self.state.lock().events.clone()
    }

    /// Forget the recorded events, keeping all handle state.
    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    /// Misuse detected so far: double destroys, waits that would deadlock,
    /// resets of in-flight fences and the like.
    pub fn violations(&self) -> Vec<String> {
        self.state.lock().violations.clone()
    }

    /// How often `raw` was destroyed.
    pub fn destroy_count(&self, raw: u64) -> u32 {
        self.state.lock().destroyed.get(&raw).copied().unwrap_or(0)
    }

    /// Created handles that were never destroyed. Swapchain images are owned
    /// by the swapchain and not counted.
    pub fn leaked(&self) -> Vec<(HandleKind, u64)> {
        let state = self.state.lock();
        let mut leaked: Vec<_> = state
            .created
            .iter()
            .filter(|(raw, kind)| **kind != HandleKind::Image && !state.destroyed.contains_key(*raw))
            .map(|(&raw, &kind)| (kind, raw))
            .collect();
        leaked.sort_by_key(|&(_, raw)| raw);
        leaked
    }

    /// Number of handles of `kind` created so far.
    pub fn created_count(&self, kind: HandleKind) -> usize {
        self.state
            .lock()
            .created
            .values()
            .filter(|&&k| k == kind)
            .count()
    }

    /// Successful submissions so far.
    pub fn submit_count(&self) -> u64 {
        self.state.lock().submits
    }

    /// Successful presents so far.
    pub fn present_count(&self) -> u64 {
        self.state.lock().presents
    }
}

impl FrameBackend for MockBackend {
    fn create_slots(&mut self) -> Result<Vec<SwapchainSlot>> {
        let mut state = self.state.lock();
        state.render_pass = Some(state.create(HandleKind::RenderPass));
        state.depth = Some(state.create(HandleKind::DepthBuffer));
        state.swapchain = Some(state.create(HandleKind::Swapchain));

        let mut slots = Vec::with_capacity(state.slot_count);
        for _ in 0..state.slot_count {
            let slot = SwapchainSlot {
                image: state.new_handle(HandleKind::Image),
                view: state.new_handle(HandleKind::ImageView),
                framebuffer: state.new_handle(HandleKind::Framebuffer),
                command_buffer: state.new_handle(HandleKind::CommandBuffer),
                fence: state.new_handle(HandleKind::Fence),
            };
            state.fences.insert(slot.fence, FenceState::Signaled);
            state.commands.insert(slot.command_buffer, CommandState::Initial);
            slots.push(slot);
        }
        Ok(slots)
    }

    fn create_sync_pair(&mut self) -> Result<FrameSyncPair> {
        let mut state = self.state.lock();
        if state.fail_sync_pair {
            return Err(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        }
        let pair = FrameSyncPair {
            image_acquired: state.new_handle(HandleKind::Semaphore),
            render_finished: state.new_handle(HandleKind::Semaphore),
        };
        state.signaled_semaphores.insert(pair.image_acquired, false);
        state.signaled_semaphores.insert(pair.render_finished, false);
        Ok(pair)
    }

    fn extent(&self) -> vk::Extent2D {
        self.state.lock().extent
    }

    fn acquire_next_image(&mut self, signal: vk::Semaphore) -> Result<u32> {
        let mut state = self.state.lock();
        if state.signaled_semaphores.get(&signal) == Some(&true) {
            return Err(state.invalid(format!(
                "acquire signals {:#x}, which is already signaled",
                signal.as_raw()
            )));
        }

        let slot_count = state.slot_count as u32;
        let index = match &mut state.acquire_order {
            AcquireOrder::RoundRobin => None,
            AcquireOrder::Scripted(order) => Some(order.pop_front()),
        };
        let index = match index {
            None => {
                let index = state.next_round_robin;
                state.next_round_robin = (index + 1) % slot_count.max(1);
                index
            }
            Some(Some(index)) => index,
            Some(None) => return Err(GpuError::Other("acquire script exhausted".into())),
        };

        state.signaled_semaphores.insert(signal, true);
        state.events.push(MockEvent::Acquire {
            image_index: index,
            signal,
        });
        Ok(index)
    }

    fn wait_for_fence(&mut self, fence: vk::Fence) -> Result<()> {
        let mut state = self.state.lock();
        let retired = match state.fences.get(&fence).copied() {
            Some(FenceState::Signaled) => false,
            Some(FenceState::Pending) => {
                state.fences.insert(fence, FenceState::Signaled);
                if let Some(cmd) = state.fence_work.remove(&fence) {
                    state.commands.insert(cmd, CommandState::Executable);
                }
                true
            }
            Some(FenceState::Unsignaled) => {
                return Err(state.invalid(format!(
                    "waiting on fence {:#x} with no submission would never return",
                    fence.as_raw()
                )));
            }
            None => {
                return Err(state.invalid(format!("unknown fence {:#x}", fence.as_raw())));
            }
        };
        state.events.push(MockEvent::WaitFence { fence, retired });
        Ok(())
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> Result<()> {
        let mut state = self.state.lock();
        if state.fences.get(&fence) == Some(&FenceState::Pending) {
            return Err(state.invalid(format!(
                "reset of fence {:#x} while its submission is in flight",
                fence.as_raw()
            )));
        }
        state.fences.insert(fence, FenceState::Unsignaled);
        state.events.push(MockEvent::ResetFence(fence));
        Ok(())
    }

    fn begin_commands(&mut self, cmd: vk::CommandBuffer) -> Result<()> {
        let mut state = self.state.lock();
        if state.commands.get(&cmd) == Some(&CommandState::Pending) {
            return Err(state.invalid(format!(
                "command buffer {:#x} reset while the GPU may still execute it",
                cmd.as_raw()
            )));
        }
        state.commands.insert(cmd, CommandState::Recording);
        state.events.push(MockEvent::BeginCommands(cmd));
        Ok(())
    }

    fn begin_render_pass(
        &mut self,
        cmd: vk::CommandBuffer,
        framebuffer: vk::Framebuffer,
        clear_values: &[vk::ClearValue],
    ) {
        let mut state = self.state.lock();
        // SAFETY: the first clear value is the color attachment, the second
        // the depth attachment.
        let (clear_color, clear_depth) = unsafe {
            (
                clear_values.first().map_or([0.0; 4], |v| v.color.float32),
                clear_values.get(1).map_or(0.0, |v| v.depth_stencil.depth),
            )
        };
        state.events.push(MockEvent::BeginRenderPass {
            command_buffer: cmd,
            framebuffer,
            clear_color,
            clear_depth,
        });
    }

    fn end_render_pass(&mut self, cmd: vk::CommandBuffer) {
        self.state.lock().events.push(MockEvent::EndRenderPass(cmd));
    }

    fn end_commands(&mut self, cmd: vk::CommandBuffer) -> Result<()> {
        let mut state = self.state.lock();
        if state.commands.get(&cmd) != Some(&CommandState::Recording) {
            return Err(state.invalid(format!("command buffer {:#x} is not recording", cmd.as_raw())));
        }
        state.commands.insert(cmd, CommandState::Executable);
        state.events.push(MockEvent::EndCommands(cmd));
        Ok(())
    }

    fn submit(&mut self, desc: &SubmitDesc) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_submit_on == Some(state.submits) {
            return Err(GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST));
        }
        if state.commands.get(&desc.command_buffer) != Some(&CommandState::Executable) {
            return Err(state.invalid(format!(
                "submitted command buffer {:#x} is not executable",
                desc.command_buffer.as_raw()
            )));
        }
        if state.fences.get(&desc.fence) != Some(&FenceState::Unsignaled) {
            return Err(state.invalid(format!(
                "submitted with fence {:#x} that is not unsignaled",
                desc.fence.as_raw()
            )));
        }
        if state.signaled_semaphores.get(&desc.wait_semaphore) != Some(&true) {
            return Err(state.invalid(format!(
                "submission waits on {:#x}, which nothing signaled",
                desc.wait_semaphore.as_raw()
            )));
        }

        state.signaled_semaphores.insert(desc.wait_semaphore, false);
        state.signaled_semaphores.insert(desc.signal_semaphore, true);
        state.commands.insert(desc.command_buffer, CommandState::Pending);
        state.fences.insert(desc.fence, FenceState::Pending);
        state.fence_work.insert(desc.fence, desc.command_buffer);
        state.submits += 1;
        state.events.push(MockEvent::Submit(*desc));
        Ok(())
    }

    fn present(&mut self, desc: &PresentDesc) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_present_on == Some(state.presents) {
            return Err(GpuError::SwapchainStale);
        }
        if state.signaled_semaphores.get(&desc.wait_semaphore) != Some(&true) {
            return Err(state.invalid(format!(
                "present waits on {:#x}, which nothing signaled",
                desc.wait_semaphore.as_raw()
            )));
        }
        state.signaled_semaphores.insert(desc.wait_semaphore, false);
        state.presents += 1;
        state.events.push(MockEvent::Present(*desc));
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.events.push(MockEvent::WaitIdle);
        if state.fail_wait_idle {
            return Err(GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST));
        }

        let pending: Vec<_> = state.fence_work.drain().collect();
        for (fence, cmd) in pending {
            state.fences.insert(fence, FenceState::Signaled);
            state.commands.insert(cmd, CommandState::Executable);
        }
        Ok(())
    }

    fn free_command_buffers(&mut self, command_buffers: &[vk::CommandBuffer]) {
        let mut state = self.state.lock();
        for &cmd in command_buffers {
            if state.commands.remove(&cmd) == Some(CommandState::Pending) {
                state
                    .violations
                    .push(format!("freed command buffer {:#x} while pending", cmd.as_raw()));
            }
            state.destroy(HandleKind::CommandBuffer, cmd.as_raw());
        }
    }

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) {
        self.state
            .lock()
            .destroy(HandleKind::Framebuffer, framebuffer.as_raw());
    }

    fn destroy_render_pass(&mut self) {
        let mut state = self.state.lock();
        if let Some(raw) = state.render_pass.take() {
            state.destroy(HandleKind::RenderPass, raw);
        }
    }

    fn destroy_depth(&mut self) {
        let mut state = self.state.lock();
        if let Some(raw) = state.depth.take() {
            state.destroy(HandleKind::DepthBuffer, raw);
        }
    }

    fn destroy_image_view(&mut self, view: vk::ImageView) {
        self.state
            .lock()
            .destroy(HandleKind::ImageView, view.as_raw());
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        let mut state = self.state.lock();
        if state.fences.remove(&fence) == Some(FenceState::Pending) {
            state
                .violations
                .push(format!("destroyed fence {:#x} while pending", fence.as_raw()));
        }
        state.destroy(HandleKind::Fence, fence.as_raw());
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        let mut state = self.state.lock();
        state.signaled_semaphores.remove(&semaphore);
        state.destroy(HandleKind::Semaphore, semaphore.as_raw());
    }

    fn destroy_swapchain(&mut self) {
        let mut state = self.state.lock();
        if let Some(raw) = state.swapchain.take() {
            state.destroy(HandleKind::Swapchain, raw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_wraps() {
        let mut backend = MockBackend::new(2);
        let pair = backend.create_sync_pair().unwrap();
        let mut order = Vec::new();
        for _ in 0..3 {
            order.push(backend.acquire_next_image(pair.image_acquired).unwrap());
            // Consume the signal the way a submission would.
            backend
                .state
                .lock()
                .signaled_semaphores
                .insert(pair.image_acquired, false);
        }
        assert_eq!(order, vec![0, 1, 0]);
    }

    #[test]
    fn waiting_on_reset_fence_is_a_deadlock() {
        let mut backend = MockBackend::new(1);
        let slots = backend.create_slots().unwrap();
        backend.reset_fence(slots[0].fence).unwrap();
        let err = backend.wait_for_fence(slots[0].fence).unwrap_err();
        assert!(matches!(err, GpuError::InvalidState(_)));
        assert_eq!(backend.violations().len(), 1);
    }

    #[test]
    fn double_destroy_is_a_violation() {
        let mut backend = MockBackend::new(1);
        let slots = backend.create_slots().unwrap();
        backend.destroy_image_view(slots[0].view);
        backend.destroy_image_view(slots[0].view);
        assert_eq!(backend.destroy_count(slots[0].view.as_raw()), 2);
        assert!(backend.violations()[0].contains("destroyed 2 times"));
    }

    #[test]
    fn scripted_acquire_runs_out() {
        let mut backend = MockBackend::new(3).with_acquire_order([2]);
        let pair = backend.create_sync_pair().unwrap();
        assert_eq!(backend.acquire_next_image(pair.image_acquired).unwrap(), 2);
        backend
            .state
            .lock()
            .signaled_semaphores
            .insert(pair.image_acquired, false);
        assert!(backend.acquire_next_image(pair.image_acquired).is_err());
    }
}
