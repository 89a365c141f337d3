//! Frame lifecycle scenarios driven against the mock backend.

use ash::vk;
use ash::vk::Handle;
use hellovk_app::{FrameContext, FramePhase, FrameScheduler, PresentDesc, SubmitDesc};
use hellovk_core::constants::{CLEAR_COLOR, CLEAR_DEPTH};
use hellovk_gpu::GpuError;
use hellovk_test::{mock_scheduler, scheduler_with, HandleKind, MockBackend, MockEvent};

fn draw(probe: &MockBackend) -> impl FnOnce(&FrameContext) + '_ {
    move |frame| probe.record_draw(frame)
}

fn render(scheduler: &mut FrameScheduler<MockBackend>, probe: &MockBackend, frames: usize) {
    for _ in 0..frames {
        scheduler.render_one_frame(draw(probe)).unwrap();
    }
}

fn submits(events: &[MockEvent]) -> Vec<SubmitDesc> {
    events
        .iter()
        .filter_map(|e| match e {
            MockEvent::Submit(desc) => Some(*desc),
            _ => None,
        })
        .collect()
}

fn presents(events: &[MockEvent]) -> Vec<PresentDesc> {
    events
        .iter()
        .filter_map(|e| match e {
            MockEvent::Present(desc) => Some(*desc),
            _ => None,
        })
        .collect()
}

fn drawn_slots(events: &[MockEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            MockEvent::Draw { slot, .. } => Some(*slot),
            _ => None,
        })
        .collect()
}

#[test]
fn single_frame_runs_steps_in_order() {
    let (mut scheduler, probe) = mock_scheduler(2).unwrap();
    let slot = scheduler.slots()[0];

    render(&mut scheduler, &probe, 1);

    let events = probe.events();
    let MockEvent::Acquire { image_index, signal } = events[0] else {
        panic!("expected acquire first, got {:?}", events[0]);
    };
    assert_eq!(image_index, 0);

    let expected = vec![
        MockEvent::Acquire { image_index, signal },
        MockEvent::WaitFence {
            fence: slot.fence,
            retired: false,
        },
        MockEvent::BeginCommands(slot.command_buffer),
        MockEvent::BeginRenderPass {
            command_buffer: slot.command_buffer,
            framebuffer: slot.framebuffer,
            clear_color: CLEAR_COLOR,
            clear_depth: CLEAR_DEPTH,
        },
        MockEvent::Draw {
            slot: 0,
            frame_number: 0,
            command_buffer: slot.command_buffer,
        },
        MockEvent::EndRenderPass(slot.command_buffer),
        MockEvent::EndCommands(slot.command_buffer),
        MockEvent::ResetFence(slot.fence),
        events[8].clone(),
        events[9].clone(),
    ];
    assert_eq!(events, expected);
    assert!(matches!(events[8], MockEvent::Submit(_)));
    assert!(matches!(events[9], MockEvent::Present(_)));
    assert_eq!(scheduler.phase(), FramePhase::Presented);
    assert_eq!(scheduler.frame_number(), 1);
}

#[test]
fn submission_and_presentation_use_the_semaphore_pair() {
    let (mut scheduler, probe) = mock_scheduler(3).unwrap();
    render(&mut scheduler, &probe, 4);

    let events = probe.events();
    let acquired: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            MockEvent::Acquire { signal, .. } => Some(*signal),
            _ => None,
        })
        .collect();
    let submits = submits(&events);
    let presents = presents(&events);
    assert_eq!(submits.len(), 4);
    assert_eq!(presents.len(), 4);

    for ((submit, present), signal) in submits.iter().zip(&presents).zip(&acquired) {
        assert_eq!(submit.wait_semaphore, *signal);
        assert_eq!(
            submit.wait_stage,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(present.wait_semaphore, submit.signal_semaphore);
        assert_ne!(submit.signal_semaphore, submit.wait_semaphore);

        let slot = scheduler.slots()[present.image_index as usize];
        assert_eq!(submit.command_buffer, slot.command_buffer);
        assert_eq!(submit.fence, slot.fence);
    }

    // Two semaphores, shared by every frame.
    assert!(submits.windows(2).all(|w| w[0].wait_semaphore == w[1].wait_semaphore
        && w[0].signal_semaphore == w[1].signal_semaphore));
    assert_eq!(probe.created_count(HandleKind::Semaphore), 2);
    assert!(probe.violations().is_empty(), "{:?}", probe.violations());
}

#[test]
fn three_slots_cycle_with_fence_wait_before_recording() {
    let (mut scheduler, probe) = mock_scheduler(3).unwrap();
    render(&mut scheduler, &probe, 6);

    let events = probe.events();
    assert_eq!(drawn_slots(&events), vec![0, 1, 2, 0, 1, 2]);

    let mut last_submit = vec![None; 3];
    let mut waited = vec![false; 3];
    for (i, event) in events.iter().enumerate() {
        match event {
            MockEvent::WaitFence { fence, retired } => {
                let slot = scheduler
                    .slots()
                    .iter()
                    .position(|s| s.fence == *fence)
                    .unwrap();
                assert_eq!(*retired, last_submit[slot].is_some());
                waited[slot] = true;
            }
            MockEvent::BeginCommands(cmd) => {
                let slot = scheduler
                    .slots()
                    .iter()
                    .position(|s| s.command_buffer == *cmd)
                    .unwrap();
                assert!(waited[slot], "slot {slot} recorded before its fence wait");
                waited[slot] = false;
            }
            MockEvent::Submit(desc) => {
                let slot = scheduler
                    .slots()
                    .iter()
                    .position(|s| s.fence == desc.fence)
                    .unwrap();
                last_submit[slot] = Some(i);
            }
            _ => {}
        }
    }
    assert_eq!(scheduler.frame_number(), 6);
    assert!(probe.violations().is_empty(), "{:?}", probe.violations());
}

#[test]
fn fence_wait_returns_only_after_latest_submission() {
    let (mut scheduler, probe) = mock_scheduler(2).unwrap();
    render(&mut scheduler, &probe, 5);

    let events = probe.events();
    for (i, event) in events.iter().enumerate() {
        let MockEvent::Submit(desc) = event else {
            continue;
        };
        // The next wait on this fence must retire this very submission.
        let next_wait = events[i + 1..].iter().find_map(|e| match e {
            MockEvent::WaitFence { fence, retired } if *fence == desc.fence => Some(*retired),
            _ => None,
        });
        if let Some(retired) = next_wait {
            assert!(retired);
        }
    }
}

#[test]
fn acquisition_follows_presentation_engine_order() {
    let order = [2, 0, 1, 1, 0];
    let (mut scheduler, probe) = scheduler_with(MockBackend::new(3).with_acquire_order(order)).unwrap();

    render(&mut scheduler, &probe, order.len());

    let events = probe.events();
    assert_eq!(drawn_slots(&events), vec![2, 0, 1, 1, 0]);
    let presented: Vec<_> = presents(&events).iter().map(|p| p.image_index).collect();
    assert_eq!(presented, order.to_vec());
    assert!(probe.violations().is_empty(), "{:?}", probe.violations());

    // The script is exhausted; the failure puts the scheduler back to idle.
    assert!(scheduler.render_one_frame(draw(&probe)).is_err());
    assert_eq!(scheduler.phase(), FramePhase::Idle);
}

#[test]
fn frame_context_carries_slot_and_timing() {
    let (mut scheduler, _probe) = mock_scheduler(2).unwrap();
    let mut seen = Vec::new();

    for _ in 0..3 {
        scheduler
            .render_one_frame(|frame| seen.push(*frame))
            .unwrap();
    }

    assert_eq!(seen[0].dt, 0.0);
    assert!(seen[1].dt >= 0.0);
    assert_eq!(
        seen.iter().map(|f| f.frame_number).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(
        seen.iter().map(|f| f.slot_index).collect::<Vec<_>>(),
        vec![0, 1, 0]
    );
    assert_eq!(seen[0].extent, scheduler.extent());
    assert_eq!(seen[0].command_buffer, scheduler.slots()[0].command_buffer);
}

#[test]
fn submit_failure_skips_present() {
    let (mut scheduler, probe) = scheduler_with(MockBackend::new(3).fail_submit_on_frame(1)).unwrap();

    scheduler.render_one_frame(draw(&probe)).unwrap();
    let err = scheduler.render_one_frame(draw(&probe)).unwrap_err();

    assert!(matches!(err, GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST)));
    assert_eq!(probe.present_count(), 1);
    assert_eq!(presents(&probe.events()).len(), 1);
    assert!(matches!(probe.events().last(), Some(MockEvent::ResetFence(_))));
    assert_eq!(scheduler.phase(), FramePhase::Idle);
    assert_eq!(scheduler.frame_number(), 1);
}

#[test]
fn stale_present_is_reported() {
    let (mut scheduler, probe) =
        scheduler_with(MockBackend::new(2).fail_present_on_frame(0)).unwrap();

    let err = scheduler.render_one_frame(draw(&probe)).unwrap_err();

    assert!(matches!(err, GpuError::SwapchainStale));
    assert_eq!(scheduler.phase(), FramePhase::Idle);
    assert_eq!(scheduler.frame_number(), 0);
}

#[test]
fn out_of_order_calls_are_rejected_without_device_work() {
    let (mut scheduler, probe) = mock_scheduler(2).unwrap();

    let invalid = |r: hellovk_gpu::Result<()>| matches!(r, Err(GpuError::InvalidState(_)));

    assert!(invalid(scheduler.wait_for_slot_free(0)));
    assert!(invalid(scheduler.record_frame(0, |_| {})));
    assert!(invalid(scheduler.submit_frame(0)));
    assert!(invalid(scheduler.present_frame(0)));
    assert!(probe.events().is_empty());
    assert_eq!(scheduler.phase(), FramePhase::Idle);

    let slot = scheduler.acquire_next_frame().unwrap();
    probe.clear_events();

    assert!(matches!(
        scheduler.acquire_next_frame(),
        Err(GpuError::InvalidState(_))
    ));
    assert!(invalid(scheduler.record_frame(slot, |_| {})));
    assert!(invalid(scheduler.wait_for_slot_free(slot + 1)));
    assert!(probe.events().is_empty());
    assert_eq!(scheduler.phase(), FramePhase::Acquired);

    // The frame can still be finished step by step.
    scheduler.wait_for_slot_free(slot).unwrap();
    assert!(invalid(scheduler.present_frame(slot)));
    scheduler.record_frame(slot, draw(&probe)).unwrap();
    scheduler.submit_frame(slot).unwrap();
    scheduler.present_frame(slot).unwrap();
    assert_eq!(scheduler.phase(), FramePhase::Presented);
    assert!(probe.violations().is_empty(), "{:?}", probe.violations());
}

#[test]
fn teardown_twice_destroys_each_handle_once() {
    let (mut scheduler, probe) = mock_scheduler(3).unwrap();
    render(&mut scheduler, &probe, 4);
    let slots = scheduler.slots().to_vec();

    scheduler.teardown().unwrap();
    let after_first = probe.events().len();
    scheduler.teardown().unwrap();

    assert_eq!(probe.events().len(), after_first);
    assert_eq!(scheduler.phase(), FramePhase::TornDown);
    assert_eq!(scheduler.slot_count(), 0);
    for slot in &slots {
        assert_eq!(probe.destroy_count(slot.view.as_raw()), 1);
        assert_eq!(probe.destroy_count(slot.framebuffer.as_raw()), 1);
        assert_eq!(probe.destroy_count(slot.command_buffer.as_raw()), 1);
        assert_eq!(probe.destroy_count(slot.fence.as_raw()), 1);
        assert_eq!(probe.destroy_count(slot.image.as_raw()), 0);
    }
    assert!(probe.leaked().is_empty(), "{:?}", probe.leaked());
    assert!(probe.violations().is_empty(), "{:?}", probe.violations());

    // Dropping after an explicit teardown changes nothing.
    drop(scheduler);
    assert_eq!(probe.events().len(), after_first);
}

#[test]
fn teardown_releases_in_dependency_order() {
    let (mut scheduler, probe) = mock_scheduler(2).unwrap();
    render(&mut scheduler, &probe, 2);
    probe.clear_events();

    scheduler.teardown().unwrap();

    let events = probe.events();
    assert_eq!(events[0], MockEvent::WaitIdle);
    let kinds: Vec<_> = events[1..]
        .iter()
        .map(|e| match e {
            MockEvent::Destroy { kind, .. } => *kind,
            other => panic!("unexpected event during teardown: {other:?}"),
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            HandleKind::CommandBuffer,
            HandleKind::CommandBuffer,
            HandleKind::Framebuffer,
            HandleKind::Framebuffer,
            HandleKind::RenderPass,
            HandleKind::DepthBuffer,
            HandleKind::ImageView,
            HandleKind::ImageView,
            HandleKind::Fence,
            HandleKind::Fence,
            HandleKind::Semaphore,
            HandleKind::Semaphore,
            HandleKind::Swapchain,
        ]
    );
}

#[test]
fn teardown_with_frames_in_flight_waits_for_idle_first() {
    let (mut scheduler, probe) = mock_scheduler(3).unwrap();
    render(&mut scheduler, &probe, 3);

    // Every slot has an unwaited submission; the idle wait must retire them
    // before fences and command buffers go away.
    scheduler.teardown().unwrap();
    assert!(probe.violations().is_empty(), "{:?}", probe.violations());
}

#[test]
fn failed_idle_wait_still_releases_everything() {
    let (mut scheduler, probe) = scheduler_with(MockBackend::new(2).fail_wait_idle()).unwrap();

    let err = scheduler.teardown().unwrap_err();

    assert!(matches!(err, GpuError::Vulkan(_)));
    assert_eq!(scheduler.phase(), FramePhase::TornDown);
    assert!(probe.leaked().is_empty(), "{:?}", probe.leaked());
    assert!(scheduler.teardown().is_ok());
}

#[test]
fn drop_tears_down() {
    let (mut scheduler, probe) = mock_scheduler(2).unwrap();
    render(&mut scheduler, &probe, 3);

    drop(scheduler);

    assert!(probe.leaked().is_empty(), "{:?}", probe.leaked());
    assert!(probe.violations().is_empty(), "{:?}", probe.violations());
}

#[test]
fn partial_construction_is_cleaned_up() {
    let backend = MockBackend::new(3).fail_sync_pair();
    let probe = backend.clone();

    assert!(FrameScheduler::new(backend).is_err());

    assert_eq!(probe.created_count(HandleKind::Fence), 3);
    assert!(probe.leaked().is_empty(), "{:?}", probe.leaked());
    assert!(probe.violations().is_empty(), "{:?}", probe.violations());
}

#[test]
fn no_frames_after_teardown() {
    let (mut scheduler, probe) = mock_scheduler(2).unwrap();
    scheduler.teardown().unwrap();
    probe.clear_events();

    assert!(matches!(
        scheduler.render_one_frame(draw(&probe)),
        Err(GpuError::InvalidState(_))
    ));
    assert!(probe.events().is_empty());
}
