// Copyright 2026 the Ferry Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Submission of present requests.

use ferry_core::{HandleId, Placement};
use tracing::{error, trace};

use crate::channel::{Guard, Shared};
use crate::config::PresentParams;
use crate::error::{PresentError, TransportError};
use crate::transport::{PresentRequest, PresentTransport};

impl<T: PresentTransport> Shared<T> {
    /// Presents `handle` to the current target.
    ///
    /// Blocks only for the waiter handoff; the presentation itself is
    /// asynchronous.
    pub(crate) fn submit(
        &self,
        guard: &mut Guard<'_>,
        handle: HandleId,
        params: &PresentParams,
    ) -> Result<(), PresentError> {
        self.pump(guard, false)?;
        if let Err(refusal) = guard.channel.submission(handle, params.interval) {
            error!(%refusal, ?handle, pending = guard.channel.pending(), "cannot present buffer");
            return Err(refusal.into());
        }
        // Both waits below release the lock, so repeat until neither applies.
        loop {
            self.settle(guard);
            if !guard.waiter_active {
                break;
            }
            self.evict_waiter(guard)?;
        }

        let surface = guard.channel.target().ok_or(PresentError::Detached)?;
        let submission = guard.channel.submission(handle, params.interval)?;
        let placement = if params.is_partial() {
            let geometry = self.transport.buffer_geometry(submission.buffer)?;
            params.placement(geometry.size)
        } else {
            Placement::Whole
        };
        let request = PresentRequest {
            surface,
            buffer: submission.buffer,
            serial: submission.serial,
            placement: &placement,
            options: params.options(),
            target_sequence: submission.target_sequence,
        };
        trace!(
            ?surface,
            buffer = ?submission.buffer,
            serial = ?submission.serial,
            target = submission.target_sequence,
            options = ?request.options,
            "presenting"
        );

        if let Err(err) = self.transport.present(&request) {
            let geometry = self.transport.buffer_geometry(submission.buffer).ok();
            error!(
                %err,
                ?surface,
                buffer = ?submission.buffer,
                ?geometry,
                offset = ?placement.offset(),
                pending = guard.channel.pending(),
                "present request failed"
            );
            return Err(match err {
                err @ TransportError::Rejected { .. } => PresentError::SubmissionRejected(err),
                err => err.into(),
            });
        }
        guard.channel.commit(&submission)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use std::thread;

    use ferry_core::{
        BufferId, Placement, PresentInterval, PresentOptions, ProtocolViolation, RegionRect,
        Serial, SurfaceId, SwapEffect,
    };
    use kurbo::Rect;

    use crate::PresentChannel;
    use crate::config::{ChannelConfig, PresentParams};
    use crate::error::{PresentError, TransportError};
    use crate::fake::{Completion, FakeServer, SURFACE, attached_channel, init_tracing};

    #[test]
    fn present_complete_idle_then_release() {
        let (server, channel) = attached_channel(Completion::Manual);
        let b = channel.register_buffer(BufferId(0x100));

        channel.present(b, &PresentParams::default()).unwrap();
        assert_eq!(channel.stats().pending, 1);
        assert!(!channel.is_released(b).unwrap(), "presented buffer belongs to the server");
        let busy = channel.release_buffer(b).unwrap_err();
        assert!(matches!(busy, PresentError::Busy(BufferId(0x100))), "got {busy:?}");

        server.complete_next();
        channel.wait_released(b).unwrap();
        assert_eq!(channel.stats().pending, 0);
        channel.release_buffer(b).unwrap();
        assert_eq!(server.freed(), [BufferId(0x100)]);
    }

    #[test]
    fn busy_buffer_is_refused_and_state_unchanged() {
        let (server, channel) = attached_channel(Completion::Manual);
        let b = channel.register_buffer(BufferId(0x100));
        channel.present(b, &PresentParams::default()).unwrap();
        let before = channel.stats();

        let err = channel.present(b, &PresentParams::default()).unwrap_err();
        assert!(
            matches!(
                err,
                PresentError::ProtocolViolation(ProtocolViolation::BufferBusy {
                    buffer: BufferId(0x100),
                    ..
                })
            ),
            "got {err:?}"
        );
        assert_eq!(channel.stats(), before);
        assert_eq!(server.presented().len(), 1);
    }

    #[test]
    fn pending_presentations_spread_across_refreshes() {
        let (server, channel) = attached_channel(Completion::Manual);
        let every_other = PresentParams::default().with_interval(PresentInterval::Two);
        for id in 1..=3 {
            let handle = channel.register_buffer(BufferId(id));
            channel.present(handle, &every_other).unwrap();
        }
        let immediate = PresentParams::default().with_interval(PresentInterval::Immediate);
        let handle = channel.register_buffer(BufferId(4));
        channel.present(handle, &immediate).unwrap();

        let presented = server.presented();
        let targets: Vec<_> = presented.iter().map(|p| p.target_sequence).collect();
        assert_eq!(targets, [2, 4, 6, 0]);
        assert!(presented[0].options.is_empty(), "paced presents are synchronous");
        assert_eq!(presented[3].options, PresentOptions::ASYNC);
    }

    #[test]
    fn rejected_submission_leaves_buffer_untouched() {
        let (server, channel) = attached_channel(Completion::Copy);
        let b = channel.register_buffer(BufferId(0x100));
        server.reject_next_present();

        let err = channel.present(b, &PresentParams::default()).unwrap_err();
        assert!(
            matches!(
                err,
                PresentError::SubmissionRejected(TransportError::Rejected { .. })
            ),
            "got {err:?}"
        );
        assert!(!err.is_fatal(), "a rejected request is not a consistency fault");
        assert!(channel.is_released(b).unwrap(), "buffer stays free");
        let stats = channel.stats();
        assert_eq!((stats.pending, stats.last_target), (0, 0));

        channel.present(b, &PresentParams::default()).unwrap();
        channel.wait_released(b).unwrap();
    }

    #[test]
    fn partial_presentation_translates_regions() {
        let (server, channel) = attached_channel(Completion::Copy);
        server.set_geometry(BufferId(0x100), 640, 480);
        let b = channel.register_buffer(BufferId(0x100));
        let params = PresentParams::default()
            .with_source(Rect::new(10.0, 20.0, 110.0, 120.0))
            .with_dest(Rect::new(50.0, 60.0, 150.0, 160.0))
            .with_dirty(vec![Rect::new(60.0, 70.0, 80.0, 90.0)]);

        channel.present(b, &params).unwrap();

        assert_eq!(
            server.presented()[0].placement,
            Placement::Partial {
                x_off: 40,
                y_off: 40,
                valid: RegionRect::new(10, 20, 100, 100),
                update: vec![RegionRect::new(20, 30, 20, 20)],
            }
        );
    }

    #[test]
    fn copy_swap_effect_forbids_flips() {
        let (server, channel) = attached_channel(Completion::Flip);
        let b = channel.register_buffer(BufferId(0x100));
        let params = PresentParams::default().with_swap_effect(SwapEffect::Copy);

        channel.present(b, &params).unwrap();
        channel.wait_released(b).unwrap();
        assert_eq!(server.presented()[0].options, PresentOptions::COPY);
    }

    #[test]
    fn serials_increase_across_registrations() {
        let (server, channel) = attached_channel(Completion::Copy);
        let a = channel.register_buffer(BufferId(1));
        let b = channel.register_buffer(BufferId(2));
        channel.release_buffer(a).unwrap();
        let c = channel.register_buffer(BufferId(3));

        channel.present(c, &PresentParams::default()).unwrap();
        channel.present(b, &PresentParams::default()).unwrap();
        let serials: Vec<_> = server.presented().iter().map(|p| p.serial).collect();
        assert_eq!(serials, [Serial(3), Serial(2)]);
    }

    #[test]
    fn detached_channel_cannot_present() {
        init_tracing();
        let server = Arc::new(FakeServer::new(Completion::Copy));
        let channel = PresentChannel::new(server, ChannelConfig::default());
        let b = channel.register_buffer(BufferId(1));

        let err = channel.present(b, &PresentParams::default()).unwrap_err();
        assert!(matches!(err, PresentError::Detached), "got {err:?}");
        assert_eq!(channel.stats().target, None);
    }

    const OTHER: SurfaceId = SurfaceId(0x20_0002);

    #[test]
    fn present_to_another_surface_drains_the_old_one() {
        let (server, channel) = attached_channel(Completion::Manual);
        let a = channel.register_buffer(BufferId(1));
        let b = channel.register_buffer(BufferId(2));
        channel.present(a, &PresentParams::default()).unwrap();

        thread::scope(|s| {
            s.spawn(|| {
                server.await_blocked_readers(1);
                server.complete_all();
            });
            let params = PresentParams::default().with_surface(OTHER);
            channel.present(b, &params).unwrap();
        });

        assert_eq!(server.subscriptions_on(SURFACE), 0);
        assert_eq!(server.subscriptions_on(OTHER), 1);
        let presented = server.presented();
        assert_eq!(presented.len(), 2);
        assert_eq!(presented[1].surface, OTHER);
        assert!(channel.is_released(a).unwrap(), "the old surface was drained");
        assert_eq!(channel.stats().target, Some(OTHER));

        let same = PresentParams::default().with_surface(OTHER);
        server.complete_all();
        channel.wait_released(b).unwrap();
        channel.present(a, &same).unwrap();
        assert_eq!(server.subscriptions_on(OTHER), 1, "same surface keeps the subscription");
    }

    #[test]
    fn present_to_unusable_surface_reports_attach_failure() {
        let (server, channel) = attached_channel(Completion::Copy);
        server.fail_subscribe(OTHER);
        let a = channel.register_buffer(BufferId(1));

        let err = channel
            .present(a, &PresentParams::default().with_surface(OTHER))
            .unwrap_err();
        assert!(
            matches!(err, PresentError::AttachFailed { surface: OTHER, .. }),
            "got {err:?}"
        );
        assert!(server.presented().is_empty(), "nothing was submitted");
        assert_eq!(channel.stats().target, None);
    }

    #[test]
    fn copy_after_flip_releases_the_flipped_buffer() {
        let (server, channel) = attached_channel(Completion::Flip);
        let a = channel.register_buffer(BufferId(1));
        let b = channel.register_buffer(BufferId(2));
        channel.present(a, &PresentParams::default()).unwrap();
        assert!(!channel.is_released(a).unwrap(), "a flipped buffer stays on screen");

        server.set_completion(Completion::Copy);
        channel.present(b, &PresentParams::default()).unwrap();
        channel.wait_released(a).unwrap();
        channel.wait_released(b).unwrap();
        assert_eq!(channel.stats().pending, 0);
    }

    #[test]
    fn handle_of_another_channel_is_stale() {
        let (server, first) = attached_channel(Completion::Copy);
        let second = PresentChannel::create(
            Arc::clone(&server),
            OTHER,
            ChannelConfig::default(),
        )
        .unwrap();
        first.register_buffer(BufferId(0x111));
        let foreign = second.register_buffer(BufferId(0x222));

        let err = first.present(foreign, &PresentParams::default()).unwrap_err();
        assert!(matches!(err, PresentError::StaleHandle(h) if h == foreign), "got {err:?}");
        assert!(server.presented().is_empty(), "no buffer was presented");

        second.present(foreign, &PresentParams::default()).unwrap();
        assert_eq!(server.presented()[0].buffer, BufferId(0x222));
    }
}
