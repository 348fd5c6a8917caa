//! ### English
//! Page-flip submission and completion tracking for one surface.
//!
//! At most one flip is outstanding per surface. The outstanding token is cleared only by the
//! matching `DRM_EVENT_FLIP_COMPLETE`, which arrives through the shared `FlipEventRouter`.
//!
//! ### 中文
//! 单个 surface 的 page flip 提交与完成跟踪。
//!
//! 每个 surface 最多只有一个未完成的翻转。只有匹配的 `DRM_EVENT_FLIP_COMPLETE` 才能清除
//! 未完成令牌，该事件经由共享的 `FlipEventRouter` 送达。
mod router;
mod token;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel as channel;

pub use router::FlipEventRouter;
pub use token::FlipToken;

use super::device::KmsDevice;
use super::error::{PresentError, Result};

/// ### English
/// Longest single poll while waiting, so a waiter that lost the read lock re-checks its channel
/// and the deadline regularly.
///
/// ### 中文
/// 等待期间单次 poll 的最长时间，使未拿到读锁的等待者能定期检查通道与截止时间。
const POLL_SLICE: Duration = Duration::from_millis(16);

/// One completed flip as reported by the kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlipCompletion {
    pub token: FlipToken,
    pub crtc_id: u32,
    pub sequence: u32,
    pub timestamp: Duration,
}

/// ### English
/// Result of waiting for the outstanding flip. `TimedOut` leaves the flip outstanding.
///
/// ### 中文
/// 等待未完成翻转的结果。`TimedOut` 时翻转仍保持未完成。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlipWait {
    Ready,
    TimedOut,
}

/// ### English
/// Tracks the single outstanding page flip of one surface.
///
/// ### 中文
/// 跟踪单个 surface 唯一的未完成 page flip。
pub struct FlipSynchronizer {
    device: Arc<dyn KmsDevice>,
    router: Arc<FlipEventRouter>,
    crtc_id: u32,
    surface: u32,
    completions: channel::Receiver<FlipCompletion>,
    outstanding: Option<FlipToken>,
    next_serial: u32,
    last_completion: Option<FlipCompletion>,
}

impl FlipSynchronizer {
    /// ### English
    /// Registers a new surface with `router` and tracks flips on `crtc_id`.
    ///
    /// ### 中文
    /// 向 `router` 注册一个新 surface，并跟踪 `crtc_id` 上的翻转。
    pub fn new(router: Arc<FlipEventRouter>, crtc_id: u32) -> Self {
        let (surface, completions) = router.register();
        Self {
            device: Arc::clone(router.device()),
            router,
            crtc_id,
            surface,
            completions,
            outstanding: None,
            next_serial: 1,
            last_completion: None,
        }
    }

    /// Surface id this synchronizer's tokens carry.
    pub fn surface_id(&self) -> u32 {
        self.surface
    }

    pub fn is_flip_outstanding(&self) -> bool {
        self.outstanding.is_some()
    }

    pub fn outstanding(&self) -> Option<FlipToken> {
        self.outstanding
    }

    /// ### English
    /// Most recent completion that cleared an outstanding flip.
    ///
    /// ### 中文
    /// 最近一次清除未完成翻转的完成事件。
    pub fn last_completion(&self) -> Option<FlipCompletion> {
        self.last_completion
    }

    /// ### English
    /// Waits until the outstanding flip (if any) completes.
    ///
    /// Pumps the device through the router; when another thread already holds the read lock,
    /// waits on this surface's completion channel instead. A zero timeout still performs one
    /// non-blocking poll.
    ///
    /// #### Parameters
    /// - `timeout`: Upper bound on the wait (`None` = wait forever).
    ///
    /// ### 中文
    /// 等待未完成的翻转（若有）结束。
    ///
    /// 通过 router 驱动设备读取；若另一个线程已持有读锁，则改为等待本 surface 的完成通道。
    /// 零超时仍会执行一次非阻塞 poll。
    ///
    /// #### 参数
    /// - `timeout`：等待上限（`None` = 无限等待）。
    pub fn wait_for_outstanding_flip(&mut self, timeout: Option<Duration>) -> Result<FlipWait> {
        self.drain_completions();
        if self.outstanding.is_none() {
            return Ok(FlipWait::Ready);
        }

        // A deadline past the end of `Instant` is the same as no deadline.
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let mut polled = false;
        loop {
            let slice = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() && polled {
                        return Ok(FlipWait::TimedOut);
                    }
                    remaining.min(POLL_SLICE)
                }
                None => POLL_SLICE,
            };

            if self.router.try_dispatch(Some(slice))?.is_none() {
                match self.completions.recv_timeout(slice) {
                    Ok(completion) => self.accept(completion),
                    Err(channel::RecvTimeoutError::Timeout) => {}
                    Err(channel::RecvTimeoutError::Disconnected) => {
                        log::warn!("flip completion channel of surface {} closed", self.surface);
                        return Ok(FlipWait::TimedOut);
                    }
                }
            }
            polled = true;

            self.drain_completions();
            if self.outstanding.is_none() {
                return Ok(FlipWait::Ready);
            }
        }
    }

    /// ### English
    /// Queues a page flip of `fb_id` on this surface's CRTC.
    ///
    /// Rejected with `FlipOutstanding` while a previous flip is pending. On success the returned
    /// token stays outstanding until its completion event arrives.
    ///
    /// ### 中文
    /// 在本 surface 的 CRTC 上排队 `fb_id` 的 page flip。
    ///
    /// 若上一次翻转仍未完成则以 `FlipOutstanding` 拒绝。成功时返回的令牌将保持未完成，
    /// 直到其完成事件到达。
    pub fn submit_flip(&mut self, fb_id: u32) -> Result<FlipToken> {
        if let Some(token) = self.outstanding {
            return Err(PresentError::FlipOutstanding {
                token: token.pack(),
            });
        }

        let token = FlipToken::new(self.surface, self.next_serial);
        self.next_serial = self.next_serial.wrapping_add(1);

        self.outstanding = Some(token);
        if let Err(source) = self.device.page_flip(self.crtc_id, fb_id, token.pack()) {
            self.outstanding = None;
            log::warn!("could not queue pageflip to framebuffer {fb_id}: {source}");
            return Err(PresentError::FlipSubmitFailed { fb_id, source });
        }

        log::trace!(
            "queued flip {} of surface {} to framebuffer {fb_id}",
            token.serial,
            self.surface
        );
        Ok(token)
    }

    /// ### English
    /// Forgets the outstanding flip and drops any completions already queued for this surface.
    /// A completion that arrives later carries a stale serial and is ignored.
    ///
    /// ### 中文
    /// 放弃未完成的翻转并丢弃已排队的完成事件。之后到达的完成事件序号已过期，会被忽略。
    pub fn abandon(&mut self) {
        if let Some(token) = self.outstanding.take() {
            log::debug!(
                "abandoning flip {} of surface {}",
                token.serial,
                self.surface
            );
        }
        while self.completions.try_recv().is_ok() {}
    }

    fn drain_completions(&mut self) {
        while let Ok(completion) = self.completions.try_recv() {
            self.accept(completion);
        }
    }

    fn accept(&mut self, completion: FlipCompletion) {
        if self.outstanding == Some(completion.token) {
            self.outstanding = None;
            self.last_completion = Some(completion);
            log::trace!(
                "flip {} of surface {} completed (sequence {})",
                completion.token.serial,
                self.surface,
                completion.sequence
            );
        } else {
            log::trace!(
                "ignoring stale flip completion {} of surface {}",
                completion.token.serial,
                self.surface
            );
        }
    }
}

impl Drop for FlipSynchronizer {
    fn drop(&mut self) {
        self.router.unregister(self.surface);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::device::fake::FakeDevice;

    fn setup() -> (Arc<FakeDevice>, Arc<FlipEventRouter>) {
        let fake = Arc::new(FakeDevice::new());
        let device: Arc<dyn KmsDevice> = fake.clone();
        (fake, Arc::new(FlipEventRouter::new(device)))
    }

    fn framebuffer(fake: &FakeDevice) -> u32 {
        let dumb = fake.create_dumb(4, 4, 32).unwrap();
        fake.add_framebuffer(4, 4, 24, 32, dumb.pitch, dumb.handle)
            .unwrap()
    }

    #[test]
    fn wait_without_outstanding_flip_is_ready() {
        let (_fake, router) = setup();
        let mut sync = FlipSynchronizer::new(router, 1);
        assert_eq!(
            sync.wait_for_outstanding_flip(Some(Duration::ZERO)).unwrap(),
            FlipWait::Ready
        );
    }

    #[test]
    fn second_submit_is_rejected_until_completion() {
        let (fake, router) = setup();
        let fb = framebuffer(&fake);
        let mut sync = FlipSynchronizer::new(router, 1);

        let token = sync.submit_flip(fb).unwrap();
        let err = sync.submit_flip(fb).unwrap_err();
        assert!(matches!(err, PresentError::FlipOutstanding { token: t } if t == token.pack()));
        assert_eq!(fake.flipped_fbs(), vec![fb]);

        assert_eq!(
            sync.wait_for_outstanding_flip(Some(Duration::ZERO)).unwrap(),
            FlipWait::TimedOut
        );
        assert!(sync.is_flip_outstanding());

        assert!(fake.complete_next_flip());
        assert_eq!(
            sync.wait_for_outstanding_flip(Some(Duration::ZERO)).unwrap(),
            FlipWait::Ready
        );
        assert_eq!(sync.last_completion().unwrap().token, token);
        sync.submit_flip(fb).unwrap();
    }

    #[test]
    fn failed_submit_clears_the_token() {
        let (fake, router) = setup();
        let fb = framebuffer(&fake);
        let mut sync = FlipSynchronizer::new(router, 1);

        fake.fail_page_flip(true);
        let err = sync.submit_flip(fb).unwrap_err();
        assert!(matches!(err, PresentError::FlipSubmitFailed { .. }));
        assert_eq!(err.raw_os_error(), Some(libc::EBUSY));
        assert!(!sync.is_flip_outstanding());

        fake.fail_page_flip(false);
        sync.submit_flip(fb).unwrap();
    }

    #[test]
    fn stale_completion_does_not_clear_a_newer_flip() {
        let (fake, router) = setup();
        let fb = framebuffer(&fake);
        let mut sync = FlipSynchronizer::new(router, 1);

        let abandoned = sync.submit_flip(fb).unwrap();
        sync.abandon();
        let current = sync.submit_flip(fb).unwrap();
        assert_ne!(abandoned, current);

        fake.inject_event(abandoned.pack());
        assert_eq!(
            sync.wait_for_outstanding_flip(Some(Duration::ZERO)).unwrap(),
            FlipWait::TimedOut
        );
        assert_eq!(sync.outstanding(), Some(current));
    }

    #[test]
    fn completions_are_routed_per_surface() {
        let (fake, router) = setup();
        let fb = framebuffer(&fake);
        let mut a = FlipSynchronizer::new(Arc::clone(&router), 1);
        let mut b = FlipSynchronizer::new(Arc::clone(&router), 2);

        a.submit_flip(fb).unwrap();
        let token_b = b.submit_flip(fb).unwrap();

        fake.inject_event(token_b.pack());
        assert_eq!(
            a.wait_for_outstanding_flip(Some(Duration::ZERO)).unwrap(),
            FlipWait::TimedOut
        );
        assert_eq!(
            b.wait_for_outstanding_flip(Some(Duration::ZERO)).unwrap(),
            FlipWait::Ready
        );
        assert!(a.is_flip_outstanding());
    }

    #[test]
    fn drop_unregisters_from_the_router() {
        let (fake, router) = setup();
        let fb = framebuffer(&fake);
        let mut sync = FlipSynchronizer::new(Arc::clone(&router), 1);
        let token = sync.submit_flip(fb).unwrap();
        drop(sync);

        fake.inject_event(token.pack());
        assert_eq!(router.dispatch(Some(Duration::ZERO)).unwrap(), 0);
    }

    #[test]
    fn unbounded_timeout_does_not_overflow() {
        let (fake, router) = setup();
        let fb = framebuffer(&fake);
        let mut sync = FlipSynchronizer::new(router, 1);

        let token = sync.submit_flip(fb).unwrap();
        assert!(fake.complete_next_flip());
        assert_eq!(
            sync.wait_for_outstanding_flip(Some(Duration::MAX)).unwrap(),
            FlipWait::Ready
        );
        assert_eq!(sync.last_completion().unwrap().token, token);
    }

    #[test]
    fn bounded_wait_expires_and_keeps_the_flip_outstanding() {
        let (fake, router) = setup();
        let fb = framebuffer(&fake);
        let mut sync = FlipSynchronizer::new(router, 1);
        let token = sync.submit_flip(fb).unwrap();

        let timeout = Duration::from_millis(40);
        let started = Instant::now();
        assert_eq!(
            sync.wait_for_outstanding_flip(Some(timeout)).unwrap(),
            FlipWait::TimedOut
        );
        assert!(started.elapsed() >= timeout);
        assert_eq!(sync.outstanding(), Some(token));
    }

    #[test]
    fn waits_on_its_channel_while_another_thread_pumps() {
        let (fake, router) = setup();
        let fb = framebuffer(&fake);
        let mut sync = FlipSynchronizer::new(Arc::clone(&router), 1);
        let token = sync.submit_flip(fb).unwrap();

        let delay = Duration::from_millis(25);
        let reader_held = std::sync::Barrier::new(2);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                let reader = router.lock_reader();
                reader_held.wait();
                std::thread::sleep(delay);
                assert!(fake.complete_next_flip());
                assert_eq!(router.route_locked(&reader).unwrap(), 1);
            });

            reader_held.wait();
            let started = Instant::now();
            assert_eq!(
                sync.wait_for_outstanding_flip(Some(Duration::from_secs(5)))
                    .unwrap(),
                FlipWait::Ready
            );
            assert!(started.elapsed() < Duration::from_secs(5));
        });

        assert_eq!(sync.last_completion().unwrap().token, token);
        assert_eq!(router.dispatch(Some(Duration::ZERO)).unwrap(), 0);
    }
}
