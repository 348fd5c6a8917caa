//! ### English
//! Event pump that routes page-flip completions to the surface that queued them.
//!
//! Each kernel event is read from the device exactly once (by whichever thread holds the read
//! lock) and forwarded to exactly one surface channel, so exactly one observer ever clears a
//! given outstanding flip.
//!
//! ### 中文
//! 将翻转完成事件路由到排队它的 surface 的事件泵。
//!
//! 每个内核事件只会被（持有读锁的线程）从设备读取一次，并只转发到一个 surface 通道，
//! 因此每个未完成的翻转只会被唯一一个观察者清除。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use std::time::Duration;

use crossbeam_channel as channel;

use super::FlipCompletion;
use super::token::FlipToken;
use crate::engine::device::KmsDevice;
use crate::engine::error::{PresentError, Result};

/// ### English
/// Routes `DRM_EVENT_FLIP_COMPLETE` events from one device to per-surface channels.
///
/// ### 中文
/// 将单个设备的 `DRM_EVENT_FLIP_COMPLETE` 事件路由到各 surface 的通道。
pub struct FlipEventRouter {
    device: Arc<dyn KmsDevice>,
    /// ### English
    /// Next surface id to hand out (0 is reserved).
    ///
    /// ### 中文
    /// 下一个分配的 surface id（0 保留不用）。
    next_surface: AtomicU32,
    routes: Mutex<HashMap<u32, channel::Sender<FlipCompletion>>>,
    /// ### English
    /// Serializes device reads; held for the whole poll + read.
    ///
    /// ### 中文
    /// 串行化设备读取；在整个 poll + read 期间持有。
    read_lock: Mutex<()>,
}

impl FlipEventRouter {
    pub fn new(device: Arc<dyn KmsDevice>) -> Self {
        Self {
            device,
            next_surface: AtomicU32::new(1),
            routes: Mutex::new(HashMap::new()),
            read_lock: Mutex::new(()),
        }
    }

    pub fn device(&self) -> &Arc<dyn KmsDevice> {
        &self.device
    }

    /// ### English
    /// Allocates a surface id and the channel its completions will arrive on.
    ///
    /// ### 中文
    /// 分配一个 surface id 以及接收其完成事件的通道。
    pub fn register(&self) -> (u32, channel::Receiver<FlipCompletion>) {
        let surface = self.next_surface.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = channel::unbounded();
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(surface, tx);
        (surface, rx)
    }

    /// ### English
    /// Stops routing events to `surface`; later completions for it are dropped.
    ///
    /// ### 中文
    /// 停止向 `surface` 路由事件；之后该 surface 的完成事件会被丢弃。
    pub fn unregister(&self, surface: u32) {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&surface);
    }

    /// ### English
    /// Waits up to `timeout` (`None` = forever) for device events and routes them.
    ///
    /// Returns the number of completions delivered to a registered surface.
    ///
    /// ### 中文
    /// 最多等待 `timeout`（`None` = 无限）读取设备事件并路由。
    ///
    /// 返回投递给已注册 surface 的完成事件数量。
    pub fn dispatch(&self, timeout: Option<Duration>) -> Result<usize> {
        let _reader = self.read_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_and_route(timeout)
    }

    /// ### English
    /// Like `dispatch`, but returns `Ok(None)` immediately if another thread is already reading
    /// the device (its completions will reach us through our channel instead).
    ///
    /// ### 中文
    /// 与 `dispatch` 相同，但若另一个线程正在读取设备则立即返回 `Ok(None)`
    ///（我们的完成事件会由它通过通道送达）。
    pub fn try_dispatch(&self, timeout: Option<Duration>) -> Result<Option<usize>> {
        let _reader = match self.read_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Ok(None),
        };
        self.read_and_route(timeout).map(Some)
    }

    /// Holds the read lock, as a pumping thread would while it waits on the device.
    #[cfg(test)]
    pub(super) fn lock_reader(&self) -> std::sync::MutexGuard<'_, ()> {
        self.read_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Routes pending events on behalf of the thread that owns `_reader`.
    #[cfg(test)]
    pub(super) fn route_locked(&self, _reader: &std::sync::MutexGuard<'_, ()>) -> Result<usize> {
        self.read_and_route(Some(Duration::ZERO))
    }

    fn read_and_route(&self, timeout: Option<Duration>) -> Result<usize> {
        let events = self
            .device
            .read_flip_events(timeout)
            .map_err(|source| PresentError::EventReadFailed { source })?;
        if events.is_empty() {
            return Ok(0);
        }

        let routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;
        for event in events {
            let token = FlipToken::unpack(event.user_data);
            let completion = FlipCompletion {
                token,
                crtc_id: event.crtc_id,
                sequence: event.sequence,
                timestamp: event.timestamp,
            };

            match routes.get(&token.surface) {
                Some(tx) if tx.send(completion).is_ok() => delivered += 1,
                _ => log::debug!(
                    "dropping flip completion for unknown surface {} (serial {})",
                    token.surface,
                    token.serial
                ),
            }
        }
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::device::fake::FakeDevice;

    fn router() -> (Arc<FakeDevice>, FlipEventRouter) {
        let fake = Arc::new(FakeDevice::new());
        let device: Arc<dyn KmsDevice> = fake.clone();
        (fake, FlipEventRouter::new(device))
    }

    #[test]
    fn completions_reach_only_their_surface() {
        let (fake, router) = router();
        let (a, rx_a) = router.register();
        let (b, rx_b) = router.register();
        assert_ne!(a, b);

        fake.inject_event(FlipToken::new(b, 7).pack());
        assert_eq!(router.dispatch(Some(Duration::ZERO)).unwrap(), 1);

        assert!(rx_a.try_recv().is_err());
        let completion = rx_b.try_recv().unwrap();
        assert_eq!(completion.token, FlipToken::new(b, 7));
    }

    #[test]
    fn unknown_surfaces_are_dropped() {
        let (fake, router) = router();
        let (surface, rx) = router.register();
        router.unregister(surface);

        fake.inject_event(FlipToken::new(surface, 1).pack());
        fake.inject_event(FlipToken::new(999, 1).pack());
        assert_eq!(router.dispatch(Some(Duration::ZERO)).unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn try_dispatch_backs_off_while_another_reader_is_active() {
        let (_fake, router) = router();
        let _held = router.read_lock.lock().unwrap();
        assert_eq!(router.try_dispatch(Some(Duration::ZERO)).unwrap(), None);
    }
}
