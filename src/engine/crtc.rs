//! ### English
//! One-time binding of the display controller (CRTC) to a surface's buffer ring.
//!
//! ### 中文
//! 显示控制器（CRTC）与 surface 缓冲环的一次性绑定。

use std::sync::Arc;

use dpi::PhysicalSize;

use super::config::DisplayConfig;
use super::device::KmsDevice;
use super::error::{PresentError, Result};
use super::format::PixelFormat;
use super::swap_chain::SwapChain;

/// ### English
/// Binding state. The ring only exists while bound, so "bound" always implies a fully
/// populated ring.
///
/// ### 中文
/// 绑定状态。缓冲环只在已绑定时存在，因此 “已绑定” 总是意味着缓冲环已完整构建。
#[derive(Debug, Default)]
pub enum CrtcState {
    #[default]
    Unbound,
    Bound(SwapChain),
}

/// ### English
/// Drives the Unbound → Bound transition for one surface.
///
/// ### 中文
/// 驱动单个 surface 的 Unbound → Bound 状态转换。
pub struct CrtcBinder {
    device: Arc<dyn KmsDevice>,
    display: DisplayConfig,
    state: CrtcState,
}

impl CrtcBinder {
    pub fn new(device: Arc<dyn KmsDevice>, display: DisplayConfig) -> Self {
        Self {
            device,
            display,
            state: CrtcState::Unbound,
        }
    }

    /// ### English
    /// Binds the CRTC if it is not bound yet; a no-op when already bound.
    ///
    /// Builds the ring, scans out slot 0 with the configured mode on the configured connector,
    /// then advances `front` so the buffer now on screen is never handed back as writable. Any
    /// failure drops the whole ring and leaves the binder unbound.
    ///
    /// #### Parameters
    /// - `size`: Per-buffer dimensions (the surface size).
    /// - `format`: Pixel format.
    /// - `ring_len`: Number of buffers.
    ///
    /// ### 中文
    /// 若 CRTC 尚未绑定则进行绑定；已绑定时为空操作。
    ///
    /// 构建缓冲环，以配置的模式在配置的 connector 上扫描输出槽位 0，然后推进 `front`，
    /// 保证当前显示中的缓冲区永远不会作为可写缓冲区交还给软件。任何失败都会 drop 整个缓冲环并保持未绑定。
    ///
    /// #### 参数
    /// - `size`：每个缓冲区的尺寸（即 surface 尺寸）。
    /// - `format`：像素格式。
    /// - `ring_len`：缓冲区数量。
    pub fn ensure_bound(
        &mut self,
        size: PhysicalSize<u32>,
        format: PixelFormat,
        ring_len: usize,
    ) -> Result<()> {
        if self.is_bound() {
            return Ok(());
        }

        let mut chain = SwapChain::build(&self.device, size, format, ring_len)?;

        let crtc_id = self.display.crtc_id;
        let fb_id = chain.current_front().fb_id();
        self.device
            .set_crtc(
                crtc_id,
                fb_id,
                self.display.connector_id,
                &self.display.mode,
            )
            .map_err(|source| {
                log::error!("could not set up CRTC {crtc_id} with framebuffer {fb_id}: {source}");
                PresentError::BindFailed { crtc_id, source }
            })?;

        chain.advance();
        log::info!(
            "CRTC {crtc_id} bound to connector {} ({}x{}, {} buffers)",
            self.display.connector_id,
            size.width,
            size.height,
            chain.len()
        );
        self.state = CrtcState::Bound(chain);
        Ok(())
    }

    /// ### English
    /// Drops the ring (releasing every buffer) and returns to Unbound. Returns whether a ring
    /// was torn down.
    ///
    /// ### 中文
    /// drop 缓冲环（释放所有缓冲区）并回到 Unbound。返回是否拆除了缓冲环。
    pub fn unbind(&mut self) -> bool {
        match std::mem::take(&mut self.state) {
            CrtcState::Bound(chain) => {
                log::info!("CRTC {} unbound", self.display.crtc_id);
                drop(chain);
                true
            }
            CrtcState::Unbound => false,
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.state, CrtcState::Bound(_))
    }

    pub fn swap_chain(&self) -> Option<&SwapChain> {
        match &self.state {
            CrtcState::Bound(chain) => Some(chain),
            CrtcState::Unbound => None,
        }
    }

    pub fn swap_chain_mut(&mut self) -> Option<&mut SwapChain> {
        match &mut self.state {
            CrtcState::Bound(chain) => Some(chain),
            CrtcState::Unbound => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::ModeInfo;
    use crate::engine::device::fake::FakeDevice;

    fn binder() -> (Arc<FakeDevice>, CrtcBinder) {
        let fake = Arc::new(FakeDevice::new());
        let device: Arc<dyn KmsDevice> = fake.clone();
        let display = DisplayConfig {
            crtc_id: 41,
            connector_id: 77,
            mode: ModeInfo {
                hdisplay: 64,
                vdisplay: 48,
                ..ModeInfo::default()
            },
        };
        (fake, CrtcBinder::new(device, display))
    }

    fn size() -> PhysicalSize<u32> {
        PhysicalSize::new(64, 48)
    }

    #[test]
    fn binding_scans_out_slot_zero_and_advances() {
        let (fake, mut binder) = binder();
        binder.ensure_bound(size(), PixelFormat::Xrgb8888, 2).unwrap();

        let chain = binder.swap_chain().unwrap();
        assert_eq!(chain.front_index(), 1);
        assert_eq!(fake.crtc_fb(), Some(chain.buffers()[0].fb_id()));
    }

    #[test]
    fn second_ensure_bound_is_a_no_op() {
        let (fake, mut binder) = binder();
        binder.ensure_bound(size(), PixelFormat::Xrgb8888, 2).unwrap();
        binder.ensure_bound(size(), PixelFormat::Xrgb8888, 2).unwrap();

        assert_eq!(fake.create_dumb_calls(), 2);
        assert_eq!(fake.set_crtc_calls(), 1);
        assert_eq!(binder.swap_chain().unwrap().front_index(), 1);
    }

    #[test]
    fn set_crtc_failure_destroys_the_ring() {
        let (fake, mut binder) = binder();
        fake.fail_set_crtc(true);

        let err = binder
            .ensure_bound(size(), PixelFormat::Xrgb8888, 3)
            .unwrap_err();
        assert!(matches!(err, PresentError::BindFailed { crtc_id: 41, .. }));
        assert!(!binder.is_bound());
        assert_eq!(fake.live_dumbs(), 0);
        assert_eq!(fake.live_framebuffers(), 0);
        assert_eq!(fake.live_mappings(), 0);

        fake.fail_set_crtc(false);
        binder.ensure_bound(size(), PixelFormat::Xrgb8888, 3).unwrap();
        assert!(binder.is_bound());
    }

    #[test]
    fn ring_failure_propagates_and_stays_unbound() {
        let (fake, mut binder) = binder();
        fake.fail_create_dumb_at(2);

        let err = binder
            .ensure_bound(size(), PixelFormat::Xrgb8888, 2)
            .unwrap_err();
        assert!(matches!(err, PresentError::AllocationFailed { .. }));
        assert!(!binder.is_bound());
        assert_eq!(fake.set_crtc_calls(), 0);
        assert_eq!(fake.live_dumbs(), 0);
    }

    #[test]
    fn unbind_is_idempotent() {
        let (fake, mut binder) = binder();
        binder.ensure_bound(size(), PixelFormat::Xrgb8888, 2).unwrap();

        assert!(binder.unbind());
        assert!(!binder.unbind());
        assert!(!binder.is_bound());
        assert_eq!(fake.live_dumbs(), 0);
    }
}
