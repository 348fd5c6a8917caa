//! ### English
//! Per-window presentation surface: the acquire / present / release protocol on top of a
//! CRTC-bound dumb-buffer ring.
//!
//! The ring is built lazily on the first acquire or present. Software draws into the buffer
//! returned by `acquire_writable_buffer`, then `present` flips it to the screen and rotates the
//! ring. The buffer currently scanned out is never the one handed back as writable while the
//! previous flip is still pending on a ring of three or more.
//!
//! ### 中文
//! 每个窗口的呈现 surface：建立在已绑定 CRTC 的 dumb buffer 环之上的
//! 获取 / 呈现 / 释放协议。
//!
//! 缓冲环在首次获取或呈现时惰性构建。软件向 `acquire_writable_buffer` 返回的缓冲区绘制，
//! 随后 `present` 将其翻转到屏幕并轮转缓冲环。

use std::ptr::NonNull;
use std::sync::Arc;

use dpi::{PhysicalPosition, PhysicalSize};

use super::config::{DisplayConfig, MIN_RING_LEN, PresentConfig};
use super::crtc::CrtcBinder;
use super::error::{PresentError, Result};
use super::flip::{FlipEventRouter, FlipSynchronizer, FlipToken, FlipWait};
use super::format::PixelFormat;

/// ### English
/// Region of the buffer that changed since the last present.
///
/// ### 中文
/// 自上次呈现以来缓冲区中发生变化的区域。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DamageRect {
    pub origin: PhysicalPosition<i32>,
    pub size: PhysicalSize<u32>,
}

/// ### English
/// The writable front buffer as seen by software rendering.
///
/// `pixels` stays valid until the surface is presented, released or dropped.
///
/// ### 中文
/// 软件渲染看到的可写 front 缓冲区。
///
/// `pixels` 在 surface 被呈现、释放或 drop 之前保持有效。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WritableBuffer {
    pub format: PixelFormat,
    pub pixels: NonNull<u8>,
    /// Row pitch in bytes.
    pub stride: u32,
    /// Mapped length in bytes.
    pub len: usize,
    /// Ring index of this buffer.
    pub slot: usize,
    pub size: PhysicalSize<u32>,
}

/// ### English
/// Outcome of a successful `present`.
///
/// ### 中文
/// 一次成功 `present` 的结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    /// ### English
    /// The flip was queued; `slot` was submitted and the ring advanced.
    ///
    /// ### 中文
    /// 翻转已排队；`slot` 已提交且缓冲环已前进。
    Queued {
        slot: usize,
        fb_id: u32,
        token: FlipToken,
    },
    /// ### English
    /// The previous flip did not complete within the timeout; nothing changed.
    ///
    /// ### 中文
    /// 上一次翻转未在超时内完成；状态未改变。
    Skipped,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PresentStats {
    pub presented: u64,
    pub skipped: u64,
}

/// ### English
/// Presentation state of one window on one CRTC.
///
/// ### 中文
/// 单个窗口在单个 CRTC 上的呈现状态。
pub struct KmsSurface {
    size: PhysicalSize<u32>,
    format: PixelFormat,
    config: PresentConfig,
    binder: CrtcBinder,
    flips: FlipSynchronizer,
    stats: PresentStats,
}

impl KmsSurface {
    /// ### English
    /// Creates an unbound surface. No kernel object is created until the first acquire/present.
    ///
    /// #### Parameters
    /// - `router`: Event router of the device the surface presents on.
    /// - `display`: CRTC, connector and mode to drive.
    /// - `size`: Buffer dimensions in pixels.
    /// - `config`: Ring length and flip timeouts.
    ///
    /// ### 中文
    /// 创建一个未绑定的 surface。在首次获取/呈现之前不会创建任何内核对象。
    ///
    /// #### 参数
    /// - `router`：surface 所在设备的事件路由器。
    /// - `display`：要驱动的 CRTC、connector 与模式。
    /// - `size`：缓冲区尺寸（像素）。
    /// - `config`：环长度与翻转超时。
    pub fn new(
        router: Arc<FlipEventRouter>,
        display: DisplayConfig,
        size: PhysicalSize<u32>,
        config: PresentConfig,
    ) -> Result<Self> {
        if size.width == 0 || size.height == 0 {
            return Err(PresentError::InvalidSize {
                width: size.width,
                height: size.height,
            });
        }
        if config.ring_len < MIN_RING_LEN {
            return Err(PresentError::InvalidRingLength {
                len: config.ring_len,
                min: MIN_RING_LEN,
            });
        }

        let device = Arc::clone(router.device());
        let flips = FlipSynchronizer::new(router, display.crtc_id);
        Ok(Self {
            size,
            format: PixelFormat::default(),
            config,
            binder: CrtcBinder::new(device, display),
            flips,
            stats: PresentStats::default(),
        })
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn config(&self) -> &PresentConfig {
        &self.config
    }

    pub fn is_bound(&self) -> bool {
        self.binder.is_bound()
    }

    pub fn is_flip_outstanding(&self) -> bool {
        self.flips.is_flip_outstanding()
    }

    pub fn stats(&self) -> PresentStats {
        self.stats
    }

    /// ### English
    /// Ring index of the buffer the next present will submit, or `None` while unbound.
    ///
    /// ### 中文
    /// 下一次 present 将提交的缓冲区在环中的索引；未绑定时为 `None`。
    pub fn front_index(&self) -> Option<usize> {
        self.binder.swap_chain().map(|chain| chain.front_index())
    }

    fn ensure_bound(&mut self) -> Result<()> {
        self.binder
            .ensure_bound(self.size, self.format, self.config.ring_len)
    }

    /// ### English
    /// Binds the display if needed and returns the current front buffer for drawing.
    /// Never waits for a flip.
    ///
    /// ### 中文
    /// 必要时绑定显示，并返回当前用于绘制的 front 缓冲区。从不等待翻转。
    pub fn acquire_writable_buffer(&mut self) -> Result<WritableBuffer> {
        self.ensure_bound()?;

        let chain = self.binder.swap_chain().ok_or(PresentError::NotBound)?;
        let slot = chain.front_index();
        let buffer = chain.current_front();
        let pixels = buffer.pixels_ptr().ok_or(PresentError::NotBound)?;
        Ok(WritableBuffer {
            format: buffer.format(),
            pixels,
            stride: buffer.stride(),
            len: buffer.size() as usize,
            slot,
            size: buffer.dimensions(),
        })
    }

    /// ### English
    /// Binds the display if needed and returns the current front buffer's bytes.
    ///
    /// ### 中文
    /// 必要时绑定显示，并返回当前 front 缓冲区的字节。
    pub fn front_pixels_mut(&mut self) -> Result<&mut [u8]> {
        self.ensure_bound()?;
        self.binder
            .swap_chain_mut()
            .and_then(|chain| chain.current_front_mut().bytes_mut())
            .ok_or(PresentError::NotBound)
    }

    /// ### English
    /// Flips the current front buffer to the screen.
    ///
    /// Waits for the previous flip up to `PresentConfig::flip_timeout`; on expiry the frame is
    /// skipped and the front index is unchanged. The whole buffer is always flipped; `damage`
    /// is only traced.
    ///
    /// #### Parameters
    /// - `damage`: Regions drawn since the last present (may be empty).
    ///
    /// ### 中文
    /// 将当前 front 缓冲区翻转到屏幕。
    ///
    /// 最多等待上一次翻转 `PresentConfig::flip_timeout`；超时则跳过该帧，front 索引不变。
    /// 总是翻转整个缓冲区；`damage` 仅用于 trace 日志。
    ///
    /// #### 参数
    /// - `damage`：自上次呈现以来绘制的区域（可为空）。
    pub fn present(&mut self, damage: &[DamageRect]) -> Result<PresentOutcome> {
        self.ensure_bound()?;

        for rect in damage {
            log::trace!(
                "damage {}x{} at ({}, {})",
                rect.size.width,
                rect.size.height,
                rect.origin.x,
                rect.origin.y
            );
        }

        if self.flips.wait_for_outstanding_flip(self.config.flip_timeout)? == FlipWait::TimedOut {
            self.stats.skipped += 1;
            log::debug!(
                "previous flip of surface {} still pending; frame skipped",
                self.flips.surface_id()
            );
            return Ok(PresentOutcome::Skipped);
        }

        let chain = self.binder.swap_chain_mut().ok_or(PresentError::NotBound)?;
        let slot = chain.front_index();
        let fb_id = chain.current_front().fb_id();
        let token = self.flips.submit_flip(fb_id)?;
        chain.advance();

        self.stats.presented += 1;
        Ok(PresentOutcome::Queued { slot, fb_id, token })
    }

    /// ### English
    /// Tears the ring down and returns the surface to Unbound.
    ///
    /// An outstanding flip is waited for at most `release_flip_timeout`, then abandoned.
    /// Idempotent; a later acquire/present binds again.
    ///
    /// ### 中文
    /// 拆除缓冲环并让 surface 回到未绑定状态。
    ///
    /// 未完成的翻转最多等待 `release_flip_timeout`，随后被放弃。幂等；之后的获取/呈现会重新绑定。
    pub fn release(&mut self) {
        if self.flips.is_flip_outstanding() {
            match self
                .flips
                .wait_for_outstanding_flip(Some(self.config.release_flip_timeout))
            {
                Ok(FlipWait::Ready) => {}
                Ok(FlipWait::TimedOut) => log::warn!(
                    "flip of surface {} did not complete before release",
                    self.flips.surface_id()
                ),
                Err(err) => log::warn!(
                    "could not wait for flip of surface {} before release: {err}",
                    self.flips.surface_id()
                ),
            }
        }
        self.flips.abandon();
        self.binder.unbind();
    }
}

impl Drop for KmsSurface {
    fn drop(&mut self) {
        self.release();
    }
}
