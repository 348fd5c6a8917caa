//! ### English
//! Configuration values handed to a surface at construction time.
//!
//! `DisplayConfig` is resolved by the windowing layer (connector enumeration and mode selection
//! happen there); `PresentConfig` tunes the buffer ring and flip waits.
//!
//! ### 中文
//! 构造 surface 时传入的配置值。
//!
//! `DisplayConfig` 由窗口层解析（connector 枚举与模式选择在那里完成）；
//! `PresentConfig` 用于调整缓冲环与翻转等待。

use std::time::Duration;

use dpi::PhysicalSize;

use super::flags::{
    KMS_PRESENT_SURFACE_FLAG_NONBLOCKING_PRESENT, KMS_PRESENT_SURFACE_FLAG_TRIPLE_BUFFER,
};

/// ### English
/// Smallest ring that keeps the scanned-out buffer away from software.
///
/// ### 中文
/// 能让正在扫描输出的缓冲区与软件隔离的最小环长度。
pub const MIN_RING_LEN: usize = 2;

/// Default ring length (double buffering).
pub const DEFAULT_RING_LEN: usize = 2;

/// ### English
/// How long `release` waits for a queued flip before tearing the ring down anyway.
///
/// ### 中文
/// `release` 在强制拆除缓冲环之前等待已排队翻转的时长。
pub const DEFAULT_RELEASE_FLIP_TIMEOUT: Duration = Duration::from_millis(100);

/// ### English
/// Display timing descriptor, mirroring the kernel's `drm_mode_modeinfo`.
///
/// ### 中文
/// 显示时序描述，对应内核的 `drm_mode_modeinfo`。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModeInfo {
    /// Pixel clock in kHz.
    pub clock: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub vscan: u16,
    pub vrefresh: u32,
    pub flags: u32,
    pub mode_type: u32,
    /// ### English
    /// Mode name (e.g. `1920x1080`); truncated to 31 bytes when handed to the kernel.
    ///
    /// ### 中文
    /// 模式名称（如 `1920x1080`）；传给内核时截断为 31 字节。
    pub name: String,
}

impl ModeInfo {
    /// ### English
    /// Active area of the mode in pixels.
    ///
    /// ### 中文
    /// 该模式的有效显示区域（像素）。
    pub fn size(&self) -> PhysicalSize<u32> {
        PhysicalSize::new(u32::from(self.hdisplay), u32::from(self.vdisplay))
    }
}

/// ### English
/// Fixed output binding of a surface: which CRTC drives which connector with which mode.
///
/// ### 中文
/// surface 的固定输出绑定：哪个 CRTC 以何种模式驱动哪个 connector。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayConfig {
    pub crtc_id: u32,
    pub connector_id: u32,
    pub mode: ModeInfo,
}

/// ### English
/// Tunables for one surface's buffer ring and flip synchronization.
///
/// ### 中文
/// 单个 surface 的缓冲环与翻转同步参数。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresentConfig {
    /// ### English
    /// Number of dumb buffers in the ring (at least `MIN_RING_LEN`).
    ///
    /// ### 中文
    /// 环中 dumb buffer 的数量（至少为 `MIN_RING_LEN`）。
    pub ring_len: usize,
    /// ### English
    /// How long `present` waits for the previous flip. `None` waits forever; on expiry the frame
    /// is skipped.
    ///
    /// ### 中文
    /// `present` 等待上一次翻转的时长。`None` 表示无限等待；超时则跳过该帧。
    pub flip_timeout: Option<Duration>,
    /// ### English
    /// Bounded wait used by `release` so shutdown never hangs on a lost flip event.
    ///
    /// ### 中文
    /// `release` 使用的有界等待，避免关闭流程因丢失翻转事件而挂起。
    pub release_flip_timeout: Duration,
}

impl Default for PresentConfig {
    fn default() -> Self {
        Self {
            ring_len: DEFAULT_RING_LEN,
            flip_timeout: None,
            release_flip_timeout: DEFAULT_RELEASE_FLIP_TIMEOUT,
        }
    }
}

impl PresentConfig {
    /// ### English
    /// Builds a config from `KMS_PRESENT_SURFACE_FLAG_*` bits. Unknown bits are ignored.
    ///
    /// #### Parameters
    /// - `flags`: Bitmask passed through the C ABI.
    ///
    /// ### 中文
    /// 根据 `KMS_PRESENT_SURFACE_FLAG_*` 位构建配置；未知位会被忽略。
    ///
    /// #### 参数
    /// - `flags`：通过 C ABI 传入的位掩码。
    pub fn from_flags(flags: u32) -> Self {
        let mut config = Self::default();
        if flags & KMS_PRESENT_SURFACE_FLAG_TRIPLE_BUFFER != 0 {
            config.ring_len = 3;
        }
        if flags & KMS_PRESENT_SURFACE_FLAG_NONBLOCKING_PRESENT != 0 {
            config.flip_timeout = Some(Duration::ZERO);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_double_buffered_and_blocking() {
        let config = PresentConfig::default();
        assert_eq!(config.ring_len, 2);
        assert_eq!(config.flip_timeout, None);
    }

    #[test]
    fn flags_select_triple_buffer_and_nonblocking_present() {
        let config = PresentConfig::from_flags(
            KMS_PRESENT_SURFACE_FLAG_TRIPLE_BUFFER | KMS_PRESENT_SURFACE_FLAG_NONBLOCKING_PRESENT,
        );
        assert_eq!(config.ring_len, 3);
        assert_eq!(config.flip_timeout, Some(Duration::ZERO));

        assert_eq!(PresentConfig::from_flags(1 << 31), PresentConfig::default());
    }

    #[test]
    fn mode_size_is_active_area() {
        let mode = ModeInfo {
            hdisplay: 1920,
            vdisplay: 1080,
            htotal: 2200,
            vtotal: 1125,
            ..ModeInfo::default()
        };
        assert_eq!(mode.size(), PhysicalSize::new(1920, 1080));
    }
}
