//! ### English
//! Kernel transport used by the presentation path.
//!
//! `KmsDevice` is the narrow set of mode-setting primitives the buffer ring needs. `DrmCard`
//! implements it with real DRM ioctls; tests use an in-memory fake.
//!
//! ### 中文
//! 呈现路径使用的内核传输层。
//!
//! `KmsDevice` 是缓冲环所需的最小 mode-setting 原语集合。`DrmCard` 用真实的 DRM ioctl 实现它；
//! 测试使用内存中的 fake 设备。
mod drm;
mod ioctl;

#[cfg(test)]
pub(crate) mod fake;

use std::io;
use std::ptr::NonNull;
use std::time::Duration;

use super::config::ModeInfo;

pub use drm::DrmCard;

/// ### English
/// Result of a successful `CREATE_DUMB` request.
///
/// ### 中文
/// `CREATE_DUMB` 请求成功后的结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DumbBuffer {
    /// ### English
    /// GEM handle used by every later operation on this memory.
    ///
    /// ### 中文
    /// 后续对该内存所有操作使用的 GEM 句柄。
    pub handle: u32,
    /// ### English
    /// Bytes per scanline, possibly larger than `width * 4`.
    ///
    /// ### 中文
    /// 每行扫描线字节数，可能大于 `width * 4`。
    pub pitch: u32,
    /// Total allocation size in bytes.
    pub size: u64,
}

/// ### English
/// One `DRM_EVENT_FLIP_COMPLETE` read from the device.
///
/// ### 中文
/// 从设备读取的一个 `DRM_EVENT_FLIP_COMPLETE` 事件。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlipEvent {
    /// ### English
    /// Opaque word passed to `page_flip`, returned untouched by the kernel.
    ///
    /// ### 中文
    /// 传给 `page_flip` 的不透明字，内核原样返回。
    pub user_data: u64,
    pub crtc_id: u32,
    /// Vertical blank counter at completion.
    pub sequence: u32,
    /// ### English
    /// Completion timestamp (`CLOCK_MONOTONIC`).
    ///
    /// ### 中文
    /// 完成时间戳（`CLOCK_MONOTONIC`）。
    pub timestamp: Duration,
}

/// ### English
/// Mode-setting primitives required by the dumb-buffer presentation path.
///
/// Implementations must be usable from several threads: the event pump may read events while
/// a surface thread queues flips.
///
/// ### 中文
/// dumb buffer 呈现路径所需的 mode-setting 原语。
///
/// 实现必须可被多个线程使用：事件泵可能在 surface 线程排队翻转的同时读取事件。
pub trait KmsDevice: Send + Sync {
    /// ### English
    /// Allocates kernel-backed pixel memory (`DRM_IOCTL_MODE_CREATE_DUMB`).
    ///
    /// ### 中文
    /// 分配内核管理的像素内存（`DRM_IOCTL_MODE_CREATE_DUMB`）。
    fn create_dumb(&self, width: u32, height: u32, bpp: u32) -> io::Result<DumbBuffer>;

    /// Returns dumb memory to the kernel (`DRM_IOCTL_MODE_DESTROY_DUMB`).
    fn destroy_dumb(&self, handle: u32) -> io::Result<()>;

    /// ### English
    /// Registers `handle` as a scanout framebuffer (`DRM_IOCTL_MODE_ADDFB`) and returns its id.
    ///
    /// ### 中文
    /// 将 `handle` 注册为可扫描输出的 framebuffer（`DRM_IOCTL_MODE_ADDFB`），并返回其 id。
    fn add_framebuffer(
        &self,
        width: u32,
        height: u32,
        depth: u32,
        bpp: u32,
        pitch: u32,
        handle: u32,
    ) -> io::Result<u32>;

    fn remove_framebuffer(&self, fb_id: u32) -> io::Result<()>;

    /// ### English
    /// Returns the fake offset to pass to `mmap` for `handle` (`DRM_IOCTL_MODE_MAP_DUMB`).
    ///
    /// ### 中文
    /// 返回 `handle` 用于 `mmap` 的伪偏移（`DRM_IOCTL_MODE_MAP_DUMB`）。
    fn map_dumb(&self, handle: u32) -> io::Result<u64>;

    /// ### English
    /// Maps `len` bytes at `offset` read/write and shared into the process.
    ///
    /// ### 中文
    /// 以读写、共享方式将 `offset` 处的 `len` 字节映射进进程。
    fn mmap(&self, offset: u64, len: usize) -> io::Result<NonNull<u8>>;

    /// ### English
    /// Unmaps a region returned by `mmap`.
    ///
    /// # Safety
    /// `ptr`/`len` must describe a live mapping obtained from this device, and no reference into
    /// it may outlive this call.
    ///
    /// ### 中文
    /// 解除 `mmap` 返回的映射。
    ///
    /// # Safety
    /// `ptr`/`len` 必须描述从该设备获得的有效映射，且任何指向它的引用都不得在调用后继续存在。
    unsafe fn munmap(&self, ptr: NonNull<u8>, len: usize) -> io::Result<()>;

    /// ### English
    /// Programs `crtc_id` to scan out `fb_id` on `connector_id` with `mode`
    /// (`DRM_IOCTL_MODE_SETCRTC`).
    ///
    /// ### 中文
    /// 设置 `crtc_id` 以 `mode` 在 `connector_id` 上扫描输出 `fb_id`（`DRM_IOCTL_MODE_SETCRTC`）。
    fn set_crtc(&self, crtc_id: u32, fb_id: u32, connector_id: u32, mode: &ModeInfo)
    -> io::Result<()>;

    /// ### English
    /// Queues a flip to `fb_id` at the next vertical blank and requests a completion event tagged
    /// with `user_data` (`DRM_IOCTL_MODE_PAGE_FLIP` + `DRM_MODE_PAGE_FLIP_EVENT`).
    ///
    /// ### 中文
    /// 排队在下一次垂直消隐时翻转到 `fb_id`，并请求带 `user_data` 标记的完成事件
    ///（`DRM_IOCTL_MODE_PAGE_FLIP` + `DRM_MODE_PAGE_FLIP_EVENT`）。
    fn page_flip(&self, crtc_id: u32, fb_id: u32, user_data: u64) -> io::Result<()>;

    /// ### English
    /// Waits up to `timeout` (`None` = forever) for the device to become readable, then returns
    /// every flip-completion event currently queued. An empty vector means nothing arrived.
    ///
    /// ### 中文
    /// 最多等待 `timeout`（`None` = 无限）直到设备可读，然后返回当前排队的所有翻转完成事件。
    /// 返回空 vector 表示没有事件到达。
    fn read_flip_events(&self, timeout: Option<Duration>) -> io::Result<Vec<FlipEvent>>;
}
