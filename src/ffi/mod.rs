//! ### English
//! C ABI surface for `kms_dumb_present`.
//!
//! All exported symbols are `extern "C"` functions; structs are `#[repr(C)]`.
//! Paths must be NUL-terminated UTF-8 (C string); they will be validated as UTF-8 and will be
//! truncated at the first NUL byte. Status-returning calls use `0`/positive for success and the
//! negative `KMS_PRESENT_STATUS_*` codes for failures.
//!
//! ### 中文
//! `kms_dumb_present` 的 C ABI 接口层。
//!
//! 所有导出符号均为 `extern "C"` 函数；结构体使用 `#[repr(C)]`。
//! 路径必须是以 NUL 结尾的 UTF-8（C 字符串）；Rust 会校验 UTF-8，且在遇到第一个 NUL 字节处截断。
//! 返回状态码的调用以 `0`/正数表示成功，以负数 `KMS_PRESENT_STATUS_*` 表示失败。
mod abi;
mod device;
mod surface;

use std::ffi::{CStr, c_char};
use std::path::PathBuf;
use std::sync::Arc;

use crate::engine::{FlipEventRouter, KmsSurface, ModeInfo, WritableBuffer};

#[repr(C)]
/// ### English
/// Opaque device handle: an open DRM card and the event router shared by its surfaces.
///
/// ### 中文
/// 不透明设备句柄：已打开的 DRM card 以及其所有 surface 共享的事件路由器。
pub struct KmsPresentDevice {
    router: Arc<FlipEventRouter>,
}

#[repr(C)]
/// ### English
/// Opaque surface handle (one window on one CRTC).
///
/// ### 中文
/// 不透明 surface 句柄（单个 CRTC 上的单个窗口）。
pub struct KmsPresentSurface {
    surface: KmsSurface,
}

#[repr(C)]
#[derive(Clone, Copy)]
/// ### English
/// Display mode as selected by the caller (layout of the kernel's `drm_mode_modeinfo`).
///
/// ### 中文
/// 调用方选择的显示模式（布局与内核 `drm_mode_modeinfo` 一致）。
pub struct KmsPresentMode {
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
    /// NUL-terminated mode name; bytes after the first NUL are ignored.
    ///
    /// ### 中文
    /// 以 NUL 结尾的模式名；第一个 NUL 之后的字节会被忽略。
    pub name: [c_char; 32],
}

#[repr(C)]
/// ### English
/// Writable front buffer returned by `kms_present_surface_acquire`.
///
/// ### 中文
/// `kms_present_surface_acquire` 返回的可写 front 缓冲区。
pub struct KmsPresentBuffer {
    /// ### English
    /// Base address of the mapping; valid until the next present/release/destroy.
    ///
    /// ### 中文
    /// 映射基地址；在下一次 present/release/destroy 之前有效。
    pub pixels: *mut u8,
    /// ### English
    /// Row pitch in bytes.
    ///
    /// ### 中文
    /// 行跨度（字节）。
    pub stride: u32,
    /// ### English
    /// Ring slot index of this buffer.
    ///
    /// ### 中文
    /// 该缓冲区在环中的槽位索引。
    pub slot: u32,
    /// ### English
    /// Mapped length in bytes.
    ///
    /// ### 中文
    /// 映射长度（字节）。
    pub size: u64,
    pub width: u32,
    pub height: u32,
    /// ### English
    /// DRM fourcc of the pixel format (`XR24`).
    ///
    /// ### 中文
    /// 像素格式的 DRM fourcc（`XR24`）。
    pub fourcc: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
/// ### English
/// Damage rectangle in pixels.
///
/// ### 中文
/// 损坏区域矩形（像素）。
pub struct KmsPresentRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// ### English
/// C ABI version for `kms_dumb_present`.
///
/// ### 中文
/// `kms_dumb_present` 的 C ABI 版本号。
const KMS_PRESENT_ABI_VERSION: u32 = 1;

/// Flip queued.
pub const KMS_PRESENT_STATUS_QUEUED: i32 = 0;
/// ### English
/// Previous flip still pending; frame skipped.
///
/// ### 中文
/// 上一次翻转仍未完成；该帧被跳过。
pub const KMS_PRESENT_STATUS_SKIPPED: i32 = 1;
/// ### English
/// A required pointer argument was NULL.
///
/// ### 中文
/// 必需的指针参数为 NULL。
pub const KMS_PRESENT_STATUS_NULL_ARGUMENT: i32 = -100;
/// ### English
/// A scalar argument was out of range.
///
/// ### 中文
/// 标量参数超出范围。
pub const KMS_PRESENT_STATUS_INVALID_ARGUMENT: i32 = -101;

impl From<&KmsPresentMode> for ModeInfo {
    fn from(mode: &KmsPresentMode) -> Self {
        let name: Vec<u8> = mode
            .name
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        Self {
            clock: mode.clock,
            hdisplay: mode.hdisplay,
            hsync_start: mode.hsync_start,
            hsync_end: mode.hsync_end,
            htotal: mode.htotal,
            hskew: mode.hskew,
            vdisplay: mode.vdisplay,
            vsync_start: mode.vsync_start,
            vsync_end: mode.vsync_end,
            vtotal: mode.vtotal,
            vscan: mode.vscan,
            vrefresh: mode.vrefresh,
            flags: mode.flags,
            mode_type: mode.mode_type,
            name: String::from_utf8_lossy(&name).into_owned(),
        }
    }
}

impl From<WritableBuffer> for KmsPresentBuffer {
    /// ### English
    /// Converts an internal `WritableBuffer` into the C ABI `KmsPresentBuffer`.
    ///
    /// #### Parameters
    /// - `value`: Source buffer description.
    ///
    /// ### 中文
    /// 将内部 `WritableBuffer` 转换为 C ABI 的 `KmsPresentBuffer`。
    ///
    /// #### 参数
    /// - `value`：源缓冲区描述。
    fn from(value: WritableBuffer) -> Self {
        Self {
            pixels: value.pixels.as_ptr(),
            stride: value.stride,
            slot: value.slot as u32,
            size: value.len as u64,
            width: value.size.width,
            height: value.size.height,
            fourcc: value.format.fourcc(),
        }
    }
}

/// ### English
/// Converts an optional NUL-terminated UTF-8 C string into a `PathBuf`.
///
/// Returns `None` for NULL pointers, invalid UTF-8, or empty strings.
///
/// # Safety
/// `ptr` must be valid and point to a NUL-terminated string for the duration of the call.
///
/// ### 中文
/// 将可选的 NUL 结尾 UTF-8 C 字符串转换为 `PathBuf`。
///
/// 对 NULL 指针、UTF-8 非法或空字符串返回 `None`。
///
/// # Safety
/// `ptr` 在本次调用期间必须有效，并指向以 NUL 结尾的字符串。
unsafe fn cstr_to_path(ptr: *const c_char) -> Option<PathBuf> {
    if ptr.is_null() {
        return None;
    }

    let value = unsafe { CStr::from_ptr(ptr) }.to_str().ok()?;
    if value.is_empty() {
        return None;
    }

    Some(PathBuf::from(value))
}
