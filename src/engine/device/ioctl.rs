//! ### English
//! Raw DRM uapi structures and ioctl request numbers (`drm.h` / `drm_mode.h`).
//!
//! ### 中文
//! 原始 DRM uapi 结构体与 ioctl 请求号（`drm.h` / `drm_mode.h`）。

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};

use libc::c_ulong;

const DRM_IOCTL_BASE: u32 = b'd' as u32;
const IOC_READ_WRITE: u32 = 3;

const fn drm_iowr<T>(nr: u32) -> c_ulong {
    ((IOC_READ_WRITE << 30)
        | ((std::mem::size_of::<T>() as u32 & 0x3fff) << 16)
        | (DRM_IOCTL_BASE << 8)
        | nr) as c_ulong
}

pub(super) const DRM_IOCTL_MODE_SETCRTC: c_ulong = drm_iowr::<DrmModeCrtc>(0xA2);
pub(super) const DRM_IOCTL_MODE_ADDFB: c_ulong = drm_iowr::<DrmModeFbCmd>(0xAE);
pub(super) const DRM_IOCTL_MODE_RMFB: c_ulong = drm_iowr::<u32>(0xAF);
pub(super) const DRM_IOCTL_MODE_PAGE_FLIP: c_ulong = drm_iowr::<DrmModeCrtcPageFlip>(0xB0);
pub(super) const DRM_IOCTL_MODE_CREATE_DUMB: c_ulong = drm_iowr::<DrmModeCreateDumb>(0xB2);
pub(super) const DRM_IOCTL_MODE_MAP_DUMB: c_ulong = drm_iowr::<DrmModeMapDumb>(0xB3);
pub(super) const DRM_IOCTL_MODE_DESTROY_DUMB: c_ulong = drm_iowr::<DrmModeDestroyDumb>(0xB4);

pub(super) const DRM_MODE_PAGE_FLIP_EVENT: u32 = 0x01;
pub(super) const DRM_EVENT_FLIP_COMPLETE: u32 = 0x02;
pub(super) const DRM_DISPLAY_MODE_LEN: usize = 32;

#[repr(C)]
#[derive(Default)]
pub(super) struct DrmModeCreateDumb {
    pub height: u32,
    pub width: u32,
    pub bpp: u32,
    pub flags: u32,
    pub handle: u32,
    pub pitch: u32,
    pub size: u64,
}

#[repr(C)]
#[derive(Default)]
pub(super) struct DrmModeMapDumb {
    pub handle: u32,
    pub pad: u32,
    pub offset: u64,
}

#[repr(C)]
#[derive(Default)]
pub(super) struct DrmModeDestroyDumb {
    pub handle: u32,
}

#[repr(C)]
#[derive(Default)]
pub(super) struct DrmModeFbCmd {
    pub fb_id: u32,
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub bpp: u32,
    pub depth: u32,
    pub handle: u32,
}

#[repr(C)]
#[derive(Default)]
pub(super) struct DrmModeModeInfo {
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
    pub type_: u32,
    pub name: [u8; DRM_DISPLAY_MODE_LEN],
}

#[repr(C)]
#[derive(Default)]
pub(super) struct DrmModeCrtc {
    pub set_connectors_ptr: u64,
    pub count_connectors: u32,
    pub crtc_id: u32,
    pub fb_id: u32,
    pub x: u32,
    pub y: u32,
    pub gamma_size: u32,
    pub mode_valid: u32,
    pub mode: DrmModeModeInfo,
}

#[repr(C)]
#[derive(Default)]
pub(super) struct DrmModeCrtcPageFlip {
    pub crtc_id: u32,
    pub fb_id: u32,
    pub flags: u32,
    pub reserved: u32,
    pub user_data: u64,
}

/// ### English
/// Size of `struct drm_event` (type + length).
///
/// ### 中文
/// `struct drm_event`（type + length）的大小。
pub(super) const DRM_EVENT_HEADER_LEN: usize = 8;

/// ### English
/// Size of `struct drm_event_vblank`, the payload of a flip-complete event.
///
/// ### 中文
/// `struct drm_event_vblank`（翻转完成事件载荷）的大小。
pub(super) const DRM_EVENT_VBLANK_LEN: usize = 32;

/// ### English
/// Issues one DRM ioctl, retrying on `EINTR`/`EAGAIN` the way libdrm's `drmIoctl` does.
///
/// #### Parameters
/// - `fd`: Open DRM device.
/// - `request`: One of the `DRM_IOCTL_*` numbers above.
/// - `arg`: The `#[repr(C)]` argument matching `request`.
///
/// ### 中文
/// 发起一次 DRM ioctl，并像 libdrm 的 `drmIoctl` 一样在 `EINTR`/`EAGAIN` 时重试。
///
/// #### 参数
/// - `fd`：已打开的 DRM 设备。
/// - `request`：上面的某个 `DRM_IOCTL_*` 请求号。
/// - `arg`：与 `request` 匹配的 `#[repr(C)]` 参数。
pub(super) fn drm_ioctl<T>(fd: BorrowedFd<'_>, request: c_ulong, arg: &mut T) -> io::Result<()> {
    loop {
        let ret = unsafe { libc::ioctl(fd.as_raw_fd(), request as _, arg as *mut T) };
        if ret != -1 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) | Some(libc::EAGAIN) => continue,
            _ => return Err(err),
        }
    }
}
