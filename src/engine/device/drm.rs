//! ### English
//! `KmsDevice` backed by an open DRM card node (`/dev/dri/cardN`).
//!
//! ### 中文
//! 基于已打开 DRM card 节点（`/dev/dri/cardN`）的 `KmsDevice` 实现。

use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::ptr::{self, NonNull};
use std::time::Duration;

use super::ioctl::{
    DRM_DISPLAY_MODE_LEN, DRM_EVENT_FLIP_COMPLETE, DRM_EVENT_HEADER_LEN, DRM_EVENT_VBLANK_LEN,
    DRM_IOCTL_MODE_ADDFB, DRM_IOCTL_MODE_CREATE_DUMB, DRM_IOCTL_MODE_DESTROY_DUMB,
    DRM_IOCTL_MODE_MAP_DUMB, DRM_IOCTL_MODE_PAGE_FLIP, DRM_IOCTL_MODE_RMFB,
    DRM_IOCTL_MODE_SETCRTC, DRM_MODE_PAGE_FLIP_EVENT, DrmModeCreateDumb, DrmModeCrtc,
    DrmModeCrtcPageFlip, DrmModeDestroyDumb, DrmModeFbCmd, DrmModeMapDumb, DrmModeModeInfo,
    drm_ioctl,
};
use super::{DumbBuffer, FlipEvent, KmsDevice};
use crate::engine::config::ModeInfo;

/// ### English
/// Event read buffer size; the kernel never splits an event across reads and a flip event is
/// 32 bytes, so this holds dozens of them.
///
/// ### 中文
/// 事件读取缓冲区大小；内核不会把一个事件拆分到多次读取中，翻转事件为 32 字节，因此可容纳数十个。
const EVENT_BUFFER_LEN: usize = 1024;

/// ### English
/// An open DRM card node. The descriptor is non-blocking so event reads never stall once
/// `poll` has reported readiness to another reader.
///
/// ### 中文
/// 已打开的 DRM card 节点。描述符为非阻塞，因此即使 `poll` 的就绪已被其它读取者消耗，读取事件也不会卡住。
#[derive(Debug)]
pub struct DrmCard {
    fd: OwnedFd,
}

impl DrmCard {
    /// ### English
    /// Opens a DRM card node read/write.
    ///
    /// #### Parameters
    /// - `path`: Device node, e.g. `/dev/dri/card0`.
    ///
    /// ### 中文
    /// 以读写方式打开 DRM card 节点。
    ///
    /// #### 参数
    /// - `path`：设备节点，如 `/dev/dri/card0`。
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC | libc::O_NONBLOCK)
            .open(path.as_ref())?;
        log::debug!("opened DRM device {}", path.as_ref().display());
        Ok(Self::from_fd(file.into()))
    }

    /// ### English
    /// Wraps a descriptor already opened (and possibly made DRM master) by the windowing layer.
    ///
    /// ### 中文
    /// 包装由窗口层打开（且可能已成为 DRM master）的描述符。
    pub fn from_fd(fd: OwnedFd) -> Self {
        Self { fd }
    }

    fn wait_readable(&self, timeout: Option<Duration>) -> io::Result<bool> {
        let timeout_ms = match timeout {
            None => -1,
            Some(timeout) => timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
        };
        let mut pollfd = libc::pollfd {
            fd: self.fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };

        let ret = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return Ok(false);
            }
            return Err(err);
        }
        if pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "DRM device reported an error condition",
            ));
        }
        Ok(ret > 0 && pollfd.revents & libc::POLLIN != 0)
    }
}

impl AsFd for DrmCard {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl KmsDevice for DrmCard {
    fn create_dumb(&self, width: u32, height: u32, bpp: u32) -> io::Result<DumbBuffer> {
        let mut creq = DrmModeCreateDumb {
            width,
            height,
            bpp,
            ..Default::default()
        };
        drm_ioctl(self.as_fd(), DRM_IOCTL_MODE_CREATE_DUMB, &mut creq)?;
        Ok(DumbBuffer {
            handle: creq.handle,
            pitch: creq.pitch,
            size: creq.size,
        })
    }

    fn destroy_dumb(&self, handle: u32) -> io::Result<()> {
        let mut dreq = DrmModeDestroyDumb { handle };
        drm_ioctl(self.as_fd(), DRM_IOCTL_MODE_DESTROY_DUMB, &mut dreq)
    }

    fn add_framebuffer(
        &self,
        width: u32,
        height: u32,
        depth: u32,
        bpp: u32,
        pitch: u32,
        handle: u32,
    ) -> io::Result<u32> {
        let mut cmd = DrmModeFbCmd {
            fb_id: 0,
            width,
            height,
            pitch,
            bpp,
            depth,
            handle,
        };
        drm_ioctl(self.as_fd(), DRM_IOCTL_MODE_ADDFB, &mut cmd)?;
        Ok(cmd.fb_id)
    }

    fn remove_framebuffer(&self, fb_id: u32) -> io::Result<()> {
        let mut id = fb_id;
        drm_ioctl(self.as_fd(), DRM_IOCTL_MODE_RMFB, &mut id)
    }

    fn map_dumb(&self, handle: u32) -> io::Result<u64> {
        let mut mreq = DrmModeMapDumb {
            handle,
            ..Default::default()
        };
        drm_ioctl(self.as_fd(), DRM_IOCTL_MODE_MAP_DUMB, &mut mreq)?;
        Ok(mreq.offset)
    }

    fn mmap(&self, offset: u64, len: usize) -> io::Result<NonNull<u8>> {
        let offset = libc::off_t::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "map offset out of range"))?;
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.fd.as_raw_fd(),
                offset,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| io::Error::other("mmap returned null"))
    }

    unsafe fn munmap(&self, ptr: NonNull<u8>, len: usize) -> io::Result<()> {
        let ret = unsafe { libc::munmap(ptr.as_ptr().cast(), len) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn set_crtc(
        &self,
        crtc_id: u32,
        fb_id: u32,
        connector_id: u32,
        mode: &ModeInfo,
    ) -> io::Result<()> {
        let connectors = [connector_id];
        let mut crtc = DrmModeCrtc {
            set_connectors_ptr: connectors.as_ptr() as u64,
            count_connectors: connectors.len() as u32,
            crtc_id,
            fb_id,
            mode_valid: 1,
            mode: raw_mode(mode),
            ..Default::default()
        };
        drm_ioctl(self.as_fd(), DRM_IOCTL_MODE_SETCRTC, &mut crtc)
    }

    fn page_flip(&self, crtc_id: u32, fb_id: u32, user_data: u64) -> io::Result<()> {
        let mut flip = DrmModeCrtcPageFlip {
            crtc_id,
            fb_id,
            flags: DRM_MODE_PAGE_FLIP_EVENT,
            reserved: 0,
            user_data,
        };
        drm_ioctl(self.as_fd(), DRM_IOCTL_MODE_PAGE_FLIP, &mut flip)
    }

    fn read_flip_events(&self, timeout: Option<Duration>) -> io::Result<Vec<FlipEvent>> {
        if !self.wait_readable(timeout)? {
            return Ok(Vec::new());
        }

        let mut buf = [0u8; EVENT_BUFFER_LEN];
        let len = unsafe { libc::read(self.fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
        if len < 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::EAGAIN) | Some(libc::EINTR) => Ok(Vec::new()),
                _ => Err(err),
            };
        }

        Ok(parse_flip_events(&buf[..len as usize]))
    }
}

fn raw_mode(mode: &ModeInfo) -> DrmModeModeInfo {
    let mut name = [0u8; DRM_DISPLAY_MODE_LEN];
    let bytes = mode.name.as_bytes();
    let len = bytes.len().min(DRM_DISPLAY_MODE_LEN - 1);
    name[..len].copy_from_slice(&bytes[..len]);

    DrmModeModeInfo {
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
        type_: mode.mode_type,
        name,
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[at..at + 4]);
    u32::from_ne_bytes(word)
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[at..at + 8]);
    u64::from_ne_bytes(word)
}

/// ### English
/// Splits a `read()` from the DRM fd into events and keeps the flip completions.
///
/// Other event types (vblank, CRTC sequence) are skipped by their length field; a truncated
/// trailing record ends parsing.
///
/// ### 中文
/// 将一次 DRM fd 的 `read()` 结果拆分为事件，只保留翻转完成事件。
///
/// 其它事件类型（vblank、CRTC sequence）按其 length 字段跳过；末尾不完整的记录会结束解析。
fn parse_flip_events(bytes: &[u8]) -> Vec<FlipEvent> {
    let mut events = Vec::new();
    let mut at = 0;
    while at + DRM_EVENT_HEADER_LEN <= bytes.len() {
        let event_type = read_u32(bytes, at);
        let length = read_u32(bytes, at + 4) as usize;
        if length < DRM_EVENT_HEADER_LEN || at + length > bytes.len() {
            break;
        }

        if event_type == DRM_EVENT_FLIP_COMPLETE && length >= DRM_EVENT_VBLANK_LEN {
            let tv_sec = read_u32(bytes, at + 16);
            let tv_usec = read_u32(bytes, at + 20);
            events.push(FlipEvent {
                user_data: read_u64(bytes, at + 8),
                sequence: read_u32(bytes, at + 24),
                crtc_id: read_u32(bytes, at + 28),
                timestamp: Duration::from_secs(u64::from(tv_sec))
                    + Duration::from_micros(u64::from(tv_usec)),
            });
        }
        at += length;
    }
    events
}
