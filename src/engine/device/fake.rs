//! In-memory `KmsDevice` used by unit tests.
//!
//! Dumb buffers are heap allocations pre-filled with garbage, mappings hand out pointers into
//! them, and flips stay queued until a test completes them. Any primitive can be told to fail
//! on its n-th call.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::ptr::NonNull;
use std::sync::Mutex;
use std::time::Duration;

use super::{DumbBuffer, FlipEvent, KmsDevice};
use crate::engine::config::ModeInfo;

/// Byte pattern standing in for stale kernel memory.
pub(crate) const STALE_BYTE: u8 = 0xA5;

const PITCH_ALIGN: u32 = 64;

const IDLE_WAIT: Duration = Duration::from_millis(1);

struct FakeDumb {
    memory: Box<[u8]>,
}

#[derive(Default)]
struct FakeState {
    next_handle: u32,
    next_fb_id: u32,
    dumbs: HashMap<u32, FakeDumb>,
    framebuffers: HashMap<u32, u32>,
    mappings: HashMap<usize, usize>,
    crtc_fb: Option<u32>,
    flips: Vec<u32>,
    queued: VecDeque<(u32, u64)>,
    pending: VecDeque<FlipEvent>,
    sequence: u32,
    auto_complete: bool,

    create_dumb_calls: usize,
    add_fb_calls: usize,
    map_calls: usize,
    set_crtc_calls: usize,

    fail_create_dumb_at: Option<usize>,
    fail_add_fb_at: Option<usize>,
    fail_map_at: Option<usize>,
    fail_set_crtc: bool,
    fail_page_flip: bool,
    fail_destroy_dumb: bool,
}

fn os_error(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

pub(crate) struct FakeDevice {
    state: Mutex<FakeState>,
}

impl FakeDevice {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_handle: 1,
                next_fb_id: 100,
                ..FakeState::default()
            }),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// Fails the `call`-th (1-based) `create_dumb`.
    pub(crate) fn fail_create_dumb_at(&self, call: usize) {
        self.with(|s| s.fail_create_dumb_at = Some(call));
    }

    pub(crate) fn fail_add_fb_at(&self, call: usize) {
        self.with(|s| s.fail_add_fb_at = Some(call));
    }

    pub(crate) fn fail_map_at(&self, call: usize) {
        self.with(|s| s.fail_map_at = Some(call));
    }

    pub(crate) fn fail_set_crtc(&self, fail: bool) {
        self.with(|s| s.fail_set_crtc = fail);
    }

    pub(crate) fn fail_page_flip(&self, fail: bool) {
        self.with(|s| s.fail_page_flip = fail);
    }

    pub(crate) fn fail_destroy_dumb(&self, fail: bool) {
        self.with(|s| s.fail_destroy_dumb = fail);
    }

    /// Completes every flip immediately, as if vblank were instantaneous.
    pub(crate) fn set_auto_complete(&self, auto_complete: bool) {
        self.with(|s| s.auto_complete = auto_complete);
    }

    /// Delivers the completion event of the oldest queued flip. Returns false if none is queued.
    pub(crate) fn complete_next_flip(&self) -> bool {
        self.with(|s| match s.queued.pop_front() {
            Some((_, user_data)) => {
                s.push_event(user_data);
                true
            }
            None => false,
        })
    }

    /// Queues an arbitrary completion event.
    pub(crate) fn inject_event(&self, user_data: u64) {
        self.with(|s| s.push_event(user_data));
    }

    pub(crate) fn live_dumbs(&self) -> usize {
        self.with(|s| s.dumbs.len())
    }

    pub(crate) fn live_framebuffers(&self) -> usize {
        self.with(|s| s.framebuffers.len())
    }

    pub(crate) fn live_mappings(&self) -> usize {
        self.with(|s| s.mappings.len())
    }

    pub(crate) fn create_dumb_calls(&self) -> usize {
        self.with(|s| s.create_dumb_calls)
    }

    pub(crate) fn set_crtc_calls(&self) -> usize {
        self.with(|s| s.set_crtc_calls)
    }

    pub(crate) fn crtc_fb(&self) -> Option<u32> {
        self.with(|s| s.crtc_fb)
    }

    /// Framebuffer ids passed to `page_flip`, in submission order.
    pub(crate) fn flipped_fbs(&self) -> Vec<u32> {
        self.with(|s| s.flips.clone())
    }
}

impl FakeState {
    fn push_event(&mut self, user_data: u64) {
        self.sequence += 1;
        self.pending.push_back(FlipEvent {
            user_data,
            crtc_id: 0,
            sequence: self.sequence,
            timestamp: Duration::from_millis(u64::from(self.sequence) * 16),
        });
    }
}

impl KmsDevice for FakeDevice {
    fn create_dumb(&self, width: u32, height: u32, bpp: u32) -> io::Result<DumbBuffer> {
        self.with(|s| {
            s.create_dumb_calls += 1;
            if s.fail_create_dumb_at == Some(s.create_dumb_calls) {
                return Err(os_error(libc::ENOMEM));
            }
            if width == 0 || height == 0 || bpp != 32 {
                return Err(os_error(libc::EINVAL));
            }

            let pitch = (width * bpp / 8).div_ceil(PITCH_ALIGN) * PITCH_ALIGN;
            let size = u64::from(pitch) * u64::from(height);
            let handle = s.next_handle;
            s.next_handle += 1;
            s.dumbs.insert(
                handle,
                FakeDumb {
                    memory: vec![STALE_BYTE; size as usize].into_boxed_slice(),
                },
            );
            Ok(DumbBuffer {
                handle,
                pitch,
                size,
            })
        })
    }

    fn destroy_dumb(&self, handle: u32) -> io::Result<()> {
        self.with(|s| {
            if s.fail_destroy_dumb {
                return Err(os_error(libc::EIO));
            }
            s.dumbs
                .remove(&handle)
                .map(|_| ())
                .ok_or_else(|| os_error(libc::ENOENT))
        })
    }

    fn add_framebuffer(
        &self,
        _width: u32,
        _height: u32,
        depth: u32,
        bpp: u32,
        _pitch: u32,
        handle: u32,
    ) -> io::Result<u32> {
        self.with(|s| {
            s.add_fb_calls += 1;
            if s.fail_add_fb_at == Some(s.add_fb_calls) {
                return Err(os_error(libc::EINVAL));
            }
            if depth != 24 || bpp != 32 || !s.dumbs.contains_key(&handle) {
                return Err(os_error(libc::EINVAL));
            }

            let fb_id = s.next_fb_id;
            s.next_fb_id += 1;
            s.framebuffers.insert(fb_id, handle);
            Ok(fb_id)
        })
    }

    fn remove_framebuffer(&self, fb_id: u32) -> io::Result<()> {
        self.with(|s| {
            s.framebuffers
                .remove(&fb_id)
                .map(|_| ())
                .ok_or_else(|| os_error(libc::ENOENT))
        })
    }

    fn map_dumb(&self, handle: u32) -> io::Result<u64> {
        self.with(|s| {
            s.map_calls += 1;
            if s.fail_map_at == Some(s.map_calls) {
                return Err(os_error(libc::ENOMEM));
            }
            if !s.dumbs.contains_key(&handle) {
                return Err(os_error(libc::ENOENT));
            }
            Ok(u64::from(handle) << 32)
        })
    }

    fn mmap(&self, offset: u64, len: usize) -> io::Result<NonNull<u8>> {
        self.with(|s| {
            let handle = (offset >> 32) as u32;
            let dumb = s
                .dumbs
                .get_mut(&handle)
                .ok_or_else(|| os_error(libc::EINVAL))?;
            if len > dumb.memory.len() {
                return Err(os_error(libc::EINVAL));
            }

            let ptr = NonNull::new(dumb.memory.as_mut_ptr()).ok_or_else(|| os_error(libc::EFAULT))?;
            s.mappings.insert(ptr.as_ptr() as usize, len);
            Ok(ptr)
        })
    }

    unsafe fn munmap(&self, ptr: NonNull<u8>, len: usize) -> io::Result<()> {
        self.with(|s| match s.mappings.remove(&(ptr.as_ptr() as usize)) {
            Some(mapped) if mapped == len => Ok(()),
            _ => Err(os_error(libc::EINVAL)),
        })
    }

    fn set_crtc(
        &self,
        _crtc_id: u32,
        fb_id: u32,
        _connector_id: u32,
        _mode: &ModeInfo,
    ) -> io::Result<()> {
        self.with(|s| {
            s.set_crtc_calls += 1;
            if s.fail_set_crtc || !s.framebuffers.contains_key(&fb_id) {
                return Err(os_error(libc::EINVAL));
            }
            s.crtc_fb = Some(fb_id);
            Ok(())
        })
    }

    fn page_flip(&self, _crtc_id: u32, fb_id: u32, user_data: u64) -> io::Result<()> {
        self.with(|s| {
            if s.fail_page_flip {
                return Err(os_error(libc::EBUSY));
            }
            if !s.framebuffers.contains_key(&fb_id) {
                return Err(os_error(libc::ENOENT));
            }

            s.flips.push(fb_id);
            if s.auto_complete {
                s.push_event(user_data);
            } else {
                s.queued.push_back((fb_id, user_data));
            }
            Ok(())
        })
    }

    fn read_flip_events(&self, timeout: Option<Duration>) -> io::Result<Vec<FlipEvent>> {
        let events: Vec<FlipEvent> = self.with(|s| s.pending.drain(..).collect());
        if events.is_empty() {
            // Nothing ever arrives asynchronously; just avoid spinning hot.
            std::thread::sleep(timeout.unwrap_or(IDLE_WAIT).min(IDLE_WAIT));
        }
        Ok(events)
    }
}
