//! ### English
//! Dumb-buffer allocation and framebuffer registration.
//!
//! ### 中文
//! dumb buffer 的分配与 framebuffer 注册。

use std::io;

use dpi::PhysicalSize;

use crate::engine::device::{DumbBuffer, KmsDevice};
use crate::engine::error::{PresentError, Result};
use crate::engine::format::PixelFormat;

/// ### English
/// Borrowed view over a device that creates, registers and releases dumb buffers.
///
/// ### 中文
/// 借用设备的视图，负责创建、注册与释放 dumb buffer。
#[derive(Clone, Copy)]
pub struct BufferAllocator<'a> {
    device: &'a dyn KmsDevice,
}

impl<'a> BufferAllocator<'a> {
    pub fn new(device: &'a dyn KmsDevice) -> Self {
        Self { device }
    }

    /// ### English
    /// Requests kernel-backed pixel memory for `size` pixels in `format`.
    ///
    /// Nothing is left behind on failure: either a fully valid `DumbBuffer` is returned or no
    /// handle exists.
    ///
    /// #### Parameters
    /// - `size`: Buffer dimensions; both must be non-zero.
    /// - `format`: Pixel format (decides bits per pixel).
    ///
    /// ### 中文
    /// 为 `format` 格式、`size` 尺寸的像素申请内核内存。
    ///
    /// 失败时不会残留任何状态：要么返回完整有效的 `DumbBuffer`，要么不存在任何句柄。
    ///
    /// #### 参数
    /// - `size`：缓冲区尺寸，宽高都必须非 0。
    /// - `format`：像素格式（决定每像素位数）。
    pub fn allocate(&self, size: PhysicalSize<u32>, format: PixelFormat) -> Result<DumbBuffer> {
        if size.width == 0 || size.height == 0 {
            return Err(PresentError::InvalidSize {
                width: size.width,
                height: size.height,
            });
        }

        let dumb = self
            .device
            .create_dumb(size.width, size.height, format.bits_per_pixel())
            .map_err(|source| PresentError::AllocationFailed { source })?;

        if dumb.handle == 0 {
            return Err(PresentError::AllocationFailed {
                source: io::Error::new(io::ErrorKind::InvalidData, "kernel returned handle 0"),
            });
        }

        let min_pitch = size.width * format.bytes_per_pixel();
        let min_size = u64::from(min_pitch) * u64::from(size.height);
        if dumb.pitch < min_pitch || dumb.size < min_size {
            self.release(dumb.handle);
            return Err(PresentError::AllocationFailed {
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "kernel returned pitch {} / size {} for {}x{}",
                        dumb.pitch, dumb.size, size.width, size.height
                    ),
                ),
            });
        }

        log::trace!(
            "created dumb buffer handle={} pitch={} size={}",
            dumb.handle,
            dumb.pitch,
            dumb.size
        );
        Ok(dumb)
    }

    /// ### English
    /// Registers an allocation as a scanout framebuffer and returns its display id.
    ///
    /// On failure the allocation is left intact; the caller releases it while unwinding.
    ///
    /// ### 中文
    /// 将分配的内存注册为可扫描输出的 framebuffer，并返回其显示 id。
    ///
    /// 失败时分配保持不变；由调用方在回滚时释放。
    pub fn register(
        &self,
        dumb: &DumbBuffer,
        size: PhysicalSize<u32>,
        format: PixelFormat,
    ) -> Result<u32> {
        let handle = dumb.handle;
        if handle == 0 {
            return Err(PresentError::RegistrationFailed {
                handle,
                source: io::Error::new(io::ErrorKind::InvalidInput, "no dumb buffer handle"),
            });
        }

        let fb_id = self
            .device
            .add_framebuffer(
                size.width,
                size.height,
                format.depth(),
                format.bits_per_pixel(),
                dumb.pitch,
                handle,
            )
            .map_err(|source| PresentError::RegistrationFailed { handle, source })?;

        if fb_id == 0 {
            return Err(PresentError::RegistrationFailed {
                handle,
                source: io::Error::new(io::ErrorKind::InvalidData, "kernel returned fb id 0"),
            });
        }
        Ok(fb_id)
    }

    /// ### English
    /// Removes a framebuffer object. `0` is a no-op; failures are logged, never returned.
    ///
    /// ### 中文
    /// 移除 framebuffer 对象。`0` 为空操作；失败只记录日志，不返回错误。
    pub fn unregister(&self, fb_id: u32) {
        if fb_id == 0 {
            return;
        }
        if let Err(err) = self.device.remove_framebuffer(fb_id) {
            log::warn!("could not remove framebuffer {fb_id}: {err}");
        }
    }

    /// ### English
    /// Returns dumb memory to the kernel. `0` is a no-op; failures are logged, never returned.
    ///
    /// ### 中文
    /// 将 dumb 内存归还内核。`0` 为空操作；失败只记录日志，不返回错误。
    pub fn release(&self, handle: u32) {
        if handle == 0 {
            return;
        }
        if let Err(err) = self.device.destroy_dumb(handle) {
            log::warn!("could not destroy dumb buffer {handle}: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::device::fake::FakeDevice;

    #[test]
    fn allocate_reports_pitch_and_size() {
        let device = FakeDevice::new();
        let allocator = BufferAllocator::new(&device);

        let dumb = allocator
            .allocate(PhysicalSize::new(1920, 1080), PixelFormat::Xrgb8888)
            .unwrap();
        assert_ne!(dumb.handle, 0);
        assert!(dumb.pitch >= 1920 * 4);
        assert!(dumb.size >= 1920 * 1080 * 4);
    }

    #[test]
    fn zero_size_is_rejected_without_touching_the_kernel() {
        let device = FakeDevice::new();
        let allocator = BufferAllocator::new(&device);

        let err = allocator
            .allocate(PhysicalSize::new(0, 1080), PixelFormat::Xrgb8888)
            .unwrap_err();
        assert!(matches!(err, PresentError::InvalidSize { width: 0, .. }));
        assert_eq!(device.create_dumb_calls(), 0);
    }

    #[test]
    fn kernel_rejection_carries_errno() {
        let device = FakeDevice::new();
        device.fail_create_dumb_at(1);
        let allocator = BufferAllocator::new(&device);

        let err = allocator
            .allocate(PhysicalSize::new(64, 64), PixelFormat::Xrgb8888)
            .unwrap_err();
        assert!(matches!(err, PresentError::AllocationFailed { .. }));
        assert_eq!(err.raw_os_error(), Some(libc::ENOMEM));
        assert_eq!(device.live_dumbs(), 0);
    }

    #[test]
    fn registration_failure_keeps_allocation() {
        let device = FakeDevice::new();
        device.fail_add_fb_at(1);
        let allocator = BufferAllocator::new(&device);
        let size = PhysicalSize::new(64, 64);

        let dumb = allocator.allocate(size, PixelFormat::Xrgb8888).unwrap();
        let err = allocator
            .register(&dumb, size, PixelFormat::Xrgb8888)
            .unwrap_err();
        assert!(matches!(err, PresentError::RegistrationFailed { .. }));
        assert_eq!(device.live_dumbs(), 1);

        allocator.release(dumb.handle);
        assert_eq!(device.live_dumbs(), 0);
    }

    #[test]
    fn release_and_unregister_ignore_zero_and_failures() {
        let device = FakeDevice::new();
        let allocator = BufferAllocator::new(&device);
        allocator.release(0);
        allocator.unregister(0);

        let dumb = allocator
            .allocate(PhysicalSize::new(8, 8), PixelFormat::Xrgb8888)
            .unwrap();
        device.fail_destroy_dumb(true);
        allocator.release(dumb.handle);
        assert_eq!(device.live_dumbs(), 1);
    }
}
