//! ### English
//! Process mappings of dumb buffers.
//!
//! ### 中文
//! dumb buffer 的进程内映射。

use std::ptr::{self, NonNull};

use crate::engine::device::KmsDevice;
use crate::engine::error::{PresentError, Result};

/// ### English
/// Borrowed view over a device that maps, clears and unmaps dumb buffers.
///
/// ### 中文
/// 借用设备的视图，负责映射、清零与解除映射 dumb buffer。
#[derive(Clone, Copy)]
pub struct BufferMapper<'a> {
    device: &'a dyn KmsDevice,
}

impl<'a> BufferMapper<'a> {
    pub fn new(device: &'a dyn KmsDevice) -> Self {
        Self { device }
    }

    /// ### English
    /// Maps `len` bytes of the dumb buffer `handle` read/write and shared.
    ///
    /// Display registration is not undone on failure; the owning `FrameBuffer` unwinds it.
    ///
    /// #### Parameters
    /// - `handle`: Dumb buffer handle from `BufferAllocator::allocate`.
    /// - `len`: Bytes to map (the allocation size reported by the kernel).
    ///
    /// ### 中文
    /// 以读写、共享方式映射 dumb buffer `handle` 的 `len` 字节。
    ///
    /// 失败时不会撤销显示注册；由持有它的 `FrameBuffer` 负责回滚。
    ///
    /// #### 参数
    /// - `handle`：`BufferAllocator::allocate` 返回的 dumb buffer 句柄。
    /// - `len`：需映射的字节数（内核报告的分配大小）。
    pub fn map(&self, handle: u32, len: usize) -> Result<NonNull<u8>> {
        let offset = self
            .device
            .map_dumb(handle)
            .map_err(|source| PresentError::MappingFailed { handle, source })?;
        self.device
            .mmap(offset, len)
            .map_err(|source| PresentError::MappingFailed { handle, source })
    }

    /// ### English
    /// Fills a fresh mapping with zero bytes so no stale kernel memory reaches the screen.
    ///
    /// # Safety
    /// `ptr` must point to at least `len` writable bytes that nothing else references.
    ///
    /// ### 中文
    /// 将新映射清零，确保旧的内核内存内容不会出现在屏幕上。
    ///
    /// # Safety
    /// `ptr` 必须指向至少 `len` 个可写字节，且没有其它引用指向它们。
    pub unsafe fn zero(&self, ptr: NonNull<u8>, len: usize) {
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, len) };
    }

    /// ### English
    /// Unmaps a region returned by `map`. Failures are logged, never returned.
    ///
    /// # Safety
    /// Same contract as `KmsDevice::munmap`.
    ///
    /// ### 中文
    /// 解除 `map` 返回的映射。失败只记录日志，不返回错误。
    ///
    /// # Safety
    /// 与 `KmsDevice::munmap` 的约定相同。
    pub unsafe fn unmap(&self, ptr: NonNull<u8>, len: usize) {
        if let Err(err) = unsafe { self.device.munmap(ptr, len) } {
            log::warn!("could not unmap dumb buffer at {ptr:p} ({len} bytes): {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dpi::PhysicalSize;

    use super::*;
    use crate::engine::buffer::BufferAllocator;
    use crate::engine::device::fake::{FakeDevice, STALE_BYTE};
    use crate::engine::format::PixelFormat;

    #[test]
    fn zero_overwrites_stale_kernel_memory() {
        let fake = Arc::new(FakeDevice::new());
        let allocator = BufferAllocator::new(&*fake);
        let mapper = BufferMapper::new(&*fake);

        let dumb = allocator
            .allocate(PhysicalSize::new(16, 4), PixelFormat::Xrgb8888)
            .unwrap();
        let len = dumb.size as usize;
        let ptr = mapper.map(dumb.handle, len).unwrap();

        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), len) };
        assert!(bytes.iter().all(|&b| b == STALE_BYTE));

        unsafe { mapper.zero(ptr, len) };
        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), len) };
        assert!(bytes.iter().all(|&b| b == 0));

        unsafe { mapper.unmap(ptr, len) };
        assert_eq!(fake.live_mappings(), 0);
        allocator.release(dumb.handle);
        assert_eq!(fake.live_dumbs(), 0);
    }
}
