//! ### English
//! One allocated, registered and mapped dumb buffer, owned RAII-style.
//!
//! `FrameBuffer` acquires its three kernel resources in order (memory → framebuffer object →
//! mapping) and releases them in strict reverse order from `release`/`Drop`, whatever step a
//! build stopped at.
//!
//! ### 中文
//! 一个已分配、已注册并已映射的 dumb buffer，以 RAII 方式持有。
//!
//! `FrameBuffer` 按顺序获取三种内核资源（内存 → framebuffer 对象 → 映射），
//! 并在 `release`/`Drop` 中严格逆序释放，无论构建停在哪一步。
mod allocator;
mod mapper;

use std::ptr::NonNull;
use std::sync::Arc;

use dpi::PhysicalSize;

pub use allocator::BufferAllocator;
pub use mapper::BufferMapper;

use super::device::KmsDevice;
use super::error::{PresentError, Result};
use super::format::PixelFormat;

/// ### English
/// A displayable pixel buffer: kernel memory, its framebuffer object and its process mapping.
///
/// Invariants: `fb_id != 0` and `map.is_some()` each imply `handle != 0`. A released buffer has
/// every field zeroed.
///
/// ### 中文
/// 可显示的像素缓冲区：内核内存、对应的 framebuffer 对象以及进程映射。
///
/// 不变量：`fb_id != 0` 与 `map.is_some()` 均意味着 `handle != 0`。已释放的缓冲区所有字段归零。
pub struct FrameBuffer {
    device: Arc<dyn KmsDevice>,
    /// ### English
    /// Dumb buffer handle (0 = not allocated).
    ///
    /// ### 中文
    /// dumb buffer 句柄（0 = 未分配）。
    handle: u32,
    /// ### English
    /// Framebuffer object id (0 = not registered).
    ///
    /// ### 中文
    /// framebuffer 对象 id（0 = 未注册）。
    fb_id: u32,
    stride: u32,
    size: u64,
    /// ### English
    /// Process mapping of the whole allocation (`None` = not mapped).
    ///
    /// ### 中文
    /// 整个分配的进程映射（`None` = 未映射）。
    map: Option<NonNull<u8>>,
    dimensions: PhysicalSize<u32>,
    format: PixelFormat,
}

/*
### English
The mapping is exclusively owned by this slot; moving the owner across threads moves the only
access path with it.

### 中文
映射由该槽位独占；所有者跨线程移动时，唯一的访问路径也随之移动。
*/
unsafe impl Send for FrameBuffer {}

impl FrameBuffer {
    /// ### English
    /// Creates an empty slot (all fields zero) bound to `device`.
    ///
    /// ### 中文
    /// 创建绑定到 `device` 的空槽位（所有字段为 0）。
    pub fn empty(device: Arc<dyn KmsDevice>) -> Self {
        Self {
            device,
            handle: 0,
            fb_id: 0,
            stride: 0,
            size: 0,
            map: None,
            dimensions: PhysicalSize::new(0, 0),
            format: PixelFormat::default(),
        }
    }

    /// ### English
    /// Allocates, registers, maps and zeroes a buffer of `dimensions` pixels.
    ///
    /// On failure the partially built buffer is dropped, which releases whatever was acquired.
    ///
    /// #### Parameters
    /// - `device`: Device that owns the kernel objects.
    /// - `dimensions`: Width/height in pixels.
    /// - `format`: Pixel format.
    ///
    /// ### 中文
    /// 分配、注册、映射并清零一个 `dimensions` 像素大小的缓冲区。
    ///
    /// 失败时部分构建的缓冲区会被 drop，从而释放已获取的资源。
    ///
    /// #### 参数
    /// - `device`：持有内核对象的设备。
    /// - `dimensions`：宽高（像素）。
    /// - `format`：像素格式。
    pub fn create(
        device: &Arc<dyn KmsDevice>,
        dimensions: PhysicalSize<u32>,
        format: PixelFormat,
    ) -> Result<Self> {
        let mut buffer = Self::empty(Arc::clone(device));
        buffer.populate(dimensions, format)?;
        Ok(buffer)
    }

    fn populate(&mut self, dimensions: PhysicalSize<u32>, format: PixelFormat) -> Result<()> {
        let device = &*self.device;
        let allocator = BufferAllocator::new(device);
        let mapper = BufferMapper::new(device);

        let dumb = allocator.allocate(dimensions, format)?;
        self.handle = dumb.handle;
        self.stride = dumb.pitch;
        self.size = dumb.size;
        self.dimensions = dimensions;
        self.format = format;

        self.fb_id = allocator.register(&dumb, dimensions, format)?;

        let len = usize::try_from(dumb.size).map_err(|_| PresentError::MappingFailed {
            handle: dumb.handle,
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "allocation larger than the address space",
            ),
        })?;
        let ptr = mapper.map(dumb.handle, len)?;
        self.map = Some(ptr);

        unsafe { mapper.zero(ptr, len) };
        Ok(())
    }

    /// ### English
    /// Releases mapping, framebuffer object and memory (in that order) and zeroes every field.
    ///
    /// Idempotent; individual release failures are logged and do not stop the remaining steps.
    ///
    /// ### 中文
    /// 按顺序释放映射、framebuffer 对象与内存，并将所有字段清零。
    ///
    /// 幂等；单个释放步骤失败只记录日志，不会中断后续步骤。
    pub fn release(&mut self) {
        let device = &*self.device;

        if let Some(ptr) = self.map.take() {
            unsafe { BufferMapper::new(device).unmap(ptr, self.size as usize) };
        }

        let allocator = BufferAllocator::new(device);
        allocator.unregister(self.fb_id);
        allocator.release(self.handle);

        self.handle = 0;
        self.fb_id = 0;
        self.stride = 0;
        self.size = 0;
        self.dimensions = PhysicalSize::new(0, 0);
    }

    pub fn handle(&self) -> u32 {
        self.handle
    }

    /// ### English
    /// Framebuffer object id handed to `SETCRTC`/`PAGE_FLIP`.
    ///
    /// ### 中文
    /// 传给 `SETCRTC`/`PAGE_FLIP` 的 framebuffer 对象 id。
    pub fn fb_id(&self) -> u32 {
        self.fb_id
    }

    /// Row pitch in bytes.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn dimensions(&self) -> PhysicalSize<u32> {
        self.dimensions
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// ### English
    /// Base address of the mapping, or `None` if the buffer is not mapped.
    ///
    /// ### 中文
    /// 映射的基地址；未映射时为 `None`。
    pub fn pixels_ptr(&self) -> Option<NonNull<u8>> {
        self.map
    }

    /// ### English
    /// Whether every resource (memory, framebuffer object, mapping) is held.
    ///
    /// ### 中文
    /// 是否持有全部资源（内存、framebuffer 对象、映射）。
    pub fn is_populated(&self) -> bool {
        self.handle != 0 && self.fb_id != 0 && self.map.is_some()
    }

    /// ### English
    /// The mapped bytes, or `None` if not mapped.
    ///
    /// ### 中文
    /// 已映射的字节；未映射时为 `None`。
    pub fn bytes(&self) -> Option<&[u8]> {
        let ptr = self.map?;
        Some(unsafe { std::slice::from_raw_parts(ptr.as_ptr(), self.size as usize) })
    }

    /// ### English
    /// Mutable mapped bytes, or `None` if not mapped.
    ///
    /// ### 中文
    /// 可变的已映射字节；未映射时为 `None`。
    pub fn bytes_mut(&mut self) -> Option<&mut [u8]> {
        let ptr = self.map?;
        Some(unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), self.size as usize) })
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("handle", &self.handle)
            .field("fb_id", &self.fb_id)
            .field("stride", &self.stride)
            .field("size", &self.size)
            .field("map", &self.map)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}
