//! ### English
//! Fixed-size ring of frame buffers with a rotating "front" slot.
//!
//! ### 中文
//! 固定大小的帧缓冲环，带轮转的 “front” 槽位。

use std::sync::Arc;

use dpi::PhysicalSize;

use super::buffer::FrameBuffer;
use super::config::MIN_RING_LEN;
use super::device::KmsDevice;
use super::error::{PresentError, Result};
use super::format::PixelFormat;

/// ### English
/// Ring of fully populated `FrameBuffer`s for one surface.
///
/// `front` is the slot the next present submits (and the one software writes before that);
/// it is always in `0..len` and moves by one per queued flip.
///
/// ### 中文
/// 单个 surface 的完整 `FrameBuffer` 环。
///
/// `front` 是下一次 present 要提交的槽位（在此之前软件也写入它）；始终位于 `0..len`，
/// 每排队一次翻转前进一位。
#[derive(Debug)]
pub struct SwapChain {
    buffers: Box<[FrameBuffer]>,
    front: usize,
}

impl SwapChain {
    /// ### English
    /// Builds `len` buffers of `size` pixels. All-or-nothing: on the first failure every buffer
    /// built so far, including the partial one, is released before the error is returned.
    ///
    /// #### Parameters
    /// - `device`: Device that owns the kernel objects.
    /// - `size`: Per-buffer dimensions.
    /// - `format`: Pixel format of every buffer.
    /// - `len`: Ring length (at least `MIN_RING_LEN`).
    ///
    /// ### 中文
    /// 构建 `len` 个 `size` 像素的缓冲区。全有或全无：首次失败时，已构建的所有缓冲区
    ///（包括部分构建的那个）都会在返回错误前被释放。
    ///
    /// #### 参数
    /// - `device`：持有内核对象的设备。
    /// - `size`：每个缓冲区的尺寸。
    /// - `format`：所有缓冲区的像素格式。
    /// - `len`：环长度（至少为 `MIN_RING_LEN`）。
    pub fn build(
        device: &Arc<dyn KmsDevice>,
        size: PhysicalSize<u32>,
        format: PixelFormat,
        len: usize,
    ) -> Result<Self> {
        if len < MIN_RING_LEN {
            return Err(PresentError::InvalidRingLength {
                len,
                min: MIN_RING_LEN,
            });
        }

        let mut buffers = Vec::with_capacity(len);
        for slot in 0..len {
            let buffer = FrameBuffer::create(device, size, format).inspect_err(|err| {
                log::error!("could not build ring slot {slot}/{len}: {err}");
            })?;
            buffers.push(buffer);
        }

        log::debug!(
            "built {len}-slot ring of {}x{} buffers",
            size.width,
            size.height
        );
        Ok(Self {
            buffers: buffers.into_boxed_slice(),
            front: 0,
        })
    }

    /// ### English
    /// The slot the next present will submit.
    ///
    /// ### 中文
    /// 下一次 present 将提交的槽位。
    pub fn current_front(&self) -> &FrameBuffer {
        &self.buffers[self.front]
    }

    pub fn current_front_mut(&mut self) -> &mut FrameBuffer {
        &mut self.buffers[self.front]
    }

    pub fn front_index(&self) -> usize {
        self.front
    }

    /// ### English
    /// Moves `front` to the next slot. Call exactly once per queued flip, after it was queued.
    ///
    /// ### 中文
    /// 将 `front` 移到下一个槽位。每次排队翻转成功后恰好调用一次。
    pub fn advance(&mut self) {
        self.front = (self.front + 1) % self.buffers.len();
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn buffers(&self) -> &[FrameBuffer] {
        &self.buffers
    }
}
