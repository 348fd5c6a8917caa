//! ### English
//! Completion tokens carried through the kernel's page-flip `user_data` word.
//!
//! ### 中文
//! 通过内核 page flip 的 `user_data` 字传递的完成令牌。

const SERIAL_BITS: u64 = 32;

/// ### English
/// Identifies one queued flip: the surface that queued it and a per-surface serial.
///
/// Packed as `(surface << 32) | serial` so the kernel hands it back verbatim in the completion
/// event; the serial lets a surface ignore completions of flips it has already abandoned.
///
/// ### 中文
/// 标识一次排队的翻转：排队它的 surface 以及该 surface 内的序号。
///
/// 打包为 `(surface << 32) | serial`，内核会在完成事件中原样返回；
/// 序号让 surface 能忽略已放弃翻转的完成事件。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FlipToken {
    pub surface: u32,
    pub serial: u32,
}

impl FlipToken {
    pub fn new(surface: u32, serial: u32) -> Self {
        Self { surface, serial }
    }

    #[inline]
    pub fn pack(self) -> u64 {
        (u64::from(self.surface) << SERIAL_BITS) | u64::from(self.serial)
    }

    #[inline]
    pub fn unpack(packed: u64) -> Self {
        Self {
            surface: (packed >> SERIAL_BITS) as u32,
            serial: packed as u32,
        }
    }
}
