//! ### English
//! Bitflags controlling optional surface behaviors.
//!
//! These are passed through the C ABI as a `u32` bitmask.
//!
//! ### 中文
//! 控制 surface 可选行为的位标志（bitflags）。
//!
//! 通过 C ABI 以 `u32` 位掩码传入。

/// ### English
/// Allocate a ring of three dumb buffers instead of two.
///
/// Lets software draw the next frame while one buffer is queued for flip and another is being
/// scanned out, at the cost of one extra buffer of memory.
///
/// ### 中文
/// 分配三个 dumb buffer 组成的环，而不是两个。
///
/// 软件可以在一个缓冲区排队翻转、另一个正在扫描输出时绘制下一帧，代价是多占用一个缓冲区的内存。
pub const KMS_PRESENT_SURFACE_FLAG_TRIPLE_BUFFER: u32 = 1 << 0;

/// ### English
/// Never block in present: if the previous flip has not completed yet, the frame is skipped
/// (present returns "skipped") instead of waiting for the next vertical refresh.
///
/// ### 中文
/// present 永不阻塞：若上一次翻转尚未完成，则跳过该帧（present 返回 “skipped”），
/// 而不是等待下一次垂直刷新。
pub const KMS_PRESENT_SURFACE_FLAG_NONBLOCKING_PRESENT: u32 = 1 << 1;

/// Mask of every flag understood by this version.
pub const KMS_PRESENT_SURFACE_FLAGS_ALL: u32 =
    KMS_PRESENT_SURFACE_FLAG_TRIPLE_BUFFER | KMS_PRESENT_SURFACE_FLAG_NONBLOCKING_PRESENT;
