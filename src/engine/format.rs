//! ### English
//! Pixel format of the dumb-buffer presentation path.
//!
//! ### 中文
//! dumb buffer 呈现路径使用的像素格式。

/// ### English
/// Pixel layouts a dumb buffer can be allocated with.
///
/// Only XRGB8888 is produced today: 24 significant bits packed into a little-endian 32-bit word
/// (`0x00RRGGBB`), the upper byte ignored by scanout.
///
/// ### 中文
/// dumb buffer 可分配的像素布局。
///
/// 目前只产生 XRGB8888：24 位有效颜色打包进小端 32 位字（`0x00RRGGBB`），最高字节在扫描输出时被忽略。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    #[default]
    Xrgb8888,
}

const fn fourcc(code: &[u8; 4]) -> u32 {
    (code[0] as u32) | (code[1] as u32) << 8 | (code[2] as u32) << 16 | (code[3] as u32) << 24
}

impl PixelFormat {
    /// ### English
    /// DRM fourcc code (`XR24`).
    ///
    /// ### 中文
    /// DRM fourcc 编码（`XR24`）。
    pub const fn fourcc(self) -> u32 {
        match self {
            Self::Xrgb8888 => fourcc(b"XR24"),
        }
    }

    /// Storage bits per pixel requested from `CREATE_DUMB` and `ADDFB`.
    pub const fn bits_per_pixel(self) -> u32 {
        match self {
            Self::Xrgb8888 => 32,
        }
    }

    /// Significant color bits (`ADDFB` depth).
    pub const fn depth(self) -> u32 {
        match self {
            Self::Xrgb8888 => 24,
        }
    }

    pub const fn bytes_per_pixel(self) -> u32 {
        self.bits_per_pixel() / 8
    }
}
