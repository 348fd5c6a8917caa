//! ### English
//! Error type shared by every presentation component.
//!
//! ### 中文
//! 所有呈现组件共用的错误类型。

use std::io;

use thiserror::Error;

/// ### English
/// Errors raised while building, binding or flipping a surface's buffer ring.
///
/// Variants that wrap a kernel failure keep the underlying `io::Error` as their source.
///
/// ### 中文
/// 构建、绑定或翻转 surface 缓冲环时产生的错误。
///
/// 包装内核失败的变体会保留原始 `io::Error` 作为 source。
#[derive(Debug, Error)]
pub enum PresentError {
    #[error("invalid surface size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("invalid buffer ring length {len} (at least {min} required)")]
    InvalidRingLength { len: usize, min: usize },

    #[error("could not create dumb buffer: {source}")]
    AllocationFailed { source: io::Error },

    #[error("could not create framebuffer for handle {handle}: {source}")]
    RegistrationFailed { handle: u32, source: io::Error },

    #[error("could not map dumb buffer {handle}: {source}")]
    MappingFailed { handle: u32, source: io::Error },

    #[error("could not set up CRTC {crtc_id}: {source}")]
    BindFailed { crtc_id: u32, source: io::Error },

    #[error("display controller is not bound")]
    NotBound,

    #[error("page flip {token:#x} is still outstanding")]
    FlipOutstanding { token: u64 },

    #[error("could not queue pageflip to framebuffer {fb_id}: {source}")]
    FlipSubmitFailed { fb_id: u32, source: io::Error },

    #[error("could not read display events: {source}")]
    EventReadFailed { source: io::Error },
}

impl PresentError {
    /// ### English
    /// Returns the OS error code of the underlying kernel failure, if any.
    ///
    /// ### 中文
    /// 返回底层内核失败的 OS 错误码（若有）。
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::AllocationFailed { source }
            | Self::RegistrationFailed { source, .. }
            | Self::MappingFailed { source, .. }
            | Self::BindFailed { source, .. }
            | Self::FlipSubmitFailed { source, .. }
            | Self::EventReadFailed { source } => source.raw_os_error(),
            _ => None,
        }
    }

    /// ### English
    /// Stable negative status code used by the C ABI.
    ///
    /// ### 中文
    /// C ABI 使用的稳定负数状态码。
    pub fn status_code(&self) -> i32 {
        match self {
            Self::InvalidSize { .. } => -1,
            Self::InvalidRingLength { .. } => -2,
            Self::AllocationFailed { .. } => -3,
            Self::RegistrationFailed { .. } => -4,
            Self::MappingFailed { .. } => -5,
            Self::BindFailed { .. } => -6,
            Self::NotBound => -7,
            Self::FlipOutstanding { .. } => -8,
            Self::FlipSubmitFailed { .. } => -9,
            Self::EventReadFailed { .. } => -10,
        }
    }
}

/// Result type for presentation operations.
pub type Result<T> = std::result::Result<T, PresentError>;
