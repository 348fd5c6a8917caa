/// ### English
/// `kms_dumb_present` crate root.
/// Software-rendered window presentation on Linux KMS via dumb buffers and page flips.
/// Exposes the C ABI via `ffi`; core implementation lives under `engine`.
///
/// ### 中文
/// `kms_dumb_present` 的 crate 根。
/// 通过 dumb buffer 与 page flip 在 Linux KMS 上呈现软件渲染的窗口。
/// 通过 `ffi` 导出 C ABI；核心实现位于 `engine` 模块。
pub mod engine;
mod ffi;

pub use engine::{
    DamageRect, DisplayConfig, DrmCard, FlipEventRouter, KmsDevice, KmsSurface, ModeInfo,
    PixelFormat, PresentConfig, PresentError, PresentOutcome, WritableBuffer,
};
