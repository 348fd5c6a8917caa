/// ### English
/// Presentation core: kernel transport, buffer ring, CRTC binding and flip synchronization.
///
/// ### 中文
/// 呈现核心：内核传输层、缓冲环、CRTC 绑定与翻转同步。
pub mod buffer;
pub mod config;
pub mod crtc;
pub mod device;
pub mod error;
pub mod flags;
pub mod flip;
pub mod format;
pub mod surface;
pub mod swap_chain;

pub use config::{DisplayConfig, ModeInfo, PresentConfig};
pub use device::{DrmCard, KmsDevice};
pub use error::{PresentError, Result};
pub use flip::{FlipEventRouter, FlipToken, FlipWait};
pub use format::PixelFormat;
pub use surface::{DamageRect, KmsSurface, PresentOutcome, PresentStats, WritableBuffer};
