//! ### English
//! C ABI bindings for device lifecycle and the flip event pump.
//!
//! ### 中文
//! 设备生命周期与翻转事件泵相关的 C ABI 绑定。

use std::ffi::c_char;
use std::sync::Arc;
use std::time::Duration;

use super::{
    KMS_PRESENT_STATUS_INVALID_ARGUMENT, KMS_PRESENT_STATUS_NULL_ARGUMENT, KmsPresentDevice,
};
use crate::engine::{DrmCard, FlipEventRouter, KmsDevice};

#[unsafe(no_mangle)]
/// ### English
/// Opens a DRM card (e.g. `/dev/dri/card0`).
///
/// Returns NULL if `path` is NULL/empty/not UTF-8 or the device cannot be opened. The caller
/// must hold DRM master on the card for mode setting to succeed.
///
/// ### 中文
/// 打开一个 DRM card（如 `/dev/dri/card0`）。
///
/// 若 `path` 为 NULL/空/非 UTF-8 或设备无法打开则返回 NULL。调用方必须持有该 card 的 DRM master，
/// mode setting 才能成功。
pub unsafe extern "C" fn kms_present_device_open(path: *const c_char) -> *mut KmsPresentDevice {
    let Some(path) = (unsafe { super::cstr_to_path(path) }) else {
        return std::ptr::null_mut();
    };

    let card = match DrmCard::open(&path) {
        Ok(card) => card,
        Err(err) => {
            log::error!("could not open {}: {err}", path.display());
            return std::ptr::null_mut();
        }
    };

    let device: Arc<dyn KmsDevice> = Arc::new(card);
    let router = Arc::new(FlipEventRouter::new(device));
    Box::into_raw(Box::new(KmsPresentDevice { router }))
}

#[unsafe(no_mangle)]
/// ### English
/// Closes a device opened by `kms_present_device_open`.
///
/// Surfaces created from this device keep the card open until they are destroyed.
///
/// ### 中文
/// 关闭由 `kms_present_device_open` 打开的设备。
///
/// 由该设备创建的 surface 会保持 card 打开，直到它们被销毁。
pub unsafe extern "C" fn kms_present_device_close(device: *mut KmsPresentDevice) {
    if device.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(device));
    }
}

#[unsafe(no_mangle)]
/// ### English
/// Reads pending flip-complete events and routes them to their surfaces.
///
/// Waits up to `timeout_ms` for the first event (`-1` = wait forever, `0` = poll). Returns the
/// number of completions delivered, or a negative status code; timeouts below `-1` are rejected
/// with `KMS_PRESENT_STATUS_INVALID_ARGUMENT`.
///
/// ### 中文
/// 读取待处理的翻转完成事件并路由到对应的 surface。
///
/// 最多等待 `timeout_ms` 毫秒（`-1` = 无限等待，`0` = 仅轮询）。返回投递的完成事件数量，
/// 失败时返回负数状态码；小于 `-1` 的超时会以 `KMS_PRESENT_STATUS_INVALID_ARGUMENT` 拒绝。
pub unsafe extern "C" fn kms_present_device_dispatch_events(
    device: *mut KmsPresentDevice,
    timeout_ms: i32,
) -> i32 {
    if device.is_null() {
        return KMS_PRESENT_STATUS_NULL_ARGUMENT;
    }

    let timeout = match timeout_ms {
        -1 => None,
        ms => match u64::try_from(ms) {
            Ok(ms) => Some(Duration::from_millis(ms)),
            Err(_) => return KMS_PRESENT_STATUS_INVALID_ARGUMENT,
        },
    };
    match unsafe { (*device).router.dispatch(timeout) } {
        Ok(count) => i32::try_from(count).unwrap_or(i32::MAX),
        Err(err) => {
            log::warn!("flip event dispatch failed: {err}");
            err.status_code()
        }
    }
}
