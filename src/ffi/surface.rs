//! ### English
//! C ABI bindings for surface lifecycle and the acquire / present / release protocol.
//!
//! ### 中文
//! surface 生命周期以及获取 / 呈现 / 释放协议的 C ABI 绑定。

use std::sync::Arc;

use dpi::{PhysicalPosition, PhysicalSize};

use super::{
    KMS_PRESENT_STATUS_NULL_ARGUMENT, KMS_PRESENT_STATUS_QUEUED, KMS_PRESENT_STATUS_SKIPPED,
    KmsPresentBuffer, KmsPresentDevice, KmsPresentMode, KmsPresentRect, KmsPresentSurface,
};
use crate::engine::flags::KMS_PRESENT_SURFACE_FLAGS_ALL;
use crate::engine::{DamageRect, DisplayConfig, KmsSurface, PresentConfig, PresentOutcome};

#[unsafe(no_mangle)]
/// ### English
/// Creates a surface that drives `crtc_id` → `connector_id` with `mode`.
///
/// No buffer is allocated until the first acquire/present. `surface_flags` is a bitmask of
/// `KMS_PRESENT_SURFACE_FLAG_*`; unknown bits are ignored. Returns NULL on invalid arguments.
///
/// ### 中文
/// 创建一个以 `mode` 驱动 `crtc_id` → `connector_id` 的 surface。
///
/// 首次获取/呈现之前不会分配任何缓冲区。`surface_flags` 为 `KMS_PRESENT_SURFACE_FLAG_*` 位掩码；
/// 未知位会被忽略。参数非法时返回 NULL。
pub unsafe extern "C" fn kms_present_surface_create(
    device: *mut KmsPresentDevice,
    width: u32,
    height: u32,
    crtc_id: u32,
    connector_id: u32,
    mode: *const KmsPresentMode,
    surface_flags: u32,
) -> *mut KmsPresentSurface {
    if device.is_null() || mode.is_null() {
        return std::ptr::null_mut();
    }

    if surface_flags & !KMS_PRESENT_SURFACE_FLAGS_ALL != 0 {
        log::debug!("ignoring unknown surface flags {surface_flags:#x}");
    }

    let router = unsafe { Arc::clone(&(*device).router) };
    let display = DisplayConfig {
        crtc_id,
        connector_id,
        mode: unsafe { &*mode }.into(),
    };
    let surface = KmsSurface::new(
        router,
        display,
        PhysicalSize::new(width, height),
        PresentConfig::from_flags(surface_flags),
    );
    let Ok(surface) = surface.inspect_err(|err| log::error!("could not create surface: {err}"))
    else {
        return std::ptr::null_mut();
    };

    Box::into_raw(Box::new(KmsPresentSurface { surface }))
}

#[unsafe(no_mangle)]
/// ### English
/// Destroys a surface created by `kms_present_surface_create` (releasing it first).
///
/// ### 中文
/// 销毁由 `kms_present_surface_create` 创建的 surface（会先释放它）。
pub unsafe extern "C" fn kms_present_surface_destroy(surface: *mut KmsPresentSurface) {
    if surface.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(surface));
    }
}

#[unsafe(no_mangle)]
/// ### English
/// Returns the buffer software should draw the next frame into. Never blocks.
///
/// Binds the display on first use. Returns `0` and fills `out_buffer` on success; on failure
/// `out_buffer` is zeroed and a negative status code is returned.
///
/// ### 中文
/// 返回软件绘制下一帧所用的缓冲区。从不阻塞。
///
/// 首次使用时绑定显示。成功时返回 `0` 并填充 `out_buffer`；失败时 `out_buffer` 被清零并返回负数状态码。
pub unsafe extern "C" fn kms_present_surface_acquire(
    surface: *mut KmsPresentSurface,
    out_buffer: *mut KmsPresentBuffer,
) -> i32 {
    if surface.is_null() || out_buffer.is_null() {
        return KMS_PRESENT_STATUS_NULL_ARGUMENT;
    }

    unsafe { std::ptr::write_bytes(out_buffer, 0, 1) };
    match unsafe { (*surface).surface.acquire_writable_buffer() } {
        Ok(buffer) => {
            unsafe { *out_buffer = buffer.into() };
            0
        }
        Err(err) => {
            log::error!("could not acquire writable buffer: {err}");
            err.status_code()
        }
    }
}

#[unsafe(no_mangle)]
/// ### English
/// Flips the current front buffer to the screen.
///
/// `rects` may be NULL when `count == 0`. Returns `KMS_PRESENT_STATUS_QUEUED` (0),
/// `KMS_PRESENT_STATUS_SKIPPED` (1) if the previous flip did not complete in time, or a
/// negative status code.
///
/// ### 中文
/// 将当前 front 缓冲区翻转到屏幕。
///
/// `count == 0` 时 `rects` 可为 NULL。返回 `KMS_PRESENT_STATUS_QUEUED`（0）；上一次翻转未及时完成时返回
/// `KMS_PRESENT_STATUS_SKIPPED`（1）；失败时返回负数状态码。
pub unsafe extern "C" fn kms_present_surface_present(
    surface: *mut KmsPresentSurface,
    rects: *const KmsPresentRect,
    count: u32,
) -> i32 {
    if surface.is_null() || (rects.is_null() && count != 0) {
        return KMS_PRESENT_STATUS_NULL_ARGUMENT;
    }

    let damage: Vec<DamageRect> = if count == 0 {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(rects, count as usize) }
            .iter()
            .map(|rect| DamageRect {
                origin: PhysicalPosition::new(rect.x, rect.y),
                size: PhysicalSize::new(rect.width, rect.height),
            })
            .collect()
    };

    match unsafe { (*surface).surface.present(&damage) } {
        Ok(PresentOutcome::Queued { .. }) => KMS_PRESENT_STATUS_QUEUED,
        Ok(PresentOutcome::Skipped) => KMS_PRESENT_STATUS_SKIPPED,
        Err(err) => {
            log::error!("present failed: {err}");
            err.status_code()
        }
    }
}

#[unsafe(no_mangle)]
/// ### English
/// Tears down the surface's buffer ring and unbinds it. Idempotent; the surface stays valid and
/// binds again on the next acquire/present.
///
/// ### 中文
/// 拆除 surface 的缓冲环并解除绑定。幂等；surface 仍然有效，下次获取/呈现时会重新绑定。
pub unsafe extern "C" fn kms_present_surface_release(surface: *mut KmsPresentSurface) {
    if surface.is_null() {
        return;
    }

    unsafe { (*surface).surface.release() };
}
