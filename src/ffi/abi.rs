use crate::engine::flags;

#[unsafe(no_mangle)]
/// ### English
/// Returns the C ABI version.
///
/// ### 中文
/// 返回 C ABI 版本号。
pub extern "C" fn kms_present_abi_version() -> u32 {
    super::KMS_PRESENT_ABI_VERSION
}

#[unsafe(no_mangle)]
/// ### English
/// Returns `KMS_PRESENT_SURFACE_FLAG_TRIPLE_BUFFER`.
/// (Constant getter for bindings that do not read C headers.)
///
/// ### 中文
/// 返回 `KMS_PRESENT_SURFACE_FLAG_TRIPLE_BUFFER`。
/// （供不读取 C 头文件的绑定使用的常量获取函数。）
pub extern "C" fn kms_present_surface_flag_triple_buffer() -> u32 {
    flags::KMS_PRESENT_SURFACE_FLAG_TRIPLE_BUFFER
}

#[unsafe(no_mangle)]
/// ### English
/// Returns `KMS_PRESENT_SURFACE_FLAG_NONBLOCKING_PRESENT`.
/// (Constant getter for bindings that do not read C headers.)
///
/// ### 中文
/// 返回 `KMS_PRESENT_SURFACE_FLAG_NONBLOCKING_PRESENT`。
/// （供不读取 C 头文件的绑定使用的常量获取函数。）
pub extern "C" fn kms_present_surface_flag_nonblocking_present() -> u32 {
    flags::KMS_PRESENT_SURFACE_FLAG_NONBLOCKING_PRESENT
}
