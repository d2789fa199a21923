//! Host desktop backends.

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
mod process;

#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "macos")]
pub use macos::MacDesktop as NativeDesktop;

#[cfg(not(target_os = "macos"))]
mod unsupported;
#[cfg(not(target_os = "macos"))]
pub use unsupported::UnsupportedDesktop as NativeDesktop;
