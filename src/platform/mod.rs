// src/platform/mod.rs
#[cfg(target_os = "macos")]
pub mod macos;
