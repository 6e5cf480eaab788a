//! Backend implementations for the generation capability
//!
//! - WebUI/Forge HTTP backend (ControlNet canny for structure, IP-Adapter for references)
//!
//! Object detectors have no built-in backend and are injected through a
//! [`BackendFactory`](crate::context::BackendFactory).

pub mod webui;

// Test utilities for backend testing
#[cfg(test)]
pub mod test_utils;

pub use self::webui::WebUiBackend;
