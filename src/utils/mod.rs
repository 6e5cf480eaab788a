//! Utility modules for image preparation

pub mod edges;
pub mod preprocessing;

// Re-export commonly used items for convenience
pub use preprocessing::{ImagePreprocessor, PreparedEdit, PreprocessingOptions};
