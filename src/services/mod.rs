//! Service layer separating I/O, persistence and progress from the pipeline
//!
//! - `io`: decoding request images and encoding results
//! - `gallery`: collision-free artifact storage and listing
//! - `progress`: progress reporting abstractions

pub mod gallery;
pub mod io;
pub mod progress;

pub use gallery::GalleryStore;
pub use io::ImageIOService;
pub use progress::{
    ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage, ProgressReporter,
    ProgressTracker, ProgressUpdate,
};
