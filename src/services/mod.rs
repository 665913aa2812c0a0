//! Services separating I/O, export and progress concerns from the pipeline

pub mod format;
pub mod io;
pub mod progress;

pub use format::OutputFormatHandler;
pub use io::ImageIOService;
pub use progress::{
    download_progress, ChannelProgressReporter, ConsoleProgressReporter, NoOpProgressReporter,
    ProcessingStage, ProcessingStatus, ProgressEvent, ProgressReporter, ProgressUpdate,
};
