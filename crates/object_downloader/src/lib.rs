pub mod domain;
pub mod object_downloader;
pub mod queue;

pub use domain::*;
pub use object_downloader::*;
pub use queue::*;
