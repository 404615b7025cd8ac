mod downloader;
mod envelope_verifier;
mod error;
mod notification_decoder;
mod notification_service;

pub use downloader::*;
pub use envelope_verifier::*;
pub use error::*;
pub use notification_decoder::*;
pub use notification_service::*;
