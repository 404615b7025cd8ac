mod client;
mod error;
mod s3_object_store;
mod sqs_queue;

pub use client::*;
pub use error::*;
pub use s3_object_store::*;
pub use sqs_queue::*;
