mod error;
mod object_store;
mod queue;

pub use error::*;
pub use object_store::*;
pub use queue::*;
