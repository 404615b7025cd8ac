pub mod aws;
pub mod consumer;
pub mod domain;
pub mod telemetry;

pub use aws::*;
pub use consumer::*;
pub use domain::*;
pub use telemetry::*;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockObjectStore;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockQueue;
