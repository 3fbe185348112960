pub mod config;
pub mod engine;
pub mod error;
pub mod policy;
pub mod progress;
pub mod remote;
pub mod retry;
pub mod storage;
pub mod verify;

pub use config::AppConfig;
pub use engine::{PassReport, SingleOutcome, SyncEngine};
pub use error::{Error, RemoteError};
pub use progress::{Phase, ProgressReporter, SilentReporter};
pub use remote::{QbitClient, RemoteEndpoint};

/// Bytes per GiB; sizes and thresholds are expressed in GB of 2^30 bytes.
pub const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
