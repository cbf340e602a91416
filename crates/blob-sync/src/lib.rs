pub mod error;
pub mod fetcher;
pub mod serde_helpers;
pub mod sidecar;
pub mod store;
pub mod sync;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use error::*;
pub use fetcher::*;
pub use sidecar::*;
pub use store::*;
pub use sync::*;
pub use traits::*;
pub use types::*;

pub use tokio_util::sync::CancellationToken;
