//! Types shared by every Sentinel component: block heights, header hashes
//! and the [`ExtendedHeader`] itself.

mod hash;
pub use hash::{Hash, HashError};

mod header;
pub use header::{ChainId, ExtendedHeader, HeaderError};

mod height;
pub use height::Height;

/// Type alias to make it easier to work with boxed errors at trait boundaries.
pub type BoxError = Box<dyn core::error::Error + Send + Sync + 'static>;
