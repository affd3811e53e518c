use async_trait::async_trait;

use sentinel_core_types::{BoxError, ExtendedHeader, Height};
use sentinel_store::Store;

/// Access to the headers proofs are validated against.
#[async_trait]
pub trait HeaderGetter: Send + Sync + 'static {
    /// The header at the given height, or `None` if it is not known (yet).
    async fn get_by_height(&self, height: Height) -> Result<Option<ExtendedHeader>, BoxError>;
}

#[async_trait]
impl HeaderGetter for Store {
    async fn get_by_height(&self, height: Height) -> Result<Option<ExtendedHeader>, BoxError> {
        match Store::get_by_height(self, height).await {
            Ok(header) => Ok(Some(header)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
