use std::sync::Arc;

use sentinel_core_types::{ChainId, ExtendedHeader, Hash, Height};
use sentinel_datastore::MemoryDatastore;
use sentinel_store::{Params, Store};

const GENESIS_TIME: u64 = 1_700_000_000_000;

/// Generates a chain of valid, linked headers.
///
/// Suites created with a different salt produce different chains,
/// which is how tests build peers that lie about a range.
#[derive(Clone, Debug)]
pub struct HeaderSuite {
    chain_id: ChainId,
    salt: u64,
    headers: Vec<ExtendedHeader>,
}

impl HeaderSuite {
    pub fn new() -> Self {
        Self::forked(0)
    }

    /// A suite producing a chain that differs from the default one from height 1.
    pub fn forked(salt: u64) -> Self {
        Self {
            chain_id: ChainId::new("test"),
            salt,
            headers: Vec::new(),
        }
    }

    /// A suite sharing the first `height` headers of this one,
    /// and diverging from it afterwards.
    pub fn fork_at(&self, height: u64, salt: u64) -> Self {
        Self {
            chain_id: self.chain_id.clone(),
            salt,
            headers: self.headers[..height as usize].to_vec(),
        }
    }

    pub fn next(&mut self) -> ExtendedHeader {
        let height = Height::new(self.headers.len() as u64 + 1);
        let last_hash = self.headers.last().map(|h| h.hash()).unwrap_or_default();

        let header = ExtendedHeader::new(
            self.chain_id.clone(),
            height,
            GENESIS_TIME + height.as_u64() * 1000,
            last_hash,
            Hash::digest(format!("data-{}-{height}", self.salt)),
            Hash::digest(b"validators"),
            height.as_u64().to_be_bytes().to_vec(),
        );

        self.headers.push(header.clone());
        header
    }

    /// Generate the next `n` headers.
    pub fn generate(&mut self, n: usize) -> Vec<ExtendedHeader> {
        (0..n).map(|_| self.next()).collect()
    }

    /// The generated header at the given height.
    ///
    /// # Panics
    /// If no header was generated at this height.
    pub fn header(&self, height: u64) -> ExtendedHeader {
        self.headers[height as usize - 1].clone()
    }

    /// The generated headers in `from..=to`.
    pub fn range(&self, from: u64, to: u64) -> Vec<ExtendedHeader> {
        self.headers[from as usize - 1..to as usize].to_vec()
    }

    pub fn headers(&self) -> &[ExtendedHeader] {
        &self.headers
    }

    pub fn head(&self) -> Option<&ExtendedHeader> {
        self.headers.last()
    }
}

impl Default for HeaderSuite {
    fn default() -> Self {
        Self::new()
    }
}

/// An in-memory store holding the given headers, which must start at height 1.
///
/// # Panics
/// If the headers cannot be appended.
pub async fn memory_store(headers: &[ExtendedHeader]) -> Store {
    let store = Store::new(Arc::new(MemoryDatastore::new()), Params::default())
        .expect("failed to open store");

    store
        .append(headers.to_vec())
        .await
        .map_err(|(_, e)| e)
        .expect("failed to append headers");

    store
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_linked() {
        let mut suite = HeaderSuite::new();
        let headers = suite.generate(3);

        for header in &headers {
            header.validate_basic().unwrap();
        }

        headers[1].verify_adjacent(&headers[0]).unwrap();
        headers[2].verify_adjacent(&headers[1]).unwrap();
    }

    #[test]
    fn forks_diverge() {
        let mut suite = HeaderSuite::new();
        suite.generate(5);

        let mut fork = suite.fork_at(3, 1);
        let forked = fork.generate(2);

        assert_eq!(fork.header(3), suite.header(3));
        assert_ne!(forked[0].hash(), suite.header(4).hash());
        forked[0].verify_adjacent(&suite.header(3)).unwrap();
    }
}
