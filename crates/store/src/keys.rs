use sentinel_core_types::{Hash, Height};
use sentinel_datastore::Key;

pub fn head() -> Key {
    Key::new("/header_store/head")
}

pub fn header(height: Height) -> Key {
    // Zero-padded so that lexicographic key order matches height order
    Key::new(format!("/header_store/headers/{:020}", height.as_u64()))
}

pub fn index(hash: &Hash) -> Key {
    Key::new(format!("/header_store/index/{hash}"))
}

pub fn encode_height(height: Height) -> [u8; 8] {
    height.as_u64().to_be_bytes()
}

pub fn decode_height(bytes: &[u8]) -> Option<Height> {
    let array = <[u8; 8]>::try_from(bytes).ok()?;
    Some(Height::new(u64::from_be_bytes(array)))
}
