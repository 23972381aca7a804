pub use primitive_types::{H160, H256, U256};

/// Milliseconds since the unix epoch.
pub type UnixMillis = u64;

/// Current wall-clock time in milliseconds.
pub fn now_millis() -> UnixMillis {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as UnixMillis)
        .unwrap_or_default()
}
