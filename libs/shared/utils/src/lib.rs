pub mod retry;
pub mod test_config;
pub mod ttl_cache;

pub use retry::retry_with_backoff;
pub use ttl_cache::TtlCache;
