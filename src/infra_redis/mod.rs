mod key_value_store_redis;

pub use key_value_store_redis::*;
