mod key_value_store_memory;
mod user_directory_memory;

pub use key_value_store_memory::*;
pub use user_directory_memory::*;
