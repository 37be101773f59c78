// store

mod key_value_store;

pub use key_value_store::*;

// repo

mod user_directory;

pub use user_directory::*;
