mod rate_limiter;
mod session_service;
mod token_codec;

pub use rate_limiter::*;
pub use session_service::*;
pub use token_codec::*;
