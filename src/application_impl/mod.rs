mod counter_rate_limiter;
mod jwt_codec;
mod local_rate_limiter;
mod refresh_store;
mod request_throttle;
mod session_service_impl;

pub use counter_rate_limiter::*;
pub use jwt_codec::*;
pub use local_rate_limiter::*;
pub use refresh_store::*;
pub use request_throttle::*;
pub use session_service_impl::*;
