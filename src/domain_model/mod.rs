mod claims;
mod throttle;
mod user;

pub use claims::*;
pub use throttle::*;
pub use user::*;
