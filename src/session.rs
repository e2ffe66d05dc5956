//! Keys stored in the cookie session.

pub const USER_ID: &str = "user_id";
pub const ROLE: &str = "role";
pub const DISPLAY_NAME: &str = "display_name";
