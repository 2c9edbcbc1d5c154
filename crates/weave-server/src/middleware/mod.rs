pub mod identity;

pub use identity::{extract_user_id, IdentityMiddleware, UserId};
