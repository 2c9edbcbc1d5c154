use uuid::Uuid;

use crate::error::ServiceError;

pub const DEFAULT_USER_ID: &str = "default-user";

const MAX_USER_ID_BYTES: usize = 256;

/// A caller identity must be non-empty, at most 256 bytes, and contain no
/// control bytes below 0x20.
pub fn validate_user_id(user_id: &str) -> Result<(), ServiceError> {
    if user_id.is_empty() {
        return Err(ServiceError::invalid_argument("user id must not be empty"));
    }
    if user_id.len() > MAX_USER_ID_BYTES {
        return Err(ServiceError::invalid_argument(format!(
            "user id exceeds {} bytes",
            MAX_USER_ID_BYTES
        )));
    }
    if user_id.bytes().any(|b| b < 0x20) {
        return Err(ServiceError::invalid_argument(
            "user id contains control characters",
        ));
    }
    Ok(())
}

/// Fresh session id: `sess_` + the first 8 hex chars of a v4 UUID.
pub fn new_session_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("sess_{}", &uuid[..8])
}
