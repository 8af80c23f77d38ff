//! Role checks applied by handlers after authentication.

use crate::db::Role;
use crate::error::{AppError, Result};
use crate::middleware::AuthenticatedUser;

pub fn require_role(user: &AuthenticatedUser, required: Role) -> Result<()> {
    if user.role.satisfies(required) {
        Ok(())
    } else {
        log::warn!(
            "User {} with role {} denied, {} required",
            user.subject_id,
            user.role,
            required
        );
        Err(AppError::permission_denied("Forbidden"))
    }
}

/// Passes when the caller is the target identity or holds `required`.
pub fn require_self_or_role(user: &AuthenticatedUser, target_id: &str, required: Role) -> Result<()> {
    if user.subject_id == target_id {
        return Ok(());
    }
    require_role(user, required)
}
