//! Authentication user types.

use crate::db::UserRole;

/// Identity resolved by the authentication gate, handed to handlers as an
/// explicit value. Carries no credential fields.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Subject UUID
    pub id: String,
    /// Role as currently stored, not as it was when the token was issued
    pub role: UserRole,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}
