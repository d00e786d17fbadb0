//! Request authentication.
//!
//! Protected endpoints take an [`Auth`] extractor, which verifies the bearer
//! access token from the `Authorization` header and resolves the account it
//! names. `Auth<AdminOnly>` additionally requires the `ADMIN` role.
//!
//! The refresh token never travels in a header or a body: it lives in an
//! HttpOnly cookie scoped to the auth endpoints (see [`cookie`]).

mod cookie;
mod errors;
mod extractors;
mod ip;
mod state;
mod types;

pub use cookie::{
    REFRESH_COOKIE_NAME, REFRESH_COOKIE_PATH, clear_refresh_cookie, get_cookie, refresh_cookie,
};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{AdminOnly, AnyRole, Auth, RoleConstraint, authenticate, bearer_token};
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use state::HasAuthBackend;
pub use types::AuthenticatedUser;
