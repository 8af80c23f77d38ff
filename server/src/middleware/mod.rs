pub mod auth;
pub mod logging;
pub mod rate_limit;
pub mod recovery;
pub mod status_hint;

pub use auth::{auth_middleware, AuthenticatedUser, PublicRoutes};
pub use logging::logging_middleware;
pub use rate_limit::{client_identity, rate_limit_middleware, RateLimiter};
pub use recovery::{install_panic_hook, recovery_middleware};
pub use status_hint::{hint_status, status_hint_middleware, STATUS_HINT_HEADER};
