pub mod auth;
pub mod email;
pub mod token;
pub mod users;
pub mod validation;

pub use auth::{AuthService, AuthSession};
pub use email::{EmailService, MailMessage, MailTransport, NotifyError, RelayTransport};
pub use token::{AuthTokens, TokenService};
pub use users::{NewUser, UserListing, UserPatch, UserService};
