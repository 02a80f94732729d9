pub mod auth;
pub mod codes;
pub mod email;
pub mod error;
pub mod google;
pub mod identity;
pub mod session;

pub use auth::AuthService;
pub use codes::{CodePolicy, CodeStore, MemoryCodeStore, PgCodeStore};
pub use email::{EmailProvider, MockEmailService, SmtpEmailService};
pub use error::ServiceError;
pub use google::{GoogleAuth, GoogleOauthClient, GoogleProfile, MockGoogleAuth};
pub use identity::{IdentityStore, MemoryIdentityStore, PgIdentityStore};
pub use session::{MemorySessionStore, RedisSessionStore, SessionPolicy, SessionStore};
