pub mod session;
pub mod user;
pub mod verification_code;

pub use session::Session;
pub use user::User;
pub use verification_code::VerificationCode;
