pub mod registration;
pub mod session;
pub mod social;

pub use registration::{register, send_code};
pub use session::{login, logout, me};
pub use social::{google_callback, google_login};
