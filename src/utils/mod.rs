mod password;
mod validation;

pub use password::{
    hash_password, hash_password_sync, verify_password, verify_password_sync, Password,
    PasswordHashString,
};
pub use validation::ValidatedJson;
