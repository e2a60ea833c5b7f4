use argon2::Config;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::db::admin::NewAdmin;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Largest batch of voting codes that can be generated in one request.
pub const MAX_CODE_BATCH: u32 = 1000;

/// Raw admin credentials, received from a user. These are never stored directly,
/// since the password is in plaintext.
#[derive(Clone, Deserialize, Serialize)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl TryFrom<AdminCredentials> for NewAdmin {
    type Error = Error;

    /// Convert [`AdminCredentials`] to a new admin by hashing the password.
    /// This enforces that the username is non-empty, and the password meets minimum length.
    fn try_from(cred: AdminCredentials) -> Result<Self, Self::Error> {
        let username = cred.username.trim();
        if username.is_empty() {
            return Err(Error::InvalidInput(
                "Admin username must not be empty".to_string(),
            ));
        }
        if cred.password.len() < MIN_PASSWORD_LENGTH {
            return Err(Error::InvalidInput(format!(
                "Admin password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }

        // 16 bytes is recommended for password hashing:
        //  https://en.wikipedia.org/wiki/Argon2
        let mut salt = [0_u8; 16];
        rand::thread_rng().fill(&mut salt);
        let password_hash =
            argon2::hash_encoded(cred.password.as_bytes(), &salt, &Config::default())?;
        Ok(Self {
            username: username.to_string(),
            password_hash,
        })
    }
}

/// A request to provision a batch of fresh voting codes.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct CodeBatchRequest {
    pub count: u32,
}

#[cfg(test)]
mod examples {
    use super::*;

    impl AdminCredentials {
        pub fn example1() -> Self {
            Self {
                username: "returning-officer".into(),
                password: "ballotbox4lyfe".into(),
            }
        }

        pub fn example2() -> Self {
            Self {
                username: "deputy".into(),
                password: "totallysecurepassword".into(),
            }
        }

        pub fn empty() -> Self {
            Self {
                username: "".into(),
                password: "".into(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_bad_credentials() {
        let short_password = AdminCredentials {
            username: "someone".into(),
            password: "short".into(),
        };
        assert!(matches!(
            NewAdmin::try_from(short_password),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            NewAdmin::try_from(AdminCredentials::empty()),
            Err(Error::InvalidInput(_))
        ));

        let admin = NewAdmin::try_from(AdminCredentials::example2()).unwrap();
        assert_eq!(admin.username, AdminCredentials::example2().username);
        assert_ne!(admin.password_hash, AdminCredentials::example2().password);
    }
}
