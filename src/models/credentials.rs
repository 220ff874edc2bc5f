//! Portal login credentials.

use std::fmt;

/// Username and password for one portal account.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Username qualified with an authentication domain (`DOMAIN\user`).
    pub fn qualified_username(&self, domain: &str) -> String {
        if domain.is_empty() {
            self.username.clone()
        } else {
            format!("{}\\{}", domain, self.username)
        }
    }
}

// Keeps the password out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}
