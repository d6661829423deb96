//! Registry credentials handed to the image daemon's push API.

use serde::{Deserialize, Serialize};

/// Username/password pair for an image registry.
///
/// Serialized with the lowercase keys the daemon's `X-Registry-Auth` header
/// expects.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serveraddress: Option<String>,
}

impl std::fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("email", &self.email)
            .field("serveraddress", &self.serveraddress)
            .finish()
    }
}
