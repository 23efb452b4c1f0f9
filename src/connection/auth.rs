use crate::core::{DocError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;

/// Username/password pair decoded from a credential token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    const SCHEME: &'static str = "Basic";

    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Decodes `"Basic <base64(user:pass)>"`. The scheme word is optional.
    ///
    /// The password is everything after the first `:`, so it may itself
    /// contain colons.
    pub fn decode(token: &str) -> Result<Self> {
        let token = token.trim();
        let encoded = match token.split_once(' ') {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case(Self::SCHEME) => rest.trim(),
            Some((scheme, _)) => {
                return Err(DocError::InvalidCredentials(format!(
                    "unsupported scheme '{}'",
                    scheme
                )));
            }
            None => token,
        };

        if encoded.is_empty() {
            return Err(DocError::InvalidCredentials("empty token".to_string()));
        }

        let bytes = STANDARD.decode(encoded)?;
        let plain = String::from_utf8(bytes)
            .map_err(|_| DocError::InvalidCredentials("token is not valid UTF-8".to_string()))?;

        let (username, password) = plain.split_once(':').ok_or_else(|| {
            DocError::InvalidCredentials("expected 'username:password'".to_string())
        })?;

        if username.is_empty() {
            return Err(DocError::InvalidCredentials("username cannot be empty".to_string()));
        }

        Ok(Self::new(username, password))
    }

    /// Encodes back into a `Basic` token.
    pub fn encode(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("{} {}", Self::SCHEME, STANDARD.encode(raw))
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}
