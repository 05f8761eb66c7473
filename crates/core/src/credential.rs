use crate::fetch::FetchError;
use std::fmt;

/// Environment variable holding the generation provider's API key.
pub const API_KEY_VAR: &str = "GENERATIVE_API_KEY";

/// Where the generation provider's secret comes from.
///
/// The key is resolved on every call rather than captured at startup, so a
/// missing key surfaces as a per-request configuration error.
#[derive(Clone)]
pub enum Credential {
    /// Read from the named environment variable each time it is needed.
    Env(String),
    /// A fixed key, mostly useful for tests and embedding.
    Static(String),
}

impl Credential {
    /// The default credential source: the `GENERATIVE_API_KEY` variable.
    pub fn from_env() -> Self {
        Self::Env(API_KEY_VAR.to_string())
    }

    /// Returns the key, or `FetchError::MissingCredential` when it is unset or blank.
    pub fn resolve(&self) -> Result<String, FetchError> {
        let (name, value) = match self {
            Credential::Env(var) => (var.as_str(), std::env::var(var).ok()),
            Credential::Static(key) => ("static key", Some(key.clone())),
        };
        value
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| FetchError::MissingCredential(name.to_string()))
    }

    pub fn is_configured(&self) -> bool {
        self.resolve().is_ok()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Env(var) => f.debug_tuple("Env").field(var).finish(),
            Credential::Static(_) => f.debug_tuple("Static").field(&"[REDACTED]").finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_credential_resolves() {
        let credential = Credential::Static("secret-key".to_string());
        assert_eq!(credential.resolve().unwrap(), "secret-key");
        assert!(credential.is_configured());
    }

    #[test]
    fn blank_static_credential_is_missing() {
        let credential = Credential::Static("   ".to_string());
        assert!(matches!(
            credential.resolve(),
            Err(FetchError::MissingCredential(_))
        ));
    }

    #[test]
    fn unset_env_credential_names_the_variable() {
        let credential = Credential::Env("STORYBOOK_TEST_UNSET_KEY_9F2A".to_string());
        match credential.resolve() {
            Err(FetchError::MissingCredential(name)) => {
                assert_eq!(name, "STORYBOOK_TEST_UNSET_KEY_9F2A")
            }
            other => panic!("Expected MissingCredential, got {:?}", other),
        }
    }

    #[test]
    fn debug_output_never_shows_static_key() {
        let credential = Credential::Static("super-secret".to_string());
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }
}
