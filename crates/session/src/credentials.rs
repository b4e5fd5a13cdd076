//! Credentials identifying a principal to a remote API.
//!
//! Credentials are immutable cache keys. Equality and hashing cover the
//! identity, the secret and every extra attribute, so two logins that differ
//! only in e.g. the organisation get separate sessions. The secret is held in
//! a [`SecretString`] and never appears in `Debug` or `Display` output.

use authsession_config::CredentialsConfig;
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone)]
pub struct Credentials {
    identity: String,
    secret: SecretString,
    extra: BTreeMap<String, String>,
}

impl Credentials {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: SecretString::new(secret.into().into()),
            extra: BTreeMap::new(),
        }
    }

    /// Attach a provider-specific attribute (organisation, customer id, ...).
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The secret, for authenticator implementations that must send it.
    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    pub fn extra(&self) -> &BTreeMap<String, String> {
        &self.extra
    }

    pub fn extra_value(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }
}

impl From<CredentialsConfig> for Credentials {
    fn from(config: CredentialsConfig) -> Self {
        Self {
            identity: config.identity,
            secret: config.secret,
            extra: BTreeMap::new(),
        }
    }
}

impl PartialEq for Credentials {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
            && self.extra == other.extra
            && self.secret.expose_secret() == other.secret.expose_secret()
    }
}

impl Eq for Credentials {}

impl Hash for Credentials {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
        self.secret.expose_secret().hash(state);
        self.extra.hash(state);
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity)?;
        if !self.extra.is_empty() {
            let keys: Vec<&str> = self.extra.keys().map(String::as_str).collect();
            write!(f, " [{}]", keys.join(","))?;
        }
        Ok(())
    }
}
