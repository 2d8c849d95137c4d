//! Caller identity.
//!
//! Every mutating route carries an `actorCredential`. A [`Credentials`]
//! implementation turns it into the acting address; the custody service then
//! decides what that address may do. The registry is injected into
//! [`crate::state::AppState`], never global.

use std::collections::HashMap;

use psc_config::secrets::ResolvedTokens;
use psc_schemas::{Address, CoreError, CoreResult};

pub trait Credentials: Send + Sync {
    /// `Unauthorized` for anything that does not identify an actor.
    fn resolve(&self, credential: &str) -> CoreResult<Address>;

    fn mode(&self) -> &'static str;
}

/// The credential is the address itself. For local demos and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressCredentials;

impl Credentials for AddressCredentials {
    fn resolve(&self, credential: &str) -> CoreResult<Address> {
        if credential.trim().is_empty() {
            return Err(CoreError::unauthorized("actorCredential is required"));
        }
        Address::parse(credential)
            .map_err(|_| CoreError::unauthorized("actorCredential is not a valid address"))
    }

    fn mode(&self) -> &'static str {
        "address"
    }
}

/// Opaque bearer tokens, each bound to one address at startup.
pub struct TokenCredentials {
    by_token: HashMap<String, Address>,
}

impl TokenCredentials {
    pub fn new(pairs: impl IntoIterator<Item = (String, Address)>) -> Self {
        Self {
            by_token: pairs.into_iter().collect(),
        }
    }

    pub fn from_resolved(tokens: &ResolvedTokens) -> CoreResult<Self> {
        let mut by_token = HashMap::with_capacity(tokens.len());
        for (token, address) in tokens.iter() {
            by_token.insert(token.to_string(), Address::parse(address)?);
        }
        Ok(Self { by_token })
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }
}

impl Credentials for TokenCredentials {
    fn resolve(&self, credential: &str) -> CoreResult<Address> {
        let t = credential.trim();
        if t.is_empty() {
            return Err(CoreError::unauthorized("actorCredential is required"));
        }
        self.by_token
            .get(t)
            .cloned()
            .ok_or_else(|| CoreError::unauthorized("unknown actorCredential"))
    }

    fn mode(&self) -> &'static str {
        "token"
    }
}
