//! Runtime resolution of credential tokens.
//!
//! YAML carries env var NAMES (`credentials.tokens[].token_env`). Values are
//! read here, once, at startup. Token values never appear in `Debug` output,
//! logs or error messages.

use std::collections::BTreeSet;
use std::fmt;

use anyhow::{bail, Result};

use crate::{CredentialMode, CredentialSettings};

/// Tokens bound to the addresses they authenticate.
#[derive(Clone, Default)]
pub struct ResolvedTokens {
    bindings: Vec<(String, String)>,
}

impl ResolvedTokens {
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// `(token, address)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(t, a)| (t.as_str(), a.as_str()))
    }
}

impl fmt::Debug for ResolvedTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addrs: Vec<&str> = self.bindings.iter().map(|(_, a)| a.as_str()).collect();
        f.debug_struct("ResolvedTokens")
            .field("addresses", &addrs)
            .field("tokens", &"<REDACTED>")
            .finish()
    }
}

/// Read an env var, treating unset and blank the same.
pub fn resolve_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub fn resolve_tokens(creds: &CredentialSettings) -> Result<ResolvedTokens> {
    resolve_tokens_with(creds, resolve_env)
}

/// In `address` mode nothing is read. In `token` mode every named env var
/// must be set and every token distinct.
pub fn resolve_tokens_with(
    creds: &CredentialSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedTokens> {
    if creds.mode == CredentialMode::Address {
        return Ok(ResolvedTokens::default());
    }

    let mut seen = BTreeSet::new();
    let mut bindings = Vec::with_capacity(creds.tokens.len());
    for b in &creds.tokens {
        let Some(token) = lookup(&b.token_env).filter(|v| !v.trim().is_empty()) else {
            bail!(
                "SECRETS_MISSING mode=token: required env var '{}' (token for {}) is not set or empty",
                b.token_env,
                b.address
            );
        };
        let token = token.trim().to_string();
        if !seen.insert(token.clone()) {
            bail!(
                "SECRETS_DUPLICATE: env var '{}' holds a token already bound to another address",
                b.token_env
            );
        }
        bindings.push((token, b.address.clone()));
    }
    Ok(ResolvedTokens { bindings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TokenBinding;

    fn token_mode() -> CredentialSettings {
        CredentialSettings {
            mode: CredentialMode::Token,
            tokens: vec![
                TokenBinding {
                    address: "0x00000000000000000000000000000000000000f1".into(),
                    token_env: "PSC_TOKEN_FDA".into(),
                },
                TokenBinding {
                    address: "0x00000000000000000000000000000000000000a1".into(),
                    token_env: "PSC_TOKEN_SUPPLIER".into(),
                },
            ],
        }
    }

    #[test]
    fn address_mode_reads_nothing() {
        let r = resolve_tokens_with(&CredentialSettings::default(), |_| {
            panic!("must not read env")
        })
        .unwrap();
        assert!(r.is_empty());
    }

    #[test]
    fn missing_var_names_the_var_not_the_value() {
        let err = resolve_tokens_with(&token_mode(), |k| {
            (k == "PSC_TOKEN_FDA").then(|| "fda-token-value".to_string())
        })
        .unwrap_err()
        .to_string();
        assert!(err.contains("PSC_TOKEN_SUPPLIER"));
        assert!(!err.contains("fda-token-value"));
    }

    #[test]
    fn debug_is_redacted() {
        let r = resolve_tokens_with(&token_mode(), |k| Some(format!("tok-{k}"))).unwrap();
        assert_eq!(r.len(), 2);
        let dbg = format!("{r:?}");
        assert!(!dbg.contains("tok-"));
        assert!(dbg.contains("REDACTED"));
    }

    #[test]
    fn shared_token_is_rejected() {
        let err = resolve_tokens_with(&token_mode(), |_| Some("same".into())).unwrap_err();
        assert!(err.to_string().contains("SECRETS_DUPLICATE"));
    }
}
