//! Push authentication.
//!
//! The proxy only asks "who is this request from"; where accounts live is up
//! to the [`Authenticator`] it is given.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::gitproxy::error::AuthError;

/// An authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub login: String,
    pub admin: bool,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `Ok(None)` when the request carries no valid credentials.
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Option<User>, AuthError>;
}

/// A configured account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub admin: bool,
}

/// HTTP Basic against a fixed list of accounts.
#[derive(Debug, Clone, Default)]
pub struct BasicAuthenticator {
    accounts: Vec<Account>,
}

impl BasicAuthenticator {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self { accounts }
    }

    fn check(&self, username: &str, password: &str) -> Option<User> {
        self.accounts
            .iter()
            .find(|a| a.username == username && a.password == password)
            .map(|a| User {
                login: a.username.clone(),
                admin: a.admin,
            })
    }
}

/// `(username, password)` from an `Authorization: Basic` header.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

#[async_trait]
impl Authenticator for BasicAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Option<User>, AuthError> {
        Ok(basic_credentials(headers).and_then(|(username, password)| self.check(&username, &password)))
    }
}
