use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use subtle::{Choice, ConstantTimeEq};

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub anonymous: bool,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            name: "anonymous".into(),
            anonymous: true,
        }
    }

    pub fn user(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            anonymous: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    Anonymous,
}

impl Credentials {
    /// Read `Authorization: Bearer <token>`; anything else is anonymous.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| Self::Bearer(token.trim().to_string()))
            .unwrap_or(Self::Anonymous)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    SetConsent { subject: String },
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SetConsent { subject } => write!(f, "set-consent:{subject}"),
        }
    }
}

/// Access control for consent writes. Reads are not gated.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity>;
    async fn authorize(&self, identity: &Identity, action: &Action) -> ServerResult<bool>;
}

pub struct AllowAllAuth;

#[async_trait]
impl AuthProvider for AllowAllAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::Bearer(token) => Ok(Identity::user(format!("bearer:{}", prefix(token)))),
            Credentials::Anonymous => Ok(Identity::anonymous()),
        }
    }

    async fn authorize(&self, _identity: &Identity, _action: &Action) -> ServerResult<bool> {
        Ok(true)
    }
}

/// Static bearer tokens; anonymous callers may not write.
pub struct TokenAuth {
    tokens: Vec<String>,
}

impl TokenAuth {
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        let mut tokens: Vec<String> = tokens.into_iter().collect();
        tokens.sort();
        tokens.dedup();
        Self { tokens }
    }

    /// Constant-time check against every configured token.
    fn accepts(&self, presented: &str) -> bool {
        let matched = self
            .tokens
            .iter()
            .fold(Choice::from(0), |found, token| {
                found | token.as_bytes().ct_eq(presented.as_bytes())
            });
        bool::from(matched)
    }
}

#[async_trait]
impl AuthProvider for TokenAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::Bearer(token) if self.accepts(token) => {
                Ok(Identity::user(format!("token:{}", prefix(token))))
            }
            Credentials::Bearer(_) => Err(ServerError::AuthFailed("unknown token".into())),
            Credentials::Anonymous => Ok(Identity::anonymous()),
        }
    }

    async fn authorize(&self, identity: &Identity, _action: &Action) -> ServerResult<bool> {
        Ok(!identity.anonymous)
    }
}

/// Enough of a token to tell callers apart in logs.
fn prefix(token: &str) -> String {
    token.chars().take(8).collect()
}
