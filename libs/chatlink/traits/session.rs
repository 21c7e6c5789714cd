use serde::{Deserialize, Serialize};

/// Authentication state published by the auth collaborator
///
/// The connection manager only reads this (through a `tokio::sync::watch`
/// receiver) to pick channel credentials. Anonymous sessions are first-class:
/// a session without a token opens the channel without credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: Option<String>,
    pub is_authenticated: bool,
}

impl Session {
    /// A session without credentials
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// An authenticated session carrying a bearer token
    pub fn authenticated(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            is_authenticated: true,
        }
    }

    /// Token to present when opening a channel, if any
    ///
    /// Empty or whitespace-only tokens are treated as absent.
    pub fn bearer_token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}
