//! Bearer tokens.

use serde::{Deserialize, Serialize};

/// Opaque bearer credential. Compared by equality only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenId(pub String);

impl TokenId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for TokenId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A token as stored in the registry document.
///
/// Field order matches the document layout:
/// `{"activated": bool, "id": string, "name": string, "issuer": string}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Cleared on deactivation; never set again.
    pub activated: bool,
    pub id: TokenId,
    /// Human-readable label, not unique.
    pub name: String,
    /// Token that minted this one. Fixed at creation.
    pub issuer: TokenId,
}

impl Token {
    /// A fresh, activated token.
    pub fn new(id: TokenId, name: impl Into<String>, issuer: TokenId) -> Self {
        Self {
            activated: true,
            id,
            name: name.into(),
            issuer,
        }
    }

    /// True if this token minted itself (only the bootstrap issuer does).
    pub fn is_self_issued(&self) -> bool {
        self.id == self.issuer
    }
}
