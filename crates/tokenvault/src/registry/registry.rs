//! Tokens, the privileged issuer set, and the document holding both.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::document::{Document, Outcome};
use crate::error::{Result, VaultError};
use crate::ids::IdSource;

use super::token::{Token, TokenId};

/// Id of the self-issued token written into a fresh registry.
pub const BOOTSTRAP_ISSUER_ID: &str = "initial-issuer-token";

/// Name of the self-issued token written into a fresh registry.
pub const BOOTSTRAP_ISSUER_NAME: &str = "initial token";

/// Draws attempted before giving up on finding an unused token id.
const MAX_ID_DRAWS: usize = 64;

// ── In-memory state ───────────────────────────────────────────────────────────

/// Registry contents. Serialized as
/// `{"issuers": [id...], "tokens": [token...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RegistryFile", into = "RegistryFile")]
pub struct RegistryState {
    issuers: BTreeSet<TokenId>,
    tokens: IndexMap<TokenId, Token>,
}

#[derive(Serialize, Deserialize)]
struct RegistryFile {
    issuers: Vec<TokenId>,
    tokens: Vec<Token>,
}

impl TryFrom<RegistryFile> for RegistryState {
    type Error = String;

    fn try_from(file: RegistryFile) -> std::result::Result<Self, Self::Error> {
        if file.issuers.is_empty() {
            return Err("registry has no issuers".to_string());
        }

        let mut tokens = IndexMap::with_capacity(file.tokens.len());
        for token in file.tokens {
            let id = token.id.clone();
            if tokens.insert(id.clone(), token).is_some() {
                return Err(format!("duplicate token id: {id}"));
            }
        }

        Ok(Self {
            issuers: file.issuers.into_iter().collect(),
            tokens,
        })
    }
}

impl From<RegistryState> for RegistryFile {
    fn from(state: RegistryState) -> Self {
        Self {
            issuers: state.issuers.into_iter().collect(),
            tokens: state.tokens.into_values().collect(),
        }
    }
}

impl RegistryState {
    /// A registry holding only the self-issued bootstrap token.
    pub fn bootstrap() -> Self {
        let id = TokenId::new(BOOTSTRAP_ISSUER_ID);
        let token = Token::new(id.clone(), BOOTSTRAP_ISSUER_NAME, id.clone());

        let mut tokens = IndexMap::new();
        tokens.insert(id.clone(), token);

        Self {
            issuers: BTreeSet::from([id]),
            tokens,
        }
    }

    pub fn issuers(&self) -> &BTreeSet<TokenId> {
        &self.issuers
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.tokens.values()
    }

    pub fn get(&self, id: &TokenId) -> Option<&Token> {
        self.tokens.get(id)
    }
}

// ── TokenRegistry ─────────────────────────────────────────────────────────────

/// Tokens and issuer privileges backed by one JSON document.
///
/// Privilege is always evaluated against the current issuer set: demoting an
/// issuer immediately invalidates every token it minted without touching
/// those tokens.
///
/// All methods take `&self`; share the registry across threads with `Arc`.
#[derive(Debug)]
pub struct TokenRegistry {
    doc: Document<RegistryState>,
    ids: Box<dyn IdSource>,
}

impl TokenRegistry {
    /// Load the registry at `path`, or bootstrap a fresh one if the file does
    /// not exist.
    pub fn open(path: impl Into<PathBuf>, ids: Box<dyn IdSource>) -> Result<Self> {
        let (doc, fresh) = Document::open_or_bootstrap(path, RegistryState::bootstrap)?;
        if fresh {
            info!(
                "bootstrapped token registry at {} with issuer '{}'",
                doc.path().display(),
                BOOTSTRAP_ISSUER_ID
            );
        }
        Ok(Self { doc, ids })
    }

    /// Load an existing registry.
    ///
    /// # Errors
    ///
    /// `VaultError::NotFound` if the file is missing, `VaultError::Corrupt` if
    /// it does not parse or breaks a registry invariant.
    pub fn load(path: impl Into<PathBuf>, ids: Box<dyn IdSource>) -> Result<Self> {
        let doc = Document::load(path)?;
        Ok(Self { doc, ids })
    }

    /// Write a fresh registry to `path`, replacing anything already there.
    pub fn bootstrap(path: impl Into<PathBuf>, ids: Box<dyn IdSource>) -> Result<Self> {
        let doc = Document::bootstrap(path, RegistryState::bootstrap())?;
        Ok(Self { doc, ids })
    }

    /// Retry failed persists before rolling back.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.doc = self.doc.with_retries(retries);
        self
    }

    pub fn path(&self) -> &Path {
        self.doc.path()
    }

    /// Clone of the whole registry state.
    pub fn snapshot(&self) -> RegistryState {
        self.doc.snapshot()
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Look up a token regardless of its activation state.
    pub fn get_token(&self, id: &TokenId) -> Option<Token> {
        self.doc.read().get(id).cloned()
    }

    /// Return the token if it exists and is activated.
    pub fn verify_token(&self, id: &TokenId) -> Option<Token> {
        self.doc
            .read()
            .get(id)
            .filter(|token| token.activated)
            .cloned()
    }

    /// True iff the token's issuer is privileged right now.
    pub fn verify_valid_issuer(&self, token: &Token) -> bool {
        self.doc.read().issuers.contains(&token.issuer)
    }

    /// True iff the token itself is privileged right now.
    pub fn verify_issuer_perms(&self, token: &Token) -> bool {
        self.doc.read().issuers.contains(&token.id)
    }

    /// Snapshot of all tokens in creation order, optionally only activated ones.
    pub fn list_tokens(&self, only_activated: bool) -> Vec<Token> {
        self.doc
            .read()
            .tokens()
            .filter(|token| !only_activated || token.activated)
            .cloned()
            .collect()
    }

    /// Snapshot of the privileged ids, sorted.
    pub fn issuers(&self) -> Vec<TokenId> {
        self.doc.read().issuers.iter().cloned().collect()
    }

    /// The bootstrap token, if this registry still holds it.
    pub fn bootstrap_token(&self) -> Option<Token> {
        self.get_token(&TokenId::new(BOOTSTRAP_ISSUER_ID))
    }

    // ── Mutations ─────────────────────────────────────────────────────────────

    /// Mint a new activated token issued by `issuer`.
    ///
    /// The caller is expected to have checked `verify_issuer_perms(issuer)`.
    ///
    /// # Errors
    ///
    /// `VaultError::NotFound` if `issuer` is not a token of this registry,
    /// `VaultError::InvariantViolation` if no unused id could be drawn, or the
    /// persist error (the new token is discarded).
    pub fn create_token(&self, name: &str, issuer: &Token) -> Result<Token> {
        let token = self.doc.mutate(|state| {
            if !state.tokens.contains_key(&issuer.id) {
                return Err(VaultError::NotFound(format!(
                    "issuer token not found: {}",
                    issuer.id
                )));
            }

            let id = self.draw_unused_id(state)?;
            let token = Token::new(id.clone(), name, issuer.id.clone());
            state.tokens.insert(id, token.clone());
            Ok(Outcome::Changed(token))
        })?;

        info!("minted token '{}' issued by {}", token.name, token.issuer);
        Ok(token)
    }

    fn draw_unused_id(&self, state: &RegistryState) -> Result<TokenId> {
        for _ in 0..MAX_ID_DRAWS {
            let id = TokenId(self.ids.next_id());
            if !state.tokens.contains_key(&id) {
                return Ok(id);
            }
        }
        Err(VaultError::InvariantViolation(format!(
            "no unused token id after {MAX_ID_DRAWS} draws"
        )))
    }

    /// Replace the token stored at `id` with `new_token`.
    ///
    /// Only the name and the activation flag may change, and activation may
    /// only go from `true` to `false`.
    ///
    /// # Errors
    ///
    /// `VaultError::NotFound` if `id` is absent, `VaultError::InvariantViolation`
    /// for a forbidden change, or the persist error (the old token is kept).
    pub fn update_token(&self, id: &TokenId, new_token: Token) -> Result<()> {
        self.doc.mutate(|state| {
            let slot = state
                .tokens
                .get_mut(id)
                .ok_or_else(|| VaultError::NotFound(format!("token not found: {id}")))?;
            replace_token(slot, new_token)
        })
    }

    /// Permanently deactivate a token and return its new state.
    ///
    /// The lookup and the flip happen under one write lock.
    pub fn deactivate_token(&self, id: &TokenId) -> Result<Token> {
        let token = self.doc.mutate(|state| {
            let slot = state
                .tokens
                .get_mut(id)
                .ok_or_else(|| VaultError::NotFound(format!("token not found: {id}")))?;

            let mut deactivated = slot.clone();
            deactivated.activated = false;
            Ok(match replace_token(slot, deactivated)? {
                Outcome::Changed(()) => Outcome::Changed(slot.clone()),
                Outcome::Unchanged(()) => Outcome::Unchanged(slot.clone()),
            })
        })?;

        info!("deactivated token {id}");
        Ok(token)
    }

    /// Grant issuer privilege to `id`.
    ///
    /// Returns `false` if `id` already held it. The first promotion of any
    /// other id while the bootstrap issuer is privileged retires the
    /// bootstrap issuer. Once retired it cannot be promoted again, so the
    /// retirement happens at most once.
    ///
    /// # Errors
    ///
    /// `VaultError::NotFound` if `id` is not a token of this registry,
    /// `VaultError::InvariantViolation` when re-promoting the retired
    /// bootstrap issuer, or the persist error (both changes are undone).
    pub fn add_issuer(&self, id: &TokenId) -> Result<bool> {
        let bootstrap_id = TokenId::new(BOOTSTRAP_ISSUER_ID);

        let (added, retired) = self.doc.mutate(|state| {
            if state.issuers.contains(id) {
                return Ok(Outcome::Unchanged((false, false)));
            }
            if !state.tokens.contains_key(id) {
                return Err(VaultError::NotFound(format!("token not found: {id}")));
            }
            if *id == bootstrap_id {
                warn!("refused to re-promote the retired bootstrap issuer");
                return Err(VaultError::InvariantViolation(format!(
                    "bootstrap issuer {id} has been retired"
                )));
            }

            state.issuers.insert(id.clone());
            let retired =
                state.tokens.contains_key(&bootstrap_id) && state.issuers.remove(&bootstrap_id);
            Ok(Outcome::Changed((true, retired)))
        })?;

        if added {
            info!("promoted {id} to issuer");
        }
        if retired {
            info!("retired bootstrap issuer after promoting {id}");
        }
        Ok(added)
    }

    /// Revoke issuer privilege from `id`.
    ///
    /// Returns `false` if `id` was not privileged.
    ///
    /// # Errors
    ///
    /// `VaultError::InvariantViolation` if `id` is the last issuer, or the
    /// persist error (the privilege is restored).
    pub fn remove_issuer(&self, id: &TokenId) -> Result<bool> {
        let removed = self.doc.mutate(|state| {
            if !state.issuers.contains(id) {
                return Ok(Outcome::Unchanged(false));
            }
            if state.issuers.len() == 1 {
                warn!("refused to demote {id}: it is the last issuer");
                return Err(VaultError::InvariantViolation(
                    "cannot remove all issuer tokens".to_string(),
                ));
            }

            state.issuers.remove(id);
            Ok(Outcome::Changed(true))
        })?;

        if removed {
            info!("demoted issuer {id}");
        }
        Ok(removed)
    }
}

/// Apply an update to a stored token. The id and issuer are immutable and
/// deactivation is one-way.
fn replace_token(slot: &mut Token, new_token: Token) -> Result<Outcome<()>> {
    if new_token.id != slot.id {
        return Err(VaultError::InvariantViolation(format!(
            "token id cannot change ({} -> {})",
            slot.id, new_token.id
        )));
    }
    if new_token.issuer != slot.issuer {
        return Err(VaultError::InvariantViolation(format!(
            "issuer of token {} is immutable",
            slot.id
        )));
    }
    if new_token.activated && !slot.activated {
        return Err(VaultError::InvariantViolation(format!(
            "token {} cannot be re-activated",
            slot.id
        )));
    }

    if *slot == new_token {
        return Ok(Outcome::Unchanged(()));
    }
    *slot = new_token;
    Ok(Outcome::Changed(()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
