//! Access gate: the authorization contract a request layer honours.
//!
//! A caller presents its bearer token as the value of the
//! [`TOKEN_HEADER`] header. The gate maps that value to a registry lookup
//! before any protected operation touches the object store:
//!
//! ```text
//! header ─→ verify_token ─→ verify_valid_issuer ─→ (uploads)
//!                                  └─→ verify_issuer_perms ─→ (token admin)
//! ```
//!
//! Downloads are public and only filtered by type.
//!
//! The registry and the store never reference each other; the gate is the
//! only place they meet.

use std::io::Write;
use std::sync::Arc;

use log::{debug, warn};

use crate::error::{Result, VaultError};
use crate::objects::{FileObject, FileType, ObjectStore, ObjectUid};
use crate::registry::{Token, TokenId, TokenRegistry};

/// Header carrying the bearer token.
pub const TOKEN_HEADER: &str = "X-AUTH-TOKEN";

/// Composes a token registry and an object store.
#[derive(Debug, Clone)]
pub struct Gate {
    registry: Arc<TokenRegistry>,
    store: Arc<ObjectStore>,
}

impl Gate {
    pub fn new(registry: Arc<TokenRegistry>, store: Arc<ObjectStore>) -> Self {
        Self { registry, store }
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    // ── Authentication ────────────────────────────────────────────────────────

    /// Resolve a presented header value to an activated token whose issuer is
    /// still privileged.
    ///
    /// # Errors
    ///
    /// `VaultError::Unauthorized` when the header is missing, the token is
    /// unknown or deactivated, or its issuer has been demoted.
    pub fn authenticate(&self, header: Option<&str>) -> Result<Token> {
        let presented = header.map(str::trim).filter(|v| !v.is_empty()).ok_or_else(|| {
            warn!("rejected request without {TOKEN_HEADER}");
            VaultError::Unauthorized(format!("missing {TOKEN_HEADER}"))
        })?;

        let token = self
            .registry
            .verify_token(&TokenId::from(presented))
            .ok_or_else(|| {
                warn!("rejected unknown or deactivated token");
                VaultError::Unauthorized("unknown or deactivated token".to_string())
            })?;

        if !self.registry.verify_valid_issuer(&token) {
            warn!(
                "rejected token '{}': issuer {} is no longer privileged",
                token.name, token.issuer
            );
            return Err(VaultError::Unauthorized(
                "token issuer has been revoked".to_string(),
            ));
        }

        debug!("accepted token '{}'", token.name);
        Ok(token)
    }

    /// [`Gate::authenticate`], then require issuer privilege on the token
    /// itself.
    pub fn authenticate_issuer(&self, header: Option<&str>) -> Result<Token> {
        let token = self.authenticate(header)?;
        if !self.registry.verify_issuer_perms(&token) {
            warn!("token '{}' attempted an issuer operation", token.name);
            return Err(VaultError::Unauthorized(
                "token is not an issuer".to_string(),
            ));
        }
        Ok(token)
    }

    // ── Objects ───────────────────────────────────────────────────────────────

    /// Store an upload sent to the `endpoint` type.
    ///
    /// # Errors
    ///
    /// `VaultError::Unauthorized` from authentication, or
    /// `VaultError::InvalidInput` if `content_type` does not classify as
    /// `endpoint`.
    pub fn upload(
        &self,
        header: Option<&str>,
        endpoint: FileType,
        content_type: &str,
        client_name: &str,
        payload: &[u8],
    ) -> Result<FileObject> {
        let token = self.authenticate(header)?;

        let detected = FileType::from_content_type(content_type);
        if detected != endpoint || endpoint == FileType::Invalid {
            return Err(VaultError::InvalidInput(format!(
                "content type '{content_type}' not accepted by the {endpoint} endpoint"
            )));
        }

        let obj = self.store.put(endpoint, client_name, payload)?;
        debug!("token '{}' uploaded {}", token.name, obj.uid);
        Ok(obj)
    }

    /// Resolve a public download request to its listing entry without
    /// touching the bytes. `requested` may carry a file extension, which is
    /// ignored.
    ///
    /// # Errors
    ///
    /// `VaultError::NotFound` if no object of that type has the uid.
    pub fn locate(&self, kind: FileType, requested: &str) -> Result<FileObject> {
        self.store.fetch_typed(&ObjectUid::from_request(requested), kind)
    }

    /// Stream a public object of type `kind`.
    ///
    /// # Errors
    ///
    /// `VaultError::NotFound` if no object of that type has the uid, or its
    /// bytes are missing.
    pub fn download(&self, kind: FileType, requested: &str, out: &mut dyn Write) -> Result<u64> {
        let obj = self.locate(kind, requested)?;
        self.store.read_object(&obj, out)
    }

    // ── Token administration ──────────────────────────────────────────────────

    /// Mint a token on behalf of the presenting issuer.
    pub fn mint(&self, header: Option<&str>, name: &str) -> Result<Token> {
        let issuer = self.authenticate_issuer(header)?;
        self.registry.create_token(name, &issuer)
    }

    pub fn list(&self, header: Option<&str>, only_activated: bool) -> Result<Vec<Token>> {
        self.authenticate_issuer(header)?;
        Ok(self.registry.list_tokens(only_activated))
    }

    pub fn show(&self, header: Option<&str>, id: &TokenId) -> Result<Token> {
        self.authenticate_issuer(header)?;
        self.registry
            .get_token(id)
            .ok_or_else(|| VaultError::NotFound(format!("token not found: {id}")))
    }

    pub fn deactivate(&self, header: Option<&str>, id: &TokenId) -> Result<Token> {
        self.authenticate_issuer(header)?;
        self.registry.deactivate_token(id)
    }

    /// Returns `false` if `id` was already an issuer.
    pub fn promote(&self, header: Option<&str>, id: &TokenId) -> Result<bool> {
        self.authenticate_issuer(header)?;
        self.registry.add_issuer(id)
    }

    /// Returns `false` if `id` was not an issuer.
    pub fn demote(&self, header: Option<&str>, id: &TokenId) -> Result<bool> {
        self.authenticate_issuer(header)?;
        self.registry.remove_issuer(id)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
