//! Token registry — bearer tokens and the delegation hierarchy.
//!
//! The registry provides:
//! - Minting tokens on behalf of an issuer
//! - Activation checks (deactivation is one-way)
//! - Live issuer checks, so demoting an issuer revokes everything it minted
//! - Promotion and demotion of issuers, never leaving the set empty
//! - Write-through persistence with rollback to the registry document

pub mod registry;
pub mod token;

pub use registry::{RegistryState, TokenRegistry, BOOTSTRAP_ISSUER_ID, BOOTSTRAP_ISSUER_NAME};
pub use token::{Token, TokenId};
