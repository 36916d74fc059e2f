//! Process configuration, read from a TOML file.
//!
//! ```toml
//! [tokens]
//! path = "tokens.json"
//! id_scheme = "secure"        # or "legacy"
//!
//! [objects]
//! listing_path = "listing.json"
//! storage_dir = "storage"
//! uid_scheme = "epoch-digit"  # or "secure"
//!
//! [persistence]
//! retries = 0
//! ```
//!
//! Every key is optional. Relative paths resolve against the working
//! directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};
use crate::ids::IdScheme;
use crate::objects::ObjectStore;
use crate::registry::TokenRegistry;

/// Default file name looked up by the CLI.
pub const CONFIG_FILE_NAME: &str = "tokenvault.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub tokens: TokensConfig,
    pub objects: ObjectsConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokensConfig {
    /// Registry document.
    pub path: PathBuf,
    pub id_scheme: IdScheme,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("tokens.json"),
            id_scheme: IdScheme::Secure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectsConfig {
    /// Listing document.
    pub listing_path: PathBuf,
    /// Root of the per-type object directories.
    pub storage_dir: PathBuf,
    pub uid_scheme: IdScheme,
}

impl Default for ObjectsConfig {
    fn default() -> Self {
        Self {
            listing_path: PathBuf::from("listing.json"),
            storage_dir: PathBuf::from("storage"),
            uid_scheme: IdScheme::EpochDigit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Extra persist attempts before a mutation is rolled back.
    pub retries: u32,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| VaultError::Config(e.to_string()))
    }

    /// Read the config file at `path`.
    ///
    /// # Errors
    ///
    /// `VaultError::NotFound` if the file is missing, `VaultError::Config` if
    /// it does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VaultError::NotFound(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            Err(e) => return Err(VaultError::Io(e)),
        };
        toml::from_str(&text).map_err(|e| VaultError::Config(format!("{}: {e}", path.display())))
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(VaultError::NotFound(_)) => {
                log::debug!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| VaultError::Config(e.to_string()))
    }

    /// Open (or bootstrap) the token registry described by this config.
    pub fn open_registry(&self) -> Result<TokenRegistry> {
        Ok(
            TokenRegistry::open(&self.tokens.path, self.tokens.id_scheme.build())?
                .with_retries(self.persistence.retries),
        )
    }

    /// Open (or start) the object store described by this config.
    pub fn open_store(&self) -> Result<ObjectStore> {
        Ok(ObjectStore::open(
            &self.objects.listing_path,
            &self.objects.storage_dir,
            self.objects.uid_scheme.build(),
        )?
        .with_retries(self.persistence.retries))
    }
}
