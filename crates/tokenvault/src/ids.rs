//! Identifier sources for tokens and stored objects.
//!
//! Token ids are bearer credentials, so the registry takes its generator as
//! an injected [`IdSource`] rather than reaching for shared random state.
//! Each registry or store owns its own source.
//!
//! | Scheme        | Output                                    | Use                         |
//! |---------------|-------------------------------------------|-----------------------------|
//! | `secure`      | base58 of 16 bytes from a seeded CSPRNG   | token default               |
//! | `legacy`      | `(offset + draw) mod 2^32`, decimal       | compatibility with old ids  |
//! | `epoch-digit` | `unix_secs * 10 + digit`, decimal         | object uid default          |

use std::fmt;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

/// Modulus of the legacy token id space.
pub const LEGACY_TOKEN_MODULUS: u64 = 1 << 32;

/// A generator of fresh identifier strings.
///
/// Implementations need not guarantee uniqueness on their own; callers
/// redraw when an id is already taken.
pub trait IdSource: Send + Sync + fmt::Debug {
    /// Draw the next identifier.
    fn next_id(&self) -> String;
}

// ── SecureIds ─────────────────────────────────────────────────────────────────

/// Unguessable ids: 16 bytes from an OS-seeded `StdRng`, base58 encoded.
pub struct SecureIds {
    rng: Mutex<StdRng>,
}

impl SecureIds {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

impl Default for SecureIds {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SecureIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecureIds")
    }
}

impl IdSource for SecureIds {
    fn next_id(&self) -> String {
        let mut buf = [0u8; 16];
        self.rng.lock().fill_bytes(&mut buf);
        bs58::encode(buf).into_string()
    }
}

// ── LegacyTokenIds ────────────────────────────────────────────────────────────

/// Decimal ids in `[0, 2^32)`: a per-instance random offset plus a fresh
/// draw, reduced modulo 2^32.
///
/// Guessable. Only for deployments that must keep minting ids of the old
/// shape.
pub struct LegacyTokenIds {
    offset: u64,
    rng: Mutex<StdRng>,
}

impl LegacyTokenIds {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Deterministic generator for tests.
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(mut rng: StdRng) -> Self {
        let offset = rng.gen::<u64>();
        Self {
            offset,
            rng: Mutex::new(rng),
        }
    }
}

impl Default for LegacyTokenIds {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LegacyTokenIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LegacyTokenIds")
    }
}

impl IdSource for LegacyTokenIds {
    fn next_id(&self) -> String {
        let draw = self.rng.lock().gen::<u64>();
        (draw.wrapping_add(self.offset) % LEGACY_TOKEN_MODULUS).to_string()
    }
}

// ── EpochDigitUids ────────────────────────────────────────────────────────────

/// Object uids of the form `unix_secs * 10 + d` for a random digit `d`.
///
/// Two draws within the same second collide with probability 1/10; the
/// object store redraws against its listing.
pub struct EpochDigitUids {
    rng: Mutex<StdRng>,
    clock: fn() -> i64,
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl EpochDigitUids {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
            clock: unix_now,
        }
    }

    /// Replace the wall clock, e.g. with a fixed instant in tests.
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for EpochDigitUids {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EpochDigitUids {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EpochDigitUids")
    }
}

impl IdSource for EpochDigitUids {
    fn next_id(&self) -> String {
        let digit = self.rng.lock().gen_range(0..10i64);
        ((self.clock)() * 10 + digit).to_string()
    }
}

// ── IdScheme ──────────────────────────────────────────────────────────────────

/// Configurable choice of identifier source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdScheme {
    Secure,
    Legacy,
    EpochDigit,
}

impl IdScheme {
    /// Build a fresh, independently seeded source for this scheme.
    pub fn build(self) -> Box<dyn IdSource> {
        match self {
            Self::Secure => Box::new(SecureIds::new()),
            Self::Legacy => Box::new(LegacyTokenIds::new()),
            Self::EpochDigit => Box::new(EpochDigitUids::new()),
        }
    }
}

impl fmt::Display for IdScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Secure => "secure",
            Self::Legacy => "legacy",
            Self::EpochDigit => "epoch-digit",
        };
        f.write_str(s)
    }
}
