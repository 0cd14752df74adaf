use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Mutex;
use base64::{Engine as _, engine::general_purpose};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce, Key
};
use ring::{pbkdf2, rand::SecureRandom};
use sha2::{Digest, Sha256};

use crate::cache::BoundedCache;

/// Key version assumed for ciphertext written before version tags existed
pub const LEGACY_KEY_VERSION: u32 = 1;

/// Derived key length in bytes (AES-256)
pub const KEY_LENGTH: usize = 32;

/// AES-GCM nonce length in bytes
pub const NONCE_LENGTH: usize = 12;

/// Default PBKDF2 iteration count
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Error types for encryption operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncryptionError {
    #[error("Unknown key version: {version}")]
    UnknownKeyVersion { version: u32 },

    #[error("Key version {version} is retired and cannot encrypt new data (active: {active})")]
    RetiredKeyVersion { version: u32, active: u32 },

    #[error("Key version {version} is already registered")]
    DuplicateKeyVersion { version: u32 },

    #[error("Malformed ciphertext: {reason}")]
    MalformedCiphertext { reason: String },

    #[error("Decryption failed: authentication tag mismatch")]
    AuthenticationFailed,

    #[error("Encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    #[error("Serialization error: {reason}")]
    SerializationError { reason: String },

    #[error("Key derivation failed: {reason}")]
    KeyDerivationFailed { reason: String },
}

/// A 256-bit symmetric key derived from a base secret
#[derive(Clone, PartialEq, Eq)]
pub struct DerivedKey([u8; KEY_LENGTH]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

// Key bytes must never reach logs
impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKey")
            .field("fingerprint", &fingerprint(&self.0))
            .finish()
    }
}

/// Derive a key from a base secret with PBKDF2-HMAC-SHA256.
///
/// Deterministic: the same secret, salt and iteration count always yield
/// the same key.
pub fn derive_key(base_secret: &str, salt: &[u8], iterations: u32) -> Result<DerivedKey, EncryptionError> {
    if base_secret.is_empty() {
        return Err(EncryptionError::KeyDerivationFailed {
            reason: "Base secret is empty".to_string(),
        });
    }

    let iterations = NonZeroU32::new(iterations).ok_or_else(|| EncryptionError::KeyDerivationFailed {
        reason: "Iteration count must be greater than zero".to_string(),
    })?;

    let mut key = [0u8; KEY_LENGTH];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        base_secret.as_bytes(),
        &mut key,
    );

    Ok(DerivedKey(key))
}

/// Version-tagged ciphertext, `"<version>:<base64(nonce || ciphertext)>"` as text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    /// Key generation that produced the ciphertext
    pub key_version: u32,
    /// Nonce followed by the AEAD ciphertext and tag
    pub ciphertext: Vec<u8>,
}

impl EncryptedPayload {
    /// Parse the tagged text form.
    ///
    /// Text without a tag is treated as legacy version 1. The base64 alphabet
    /// never contains ':' so the first colon always separates the tag.
    pub fn parse(text: &str) -> Result<Self, EncryptionError> {
        let (key_version, body) = match text.split_once(':') {
            Some((tag, body)) => {
                let version = tag.parse::<u32>().map_err(|_| EncryptionError::MalformedCiphertext {
                    reason: format!("Invalid key version tag '{}'", tag),
                })?;
                (version, body)
            }
            None => (LEGACY_KEY_VERSION, text),
        };

        let ciphertext = general_purpose::STANDARD.decode(body)
            .map_err(|e| EncryptionError::MalformedCiphertext {
                reason: format!("Invalid base64: {}", e),
            })?;

        if ciphertext.len() <= NONCE_LENGTH {
            return Err(EncryptionError::MalformedCiphertext {
                reason: "Ciphertext shorter than nonce".to_string(),
            });
        }

        Ok(Self { key_version, ciphertext })
    }

    fn split(&self) -> (&[u8], &[u8]) {
        self.ciphertext.split_at(NONCE_LENGTH)
    }
}

impl fmt::Display for EncryptedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key_version, general_purpose::STANDARD.encode(&self.ciphertext))
    }
}

impl FromStr for EncryptedPayload {
    type Err = EncryptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Base secret for one key generation
#[derive(Clone)]
pub struct KeySecret {
    pub version: u32,
    pub secret: String,
    pub salt: Vec<u8>,
}

impl KeySecret {
    pub fn new(version: u32, secret: impl Into<String>, salt: impl Into<Vec<u8>>) -> Self {
        Self {
            version,
            secret: secret.into(),
            salt: salt.into(),
        }
    }
}

impl fmt::Debug for KeySecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySecret")
            .field("version", &self.version)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Cache key for derived keys; the secret is stored only as a digest
pub type DerivationKey = (String, Vec<u8>, u32);

/// Versioned key ring for field-level encryption.
///
/// Exactly one version is active for new encryption. Retired versions stay
/// resolvable so historical ciphertext never needs re-encryption.
pub struct KeyManager {
    /// Keys by version
    keys: BTreeMap<u32, DerivedKey>,
    /// Version used for new encryption
    active_version: u32,
    /// PBKDF2 iteration count
    iterations: u32,
    /// Memoized derivations, injected by the owner
    derivations: Mutex<BoundedCache<DerivationKey, DerivedKey>>,
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyManager")
            .field("versions", &self.keys.keys().collect::<Vec<_>>())
            .field("active_version", &self.active_version)
            .field("iterations", &self.iterations)
            .finish()
    }
}

impl KeyManager {
    /// Build a key ring from base secrets.
    ///
    /// The highest version becomes active unless `active_version` names
    /// another registered version.
    pub fn from_secrets(
        secrets: &[KeySecret],
        active_version: Option<u32>,
        iterations: u32,
        cache: BoundedCache<DerivationKey, DerivedKey>,
    ) -> Result<Self, EncryptionError> {
        let mut manager = Self {
            keys: BTreeMap::new(),
            active_version: 0,
            iterations,
            derivations: Mutex::new(cache),
        };

        for secret in secrets {
            manager.register(secret)?;
        }

        let active = match active_version {
            Some(version) => version,
            None => *manager.keys.keys().next_back().ok_or_else(|| EncryptionError::KeyDerivationFailed {
                reason: "No key secrets supplied".to_string(),
            })?,
        };

        if !manager.keys.contains_key(&active) {
            return Err(EncryptionError::UnknownKeyVersion { version: active });
        }
        manager.active_version = active;

        tracing::debug!(
            versions = manager.keys.len(),
            active_version = active,
            "Key manager initialised"
        );

        Ok(manager)
    }

    /// Single-version key ring, mostly for tests and tooling
    pub fn single(secret: &str, salt: &[u8], iterations: u32) -> Result<Self, EncryptionError> {
        Self::from_secrets(
            &[KeySecret::new(LEGACY_KEY_VERSION, secret, salt)],
            None,
            iterations,
            BoundedCache::new(8),
        )
    }

    /// Register a historical key version without changing the active one
    pub fn register(&mut self, secret: &KeySecret) -> Result<(), EncryptionError> {
        if self.keys.contains_key(&secret.version) {
            return Err(EncryptionError::DuplicateKeyVersion { version: secret.version });
        }

        let key = self.derive_cached(&secret.secret, &secret.salt)?;
        self.keys.insert(secret.version, key);
        Ok(())
    }

    /// Introduce a new active key; previous versions become decrypt-only.
    pub fn rotate(&mut self, secret: &str, salt: &[u8]) -> Result<u32, EncryptionError> {
        let next = self.keys.keys().next_back().copied().unwrap_or(0) + 1;
        self.register(&KeySecret::new(next, secret, salt))?;

        let previous = self.active_version;
        self.active_version = next;

        tracing::info!(previous_version = previous, active_version = next, "Encryption key rotated");
        Ok(next)
    }

    pub fn active_version(&self) -> u32 {
        self.active_version
    }

    pub fn versions(&self) -> Vec<u32> {
        self.keys.keys().copied().collect()
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Encrypt a serializable value under the active key
    pub fn encrypt<T: Serialize + ?Sized>(&self, plaintext: &T) -> Result<String, EncryptionError> {
        self.encrypt_with_version(plaintext, self.active_version)
    }

    /// Encrypt under an explicit version, which must be the active one
    pub fn encrypt_with_version<T: Serialize + ?Sized>(
        &self,
        plaintext: &T,
        version: u32,
    ) -> Result<String, EncryptionError> {
        if !self.keys.contains_key(&version) {
            return Err(EncryptionError::UnknownKeyVersion { version });
        }
        if version != self.active_version {
            return Err(EncryptionError::RetiredKeyVersion {
                version,
                active: self.active_version,
            });
        }

        let serialized = serde_json::to_vec(plaintext)
            .map_err(|e| EncryptionError::SerializationError {
                reason: e.to_string()
            })?;

        Ok(self.encrypt_bytes(&serialized, version)?.to_string())
    }

    /// Decrypt a tagged ciphertext and deserialize it
    pub fn decrypt<T: DeserializeOwned>(&self, versioned: &str) -> Result<T, EncryptionError> {
        let payload = EncryptedPayload::parse(versioned)?;
        let bytes = self.decrypt_bytes(&payload)?;

        serde_json::from_slice(&bytes)
            .map_err(|e| EncryptionError::SerializationError {
                reason: e.to_string()
            })
    }

    /// Encrypt raw bytes
    pub fn encrypt_bytes(&self, data: &[u8], version: u32) -> Result<EncryptedPayload, EncryptionError> {
        let key = self.key(version)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        ring::rand::SystemRandom::new()
            .fill(&mut nonce_bytes)
            .map_err(|_| EncryptionError::EncryptionFailed {
                reason: "Failed to generate nonce".to_string()
            })?;

        let sealed = cipher.encrypt(Nonce::from_slice(&nonce_bytes), data)
            .map_err(|e| EncryptionError::EncryptionFailed {
                reason: e.to_string()
            })?;

        let mut ciphertext = Vec::with_capacity(NONCE_LENGTH + sealed.len());
        ciphertext.extend_from_slice(&nonce_bytes);
        ciphertext.extend_from_slice(&sealed);

        Ok(EncryptedPayload {
            key_version: version,
            ciphertext,
        })
    }

    /// Decrypt raw bytes, verifying the authentication tag
    pub fn decrypt_bytes(&self, payload: &EncryptedPayload) -> Result<Vec<u8>, EncryptionError> {
        let key = self.key(payload.key_version)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

        let (nonce, sealed) = payload.split();
        cipher.decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| EncryptionError::AuthenticationFailed)
    }

    fn key(&self, version: u32) -> Result<&DerivedKey, EncryptionError> {
        self.keys.get(&version)
            .ok_or(EncryptionError::UnknownKeyVersion { version })
    }

    fn derive_cached(&self, secret: &str, salt: &[u8]) -> Result<DerivedKey, EncryptionError> {
        let cache_key = (fingerprint(secret.as_bytes()), salt.to_vec(), self.iterations);
        let mut cache = self.derivations.lock().unwrap_or_else(|e| e.into_inner());
        cache.get_or_insert_with(cache_key, || derive_key(secret, salt, self.iterations))
    }
}

/// Short SHA-256 fingerprint for identifying secrets and keys without exposing them
fn fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}
