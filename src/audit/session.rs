//! Session identifiers and client attribution

use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

use crate::models::{ClientContext, EncryptionError, Validators};

const RANDOM_BYTES: usize = 8;
const FINGERPRINT_BYTES: usize = 8;

/// Hash of the coarse client attributes (user agent, language, timezone,
/// platform), truncated to 8 bytes of hex.
///
/// Stable for a given device configuration; not an identity.
pub fn client_fingerprint(client: &ClientContext) -> String {
    let mut hasher = Sha256::new();
    for part in [&client.user_agent, &client.accept_language, &client.timezone, &client.platform] {
        hasher.update(part.as_deref().unwrap_or("").as_bytes());
        hasher.update([0x1f]);
    }
    let digest = hasher.finalize();
    hex(&digest[..FINGERPRINT_BYTES])
}

/// `<hex millis>-<random>-<fingerprint>`
pub fn session_id(
    rng: &SystemRandom,
    now: DateTime<Utc>,
    client: &ClientContext,
) -> Result<String, EncryptionError> {
    let mut random = [0u8; RANDOM_BYTES];
    rng.fill(&mut random).map_err(|_| EncryptionError::EncryptionFailed {
        reason: "Secure random source unavailable".to_string(),
    })?;

    let millis = now.timestamp_millis().max(0) as u64;
    Ok(format!("{:x}-{}-{}", millis, hex(&random), client_fingerprint(client)))
}

/// Syntactic IPv4/IPv6 check; says nothing about whether the address is trusted
pub fn ip_is_valid(ip_address: Option<&str>) -> bool {
    ip_address
        .map(|ip| Validators::ip_address(ip, "ip_address").is_ok())
        .unwrap_or(false)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
