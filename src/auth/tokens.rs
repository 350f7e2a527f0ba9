use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// A token mailed to the user plus the digest kept in the database.
#[derive(Debug, Clone)]
pub struct OneTimeToken {
    pub token: String,
    pub digest: String,
}

impl OneTimeToken {
    /// 20 random bytes as hex; the digest is SHA-256 over the hex text.
    pub fn activation() -> Self {
        let token = hex::encode(random_bytes::<20>());
        let digest = activation_digest(&token);
        Self { token, digest }
    }

    /// 16 random bytes as URL-safe base64; the digest is SHA-256 over the raw bytes.
    pub fn reset() -> Self {
        let raw = random_bytes::<16>();
        Self {
            token: URL_SAFE.encode(raw),
            digest: hex::encode(Sha256::digest(raw)),
        }
    }
}

pub fn activation_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Digest of a mailed reset token, or `None` when it is not valid base64.
pub fn reset_digest(token: &str) -> Option<String> {
    URL_SAFE.decode(token).ok().map(|raw| hex::encode(Sha256::digest(raw)))
}

/// True when the candidate digest matches the stored one and the expiry is in the future.
pub fn matches(candidate: Option<&str>, stored: Option<&str>, expires_at: Option<DateTime<Utc>>) -> bool {
    match (candidate, stored, expires_at) {
        (Some(candidate), Some(stored), Some(expires_at)) => candidate == stored && Utc::now() < expires_at,
        _ => false,
    }
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn activation_token_is_hex_and_digest_verifies() {
        let t = OneTimeToken::activation();
        assert_eq!(t.token.len(), 40);
        assert!(t.token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(activation_digest(&t.token), t.digest);
    }

    #[test]
    fn reset_digest_is_over_raw_bytes() {
        let t = OneTimeToken::reset();
        assert_eq!(reset_digest(&t.token).as_deref(), Some(t.digest.as_str()));
        assert_ne!(activation_digest(&t.token), t.digest);
        assert!(reset_digest("not base64!").is_none());
    }

    #[test]
    fn expired_or_missing_never_matches() {
        let later = Utc::now() + Duration::hours(1);
        let earlier = Utc::now() - Duration::seconds(1);
        assert!(matches(Some("abc"), Some("abc"), Some(later)));
        assert!(!matches(Some("abc"), Some("abc"), Some(earlier)));
        assert!(!matches(Some("abc"), Some("abd"), Some(later)));
        assert!(!matches(Some("abc"), None, Some(later)));
    }
}
