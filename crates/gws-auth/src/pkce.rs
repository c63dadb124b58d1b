//! PKCE verifier/challenge pairs (RFC 7636, S256 method)

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Challenge method sent as `code_challenge_method`
pub const CHALLENGE_METHOD: &str = "S256";

/// Number of random bytes behind the verifier
const VERIFIER_BYTES: usize = 32;

/// A code verifier and its derived challenge
#[derive(Clone)]
pub struct Pkce {
    verifier: String,
    challenge: String,
}

impl Pkce {
    /// Generate a fresh verifier from 32 random bytes
    pub fn generate() -> Self {
        let mut bytes = [0u8; VERIFIER_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_verifier(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Derive the challenge for an existing verifier
    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    /// Secret submitted at token exchange
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// Value sent in the authorization URL
    pub fn challenge(&self) -> &str {
        &self.challenge
    }
}

/// `base64url(SHA256(verifier))` without padding
pub fn challenge_for(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Random opaque value for the OAuth `state` parameter
pub fn random_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7636_appendix_b_vector() {
        let pkce = Pkce::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(
            pkce.challenge(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_generated_verifier_shape() {
        let pkce = Pkce::generate();
        // 32 bytes -> 43 unpadded base64url characters
        assert_eq!(pkce.verifier().len(), 43);
        assert!(pkce
            .verifier()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(pkce.challenge(), challenge_for(pkce.verifier()));
    }

    #[test]
    fn test_verifiers_are_unique() {
        assert_ne!(Pkce::generate().verifier(), Pkce::generate().verifier());
        assert_ne!(random_state(), random_state());
    }
}
