//! PKCE (RFC 7636) verifier/challenge generation.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// The only challenge method this client uses.
pub const PKCE_METHOD: &str = "S256";

/// A PKCE verifier and its derived challenge.
///
/// The verifier must be held until the token exchange; the challenge goes
/// into the authorization URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge {
    /// Base64-URL (unpadded) encoding of 32 random bytes.
    pub verifier: String,
    /// Base64-URL (unpadded) SHA-256 of the verifier.
    pub challenge: String,
}

impl PkceChallenge {
    /// Generate a fresh verifier/challenge pair.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        Self::from_verifier(verifier)
    }

    fn from_verifier(verifier: String) -> Self {
        let digest = Sha256::digest(verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(digest);
        Self {
            verifier,
            challenge,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_is_unpadded_url_safe_base64_of_32_bytes() {
        let pkce = PkceChallenge::generate();
        // 32 bytes -> 43 base64 characters without padding
        assert_eq!(pkce.verifier.len(), 43);
        assert!(!pkce.verifier.contains('='));
        assert!(!pkce.verifier.contains('+'));
        assert!(!pkce.verifier.contains('/'));
    }

    #[test]
    fn challenge_matches_rfc7636_derivation() {
        let pkce = PkceChallenge::from_verifier(
            "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string(),
        );
        // Appendix B of RFC 7636
        assert_eq!(pkce.challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn pairs_are_unique() {
        assert_ne!(PkceChallenge::generate(), PkceChallenge::generate());
    }
}
