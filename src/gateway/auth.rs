//! Connection pairing check

use sha2::{Digest, Sha256};

/// Shared-secret check for incoming connections.
///
/// Only the SHA-256 digest of the configured token is kept. Presented
/// tokens are digested and compared without early exit.
#[derive(Clone)]
pub struct PairingToken {
    digest: Option<[u8; 32]>,
}

impl PairingToken {
    /// `None` or an empty token disables the check
    pub fn new(token: Option<&str>) -> Self {
        Self {
            digest: token.filter(|t| !t.is_empty()).map(digest),
        }
    }

    pub fn is_required(&self) -> bool {
        self.digest.is_some()
    }

    /// Whether a connection presenting `presented` is authenticated
    pub fn verify(&self, presented: Option<&str>) -> bool {
        let Some(expected) = &self.digest else {
            return true;
        };
        let Some(presented) = presented else {
            return false;
        };
        let actual = digest(presented);
        expected
            .iter()
            .zip(actual.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for PairingToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingToken")
            .field("required", &self.is_required())
            .finish()
    }
}

fn digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_when_unset() {
        let token = PairingToken::new(None);
        assert!(!token.is_required());
        assert!(token.verify(None));
        assert!(token.verify(Some("anything")));
        assert!(PairingToken::new(Some("")).verify(None));
    }

    #[test]
    fn test_verify() {
        let token = PairingToken::new(Some("pair-4821"));
        assert!(token.is_required());
        assert!(token.verify(Some("pair-4821")));
        assert!(!token.verify(Some("pair-4822")));
        assert!(!token.verify(Some("")));
        assert!(!token.verify(None));
    }

    #[test]
    fn test_debug_hides_secret() {
        let token = PairingToken::new(Some("pair-4821"));
        let debug = format!("{:?}", token);
        assert!(!debug.contains("pair-4821"));
        assert!(debug.contains("required: true"));
    }
}
