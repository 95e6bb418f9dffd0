//! Ed25519 signing keypair for the operator identity.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid secret key length: expected 32 bytes, got {0}")]
    InvalidSecretLength(usize),
    #[error("Invalid hex encoding")]
    InvalidHex,
}

/// An ed25519 keypair used to sign ledger transactions.
pub struct SigningKeypair {
    pub(crate) signing_key: SigningKey,
}

impl SigningKeypair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Rebuild a keypair from a 32-byte secret.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    /// Rebuild a keypair from a hex-encoded 32-byte secret.
    pub fn from_secret_hex(secret: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(secret.trim()).map_err(|_| KeyError::InvalidHex)?;
        let secret: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretLength(bytes.len()))?;
        Ok(Self::from_secret_bytes(&secret))
    }

    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Hex-encoded public key; the operator's on-chain address.
    pub fn address(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    /// Sign a message, returning the detached 64-byte signature.
    pub fn sign(&self, data: &[u8]) -> [u8; 64] {
        self.signing_key.sign(data).to_bytes()
    }
}

/// Verify a detached signature against a 32-byte public key.
///
/// Malformed keys or wrong-length signatures simply fail verification;
/// callers decide on the wire how strict to be about shape.
pub fn verify_detached(pubkey: &[u8; 32], data: &[u8], signature: &[u8]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(pubkey) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; 64]>::try_from(signature) else {
        return false;
    };
    verifying_key
        .verify_strict(data, &Signature::from_bytes(&sig_bytes))
        .is_ok()
}

impl Clone for SigningKeypair {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
        }
    }
}

impl std::fmt::Debug for SigningKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeypair")
            .field("address", &self.address())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_and_rebuild() {
        let kp = SigningKeypair::generate();
        let rebuilt = SigningKeypair::from_secret_bytes(&kp.secret_key_bytes());
        assert_eq!(kp.public_key_bytes(), rebuilt.public_key_bytes());
    }

    #[test]
    fn test_from_hex() {
        let kp = SigningKeypair::generate();
        let hex_secret = hex::encode(kp.secret_key_bytes());
        let rebuilt = SigningKeypair::from_secret_hex(&hex_secret).unwrap();
        assert_eq!(kp.address(), rebuilt.address());
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        assert!(matches!(
            SigningKeypair::from_secret_hex("not hex"),
            Err(KeyError::InvalidHex)
        ));
        assert!(matches!(
            SigningKeypair::from_secret_hex("abcd"),
            Err(KeyError::InvalidSecretLength(2))
        ));
    }

    #[test]
    fn test_sign_and_verify_detached() {
        let keypair = SigningKeypair::generate();
        let envelope = b"collect_pin:42";

        let signature = keypair.sign(envelope);
        assert!(verify_detached(
            &keypair.public_key_bytes(),
            envelope,
            &signature
        ));
        assert!(!verify_detached(
            &keypair.public_key_bytes(),
            b"collect_pin:43",
            &signature
        ));
    }

    #[test]
    fn test_verify_rejects_wrong_key_and_bad_shape() {
        let keypair = SigningKeypair::generate();
        let other = SigningKeypair::generate();
        let data = b"flag_pinner:deadbeef";
        let signature = keypair.sign(data);

        assert!(!verify_detached(&other.public_key_bytes(), data, &signature));
        assert!(!verify_detached(
            &keypair.public_key_bytes(),
            data,
            &signature[..32]
        ));
    }
}
