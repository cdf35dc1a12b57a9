//! Cryptographic primitives for ChronoSync.
//!
//! Wraps Ed25519 signing of outgoing responses and the Blake3-based state
//! fingerprint with strong types.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};
use crate::name::Component;
use crate::packet::Response;

/// A fingerprint of the global producer state, rendered as lowercase hex.
///
/// The special value `"00"` stands for the empty state every participant
/// starts from.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Textual form of the bootstrap fingerprint.
    pub const BOOTSTRAP: &'static str = "00";

    /// The fingerprint of the empty state.
    pub fn bootstrap() -> Self {
        Self(Self::BOOTSTRAP.to_string())
    }

    /// Check if this is the bootstrap fingerprint.
    pub fn is_bootstrap(&self) -> bool {
        self.0 == Self::BOOTSTRAP
    }

    /// Render a finished Blake3 hash.
    pub fn from_hash(hash: blake3::Hash) -> Self {
        Self(hex::encode(hash.as_bytes()))
    }

    /// Read a fingerprint carried in a name component.
    pub fn from_component(component: &Component) -> Self {
        Self(component.to_escaped_string())
    }

    /// The name component carrying this fingerprint.
    pub fn to_component(&self) -> Component {
        Component::from(self.0.as_str())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short: String = self.0.chars().take(16).collect();
        write!(f, "Fingerprint({})", short)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A 32-byte Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ed25519PublicKey(pub [u8; 32]);

impl Ed25519PublicKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Verify a signature over a message.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<()> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| CoreError::InvalidPublicKey)?;

        verifying_key
            .verify(message, &Signature::from_bytes(&signature.0))
            .map_err(|_| CoreError::InvalidSignature)
    }

    /// Verify the signature carried by a response.
    pub fn verify_response(&self, response: &Response) -> Result<()> {
        let signature = response.signature.as_ref().ok_or(CoreError::MissingSignature)?;
        self.verify(&response.signed_portion(), signature)
    }
}

impl fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Pub({})", &self.to_hex()[..16])
    }
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signature(pub [u8; 64]);

impl Ed25519Signature {
    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Sig({}...)", &self.to_hex()[..16])
    }
}

/// A keypair for signing responses.
///
/// This wraps ed25519-dalek's SigningKey.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Get the public key.
    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        Ed25519Signature(self.signing_key.sign(message).to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.public_key())
    }
}

/// Signs every response before it leaves the node.
pub trait Signer {
    fn sign(&self, response: &mut Response);
}

/// Ed25519 signer over `name-uri || payload`.
#[derive(Debug, Clone)]
pub struct Ed25519Signer {
    keypair: Keypair,
}

impl Ed25519Signer {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, response: &mut Response) {
        response.signature = Some(self.keypair.sign(&response.signed_portion()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;

    #[test]
    fn test_keypair_sign_verify() {
        let keypair = Keypair::generate();
        let message = b"hello world";
        let signature = keypair.sign(message);

        keypair
            .public_key()
            .verify(message, &signature)
            .expect("valid signature should verify");

        assert!(keypair.public_key().verify(b"hello worlD", &signature).is_err());
    }

    #[test]
    fn test_keypair_deterministic_from_seed() {
        let seed = [0x42u8; 32];
        assert_eq!(
            Keypair::from_seed(&seed).public_key(),
            Keypair::from_seed(&seed).public_key()
        );
    }

    #[test]
    fn test_signer_covers_name() {
        let signer = Ed25519Signer::new(Keypair::from_seed(&[7u8; 32]));
        let mut response = Response::new("/sync/ab".parse::<Name>().unwrap(), &b"state"[..]);
        assert!(matches!(
            signer.public_key().verify_response(&response),
            Err(CoreError::MissingSignature)
        ));

        signer.sign(&mut response);
        signer.public_key().verify_response(&response).unwrap();

        // Same payload under another name must not verify.
        response.name = "/sync/cd".parse().unwrap();
        assert!(signer.public_key().verify_response(&response).is_err());
    }

    #[test]
    fn test_fingerprint_component_roundtrip() {
        let fp = Fingerprint::from_hash(blake3::hash(b"state"));
        assert_eq!(fp.as_str().len(), 64);
        assert_eq!(Fingerprint::from_component(&fp.to_component()), fp);
        assert!(Fingerprint::bootstrap().is_bootstrap());
        assert!(!fp.is_bootstrap());
    }

    #[test]
    fn test_fingerprint_debug_truncates_on_char_boundary() {
        let fp = Fingerprint::from_hash(blake3::hash(b"state"));
        assert_eq!(format!("{:?}", fp), format!("Fingerprint({})", &fp.as_str()[..16]));

        // Fingerprints parsed off the wire need not be ASCII.
        let odd = Fingerprint::from("ééééééééééééééééé");
        assert_eq!(format!("{:?}", odd), format!("Fingerprint({})", "é".repeat(16)));
    }
}
