/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cryptographic primitives.
//!
//! The definitions and re-exports in this module provide two categories of cryptographic primitives:
//! 1. **Cryptographic Hashes**: provided by the [`sha2`] crate.
//! 2. **Digital Signatures**: provided by the [`ed25519_dalek`] crate.
//!
//! The consensus core treats both as opaque operations: it hashes and signs Borsh serializations, and
//! verifies signatures against the verifying keys of the current validator set.

use super::data_types::{CryptoHash, SignatureBytes, VerifyingKeyBytes};

// re-exports below.
pub use sha2::Digest;
pub use sha2::Sha256 as CryptoHasher;

pub use ed25519_dalek::{Signature, SignatureError, Signer, SigningKey, Verifier, VerifyingKey};

/// A facade around [`SigningKey`] that implements method for [`sign`](Self::sign)-ing messages as well
/// as a getter for the [`public`](Self::public) key associated with the signing key.
#[derive(Clone)]
pub struct Keypair(SigningKey);

impl Keypair {
    /// Create a `Keypair` that wraps over `signing_key`.
    pub fn new(signing_key: SigningKey) -> Keypair {
        Keypair(signing_key)
    }

    /// Sign an arbitrary `message` with the `Keypair`.
    pub fn sign(&self, message: &[u8]) -> SignatureBytes {
        SignatureBytes::new(self.0.sign(message).to_bytes())
    }

    /// Get the `VerifyingKey` of this `Keypair`.
    pub fn public(&self) -> VerifyingKey {
        self.0.verifying_key()
    }

    /// Get the bytes of the `VerifyingKey` of this `Keypair`.
    pub fn public_bytes(&self) -> VerifyingKeyBytes {
        self.0.verifying_key().to_bytes()
    }
}

/// Compute the SHA256 hash of `bytes`.
pub fn hash(bytes: &[u8]) -> CryptoHash {
    let mut hasher = CryptoHasher::new();
    hasher.update(bytes);
    CryptoHash::new(hasher.finalize().into())
}

/// Check that `signature` is a signature by `signer` over `message`.
///
/// Returns `false` (rather than an error) if `signer` is not a valid Ed25519 verifying key.
pub fn verify(signer: &VerifyingKeyBytes, message: &[u8], signature: &SignatureBytes) -> bool {
    match VerifyingKey::from_bytes(signer) {
        Ok(verifying_key) => verifying_key
            .verify(message, &Signature::from_bytes(&signature.bytes()))
            .is_ok(),
        Err(_) => false,
    }
}

/// Borsh-serialize `value` into a fresh byte vector.
///
/// Serializing into a `Vec<u8>` cannot fail for the types in this crate, so the I/O error that Borsh's
/// writer interface could in principle return is discarded.
pub(crate) fn encode<T: borsh::BorshSerialize>(value: &T) -> Vec<u8> {
    let mut bytes = Vec::new();
    let _ = value.serialize(&mut bytes);
    bytes
}
