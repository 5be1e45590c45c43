/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits shared by signed messages and by the certificates that aggregate them.

use super::{
    crypto_primitives::verify,
    data_types::{SignatureBytes, TotalPower, VerifyingKeyBytes, ViewNumber},
    validator_set::ValidatorSet,
};

/// Data types that contain: 1. A message, and 2. A digital signature over said message whose
/// correctness can be verified against a verifying key.
pub trait SignedMessage {
    /// Get the bytes that are passed as input into the signing function to form the signature
    /// of the `SignedMessage`.
    fn message_bytes(&self) -> Vec<u8>;

    /// Get the signature of the `SignedMessage`.
    fn signature_bytes(&self) -> SignatureBytes;

    /// Verify that `signature_bytes` is a signature created by `signer` over `message_bytes`.
    fn is_correct(&self, signer: &VerifyingKeyBytes) -> bool {
        verify(signer, &self.message_bytes(), &self.signature_bytes())
    }
}

/// Data types that aggregate the signatures of multiple validators into evidence that a quorum of
/// validators in a particular validator set supports a particular decision.
pub trait Certificate {
    /// Get the view that the certificate is about.
    fn view(&self) -> ViewNumber;

    /// Sum up the powers of the validators in `validator_set` that signed the certificate.
    fn weight(&self, validator_set: &ValidatorSet) -> TotalPower;

    /// Check whether every signature in the certificate verifies, and the signers together have at
    /// least [`quorum`](ValidatorSet::quorum) power in `validator_set`.
    fn is_correctly_signed(&self, validator_set: &ValidatorSet) -> bool;
}
