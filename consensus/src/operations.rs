// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use async_trait::async_trait;
use node_data::bls::PublicKey;
use node_data::ledger::Seed;
use thiserror::Error;

use crate::errors::ConsensusError;

#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("score proof verification failed")]
    InvalidProof,
    #[error("verifier failure: {0}")]
    Failed(String),
}

impl From<VerifierError> for ConsensusError {
    fn from(e: VerifierError) -> Self {
        match e {
            VerifierError::InvalidSignature => ConsensusError::InvalidSignature,
            VerifierError::InvalidProof => ConsensusError::InvalidSignature,
            VerifierError::Failed(cause) => {
                ConsensusError::InternalVerifierFailure(cause)
            }
        }
    }
}

/// Narrow interface to the cryptographic subsystem.
///
/// Calls are potentially long-running and executed behind a lock, so the
/// phase handlers treat them as suspension points rather than doing any
/// curve arithmetic inline.
#[async_trait]
pub trait Operations: Send + Sync {
    /// Verifies a BLS signature of a committee member over `msg`.
    async fn verify_bls(
        &self,
        pubkey: &PublicKey,
        msg: &[u8],
        sig: &[u8],
    ) -> Result<(), VerifierError>;

    /// Verifies a block generator's Ed25519 signature over `msg`.
    async fn verify_ed25519(
        &self,
        pubkey: &[u8; 32],
        msg: &[u8],
        sig: &[u8; 64],
    ) -> Result<(), VerifierError>;

    /// Verifies the zero-knowledge score proof against the public inputs
    /// it was generated from.
    async fn verify_score_proof(
        &self,
        proof: &[u8],
        seed: &Seed,
        z: &[u8; 32],
        bid_list_subset: &[u8],
    ) -> Result<(), VerifierError>;

    /// Signs `msg` with this provisioner's BLS secret key.
    async fn sign_bls(&self, msg: &[u8]) -> Result<Vec<u8>, VerifierError>;
}
