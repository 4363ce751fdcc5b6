// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::sync::Arc;

use async_trait::async_trait;
use node_data::ledger::Hash;
use node_data::message::{payload, Message, Payload, StepVote, Topics};
use tokio::sync::Mutex;

use crate::commons::Database;
use crate::errors::ConsensusError;
use crate::reduction::VoteHandler;

/// Block-reduction variant: votes carry candidate block hashes.
pub struct BlockVotes<D: Database> {
    db: Arc<Mutex<D>>,
}

impl<D: Database> BlockVotes<D> {
    pub fn new(db: Arc<Mutex<D>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl<D: Database + 'static> VoteHandler for BlockVotes<D> {
    type Vote = payload::Reduction;

    fn name() -> &'static str {
        "block_red"
    }

    fn topic() -> Topics {
        Topics::BlockReduction
    }

    fn agreement_topic() -> Topics {
        Topics::BlockAgreement
    }

    fn unwrap_vote(msg: &Message) -> Result<Self::Vote, ConsensusError> {
        match &msg.payload {
            Payload::Reduction(p) => Ok(p.clone()),
            _ => Err(ConsensusError::MalformedEvent),
        }
    }

    async fn verify_vote(
        &self,
        vote: &Self::Vote,
    ) -> Result<(), ConsensusError> {
        // The zero hash is the distinguished "empty" vote.
        if vote.voted_hash == [0u8; 32] {
            return Ok(());
        }

        if !self
            .db
            .lock()
            .await
            .contains_candidate_block(&vote.voted_hash)
        {
            return Err(ConsensusError::UnknownCandidate);
        }

        Ok(())
    }

    /// A voter re-sending its vote keeps the event with the higher
    /// signature.
    fn prefer(
        stored: &StepVote<Self::Vote>,
        incoming: &StepVote<Self::Vote>,
    ) -> bool {
        incoming.payload.signed_hash > stored.payload.signed_hash
    }

    fn extract_carry(&mut self, msg: &Message) -> Hash {
        match &msg.payload {
            // Selection winner opens the first step
            Payload::Score(p) => p.vote_hash,
            // First-step winner opens the second step
            Payload::BlockStepVotes(p) => p.voted_hash,
            _ => [0u8; 32],
        }
    }

    fn build_vote(&self, voted_hash: Hash, signed_hash: Vec<u8>) -> Payload {
        Payload::Reduction(payload::Reduction {
            voted_hash,
            signed_hash,
        })
    }

    fn build_step_votes(
        &self,
        voted_hash: Hash,
        votes: Vec<StepVote<Self::Vote>>,
    ) -> Payload {
        Payload::BlockStepVotes(payload::BlockStepVotes { voted_hash, votes })
    }

    fn build_agreement(
        &self,
        winner: Hash,
        votes: Vec<StepVote<Self::Vote>>,
    ) -> Payload {
        Payload::BlockAgreement(payload::BlockAgreement {
            block_hash: winner,
            votes,
        })
    }
}
