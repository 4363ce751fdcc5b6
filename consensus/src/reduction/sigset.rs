// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use async_trait::async_trait;
use node_data::ledger::Hash;
use node_data::message::{
    payload, vote_set_hash, Message, Payload, StepVote, Topics,
};

use crate::errors::ConsensusError;
use crate::reduction::VoteHandler;

/// SigSet-reduction variant: votes carry signature-set hashes, bound to
/// the block hash the reduction phase agreed on.
#[derive(Default)]
pub struct SigSetVotes {
    block_hash: Hash,
}

impl SigSetVotes {
    pub fn block_hash(&self) -> &Hash {
        &self.block_hash
    }
}

#[async_trait]
impl VoteHandler for SigSetVotes {
    type Vote = payload::SigSet;

    fn name() -> &'static str {
        "sigset_red"
    }

    fn topic() -> Topics {
        Topics::SigSetReduction
    }

    fn agreement_topic() -> Topics {
        Topics::SigSetAgreement
    }

    fn unwrap_vote(msg: &Message) -> Result<Self::Vote, ConsensusError> {
        match &msg.payload {
            Payload::SigSet(p) => Ok(p.clone()),
            _ => Err(ConsensusError::MalformedEvent),
        }
    }

    async fn verify_vote(
        &self,
        vote: &Self::Vote,
    ) -> Result<(), ConsensusError> {
        // The vote must be bound to the same agreed block
        if vote.block_hash != self.block_hash {
            return Err(ConsensusError::MalformedEvent);
        }

        Ok(())
    }

    // No priority for sigset duplicates; the first event stays.
    fn prefer(
        _stored: &StepVote<Self::Vote>,
        _incoming: &StepVote<Self::Vote>,
    ) -> bool {
        false
    }

    fn extract_carry(&mut self, msg: &Message) -> Hash {
        match &msg.payload {
            // A block agreement opens the first step: the hash to reduce
            // is the digest of its vote set.
            Payload::BlockAgreement(p) => {
                self.block_hash = p.block_hash;
                vote_set_hash(&p.votes)
            }
            // First-step winner opens the second step
            Payload::SigSetStepVotes(p) => {
                self.block_hash = p.block_hash;
                p.voted_hash
            }
            _ => {
                self.block_hash = [0u8; 32];
                [0u8; 32]
            }
        }
    }

    fn build_vote(&self, voted_hash: Hash, signed_hash: Vec<u8>) -> Payload {
        Payload::SigSet(payload::SigSet {
            voted_hash,
            signed_hash,
            block_hash: self.block_hash,
        })
    }

    fn build_step_votes(
        &self,
        voted_hash: Hash,
        votes: Vec<StepVote<Self::Vote>>,
    ) -> Payload {
        Payload::SigSetStepVotes(payload::SigSetStepVotes {
            voted_hash,
            block_hash: self.block_hash,
            votes,
        })
    }

    fn build_agreement(
        &self,
        _winner: Hash,
        votes: Vec<StepVote<Self::Vote>>,
    ) -> Payload {
        Payload::SigSetAgreement(payload::SigSetAgreement {
            block_hash: self.block_hash,
            votes,
        })
    }
}
