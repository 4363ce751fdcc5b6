// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

// RoundUpdate carries the data about the new Round, such as this
// provisioner keys, the current Seed and the Hash of the tip block.

use async_trait::async_trait;
use node_data::bls::PublicKey;
use node_data::ledger::{Candidate, Hash, Header, Seed};
use node_data::message::{AsyncQueue, Message, Payload};
use tracing::error;

use crate::config;
use crate::errors::ConsensusError;

#[derive(Clone, Debug, Default)]
pub struct RoundUpdate {
    // Current round number of the ongoing consensus
    pub round: u64,

    // This provisioner consensus keys
    pub pubkey_bls: PublicKey,

    pub timeouts: TimeoutSet,

    seed: Seed,
    hash: Hash,
    timestamp: i64,
}

impl RoundUpdate {
    pub fn new(
        pubkey_bls: PublicKey,
        tip: &Header,
        timeouts: TimeoutSet,
    ) -> Self {
        RoundUpdate {
            round: tip.height + 1,
            pubkey_bls,
            timeouts,
            seed: tip.seed,
            hash: tip.hash,
            timestamp: tip.timestamp,
        }
    }

    pub fn seed(&self) -> Seed {
        self.seed
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Base step timers, in milliseconds, per phase kind.
#[derive(Clone, Debug)]
pub struct TimeoutSet {
    pub selection: u64,
    pub reduction: u64,
    pub sig_set: u64,
}

impl Default for TimeoutSet {
    fn default() -> Self {
        Self {
            selection: config::CONSENSUS_TIMEOUT_MS,
            reduction: config::CONSENSUS_TIMEOUT_MS,
            sig_set: config::CONSENSUS_TIMEOUT_MS,
        }
    }
}

/// Candidate store consumed by the consensus. An implementation may
/// satisfy a lookup miss through the external GetCandidate RPC.
#[async_trait]
pub trait Database: Send + Sync {
    fn store_candidate_block(&mut self, candidate: Candidate);
    async fn get_candidate_block_by_hash(
        &self,
        h: &Hash,
    ) -> anyhow::Result<Candidate>;
    fn contains_candidate_block(&self, h: &Hash) -> bool;
    fn delete_candidate_blocks(&mut self);
}

/// Phases of a single iteration, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepName {
    Selection = 0,
    FirstReduction = 1,
    SecondReduction = 2,
    FirstSigSet = 3,
    SecondSigSet = 4,
}

pub trait IterCounter {
    /// Count of all steps per a single iteration
    const STEP_NUM: u8 = 5;
    type Step;

    fn next(&mut self) -> Result<(), ConsensusError>
    where
        Self: Sized;
    fn step_from_pos(&self, pos: usize) -> Self::Step;
}

impl IterCounter for u8 {
    type Step = u8;

    fn next(&mut self) -> Result<(), ConsensusError> {
        let next = *self + 1;
        if next >= config::CONSENSUS_MAX_STEP / Self::STEP_NUM {
            return Err(ConsensusError::StepCapReached);
        }

        *self = next;
        Ok(())
    }

    // Steps are 1-based; a step of 0 marks an uninitialized header.
    fn step_from_pos(&self, pos: usize) -> Self::Step {
        self * Self::STEP_NUM + pos as u8 + 1
    }
}

/// Forwards agreement events produced by the reduction phases to the
/// agreement loop, filtering out the no-progress ones.
#[derive(Clone)]
pub(crate) struct AgreementSender {
    queue: AsyncQueue<Message>,
}

impl AgreementSender {
    pub(crate) fn new(queue: AsyncQueue<Message>) -> Self {
        Self { queue }
    }

    /// Sends an agreement (internally) to the agreement loop.
    pub(crate) async fn send(&self, msg: Message) -> bool {
        let (block_hash, votes_len) = match &msg.payload {
            Payload::BlockAgreement(p) => (p.block_hash, p.votes.len()),
            Payload::SigSetAgreement(p) => (p.block_hash, p.votes.len()),
            _ => return false,
        };

        // Zero-hash agreements carry no progress.
        if block_hash == [0u8; 32] || votes_len == 0 {
            return false;
        }

        tracing::debug!(
            event = "send agreement",
            hash = node_data::ledger::to_str(&block_hash),
            round = msg.header.round,
            step = msg.header.step,
            votes = votes_len,
        );

        let _ = self
            .queue
            .send(msg)
            .await
            .map_err(|e| error!("send agreement failed with {:?}", e));

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_from_pos() {
        let iter: u8 = 0;
        assert_eq!(iter.step_from_pos(StepName::Selection as usize), 1);
        assert_eq!(iter.step_from_pos(StepName::SecondSigSet as usize), 5);

        let iter: u8 = 3;
        assert_eq!(iter.step_from_pos(StepName::Selection as usize), 16);
        assert_eq!(iter.step_from_pos(StepName::FirstSigSet as usize), 19);
    }

    #[test]
    fn test_step_cap() {
        let mut iter: u8 = 0;
        let mut advanced = 0;
        while iter.next().is_ok() {
            advanced += 1;
        }

        // The last valid iteration must not produce a step beyond the cap.
        assert!(
            iter.step_from_pos(StepName::SecondSigSet as usize)
                <= config::CONSENSUS_MAX_STEP
        );
        assert!(advanced > 0);
    }
}
