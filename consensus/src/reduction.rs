// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

pub mod block;
pub mod handler;
pub mod sigset;
pub mod step;

use async_trait::async_trait;
use node_data::ledger::Hash;
use node_data::message::payload::VotePayload;
use node_data::message::{Message, Payload, StepVote, Topics};
use node_data::Serializable;

use crate::errors::ConsensusError;

/// The capability set a reduction variant plugs into the generic broker:
/// vote extraction and verification, duplicate priority, and construction
/// of outgoing events. Block and SigSet reduction are the two variants.
#[async_trait]
pub trait VoteHandler: Send + Sync + 'static {
    type Vote: VotePayload
        + Serializable
        + Clone
        + PartialEq
        + std::fmt::Debug
        + Send
        + Sync
        + 'static;

    fn name() -> &'static str;
    fn topic() -> Topics;
    fn agreement_topic() -> Topics;

    /// Extracts this variant's vote payload from an inbound message.
    fn unwrap_vote(msg: &Message) -> Result<Self::Vote, ConsensusError>;

    /// Variant-specific validity checks beyond the vote signature.
    async fn verify_vote(&self, vote: &Self::Vote)
        -> Result<(), ConsensusError>;

    /// Resolves two votes of the same voter for the same hash. Returns
    /// true when the incoming event replaces the stored one.
    fn prefer(
        stored: &StepVote<Self::Vote>,
        incoming: &StepVote<Self::Vote>,
    ) -> bool;

    /// Reads the hash to vote for out of the message that opens this
    /// step, updating any binding the variant keeps.
    fn extract_carry(&mut self, msg: &Message) -> Hash;

    /// Builds this node's outgoing vote payload.
    fn build_vote(&self, voted_hash: Hash, signed_hash: Vec<u8>) -> Payload;

    /// Builds the internal first-step result handed to the second step.
    fn build_step_votes(
        &self,
        voted_hash: Hash,
        votes: Vec<StepVote<Self::Vote>>,
    ) -> Payload;

    /// Builds the agreement payload carrying the winning vote set.
    fn build_agreement(
        &self,
        winner: Hash,
        votes: Vec<StepVote<Self::Vote>>,
    ) -> Payload;
}
