// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::sync::Arc;

use node_data::ledger::{Hash, Seed};
use node_data::message::payload::VotePayload;
use node_data::message::{marshal_signable_vote, Message, Payload, StepVote};
use tokio::sync::Mutex;

use crate::errors::ConsensusError;
use crate::operations::Operations;
use crate::user::committee::CommitteeSet;
use crate::user::sortition;
use crate::util::cluster::Cluster;

/// Performs the full verification of an agreement event: every vote in
/// the carried set must be signed by a member of the committee of the
/// vote's (round, step), name the agreed hash, and the set's cumulative
/// weight must reach the quorum.
///
/// Intended to run inside the accumulator task, off the phase hot path.
pub async fn verify_agreement<T: Operations>(
    msg: &Message,
    committees: &CommitteeSet,
    seed: Seed,
    executor: &Arc<Mutex<T>>,
) -> Result<(), ConsensusError> {
    match &msg.payload {
        Payload::BlockAgreement(p) => {
            verify_vote_set(
                &p.votes,
                &p.block_hash,
                msg.header.round,
                msg.header.step,
                committees,
                seed,
                executor,
            )
            .await
        }
        Payload::SigSetAgreement(p) => {
            // Every vote must be bound to the agreed block
            for vote in &p.votes {
                if vote.payload.block_hash != p.block_hash {
                    return Err(ConsensusError::MalformedEvent);
                }
            }

            // The voted hash of a sigset agreement is the signature-set
            // hash its votes name.
            let voted_hash = p
                .votes
                .first()
                .map(|vote| vote.payload.voted_hash)
                .ok_or(ConsensusError::QuorumMissed)?;

            verify_vote_set(
                &p.votes,
                &voted_hash,
                msg.header.round,
                msg.header.step,
                committees,
                seed,
                executor,
            )
            .await
        }
        _ => Err(ConsensusError::MalformedEvent),
    }
}

async fn verify_vote_set<T, P>(
    votes: &[StepVote<P>],
    expected_hash: &Hash,
    round: u64,
    step: u8,
    committees: &CommitteeSet,
    seed: Seed,
    executor: &Arc<Mutex<T>>,
) -> Result<(), ConsensusError>
where
    T: Operations,
    P: VotePayload,
{
    if votes.is_empty() || *expected_hash == [0u8; 32] {
        return Err(ConsensusError::QuorumMissed);
    }

    let cfg = sortition::Config::reduction(seed, round, step);
    let committee = committees.get_or_create(&cfg).await;

    let mut voters = Cluster::new();
    for vote in votes {
        if vote.round != round || vote.step != step {
            return Err(ConsensusError::MalformedEvent);
        }

        if vote.payload.voted_hash() != expected_hash {
            return Err(ConsensusError::MalformedEvent);
        }

        // A vote from a non-member invalidates the whole set
        let weight = committee
            .votes_for(&vote.pubkey_bls)
            .ok_or(ConsensusError::NotCommitteeMember)?;

        // so does a duplicated voter
        if voters.set_weight(&vote.pubkey_bls, weight).is_none() {
            return Err(ConsensusError::DuplicateVote);
        }

        let signable =
            marshal_signable_vote(vote.payload.voted_hash(), round, step);
        executor
            .lock()
            .await
            .verify_bls(&vote.pubkey_bls, &signable, vote.payload.signed_hash())
            .await?;
    }

    if voters.total_occurrences() < committee.quorum() {
        return Err(ConsensusError::QuorumMissed);
    }

    Ok(())
}
