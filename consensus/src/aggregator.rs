// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::collections::BTreeMap;

use node_data::bls::PublicKey;
use node_data::ledger::Hash;
use node_data::message::payload::VotePayload;
use node_data::message::{Header, StepVote};
use tracing::trace;

use crate::errors::ConsensusError;
use crate::user::committee::Committee;
use crate::util::cluster::Cluster;

/// Collects votes of a reduction step into per-hash buckets, weighted by
/// the voter's committee credits, until one bucket crosses the quorum.
pub struct Aggregator<P> {
    buckets: BTreeMap<Hash, (Vec<StepVote<P>>, Cluster<PublicKey>)>,
    voters: BTreeMap<PublicKey, Hash>,
}

impl<P> Default for Aggregator<P> {
    fn default() -> Self {
        Self {
            buckets: BTreeMap::new(),
            voters: BTreeMap::new(),
        }
    }
}

impl<P: VotePayload + Clone> Aggregator<P> {
    /// Accounts a vote of a committee member.
    ///
    /// A member votes at most once per (round, step). A second vote for a
    /// different hash is a protocol violation and is dropped; a second
    /// vote for the same hash is resolved by `prefer`, keeping a single
    /// event per voter.
    ///
    /// Returns the bucket snapshot once its cumulative weight reaches the
    /// quorum.
    pub fn collect_vote(
        &mut self,
        committee: &Committee,
        header: &Header,
        payload: &P,
        prefer: fn(&StepVote<P>, &StepVote<P>) -> bool,
    ) -> Result<Option<(Hash, Vec<StepVote<P>>)>, ConsensusError> {
        // A vote from a non-member is never counted.
        let weight = committee
            .votes_for(&header.pubkey_bls)
            .ok_or(ConsensusError::NotCommitteeMember)?;

        let hash = *payload.voted_hash();

        if let Some(prev_hash) = self.voters.get(&header.pubkey_bls) {
            if *prev_hash != hash {
                return Err(ConsensusError::DuplicateVote);
            }

            if let Some((votes, _)) = self.buckets.get_mut(&hash) {
                if let Some(stored) = votes
                    .iter_mut()
                    .find(|v| v.pubkey_bls == header.pubkey_bls)
                {
                    let incoming = StepVote {
                        round: header.round,
                        step: header.step,
                        pubkey_bls: header.pubkey_bls,
                        payload: payload.clone(),
                    };

                    if prefer(stored, &incoming) {
                        *stored = incoming;
                    }
                }
            }

            // The voter's weight is already accounted.
            return Ok(None);
        }

        self.voters.insert(header.pubkey_bls, hash);

        let (votes, cluster) = self.buckets.entry(hash).or_default();
        votes.push(StepVote {
            round: header.round,
            step: header.step,
            pubkey_bls: header.pubkey_bls,
            payload: payload.clone(),
        });
        cluster.set_weight(&header.pubkey_bls, weight);

        let total = cluster.total_occurrences();
        let quorum_target = committee.quorum();
        trace!("total votes: {}, quorum target: {}", total, quorum_target);

        if total >= quorum_target {
            return Ok(Some((hash, votes.clone())));
        }

        Ok(None)
    }

    /// The bucket with the highest cumulative weight, or None when the
    /// aggregator is empty or the top buckets are tied.
    pub fn get_winner(&self) -> Option<(Hash, Vec<StepVote<P>>)> {
        let mut best: Option<(&Hash, &Vec<StepVote<P>>, usize)> = None;
        let mut tied = false;

        for (hash, (votes, cluster)) in self.buckets.iter() {
            let weight = cluster.total_occurrences();

            match best {
                Some((_, _, best_weight)) if weight == best_weight => {
                    tied = true;
                }
                Some((_, _, best_weight)) if weight > best_weight => {
                    best = Some((hash, votes, weight));
                    tied = false;
                }
                None => best = Some((hash, votes, weight)),
                _ => {}
            }
        }

        if tied {
            return None;
        }

        best.map(|(hash, votes, _)| (*hash, votes.clone()))
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use node_data::message::payload::Reduction;

    use super::*;

    fn keep_first(_: &StepVote<Reduction>, _: &StepVote<Reduction>) -> bool {
        false
    }

    fn header(key: PublicKey) -> Header {
        Header {
            pubkey_bls: key,
            round: 1,
            step: 2,
            topic: 0,
        }
    }

    fn vote(hash: Hash) -> Reduction {
        Reduction {
            voted_hash: hash,
            signed_hash: vec![1; 33],
        }
    }

    #[test]
    fn test_non_member_vote_is_never_counted() {
        let member = PublicKey::from_seed_u64(1);
        let outsider = PublicKey::from_seed_u64(99);
        let committee = Committee::from_credits(member, &[(member, 4)]);

        let mut aggr = Aggregator::<Reduction>::default();
        assert_eq!(
            aggr.collect_vote(
                &committee,
                &header(outsider),
                &vote([1; 32]),
                keep_first
            ),
            Err(ConsensusError::NotCommitteeMember)
        );
        assert!(aggr.get_winner().is_none());
    }

    #[test]
    fn test_weighted_quorum() {
        let a = PublicKey::from_seed_u64(1);
        let b = PublicKey::from_seed_u64(2);
        let committee = Committee::from_credits(a, &[(a, 3), (b, 1)]);
        assert_eq!(committee.quorum(), 3);

        let block_hash = hex!(
            "b70189c7e7a347989f4fbc1205ce612f755dfc489ecf28f9f883800acf078bd5"
        );

        let mut aggr = Aggregator::<Reduction>::default();

        // A single vote of a triple-credit member crosses the quorum
        let result = aggr
            .collect_vote(&committee, &header(a), &vote(block_hash), keep_first)
            .unwrap()
            .expect("quorum to be reached");

        assert_eq!(result.0, block_hash);
        assert_eq!(result.1.len(), 1);
        assert_eq!(result.1[0].pubkey_bls, a);
    }

    #[test]
    fn test_duplicate_votes() {
        let a = PublicKey::from_seed_u64(1);
        let b = PublicKey::from_seed_u64(2);
        let committee = Committee::from_credits(a, &[(a, 1), (b, 3)]);

        let mut aggr = Aggregator::<Reduction>::default();
        assert_eq!(
            aggr.collect_vote(&committee, &header(a), &vote([1; 32]), keep_first),
            Ok(None)
        );

        // Changing one's vote mid-step is a protocol violation
        assert_eq!(
            aggr.collect_vote(&committee, &header(a), &vote([2; 32]), keep_first),
            Err(ConsensusError::DuplicateVote)
        );

        // A re-sent identical vote contributes at most once
        assert_eq!(
            aggr.collect_vote(&committee, &header(a), &vote([1; 32]), keep_first),
            Ok(None)
        );
        assert_eq!(aggr.get_winner().unwrap().1.len(), 1);
    }

    #[test]
    fn test_duplicate_resolution_prefers_higher_signature() {
        fn prefer_higher(
            stored: &StepVote<Reduction>,
            incoming: &StepVote<Reduction>,
        ) -> bool {
            incoming.payload.signed_hash > stored.payload.signed_hash
        }

        let a = PublicKey::from_seed_u64(1);
        let committee = Committee::from_credits(a, &[(a, 1)]);

        let mut aggr = Aggregator::<Reduction>::default();
        let low = Reduction {
            voted_hash: [1; 32],
            signed_hash: vec![1; 33],
        };
        let high = Reduction {
            voted_hash: [1; 32],
            signed_hash: vec![9; 33],
        };

        let _ = aggr.collect_vote(&committee, &header(a), &low, prefer_higher);
        let _ = aggr.collect_vote(&committee, &header(a), &high, prefer_higher);

        let (_, votes) = aggr.get_winner().unwrap();
        assert_eq!(votes[0].payload.signed_hash, vec![9; 33]);
    }

    #[test]
    fn test_plurality_winner_and_ties() {
        let a = PublicKey::from_seed_u64(1);
        let b = PublicKey::from_seed_u64(2);
        let c = PublicKey::from_seed_u64(3);
        let d = PublicKey::from_seed_u64(4);
        let committee = Committee::from_credits(
            a,
            &[(a, 2), (b, 1), (c, 1), (d, 1)],
        );
        assert_eq!(committee.quorum(), 4);

        let mut aggr = Aggregator::<Reduction>::default();
        let _ = aggr.collect_vote(&committee, &header(a), &vote([1; 32]), keep_first);
        let _ = aggr.collect_vote(&committee, &header(b), &vote([2; 32]), keep_first);

        // 2 vs 1: the heavier bucket wins the plurality
        assert_eq!(aggr.get_winner().unwrap().0, [1; 32]);

        // 2 vs 2: tied buckets produce no winner
        let _ = aggr.collect_vote(&committee, &header(c), &vote([2; 32]), keep_first);
        assert!(aggr.get_winner().is_none());

        // 2 vs 3: the late vote breaks the tie below quorum
        let _ = aggr.collect_vote(&committee, &header(d), &vote([2; 32]), keep_first);
        assert_eq!(aggr.get_winner().unwrap().0, [2; 32]);
    }
}
