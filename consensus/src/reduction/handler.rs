// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::sync::Arc;

use async_trait::async_trait;
use node_data::ledger::Hash;
use node_data::message::payload::VotePayload;
use node_data::message::{
    marshal_signable_vote, Header, Message, StepVote, Topics,
};
use tokio::sync::Mutex;

use crate::aggregator::Aggregator;
use crate::commons::RoundUpdate;
use crate::errors::ConsensusError;
use crate::msg_handler::{HandleMsgOutput, MsgHandler};
use crate::operations::Operations;
use crate::reduction::VoteHandler;
use crate::user::committee::Committee;

/// Which of the two broker steps this handler instance runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    First,
    Second,
}

/// Generic reduction handler: collects votes of one step into the
/// aggregator and snapshots the result on quorum or timeout. The two
/// instances of a broker share their semantics through the `VoteHandler`
/// variant.
pub struct Reduction<V: VoteHandler, T: Operations> {
    pub(crate) aggr: Aggregator<V::Vote>,
    pub(crate) voted_hash: Hash,
    pub(crate) kind: StepKind,
    pub(crate) variant: V,
    executor: Arc<Mutex<T>>,
}

#[async_trait]
impl<V: VoteHandler, T: Operations + 'static> MsgHandler for Reduction<V, T> {
    /// Verifies if msg is a valid reduction vote for this step.
    async fn verify(
        &mut self,
        msg: &Message,
        _ru: &RoundUpdate,
        _step: u8,
        committee: &Committee,
    ) -> Result<(), ConsensusError> {
        let vote = V::unwrap_vote(msg)?;

        if !committee.is_member(&msg.header.pubkey_bls) {
            return Err(ConsensusError::NotCommitteeMember);
        }

        let signable = marshal_signable_vote(
            vote.voted_hash(),
            msg.header.round,
            msg.header.step,
        );
        self.executor
            .lock()
            .await
            .verify_bls(&msg.header.pubkey_bls, &signable, vote.signed_hash())
            .await?;

        self.variant.verify_vote(&vote).await
    }

    /// Collects the vote and snapshots the step result once a bucket
    /// crosses the quorum.
    async fn collect(
        &mut self,
        msg: Message,
        ru: &RoundUpdate,
        step: u8,
        committee: &Committee,
    ) -> Result<HandleMsgOutput, ConsensusError> {
        let vote = V::unwrap_vote(&msg)?;

        if let Some((hash, votes)) =
            self.aggr
                .collect_vote(committee, &msg.header, &vote, V::prefer)?
        {
            return Ok(HandleMsgOutput::Ready(
                self.step_result(ru, step, hash, votes),
            ));
        }

        Ok(HandleMsgOutput::Pending)
    }

    /// Handles an event of step execution timeout.
    fn handle_timeout(
        &mut self,
        ru: &RoundUpdate,
        step: u8,
    ) -> Result<HandleMsgOutput, ConsensusError> {
        let result = match self.kind {
            // Without a quorum the first step snapshots the plurality
            // winner; tied buckets degrade to the empty vote.
            StepKind::First => {
                let (hash, votes) = self
                    .aggr
                    .get_winner()
                    .unwrap_or(([0u8; 32], vec![]));

                self.internal_result(ru, step, hash, votes)
            }
            // The second step requires a quorum; its absence is reported
            // downstream as a no-progress agreement.
            StepKind::Second => self.no_progress_agreement(ru, step),
        };

        Ok(HandleMsgOutput::Ready(result))
    }
}

impl<V: VoteHandler, T: Operations + 'static> Reduction<V, T> {
    pub(crate) fn new(
        kind: StepKind,
        variant: V,
        executor: Arc<Mutex<T>>,
    ) -> Self {
        Self {
            aggr: Aggregator::default(),
            voted_hash: [0u8; 32],
            kind,
            variant,
            executor,
        }
    }

    pub(crate) fn voted_hash(&self) -> Hash {
        self.voted_hash
    }

    pub(crate) fn reset(&mut self) {
        self.aggr = Aggregator::default();
        self.voted_hash = [0u8; 32];
    }

    fn step_result(
        &self,
        ru: &RoundUpdate,
        step: u8,
        hash: Hash,
        votes: Vec<StepVote<V::Vote>>,
    ) -> Message {
        match self.kind {
            StepKind::First => self.internal_result(ru, step, hash, votes),
            StepKind::Second => {
                // An agreement is emitted only when the quorum confirms
                // the hash carried over from the first step.
                if hash != [0u8; 32] && hash == self.voted_hash {
                    return Message {
                        header: self.result_header(
                            ru,
                            step,
                            V::agreement_topic() as u8,
                        ),
                        payload: self.variant.build_agreement(hash, votes),
                    };
                }

                self.no_progress_agreement(ru, step)
            }
        }
    }

    fn internal_result(
        &self,
        ru: &RoundUpdate,
        step: u8,
        hash: Hash,
        votes: Vec<StepVote<V::Vote>>,
    ) -> Message {
        Message {
            header: self.result_header(ru, step, Topics::Unknown as u8),
            payload: self.variant.build_step_votes(hash, votes),
        }
    }

    fn no_progress_agreement(&self, ru: &RoundUpdate, step: u8) -> Message {
        Message {
            header: self.result_header(ru, step, V::agreement_topic() as u8),
            payload: self.variant.build_agreement([0u8; 32], vec![]),
        }
    }

    fn result_header(&self, ru: &RoundUpdate, step: u8, topic: u8) -> Header {
        Header {
            pubkey_bls: ru.pubkey_bls,
            round: ru.round,
            step,
            topic,
        }
    }
}

#[cfg(test)]
mod tests {
    use node_data::bls::PublicKey;
    use node_data::ledger::Candidate;
    use node_data::message::payload::Reduction as ReductionPayload;
    use node_data::message::Payload;

    use super::*;
    use crate::commons::Database;
    use crate::operations::VerifierError;
    use crate::reduction::block::BlockVotes;

    struct AcceptAll;

    #[async_trait]
    impl Operations for AcceptAll {
        async fn verify_bls(
            &self,
            _pubkey: &PublicKey,
            _msg: &[u8],
            sig: &[u8],
        ) -> Result<(), VerifierError> {
            // An empty signature models a mutated/invalid one
            if sig.is_empty() {
                return Err(VerifierError::InvalidSignature);
            }
            Ok(())
        }

        async fn verify_ed25519(
            &self,
            _pubkey: &[u8; 32],
            _msg: &[u8],
            _sig: &[u8; 64],
        ) -> Result<(), VerifierError> {
            Ok(())
        }

        async fn verify_score_proof(
            &self,
            _proof: &[u8],
            _seed: &node_data::ledger::Seed,
            _z: &[u8; 32],
            _bid_list_subset: &[u8],
        ) -> Result<(), VerifierError> {
            Ok(())
        }

        async fn sign_bls(
            &self,
            _msg: &[u8],
        ) -> Result<Vec<u8>, VerifierError> {
            Ok(vec![1; 33])
        }
    }

    #[derive(Default)]
    struct MemDb {
        candidates: std::collections::HashMap<[u8; 32], Candidate>,
    }

    #[async_trait]
    impl Database for MemDb {
        fn store_candidate_block(&mut self, candidate: Candidate) {
            self.candidates.insert(candidate.hash, candidate);
        }

        async fn get_candidate_block_by_hash(
            &self,
            h: &[u8; 32],
        ) -> anyhow::Result<Candidate> {
            self.candidates
                .get(h)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("not found"))
        }

        fn contains_candidate_block(&self, h: &[u8; 32]) -> bool {
            self.candidates.contains_key(h)
        }

        fn delete_candidate_blocks(&mut self) {
            self.candidates.clear();
        }
    }

    fn reduction_msg(key: PublicKey, voted_hash: [u8; 32]) -> Message {
        Message::new_reduction(
            Header {
                pubkey_bls: key,
                round: 1,
                step: 2,
                topic: 0,
            },
            ReductionPayload {
                voted_hash,
                signed_hash: vec![7; 33],
            },
        )
    }

    fn handler(
        kind: StepKind,
        db: Arc<Mutex<MemDb>>,
    ) -> Reduction<BlockVotes<MemDb>, AcceptAll> {
        Reduction::new(kind, BlockVotes::new(db), Arc::new(Mutex::new(AcceptAll)))
    }

    #[tokio::test]
    async fn test_unknown_candidate_is_rejected() {
        let db = Arc::new(Mutex::new(MemDb::default()));
        let mut h = handler(StepKind::First, db.clone());

        let key = PublicKey::from_seed_u64(1);
        let committee = Committee::from_credits(key, &[(key, 4)]);
        let ru = RoundUpdate::default();

        let msg = reduction_msg(key, [9; 32]);
        assert_eq!(
            h.verify(&msg, &ru, 2, &committee).await,
            Err(ConsensusError::UnknownCandidate)
        );

        // Once the candidate body is cached the same vote verifies
        db.lock().await.store_candidate_block(Candidate {
            hash: [9; 32],
            data: vec![1],
        });
        assert_eq!(h.verify(&msg, &ru, 2, &committee).await, Ok(()));

        // The empty vote needs no candidate
        let empty = reduction_msg(key, [0; 32]);
        assert_eq!(h.verify(&empty, &ru, 2, &committee).await, Ok(()));
    }

    #[tokio::test]
    async fn test_late_event_is_rejected() {
        let db = Arc::new(Mutex::new(MemDb::default()));
        let mut h = handler(StepKind::First, db);

        let key = PublicKey::from_seed_u64(1);
        let committee = Committee::from_credits(key, &[(key, 4)]);

        let tip = node_data::ledger::Header {
            height: 4,
            ..Default::default()
        };
        let ru = RoundUpdate::new(key, &tip, Default::default());
        assert_eq!(ru.round, 5);

        // An event of round R-1 arriving mid-round is dropped with a
        // low-priority error and no state change.
        let mut msg = reduction_msg(key, [0; 32]);
        msg.header.round = 4;
        msg.header.step = 2;

        let result = h.is_valid(&msg, &ru, 2, &committee).await;
        assert_eq!(result, Err(ConsensusError::WrongRound));
        assert_eq!(
            result.unwrap_err().priority(),
            crate::errors::Priority::Low
        );
        assert!(h.aggr.get_winner().is_none());

        // Same round, earlier step
        let mut msg = reduction_msg(key, [0; 32]);
        msg.header.round = 5;
        msg.header.step = 1;
        assert_eq!(
            h.is_valid(&msg, &ru, 2, &committee).await,
            Err(ConsensusError::WrongStep)
        );

        // Later step is reported for parking
        let mut msg = reduction_msg(key, [0; 32]);
        msg.header.round = 5;
        msg.header.step = 3;
        assert_eq!(
            h.is_valid(&msg, &ru, 2, &committee).await,
            Err(ConsensusError::FutureEvent)
        );
    }

    #[tokio::test]
    async fn test_invalid_signature_is_rejected() {
        let db = Arc::new(Mutex::new(MemDb::default()));
        let mut h = handler(StepKind::First, db);

        let key = PublicKey::from_seed_u64(1);
        let committee = Committee::from_credits(key, &[(key, 4)]);

        let mut msg = reduction_msg(key, [0; 32]);
        if let Payload::Reduction(p) = &mut msg.payload {
            p.signed_hash = vec![];
        }

        assert_eq!(
            h.verify(&msg, &RoundUpdate::default(), 2, &committee).await,
            Err(ConsensusError::InvalidSignature)
        );
    }

    #[tokio::test]
    async fn test_non_member_is_rejected() {
        let db = Arc::new(Mutex::new(MemDb::default()));
        let mut h = handler(StepKind::First, db);

        let member = PublicKey::from_seed_u64(1);
        let outsider = PublicKey::from_seed_u64(2);
        let committee = Committee::from_credits(member, &[(member, 4)]);

        let msg = reduction_msg(outsider, [0; 32]);
        assert_eq!(
            h.verify(&msg, &RoundUpdate::default(), 2, &committee).await,
            Err(ConsensusError::NotCommitteeMember)
        );
    }

    #[tokio::test]
    async fn test_first_step_quorum_snapshot() {
        let db = Arc::new(Mutex::new(MemDb::default()));
        let mut h = handler(StepKind::First, db);
        h.voted_hash = [9; 32];

        let key = PublicKey::from_seed_u64(1);
        let committee = Committee::from_credits(key, &[(key, 4)]);

        let out = h
            .collect(
                reduction_msg(key, [9; 32]),
                &RoundUpdate::default(),
                2,
                &committee,
            )
            .await
            .expect("collect to succeed");

        match out {
            HandleMsgOutput::Ready(msg) => match msg.payload {
                Payload::BlockStepVotes(p) => {
                    assert_eq!(p.voted_hash, [9; 32]);
                    assert_eq!(p.votes.len(), 1);
                }
                _ => panic!("expected a step-votes result"),
            },
            _ => panic!("expected a quorum"),
        }
    }

    #[tokio::test]
    async fn test_split_vote_times_out_with_empty_hash() {
        let db = Arc::new(Mutex::new(MemDb::default()));
        let mut h = handler(StepKind::First, db);

        let a = PublicKey::from_seed_u64(1);
        let b = PublicKey::from_seed_u64(2);
        let committee = Committee::from_credits(a, &[(a, 2), (b, 2)]);
        assert_eq!(committee.quorum(), 3);

        let ru = RoundUpdate::default();

        // Two voters split over two hashes; neither bucket reaches the
        // quorum before the timer expires.
        for (key, hash) in [(a, [1u8; 32]), (b, [2u8; 32])] {
            let out = h
                .collect(reduction_msg(key, hash), &ru, 2, &committee)
                .await
                .expect("collect to succeed");
            assert!(matches!(out, HandleMsgOutput::Pending));
        }

        match h.handle_timeout(&ru, 2).expect("timeout handled") {
            HandleMsgOutput::Ready(msg) => match msg.payload {
                Payload::BlockStepVotes(p) => {
                    assert_eq!(p.voted_hash, [0; 32]);
                    assert!(p.votes.is_empty());
                }
                _ => panic!("expected a step-votes result"),
            },
            _ => panic!("expected a result"),
        }
    }

    #[tokio::test]
    async fn test_second_step_confirms_carried_winner() {
        let db = Arc::new(Mutex::new(MemDb::default()));
        let mut h = handler(StepKind::Second, db);
        h.voted_hash = [9; 32];

        let key = PublicKey::from_seed_u64(1);
        let committee = Committee::from_credits(key, &[(key, 4)]);
        let ru = RoundUpdate::default();

        let out = h
            .collect(reduction_msg(key, [9; 32]), &ru, 3, &committee)
            .await
            .expect("collect to succeed");

        match out {
            HandleMsgOutput::Ready(msg) => {
                assert_eq!(msg.topic(), Topics::BlockAgreement);
                match msg.payload {
                    Payload::BlockAgreement(p) => {
                        assert_eq!(p.block_hash, [9; 32]);
                        assert_eq!(p.votes.len(), 1);
                    }
                    _ => panic!("expected an agreement"),
                }
            }
            _ => panic!("expected a quorum"),
        }
    }

    #[tokio::test]
    async fn test_second_step_mismatch_yields_no_progress() {
        let db = Arc::new(Mutex::new(MemDb::default()));
        let mut h = handler(StepKind::Second, db);

        // The step was opened with a different winner
        h.voted_hash = [7; 32];

        let key = PublicKey::from_seed_u64(1);
        let committee = Committee::from_credits(key, &[(key, 4)]);
        let ru = RoundUpdate::default();

        let out = h
            .collect(reduction_msg(key, [9; 32]), &ru, 3, &committee)
            .await
            .expect("collect to succeed");

        match out {
            HandleMsgOutput::Ready(msg) => match msg.payload {
                Payload::BlockAgreement(p) => {
                    assert_eq!(p.block_hash, [0; 32]);
                    assert!(p.votes.is_empty());
                }
                _ => panic!("expected a no-progress agreement"),
            },
            _ => panic!("expected a result"),
        }
    }

    #[test]
    fn test_step_votes_roundtrip() {
        // The internal result is rebuilt bit-exact when marshalled as a
        // vote set inside an agreement
        let votes: Vec<StepVote<ReductionPayload>> = (0..2)
            .map(|i| StepVote {
                round: 1,
                step: 3,
                pubkey_bls: PublicKey::from_seed_u64(i),
                payload: ReductionPayload {
                    voted_hash: [9; 32],
                    signed_hash: vec![i as u8 + 1; 33],
                },
            })
            .collect();

        let mut buf = vec![];
        node_data::message::write_vote_set(&mut buf, &votes).expect("write");
        let dup: Vec<StepVote<ReductionPayload>> =
            node_data::message::read_vote_set(&mut &buf[..]).expect("read");

        assert_eq!(votes, dup);
        let mut buf2 = vec![];
        node_data::message::write_vote_set(&mut buf2, &dup).expect("write");
        assert_eq!(buf, buf2);
    }
}
