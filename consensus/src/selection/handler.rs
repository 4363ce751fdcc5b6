// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::sync::Arc;

use async_trait::async_trait;
use node_data::message::{marshal_signable_score, Message, Payload};
use tokio::sync::Mutex;

use crate::commons::RoundUpdate;
use crate::errors::ConsensusError;
use crate::msg_handler::{HandleMsgOutput, MsgHandler};
use crate::operations::Operations;
use crate::user::committee::Committee;

/// Tracks the best score event seen for the current (round, step) and
/// surfaces its candidate hash on timeout.
pub struct Selection<T: Operations> {
    best_msg: Option<Message>,
    executor: Arc<Mutex<T>>,
}

#[async_trait]
impl<T: Operations + 'static> MsgHandler for Selection<T> {
    /// Verifies if msg is a valid score event.
    async fn verify(
        &mut self,
        msg: &Message,
        _ru: &RoundUpdate,
        _step: u8,
        _committee: &Committee,
    ) -> Result<(), ConsensusError> {
        let p = match &msg.payload {
            Payload::Score(p) => p,
            _ => return Err(ConsensusError::MalformedEvent),
        };

        let signable =
            marshal_signable_score(msg.header.round, msg.header.step, p)
                .map_err(|_| ConsensusError::MalformedEvent)?;

        let executor = self.executor.lock().await;
        executor
            .verify_ed25519(&p.pubkey_ed25519, &signable, &p.signature_ed25519)
            .await?;
        executor
            .verify_score_proof(&p.proof, &p.seed, &p.z, &p.bid_list_subset)
            .await?;

        Ok(())
    }

    /// Keeps the event if its score strictly exceeds the tracked best.
    async fn collect(
        &mut self,
        msg: Message,
        _ru: &RoundUpdate,
        _step: u8,
        _committee: &Committee,
    ) -> Result<HandleMsgOutput, ConsensusError> {
        let p = match &msg.payload {
            Payload::Score(p) => p,
            _ => return Err(ConsensusError::MalformedEvent),
        };

        // Scores compare as big-endian unsigned integers; equal scores
        // keep the first-seen event.
        let is_best = match &self.best_msg {
            Some(best) => match &best.payload {
                Payload::Score(b) => p.score > b.score,
                _ => true,
            },
            None => true,
        };

        if is_best {
            tracing::debug!(
                event = "new best score",
                score = node_data::ledger::to_str(&p.score),
                hash = node_data::ledger::to_str(&p.vote_hash),
            );
            self.best_msg = Some(msg);
        }

        Ok(HandleMsgOutput::Pending)
    }

    /// On timeout the selection forwards the best candidate seen, or an
    /// empty message standing for the zero-hash vote.
    fn handle_timeout(
        &mut self,
        _ru: &RoundUpdate,
        _step: u8,
    ) -> Result<HandleMsgOutput, ConsensusError> {
        Ok(HandleMsgOutput::Ready(
            self.best_msg.take().unwrap_or_else(Message::empty),
        ))
    }
}

impl<T: Operations + 'static> Selection<T> {
    pub(crate) fn new(executor: Arc<Mutex<T>>) -> Self {
        Self {
            best_msg: None,
            executor,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.best_msg = None;
    }
}

#[cfg(test)]
mod tests {
    use node_data::bls::PublicKey;
    use node_data::ledger::Seed;
    use node_data::message::{payload, Header, Topics};

    use super::*;
    use crate::operations::VerifierError;

    struct AcceptAll;

    #[async_trait]
    impl Operations for AcceptAll {
        async fn verify_bls(
            &self,
            _pubkey: &PublicKey,
            _msg: &[u8],
            _sig: &[u8],
        ) -> Result<(), VerifierError> {
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
            proof: &[u8],
            _seed: &Seed,
            _z: &[u8; 32],
            _bid_list_subset: &[u8],
        ) -> Result<(), VerifierError> {
            if proof.is_empty() {
                return Err(VerifierError::InvalidProof);
            }
            Ok(())
        }

        async fn sign_bls(
            &self,
            _msg: &[u8],
        ) -> Result<Vec<u8>, VerifierError> {
            Ok(vec![1; 33])
        }
    }

    fn score_msg(score: [u8; 32], vote_hash: [u8; 32]) -> Message {
        Message::new_score(
            Header {
                round: 1,
                step: 1,
                pubkey_bls: PublicKey::default(),
                topic: Topics::Score as u8,
            },
            payload::Score {
                score,
                proof: vec![1; 8],
                vote_hash,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_higher_score_wins() {
        let mut handler = Selection::new(Arc::new(Mutex::new(AcceptAll)));
        let ru = RoundUpdate::default();
        let committee = Committee::default();

        let mut low = [0u8; 32];
        low[31] = 1;
        let mut high = [0u8; 32];
        high[31] = 2;

        let _ = handler
            .collect(score_msg(low, [1; 32]), &ru, 1, &committee)
            .await;
        let _ = handler
            .collect(score_msg(high, [2; 32]), &ru, 1, &committee)
            .await;

        // A lower score does not replace the tracked best
        let _ = handler
            .collect(score_msg(low, [3; 32]), &ru, 1, &committee)
            .await;

        match handler.handle_timeout(&ru, 1).expect("timeout handled") {
            HandleMsgOutput::Ready(msg) => match msg.payload {
                Payload::Score(p) => assert_eq!(p.vote_hash, [2; 32]),
                _ => panic!("expected the best score event"),
            },
            _ => panic!("expected a result"),
        }
    }

    #[tokio::test]
    async fn test_equal_score_keeps_first() {
        let mut handler = Selection::new(Arc::new(Mutex::new(AcceptAll)));
        let ru = RoundUpdate::default();
        let committee = Committee::default();

        let score = [7u8; 32];
        let _ = handler
            .collect(score_msg(score, [1; 32]), &ru, 1, &committee)
            .await;
        let _ = handler
            .collect(score_msg(score, [2; 32]), &ru, 1, &committee)
            .await;

        match handler.handle_timeout(&ru, 1).expect("timeout handled") {
            HandleMsgOutput::Ready(msg) => match msg.payload {
                Payload::Score(p) => assert_eq!(p.vote_hash, [1; 32]),
                _ => panic!("expected the first score event"),
            },
            _ => panic!("expected a result"),
        }
    }

    #[tokio::test]
    async fn test_invalid_proof_is_rejected() {
        let mut handler = Selection::new(Arc::new(Mutex::new(AcceptAll)));

        let mut msg = score_msg([1; 32], [1; 32]);
        if let Payload::Score(p) = &mut msg.payload {
            p.proof = vec![];
        }

        assert!(handler
            .verify(&msg, &RoundUpdate::default(), 1, &Committee::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_empty_selection_times_out_empty() {
        let mut handler = Selection::<AcceptAll>::new(Arc::new(Mutex::new(AcceptAll)));

        match handler
            .handle_timeout(&RoundUpdate::default(), 1)
            .expect("timeout handled")
        {
            HandleMsgOutput::Ready(msg) => {
                assert_eq!(msg.payload, Payload::Empty)
            }
            _ => panic!("expected a result"),
        }
    }
}
