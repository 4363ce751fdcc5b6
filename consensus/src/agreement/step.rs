// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use node_data::ledger::{to_str, Candidate, Certificate, Hash};
use node_data::message::{AsyncQueue, Message, Payload, Status};
use tokio::select;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn, Instrument};

use crate::agreement::accumulator::Accumulator;
use crate::commons::{Database, RoundUpdate};
use crate::errors::ConsensusError;
use crate::operations::Operations;
use crate::queue::Queue;
use crate::user::committee::CommitteeSet;

/// Retries of the winning-candidate lookup before the round is given up.
const CANDIDATE_FETCH_RETRIES: usize = 3;

pub(crate) struct Agreement {
    pub inbound_queue: AsyncQueue<Message>,
    outbound_queue: AsyncQueue<Message>,

    future_msgs: Arc<Mutex<Queue<Message>>>,
}

impl Agreement {
    pub fn new(
        inbound_queue: AsyncQueue<Message>,
        outbound_queue: AsyncQueue<Message>,
    ) -> Self {
        Self {
            inbound_queue,
            outbound_queue,
            future_msgs: Arc::new(Mutex::new(Queue::default())),
        }
    }

    /// Spawns a task to process agreement messages for a specified round.
    /// There could be only one instance of this task per a time.
    pub(crate) fn spawn<T: Operations + 'static, D: Database + 'static>(
        &mut self,
        ru: RoundUpdate,
        committees: Arc<CommitteeSet>,
        db: Arc<Mutex<D>>,
        executor: Arc<Mutex<T>>,
    ) -> JoinHandle<Result<(Candidate, Certificate), ConsensusError>> {
        let future_msgs = self.future_msgs.clone();
        let inbound = self.inbound_queue.clone();
        let outbound = self.outbound_queue.clone();

        let round = ru.round;
        let pubkey = ru.pubkey_bls.to_bs58();

        tokio::spawn(async move {
            // Run agreement life-cycle loop
            Executor {
                ru,
                inbound_queue: inbound,
                outbound_queue: outbound,
                committees,
                db,
                executor,
                seen: HashSet::new(),
            }
            .run(future_msgs)
            .instrument(tracing::info_span!("agr_task", round, pubkey))
            .await
        })
    }
}

/// Executor implements life-cycle loop of a single agreement instance.
/// This should be started with each new round and dropped on round
/// termination.
struct Executor<T: Operations, D: Database> {
    ru: RoundUpdate,

    inbound_queue: AsyncQueue<Message>,
    outbound_queue: AsyncQueue<Message>,

    committees: Arc<CommitteeSet>,
    db: Arc<Mutex<D>>,
    executor: Arc<Mutex<T>>,

    /// Digests of agreements already taken in, to stop re-propagation
    /// loops.
    seen: HashSet<Hash>,
}

impl<T: Operations + 'static, D: Database + 'static> Executor<T, D> {
    async fn run(
        &mut self,
        future_msgs: Arc<Mutex<Queue<Message>>>,
    ) -> Result<(Candidate, Certificate), ConsensusError> {
        let (collected_votes_tx, mut collected_votes_rx) =
            mpsc::channel::<Certificate>(10);

        // Accumulator
        let mut acc = Accumulator::new(
            collected_votes_tx,
            self.committees.clone(),
            self.ru.clone(),
            self.executor.clone(),
        );

        // Drain future messages parked for the current round.
        {
            let mut queue = future_msgs.lock().await;
            if self.ru.round > 0 {
                queue.clear_round(self.ru.round - 1);
            }

            if let Some(messages) = queue.drain_events(self.ru.round, 0) {
                for msg in messages {
                    self.collect_agreement(&mut acc, msg).await;
                }
            }
        }

        // event_loop for agreement messages
        loop {
            select! {
                biased;
                // Process the output message from the Accumulator
                cert = collected_votes_rx.recv() => {
                    match cert {
                        Some(cert) => {
                            if let Some(winner) = self.resolve_winner(&cert).await {
                                // Winning block of this round found.
                                future_msgs.lock().await.clear_round(self.ru.round);
                                break Ok((winner, cert));
                            }

                            break Err(ConsensusError::UnknownCandidate);
                        }
                        None => break Err(ConsensusError::ChildTaskTerminated),
                    }
                },
                // Process messages from outside world
                msg = self.inbound_queue.recv() => {
                    if let Ok(msg) = msg {
                        match msg.header.compare_round(self.ru.round) {
                            Status::Future => {
                                // Future agreement message. Keep it for
                                // processing when we reach this round.
                                future_msgs
                                    .lock()
                                    .await
                                    .put_event(msg.header.round, 0, msg);
                            }
                            Status::Present => {
                                self.collect_agreement(&mut acc, msg).await;
                            }
                            Status::Past => {
                                trace!("agreement of a past round dropped");
                            }
                        };
                    }
                }
            };
        }
    }

    async fn collect_agreement(&mut self, acc: &mut Accumulator, msg: Message) {
        if !matches!(
            msg.payload,
            Payload::BlockAgreement(_) | Payload::SigSetAgreement(_)
        ) {
            warn!(
                event = "unexpected payload on agreement queue",
                topic = format!("{:?}", msg.topic()),
            );
            return;
        }

        // Duplicates are dropped on the digest of the canonical encoding
        if !self.seen.insert(msg.digest()) {
            trace!("duplicated agreement dropped");
            return;
        }

        // Publish the agreement
        self.outbound_queue
            .send(msg.clone())
            .await
            .unwrap_or_else(|err| {
                error!("unable to publish a collected agreement msg {:?}", err)
            });

        // Accumulate the agreement
        acc.process(msg).await;
    }

    /// Fetches the body of the winning candidate. A missing body is
    /// requested from peers through the GetCandidate call.
    async fn resolve_winner(&self, cert: &Certificate) -> Option<Candidate> {
        for _ in 0..CANDIDATE_FETCH_RETRIES {
            match self
                .db
                .lock()
                .await
                .get_candidate_block_by_hash(&cert.block_hash)
                .await
            {
                Ok(candidate) => {
                    debug!(
                        event = "winner resolved",
                        hash = to_str(&cert.block_hash),
                    );
                    return Some(candidate);
                }
                Err(e) => {
                    warn!(
                        event = "candidate not found, requesting from peers",
                        hash = to_str(&cert.block_hash),
                        err = format!("{:?}", e),
                    );

                    let _ = self
                        .outbound_queue
                        .send(Message::new_get_candidate(cert.block_hash))
                        .await;

                    tokio::time::sleep(Duration::from_millis(1000)).await;
                }
            }
        }

        None
    }
}
