// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::collections::HashMap;
use std::sync::Arc;

use node_data::ledger::{Certificate, Hash};
use node_data::message::{payload, Message, Payload, StepVote};
use tokio::sync::mpsc::Sender;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Instrument};

use crate::agreement::verifiers::verify_agreement;
use crate::commons::RoundUpdate;
use crate::errors::Priority;
use crate::operations::Operations;
use crate::user::committee::CommitteeSet;

/// Quorum-backed vote sets collected for a single block hash. A
/// certificate is complete once both flavours are present.
#[derive(Default)]
struct CertState {
    block: Option<(u8, Vec<StepVote<payload::Reduction>>)>,
    sig_set: Option<(u8, Vec<StepVote<payload::SigSet>>)>,
}

/// StorePerHash maps a block hash to the agreements collected for it.
type StorePerHash = HashMap<Hash, CertState>;

pub(crate) struct Accumulator {
    workers: Vec<JoinHandle<()>>,
    inbound: Sender<Message>,
}

impl Accumulator {
    pub fn new<T: Operations + 'static>(
        collected_votes_tx: Sender<Certificate>,
        committees: Arc<CommitteeSet>,
        ru: RoundUpdate,
        executor: Arc<Mutex<T>>,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<Message>(100);

        let mut a = Self {
            workers: vec![],
            inbound: tx,
        };

        // Spawn a worker to process all agreement message verifications.
        // It accumulates verified results and exits by providing a
        // complete certificate back to the agreement loop.
        let handle = tokio::spawn(
            async move {
                let mut stores = StorePerHash::default();

                while let Some(msg) = rx.recv().await {
                    if let Err(e) =
                        verify_agreement(&msg, &committees, ru.seed(), &executor)
                            .await
                    {
                        match e.priority() {
                            Priority::High => error!("{:#?}", e),
                            Priority::Low => warn!("{:#?}", e),
                        }
                        continue;
                    }

                    if let Some(cert) = Self::accumulate(&mut stores, &ru, msg)
                    {
                        collected_votes_tx.send(cert).await.unwrap_or_else(
                            |err| {
                                error!(
                                    "unable to send_msg collected_votes {:?}",
                                    err
                                )
                            },
                        );
                        break;
                    }
                }
            }
            .instrument(tracing::info_span!("acc_task")),
        );

        a.workers.push(handle);
        a
    }

    pub async fn process(&mut self, msg: Message) {
        self.inbound
            .send(msg)
            .await
            .unwrap_or_else(|err| error!("unable to queue agreement_msg {:?}", err));
    }

    fn accumulate(
        stores: &mut StorePerHash,
        ru: &RoundUpdate,
        msg: Message,
    ) -> Option<Certificate> {
        let step = msg.header.step;

        let (block_hash, entry) = match msg.payload {
            Payload::BlockAgreement(p) => {
                let entry = stores.entry(p.block_hash).or_default();
                entry.block.get_or_insert((step, p.votes));
                (p.block_hash, &*entry)
            }
            Payload::SigSetAgreement(p) => {
                let entry = stores.entry(p.block_hash).or_default();
                entry.sig_set.get_or_insert((step, p.votes));
                (p.block_hash, &*entry)
            }
            _ => return None,
        };

        if let (Some((block_step, block_votes)), Some((sigset_step, sig_set_votes))) =
            (&entry.block, &entry.sig_set)
        {
            info!(
                event = "quorum reached",
                round = ru.round,
                hash = node_data::ledger::to_str(&block_hash),
            );

            return Some(Certificate {
                round: ru.round,
                step: std::cmp::max(*block_step, *sigset_step),
                block_hash,
                block_votes: block_votes.clone(),
                sig_set_votes: sig_set_votes.clone(),
            });
        }

        None
    }
}

impl Drop for Accumulator {
    fn drop(&mut self) {
        // Abort all workers
        for handle in self.workers.iter() {
            handle.abort();
        }

        self.workers.clear();
    }
}
