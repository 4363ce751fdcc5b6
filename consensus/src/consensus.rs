// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::sync::Arc;

use node_data::ledger::{Candidate, Certificate};
use node_data::message::{AsyncQueue, Message};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::agreement::step::Agreement;
use crate::commons::{
    AgreementSender, Database, IterCounter, RoundUpdate, StepName,
};
use crate::errors::ConsensusError;
use crate::execution_ctx::{ExecutionCtx, IterationCtx};
use crate::operations::Operations;
use crate::phase::Phase;
use crate::queue::Queue;
use crate::reduction::block::BlockVotes;
use crate::reduction::handler::{Reduction, StepKind};
use crate::reduction::sigset::SigSetVotes;
use crate::reduction::step::ReductionStep;
use crate::selection::handler::Selection;
use crate::selection::step::SelectionStep;
use crate::user::committee::CommitteeSet;
use crate::user::provisioners::Provisioners;
use crate::user::sortition;

pub struct Consensus<T: Operations + 'static, D: Database + 'static> {
    /// inbound is a queue of events that comes from outside world
    inbound: AsyncQueue<Message>,
    /// outbound is a queue of events, this consensus instance shares
    /// with the outside world.
    outbound: AsyncQueue<Message>,

    /// future_msgs is a queue of events read from the inbound queue.
    /// These msgs are pending to be handled in a future round/step.
    future_msgs: Arc<Mutex<Queue<Message>>>,

    /// agreement_process implements the agreement message handler within
    /// the context of a separate task execution.
    agreement_process: Agreement,

    /// Reference to the executor of any crypto-related call
    executor: Arc<Mutex<T>>,

    // Database
    db: Arc<Mutex<D>>,
}

impl<T: Operations + 'static, D: Database + 'static> Consensus<T, D> {
    /// Creates an instance of Consensus.
    ///
    /// # Arguments
    ///
    /// * `inbound` - a queue of input events consumed by the main loop
    /// * `outbound` - a queue of output events that the main loop
    ///   broadcasts to the outside world
    /// * `agr_inbound_queue` - a queue of input events consumed solely by
    ///   the agreement loop
    /// * `agr_outbound_queue` - a queue of output events that the
    ///   agreement loop broadcasts to the outside world
    pub fn new(
        inbound: AsyncQueue<Message>,
        outbound: AsyncQueue<Message>,
        agr_inbound_queue: AsyncQueue<Message>,
        agr_outbound_queue: AsyncQueue<Message>,
        executor: Arc<Mutex<T>>,
        db: Arc<Mutex<D>>,
    ) -> Self {
        Self {
            inbound,
            outbound,
            future_msgs: Arc::new(Mutex::new(Queue::default())),
            agreement_process: Agreement::new(
                agr_inbound_queue,
                agr_outbound_queue,
            ),
            executor,
            db,
        }
    }

    /// Spins the consensus state machine. The consensus runs for the
    /// whole round until either the winning block and its certificate
    /// are produced or the node needs to re-sync.
    ///
    /// # Arguments
    ///
    /// * `ru` - the round update the external chain accepted last
    /// * `provisioners` - a snapshot of the provisioner set, valid for
    ///   the whole round
    /// * `cancel_rx` - a chan that allows the client to drop consensus
    ///   execution on demand
    pub async fn spin(
        &mut self,
        ru: RoundUpdate,
        provisioners: Provisioners,
        cancel_rx: oneshot::Receiver<i32>,
    ) -> Result<(Candidate, Certificate), ConsensusError> {
        let round = ru.round;

        // The committee extractor is shared between the main loop and
        // the agreement loop and lives for the round.
        let committees =
            Arc::new(CommitteeSet::new(ru.pubkey_bls, provisioners));

        // Agreement loop, executed in a separate task, collects
        // agreement events of both flavours.
        let mut agreement_task_handle = self.agreement_process.spawn(
            ru.clone(),
            committees.clone(),
            self.db.clone(),
            self.executor.clone(),
        );

        let sender =
            AgreementSender::new(self.agreement_process.inbound_queue.clone());

        // Consensus loop - selection-reduction-sigset loop
        let mut main_task_handle =
            self.spawn_main_loop(ru, committees, sender);

        // Wait for any of the tasks to complete.
        let result;
        tokio::select! {
            recv = &mut agreement_task_handle => {
                result = recv.map_err(|_| ConsensusError::Canceled)?;
                tracing::trace!("agreement result: {:?}", result.as_ref().map(|(c, _)| c.hash));
            },
            recv = &mut main_task_handle => {
                result = recv.map_err(|_| ConsensusError::Canceled)?;
                tracing::trace!("main_loop result: {:?}", result.as_ref().err());
            },
            // Canceled from outside.
            // This could be triggered by the synchronizer or on node
            // termination.
            _ = cancel_rx => {
                result = Err(ConsensusError::Canceled);
                tracing::debug!(event = "consensus canceled", round);
            }
        }

        // Tear-down procedure
        // Delete all candidates
        self.db.lock().await.delete_candidate_blocks();

        // Abort all tasks
        abort(&mut agreement_task_handle).await;
        abort(&mut main_task_handle).await;

        result
    }

    fn spawn_main_loop(
        &mut self,
        ru: RoundUpdate,
        committees: Arc<CommitteeSet>,
        sender: AgreementSender,
    ) -> JoinHandle<Result<(Candidate, Certificate), ConsensusError>> {
        let inbound = self.inbound.clone();
        let outbound = self.outbound.clone();
        let future_msgs = self.future_msgs.clone();
        let executor = self.executor.clone();
        let db = self.db.clone();

        tokio::spawn(async move {
            if ru.round > 0 {
                future_msgs.lock().await.clear_round(ru.round - 1);
            }

            let selection_handler =
                Arc::new(Mutex::new(Selection::new(executor.clone())));

            let first_reduction_handler = Arc::new(Mutex::new(Reduction::new(
                StepKind::First,
                BlockVotes::new(db.clone()),
                executor.clone(),
            )));

            let sec_reduction_handler = Arc::new(Mutex::new(Reduction::new(
                StepKind::Second,
                BlockVotes::new(db.clone()),
                executor.clone(),
            )));

            let first_sigset_handler = Arc::new(Mutex::new(Reduction::new(
                StepKind::First,
                SigSetVotes::default(),
                executor.clone(),
            )));

            let sec_sigset_handler = Arc::new(Mutex::new(Reduction::new(
                StepKind::Second,
                SigSetVotes::default(),
                executor.clone(),
            )));

            let mut phases = [
                Phase::Selection(SelectionStep::new(
                    selection_handler.clone(),
                    ru.timeouts.selection,
                )),
                Phase::BlockReduction(ReductionStep::new(
                    executor.clone(),
                    first_reduction_handler.clone(),
                    ru.timeouts.reduction,
                )),
                Phase::BlockReduction(ReductionStep::new(
                    executor.clone(),
                    sec_reduction_handler.clone(),
                    ru.timeouts.reduction,
                )),
                Phase::SigSetReduction(ReductionStep::new(
                    executor.clone(),
                    first_sigset_handler.clone(),
                    ru.timeouts.sig_set,
                )),
                Phase::SigSetReduction(ReductionStep::new(
                    executor.clone(),
                    sec_sigset_handler.clone(),
                    ru.timeouts.sig_set,
                )),
            ];

            // Consensus loop
            // Initialize and run the consensus loop
            let mut iteration_counter: u8 = 0;
            let mut iter_ctx = IterationCtx::new(
                ru.round,
                selection_handler,
                first_reduction_handler,
                sec_reduction_handler,
                first_sigset_handler,
                sec_sigset_handler,
                committees.clone(),
            );

            loop {
                iter_ctx.on_begin(iteration_counter, &ru).await;

                let mut msg = Message::empty();
                // Execute a single iteration
                for pos in 0..phases.len() {
                    let phase = phases.get_mut(pos).unwrap();

                    let step = iteration_counter.step_from_pos(pos);
                    let name = phase.name();

                    // Initialize new phase with the message returned by
                    // the previous phase.
                    phase.reinitialize(&msg, ru.round, step).await;

                    // Construct phase execution context
                    let ctx = ExecutionCtx::new(
                        &mut iter_ctx,
                        inbound.clone(),
                        outbound.clone(),
                        future_msgs.clone(),
                        db.clone(),
                        ru.clone(),
                        step,
                    );

                    let committee = committees
                        .get_or_create(&sortition::Config::reduction(
                            ru.seed(),
                            ru.round,
                            step,
                        ))
                        .await;

                    // Execute a phase.
                    // An error returned here terminates the consensus
                    // round.
                    msg = phase
                        .run(ctx, committee)
                        .instrument(tracing::info_span!(
                            "main",
                            round = ru.round,
                            step = step,
                            name,
                            pk = ru.pubkey_bls.to_bs58(),
                        ))
                        .await?;

                    // Delegate the agreement to the agreement loop for
                    // further processing.
                    let forwarded = sender.send(msg.clone()).await;

                    // Without a block agreement there is no signature
                    // set to reduce; the iteration restarts from
                    // Selection.
                    if pos == StepName::SecondReduction as usize && !forwarded
                    {
                        break;
                    }
                }

                iter_ctx.on_end();

                iteration_counter.next()?;
            }
        })
    }
}

#[inline]
async fn abort<T>(h: &mut JoinHandle<T>) {
    if h.is_finished() {
        return;
    }

    h.abort();

    let _ = h.await;
}
