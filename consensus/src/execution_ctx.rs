// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::cmp;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use node_data::message::{AsyncQueue, Message, Payload, Topics};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::commons::{Database, IterCounter, RoundUpdate};
use crate::config::CONSENSUS_MAX_TIMEOUT_MS;
use crate::errors::{ConsensusError, Priority};
use crate::msg_handler::{HandleMsgOutput, MsgHandler};
use crate::operations::Operations;
use crate::queue::Queue;
use crate::reduction::block::BlockVotes;
use crate::reduction::handler::Reduction;
use crate::reduction::sigset::SigSetVotes;
use crate::selection::handler::Selection;
use crate::user::committee::CommitteeSet;
use crate::user::committee::Committee;
use crate::user::sortition;

/// Shared state within the execution of a single iteration: the phase
/// handlers, the committee extractor handle and the set of background
/// tasks the iteration spawned.
pub struct IterationCtx<T: Operations + 'static, D: Database + 'static> {
    selection_handler: Arc<Mutex<Selection<T>>>,
    first_reduction_handler: Arc<Mutex<Reduction<BlockVotes<D>, T>>>,
    sec_reduction_handler: Arc<Mutex<Reduction<BlockVotes<D>, T>>>,
    first_sigset_handler: Arc<Mutex<Reduction<SigSetVotes, T>>>,
    sec_sigset_handler: Arc<Mutex<Reduction<SigSetVotes, T>>>,

    committees: Arc<CommitteeSet>,

    pub join_set: JoinSet<()>,

    round: u64,
    iter: u8,
}

impl<T: Operations + 'static, D: Database + 'static> IterationCtx<T, D> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        round: u64,
        selection_handler: Arc<Mutex<Selection<T>>>,
        first_reduction_handler: Arc<Mutex<Reduction<BlockVotes<D>, T>>>,
        sec_reduction_handler: Arc<Mutex<Reduction<BlockVotes<D>, T>>>,
        first_sigset_handler: Arc<Mutex<Reduction<SigSetVotes, T>>>,
        sec_sigset_handler: Arc<Mutex<Reduction<SigSetVotes, T>>>,
        committees: Arc<CommitteeSet>,
    ) -> Self {
        Self {
            selection_handler,
            first_reduction_handler,
            sec_reduction_handler,
            first_sigset_handler,
            sec_sigset_handler,
            committees,
            join_set: JoinSet::new(),
            round,
            iter: 0,
        }
    }

    /// Amortises sortition by precomputing the committees of the whole
    /// iteration up front.
    pub(crate) async fn on_begin(&mut self, iter: u8, ru: &RoundUpdate) {
        self.iter = iter;
        self.committees
            .pregenerate(
                ru.seed(),
                ru.round,
                iter.step_from_pos(0),
                u8::STEP_NUM,
            )
            .await;
    }

    pub(crate) fn on_end(&mut self) {
        debug!(
            event = "iter completed",
            len = self.join_set.len(),
            round = self.round,
            iter = self.iter,
        );
        self.join_set.abort_all();
    }

    /// Offers an event of the current round but an already-executed step
    /// to the handler that ran that step, so that a late quorum can still
    /// surface an agreement.
    pub(crate) async fn collect_past_event(
        &self,
        ru: &RoundUpdate,
        msg: &Message,
    ) -> Option<Message> {
        let step = msg.header.step;
        if step == 0 {
            return None;
        }

        // Handlers only hold state for the ongoing iteration; events of
        // earlier iterations are of no further use.
        if (step - 1) / u8::STEP_NUM != self.iter {
            return None;
        }

        let cfg = sortition::Config::reduction(ru.seed(), ru.round, step);
        let committee = self.committees.get_or_create(&cfg).await;

        let pos = ((step - 1) % u8::STEP_NUM) as usize;
        let output = match pos {
            1 => {
                Self::collect_with(
                    &self.first_reduction_handler,
                    msg,
                    ru,
                    step,
                    &committee,
                )
                .await
            }
            2 => {
                Self::collect_with(
                    &self.sec_reduction_handler,
                    msg,
                    ru,
                    step,
                    &committee,
                )
                .await
            }
            3 => {
                Self::collect_with(
                    &self.first_sigset_handler,
                    msg,
                    ru,
                    step,
                    &committee,
                )
                .await
            }
            4 => {
                Self::collect_with(
                    &self.sec_sigset_handler,
                    msg,
                    ru,
                    step,
                    &committee,
                )
                .await
            }
            // Score events from executed steps are of no further use
            _ => None,
        }?;

        let topic = output.topic();
        if topic == Topics::BlockAgreement || topic == Topics::SigSetAgreement
        {
            debug!(
                event = "agreement from previous step",
                msg_step = output.header.step
            );
            return Some(output);
        }

        None
    }

    async fn collect_with<C: MsgHandler>(
        handler: &Arc<Mutex<C>>,
        msg: &Message,
        ru: &RoundUpdate,
        step: u8,
        committee: &Committee,
    ) -> Option<Message> {
        let mut guard = handler.lock().await;

        guard.verify(msg, ru, step, committee).await.ok()?;

        match guard.collect(msg.clone(), ru, step, committee).await {
            Ok(HandleMsgOutput::Ready(m)) => Some(m),
            _ => None,
        }
    }
}

impl<T: Operations + 'static, D: Database + 'static> Drop
    for IterationCtx<T, D>
{
    fn drop(&mut self) {
        self.join_set.abort_all();
    }
}

/// ExecutionCtx encapsulates all data needed by a single step to be fully
/// executed.
pub struct ExecutionCtx<'a, T: Operations + 'static, D: Database + 'static> {
    pub iter_ctx: &'a mut IterationCtx<T, D>,

    /// Messaging-related fields
    pub inbound: AsyncQueue<Message>,
    pub outbound: AsyncQueue<Message>,
    pub future_msgs: Arc<Mutex<Queue<Message>>>,

    /// Candidate store
    pub db: Arc<Mutex<D>>,

    // Round/Step parameters
    pub round_update: RoundUpdate,
    pub step: u8,
}

impl<'a, T: Operations + 'static, D: Database + 'static> ExecutionCtx<'a, T, D> {
    /// Creates step execution context.
    pub(crate) fn new(
        iter_ctx: &'a mut IterationCtx<T, D>,
        inbound: AsyncQueue<Message>,
        outbound: AsyncQueue<Message>,
        future_msgs: Arc<Mutex<Queue<Message>>>,
        db: Arc<Mutex<D>>,
        round_update: RoundUpdate,
        step: u8,
    ) -> Self {
        Self {
            iter_ctx,
            inbound,
            outbound,
            future_msgs,
            db,
            round_update,
            step,
        }
    }

    /// Runs a loop that collects both inbound events and the timeout
    /// event.
    ///
    /// It accepts an instance of MsgHandler impl (phase var) and calls
    /// its methods based on the occurred event.
    ///
    /// In an event of timeout, it also increases the step timeout value
    /// accordingly.
    pub async fn event_loop<C: MsgHandler + Send>(
        &mut self,
        committee: &Committee,
        phase: Arc<Mutex<C>>,
        timeout_millis: &mut u64,
    ) -> Result<Message, ConsensusError> {
        debug!(event = "run event_loop");

        // Calculate timeout
        let deadline = Instant::now()
            .checked_add(Duration::from_millis(*timeout_millis))
            .unwrap();

        let inbound = self.inbound.clone();

        // Duplicates are dropped on the digest of their canonical
        // encoding.
        let mut seen = HashSet::new();

        // Handle both timeout event and messages from inbound queue.
        loop {
            match time::timeout_at(deadline, inbound.recv()).await {
                // Inbound message event
                Ok(result) => {
                    if let Ok(msg) = result {
                        if !seen.insert(msg.digest()) {
                            trace!("duplicated event dropped");
                            continue;
                        }

                        if let Some(step_result) = self
                            .process_inbound_msg(committee, phase.clone(), msg)
                            .await?
                        {
                            return Ok(step_result);
                        }
                    }
                }
                // Timeout event. Phase could not reach its final goal.
                // Increase timeout for next execution of this step and
                // move on.
                Err(_) => {
                    info!(event = "timeout-ed");
                    Self::increase_timeout(timeout_millis);

                    return self.process_timeout_event(phase).await;
                }
            }
        }
    }

    /// Delegates the received message to the phase handler for further
    /// processing.
    ///
    /// Returning Ok(Some(msg)) here is interpreted as the step result by
    /// event_loop. A high-priority error tears the phase down.
    async fn process_inbound_msg<C: MsgHandler + Send>(
        &mut self,
        committee: &Committee,
        phase: Arc<Mutex<C>>,
        msg: Message,
    ) -> Result<Option<Message>, ConsensusError> {
        // Candidate bodies are cached whenever they show up; the
        // consensus position checks do not apply to them.
        if let Payload::Candidate(p) = &msg.payload {
            self.db.lock().await.store_candidate_block(*p.clone());
            return Ok(None);
        }

        if msg.topic() == Topics::Quit {
            debug!(event = "quit received");
            return Err(ConsensusError::Canceled);
        }

        // Check if a message is fully valid. If so, then it can be
        // re-broadcast.
        let valid = phase
            .lock()
            .await
            .is_valid(&msg, &self.round_update, self.step, committee)
            .await;

        match valid {
            Ok(_) => {
                // Re-publish the verified event
                self.outbound.send(msg.clone()).await.unwrap_or_else(
                    |err| error!("unable to re-publish a handled msg {:?}", err),
                );
            }
            Err(ConsensusError::FutureEvent) => {
                trace!("future msg {:?}", msg);
                // This is a message from future round or step. Save it
                // in future_msgs to be processed when we reach same
                // round/step.
                self.future_msgs.lock().await.put_event(
                    msg.header.round,
                    msg.header.step,
                    msg,
                );

                return Ok(None);
            }
            Err(e)
                if matches!(
                    e,
                    ConsensusError::WrongRound | ConsensusError::WrongStep
                ) =>
            {
                debug!(
                    event = "past event",
                    err = format!("{:?}", e),
                    msg_round = msg.header.round,
                    msg_step = msg.header.step,
                    peer = msg.header.pubkey_bls.to_bs58(),
                );

                return Ok(self.process_past_events(&msg).await);
            }
            Err(e) if e.priority() == Priority::High => {
                error!(
                    event = "phase teardown",
                    err = format!("{:?}", e),
                    msg_round = msg.header.round,
                    msg_step = msg.header.step,
                );
                return Err(e);
            }
            Err(e) => {
                // A validation failure attributable to the remote peer;
                // the offending event is dropped.
                warn!(
                    event = "event discarded",
                    err = format!("{:?}", e),
                    msg_topic = format!("{:?}", msg.topic()),
                    msg_round = msg.header.round,
                    msg_step = msg.header.step,
                    peer = msg.header.pubkey_bls.to_bs58(),
                );
                return Ok(None);
            }
        }

        let collected = phase
            .lock()
            .await
            .collect(msg.clone(), &self.round_update, self.step, committee)
            .await;

        match collected {
            Ok(HandleMsgOutput::Ready(m)) => Ok(Some(m)),
            Ok(HandleMsgOutput::Pending) => Ok(None),
            Err(e) if e.priority() == Priority::High => {
                error!(event = "phase teardown", err = format!("{:?}", e));
                Err(e)
            }
            Err(e) => {
                warn!(
                    event = "failed collect",
                    err = format!("{:?}", e),
                    msg_topic = format!("{:?}", msg.topic()),
                    msg_step = msg.header.step,
                    msg_round = msg.header.round,
                );
                Ok(None)
            }
        }
    }

    /// Process events from a previously executed step of the current
    /// round.
    async fn process_past_events(&mut self, msg: &Message) -> Option<Message> {
        if msg.header.round != self.round_update.round {
            // Events of past rounds are dropped with no further action
            return None;
        }

        // Repropagate past-step events of the ongoing round
        if let Err(e) = self.outbound.send(msg.clone()).await {
            error!("could not repropagate msg due to {:?}", e);
        }

        self.iter_ctx
            .collect_past_event(&self.round_update, msg)
            .await
    }

    /// Delegates the received event of timeout to the phase handler for
    /// further processing.
    async fn process_timeout_event<C: MsgHandler>(
        &mut self,
        phase: Arc<Mutex<C>>,
    ) -> Result<Message, ConsensusError> {
        if let Ok(HandleMsgOutput::Ready(msg)) = phase
            .lock()
            .await
            .handle_timeout(&self.round_update, self.step)
        {
            return Ok(msg);
        }

        Ok(Message::empty())
    }

    /// Handles all messages stored in future_msgs queue that belong to
    /// the current round and step.
    ///
    /// Returns Some(msg) if the step is finalized.
    pub async fn handle_future_msgs<C: MsgHandler + Send>(
        &self,
        committee: &Committee,
        phase: Arc<Mutex<C>>,
    ) -> Option<Message> {
        let mut phase = phase.lock().await;

        let drained = self
            .future_msgs
            .lock()
            .await
            .drain_events(self.round_update.round, self.step);

        if let Some(messages) = drained {
            if !messages.is_empty() {
                debug!(event = "drain future msgs", count = messages.len())
            }

            for msg in messages {
                let valid = phase
                    .is_valid(&msg, &self.round_update, self.step, committee)
                    .await;

                if valid.is_ok() {
                    self.outbound.send(msg.clone()).await.unwrap_or_else(
                        |err| {
                            error!(
                                "unable to re-publish a queued msg {:?}",
                                err
                            )
                        },
                    );

                    if let Ok(HandleMsgOutput::Ready(msg)) = phase
                        .collect(
                            msg,
                            &self.round_update,
                            self.step,
                            committee,
                        )
                        .await
                    {
                        return Some(msg);
                    }
                }
            }
        }

        None
    }

    fn increase_timeout(timeout_millis: &mut u64) {
        // Increase timeout up to CONSENSUS_MAX_TIMEOUT_MS
        *timeout_millis =
            cmp::min(*timeout_millis * 2, CONSENSUS_MAX_TIMEOUT_MS);
    }
}
