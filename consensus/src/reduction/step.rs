// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::sync::Arc;

use node_data::ledger::to_str;
use node_data::message::{marshal_signable_vote, Header, Message};
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::commons::Database;
use crate::errors::ConsensusError;
use crate::execution_ctx::ExecutionCtx;
use crate::operations::Operations;
use crate::reduction::handler::Reduction;
use crate::reduction::VoteHandler;
use crate::user::committee::Committee;

/// Drives a single step of a reduction broker: casts this node's vote
/// and runs the event loop until quorum or timeout.
pub struct ReductionStep<V: VoteHandler, T: Operations> {
    handler: Arc<Mutex<Reduction<V, T>>>,
    executor: Arc<Mutex<T>>,
    timeout_millis: u64,
}

impl<V: VoteHandler, T: Operations + 'static> ReductionStep<V, T> {
    pub(crate) fn new(
        executor: Arc<Mutex<T>>,
        handler: Arc<Mutex<Reduction<V, T>>>,
        timeout_millis: u64,
    ) -> Self {
        Self {
            handler,
            executor,
            timeout_millis,
        }
    }

    pub async fn reinitialize(&mut self, msg: &Message, round: u64, step: u8) {
        let mut handler = self.handler.lock().await;

        handler.reset();
        let voted_hash = handler.variant.extract_carry(msg);
        handler.voted_hash = voted_hash;

        debug!(
            event = "init",
            name = V::name(),
            round = round,
            step = step,
            timeout = self.timeout_millis,
            hash = to_str(&voted_hash),
        )
    }

    pub async fn run<D: Database + 'static>(
        &mut self,
        mut ctx: ExecutionCtx<'_, T, D>,
        committee: Committee,
    ) -> Result<Message, ConsensusError> {
        if committee.am_member() {
            self.spawn_cast_vote(&mut ctx);
        }

        // handle queued messages for current round and step.
        if let Some(m) = ctx
            .handle_future_msgs(&committee, self.handler.clone())
            .await
        {
            return Ok(m);
        }

        ctx.event_loop(
            &committee,
            self.handler.clone(),
            &mut self.timeout_millis,
        )
        .await
    }

    /// Signs the carried hash and broadcasts this node's vote, off the
    /// step's hot path. The vote is also fed back to the own inbound
    /// queue to be accounted like any other.
    fn spawn_cast_vote<D: Database + 'static>(
        &self,
        ctx: &mut ExecutionCtx<'_, T, D>,
    ) {
        let handler = self.handler.clone();
        let executor = self.executor.clone();
        let inbound = ctx.inbound.clone();
        let outbound = ctx.outbound.clone();
        let ru = ctx.round_update.clone();
        let step = ctx.step;

        ctx.iter_ctx.join_set.spawn(async move {
            let voted_hash = handler.lock().await.voted_hash();
            let signable = marshal_signable_vote(&voted_hash, ru.round, step);

            let signed_hash =
                match executor.lock().await.sign_bls(&signable).await {
                    Ok(signature) => signature,
                    Err(e) => {
                        error!("could not sign vote due to {:?}", e);
                        return;
                    }
                };

            let payload = handler
                .lock()
                .await
                .variant
                .build_vote(voted_hash, signed_hash);

            let msg = Message {
                header: Header {
                    pubkey_bls: ru.pubkey_bls,
                    round: ru.round,
                    step,
                    topic: V::topic() as u8,
                },
                payload,
            };

            if let Err(e) = outbound.send(msg.clone()).await {
                error!("could not broadcast vote due to {:?}", e);
            }
            if let Err(e) = inbound.send(msg).await {
                error!("could not register own vote due to {:?}", e);
            }
        });
    }

    pub fn name(&self) -> &'static str {
        V::name()
    }

    pub fn get_timeout(&self) -> u64 {
        self.timeout_millis
    }
}
