// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::sync::Arc;

use node_data::message::Message;
use tokio::sync::Mutex;
use tracing::debug;

use crate::commons::Database;
use crate::errors::ConsensusError;
use crate::execution_ctx::ExecutionCtx;
use crate::operations::Operations;
use crate::selection::handler;
use crate::user::committee::Committee;

/// Runs the Selection phase: collects score events from block generators
/// until the step timer expires, then hands the winner downstream.
pub struct SelectionStep<T: Operations> {
    handler: Arc<Mutex<handler::Selection<T>>>,
    timeout_millis: u64,
}

impl<T: Operations + 'static> SelectionStep<T> {
    pub(crate) fn new(
        handler: Arc<Mutex<handler::Selection<T>>>,
        timeout_millis: u64,
    ) -> Self {
        Self {
            handler,
            timeout_millis,
        }
    }

    pub async fn reinitialize(&mut self, _msg: &Message, round: u64, step: u8) {
        self.handler.lock().await.reset();

        debug!(
            event = "init",
            name = self.name(),
            round = round,
            step = step,
            timeout = self.timeout_millis,
        )
    }

    pub async fn run<D: Database + 'static>(
        &mut self,
        mut ctx: ExecutionCtx<'_, T, D>,
        committee: Committee,
    ) -> Result<Message, ConsensusError> {
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

    pub fn name(&self) -> &'static str {
        "selection"
    }

    pub fn get_timeout(&self) -> u64 {
        self.timeout_millis
    }
}
