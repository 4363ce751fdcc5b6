// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use node_data::message::Message;

use crate::commons::Database;
use crate::errors::ConsensusError;
use crate::execution_ctx::ExecutionCtx;
use crate::operations::Operations;
use crate::reduction::block::BlockVotes;
use crate::reduction::sigset::SigSetVotes;
use crate::reduction::step::ReductionStep;
use crate::selection::step::SelectionStep;
use crate::user::committee::Committee;

/// A phase of the iteration pipeline. The reduction variants appear
/// twice in the pipeline, once per broker step.
pub enum Phase<T: Operations + 'static, D: Database + 'static> {
    Selection(SelectionStep<T>),
    BlockReduction(ReductionStep<BlockVotes<D>, T>),
    SigSetReduction(ReductionStep<SigSetVotes, T>),
}

impl<T: Operations + 'static, D: Database + 'static> Phase<T, D> {
    pub async fn reinitialize(&mut self, msg: &Message, round: u64, step: u8) {
        match self {
            Phase::Selection(p) => p.reinitialize(msg, round, step).await,
            Phase::BlockReduction(p) => p.reinitialize(msg, round, step).await,
            Phase::SigSetReduction(p) => p.reinitialize(msg, round, step).await,
        }
    }

    pub async fn run(
        &mut self,
        ctx: ExecutionCtx<'_, T, D>,
        committee: Committee,
    ) -> Result<Message, ConsensusError> {
        match self {
            Phase::Selection(p) => p.run(ctx, committee).await,
            Phase::BlockReduction(p) => p.run(ctx, committee).await,
            Phase::SigSetReduction(p) => p.run(ctx, committee).await,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Selection(p) => p.name(),
            Phase::BlockReduction(p) => p.name(),
            Phase::SigSetReduction(p) => p.name(),
        }
    }

    pub fn get_timeout(&self) -> u64 {
        match self {
            Phase::Selection(p) => p.get_timeout(),
            Phase::BlockReduction(p) => p.get_timeout(),
            Phase::SigSetReduction(p) => p.get_timeout(),
        }
    }
}
