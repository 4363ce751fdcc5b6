// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use async_trait::async_trait;
use node_data::message::{Message, Status};

use crate::commons::RoundUpdate;
use crate::errors::ConsensusError;
use crate::user::committee::Committee;

/// Indicates whether an output value is available for current step
/// execution (Step is Ready) or the step needs to keep collecting data
/// (Step is Pending).
pub enum HandleMsgOutput {
    Pending,
    Ready(Message),
}

/// MsgHandler must be implemented by any phase that processes external
/// events within the event_loop life-cycle.
#[async_trait]
pub trait MsgHandler {
    /// is_valid positions a new event against the currently executed
    /// (round, step).
    ///
    /// Only an event for the current position is delegated to the phase
    /// verification; past events are rejected with the matching error
    /// kind and future ones are reported for parking.
    async fn is_valid(
        &mut self,
        msg: &Message,
        ru: &RoundUpdate,
        step: u8,
        committee: &Committee,
    ) -> Result<(), ConsensusError> {
        match msg.compare(ru.round, step) {
            Status::Past => {
                if msg.header.round < ru.round {
                    Err(ConsensusError::WrongRound)
                } else {
                    Err(ConsensusError::WrongStep)
                }
            }
            Status::Present => self.verify(msg, ru, step, committee).await,
            Status::Future => Err(ConsensusError::FutureEvent),
        }
    }

    /// verify allows each phase to fully verify the event payload.
    async fn verify(
        &mut self,
        msg: &Message,
        ru: &RoundUpdate,
        step: u8,
        committee: &Committee,
    ) -> Result<(), ConsensusError>;

    /// collect allows each phase to process a verified event.
    async fn collect(
        &mut self,
        msg: Message,
        ru: &RoundUpdate,
        step: u8,
        committee: &Committee,
    ) -> Result<HandleMsgOutput, ConsensusError>;

    /// handle_timeout allows each phase to produce its result on a step
    /// timer expiry.
    fn handle_timeout(
        &mut self,
        ru: &RoundUpdate,
        step: u8,
    ) -> Result<HandleMsgOutput, ConsensusError>;
}
