// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

/// Maximum number of steps Consensus could run per round.
pub const CONSENSUS_MAX_STEP: u8 = 213;
/// Percentage number that determines a quorum.
pub const CONSENSUS_QUORUM_THRESHOLD: f64 = 0.75;
/// Committee credits extracted for a reduction step.
pub const CONSENSUS_COMMITTEE_SIZE: usize = 64;
/// Initial step timeout in milliseconds.
pub const CONSENSUS_TIMEOUT_MS: u64 = 20 * 1000;
/// Maximum step timeout.
pub const CONSENSUS_MAX_TIMEOUT_MS: u64 = 60 * 1000;
/// Maximum number of events parked for a future (round, step).
pub const CONSENSUS_QUEUE_LIMIT: usize = 4096;
/// Capacity of an event-bus subscription queue.
pub const CONSENSUS_BUS_CAP: usize = 1000;
