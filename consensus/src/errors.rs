// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use thiserror::Error;

/// Severity of a consensus error.
///
/// Low errors are validation failures attributable to a remote peer: the
/// offending event is logged and dropped without affecting node state.
/// High errors tear the phase down and propagate to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Low,
    High,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("voter is not a committee member")]
    NotCommitteeMember,
    #[error("event belongs to a past round")]
    WrongRound,
    #[error("event belongs to a past step")]
    WrongStep,
    #[error("candidate block not known")]
    UnknownCandidate,
    #[error("duplicated vote")]
    DuplicateVote,
    #[error("malformed event")]
    MalformedEvent,
    #[error("quorum not reached")]
    QuorumMissed,
    #[error("step cap reached")]
    StepCapReached,
    #[error("verifier failure: {0}")]
    InternalVerifierFailure(String),

    #[error("event belongs to a future round or step")]
    FutureEvent,

    #[error("consensus canceled")]
    Canceled,
    #[error("child task terminated")]
    ChildTaskTerminated,
}

impl ConsensusError {
    pub fn priority(&self) -> Priority {
        match self {
            ConsensusError::InternalVerifierFailure(_)
            | ConsensusError::StepCapReached
            | ConsensusError::Canceled
            | ConsensusError::ChildTaskTerminated => Priority::High,
            _ => Priority::Low,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_errors_are_low_priority() {
        for err in [
            ConsensusError::InvalidSignature,
            ConsensusError::NotCommitteeMember,
            ConsensusError::WrongRound,
            ConsensusError::WrongStep,
            ConsensusError::UnknownCandidate,
            ConsensusError::DuplicateVote,
            ConsensusError::MalformedEvent,
            ConsensusError::QuorumMissed,
        ] {
            assert_eq!(err.priority(), Priority::Low);
        }

        let verifier_crash =
            ConsensusError::InternalVerifierFailure("pool died".into());
        assert_eq!(verifier_crash.priority(), Priority::High);
        assert_eq!(ConsensusError::StepCapReached.priority(), Priority::High);
    }
}
