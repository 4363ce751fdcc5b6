// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use node_data::ledger::Seed;
use num_bigint::BigInt;
use num_bigint::Sign::Plus;
use sha3::{Digest, Sha3_256};

use crate::config;

/// Inputs pinning a deterministic committee extraction: the last block
/// seed, the (round, step) under execution and the committee credits to
/// distribute.
#[derive(Debug, Clone, Default, Eq, Hash, PartialEq)]
pub struct Config {
    pub seed: Seed,
    pub round: u64,
    pub step: u8,
    pub committee_size: usize,
}

impl Config {
    pub fn new(seed: Seed, round: u64, step: u8, committee_size: usize) -> Self {
        Self {
            seed,
            round,
            step,
            committee_size,
        }
    }

    pub fn reduction(seed: Seed, round: u64, step: u8) -> Self {
        Self::new(seed, round, step, config::CONSENSUS_COMMITTEE_SIZE)
    }
}

// The deterministic procedure requires the set of eligible stakes, the
// latest global seed, current consensus round and current consensus step.

pub fn create_sortition_hash(cfg: &Config, counter: u32) -> [u8; 32] {
    let mut hasher = Sha3_256::new();

    // write input message
    hasher.update(&cfg.seed.inner()[..]);
    hasher.update(cfg.round.to_le_bytes());
    hasher.update(cfg.step.to_le_bytes());
    hasher.update(counter.to_le_bytes());

    // read hash digest
    let reader = hasher.finalize();
    reader.as_slice().try_into().expect("Wrong length")
}

/// Generate a score from the given hash and total stake weight
pub fn generate_sortition_score(
    hash: [u8; 32],
    total_weight: &BigInt,
) -> BigInt {
    let num = BigInt::from_bytes_be(Plus, hash.as_slice());
    num % total_weight
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn test_sortition_hash_is_reproducible() {
        let cfg = Config::new(Seed::from([3; 33]), 10, 3, 64);

        // The stream must be reproducible across nodes
        assert_eq!(create_sortition_hash(&cfg, 1), create_sortition_hash(&cfg, 1));

        // and distinct per slot, step and round
        assert_ne!(create_sortition_hash(&cfg, 1), create_sortition_hash(&cfg, 2));

        let other_step = Config::new(Seed::from([3; 33]), 10, 4, 64);
        assert_ne!(
            create_sortition_hash(&cfg, 1),
            create_sortition_hash(&other_step, 1)
        );

        let other_round = Config::new(Seed::from([3; 33]), 11, 3, 64);
        assert_ne!(
            create_sortition_hash(&cfg, 1),
            create_sortition_hash(&other_round, 1)
        );
    }

    #[test]
    pub fn test_generate_sortition_score() {
        let cfg = Config::new(Seed::from([4; 33]), 10, 3, 64);

        for total in [1u64, 44443333, 123342342] {
            let hash = create_sortition_hash(&cfg, 1);
            let total_weight = BigInt::from(total);
            let score = generate_sortition_score(hash, &total_weight);

            assert!(score >= BigInt::from(0u64));
            assert!(score < total_weight);
        }
    }
}
