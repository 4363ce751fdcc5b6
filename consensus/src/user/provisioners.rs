// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::collections::BTreeMap;

use node_data::bls::PublicKey;
use num_bigint::BigInt;

use crate::user::sortition;
use crate::user::stake::Stake;

/// The set of stakers eligible for consensus committees, ordered by BLS
/// key. Mutations happen only at round boundaries; each round works on a
/// snapshot (clone) of this set.
#[derive(Clone, Default, Debug)]
pub struct Provisioners {
    members: BTreeMap<PublicKey, Stake>,
}

impl Provisioners {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds a staker with an already-elapsed lock window.
    pub fn add_member_with_value(&mut self, pubkey_bls: PublicKey, value: u64) {
        self.add_member(pubkey_bls, Stake::new(value, 0));
    }

    pub fn add_member(&mut self, pubkey_bls: PublicKey, stake: Stake) {
        debug_assert!(stake.value > 0);
        self.members.entry(pubkey_bls).or_insert(stake);
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Sums up the total weight of stakes eligible at the given round.
    pub fn total_eligible_weight(&self, round: u64) -> u64 {
        self.members
            .values()
            .filter(|stake| stake.is_eligible(round))
            .map(|stake| stake.value)
            .sum()
    }

    /// Runs the deterministic sortition function, producing the slot
    /// owners of the voting committee for the given (round, step).
    ///
    /// The same provisioner may be drawn repeatedly, contributing that
    /// many credits to its committee weight.
    pub fn create_committee(&self, cfg: &sortition::Config) -> Vec<PublicKey> {
        let mut committee: Vec<PublicKey> =
            Vec::with_capacity(cfg.committee_size);

        let eligible: Vec<(&PublicKey, u64)> = self
            .members
            .iter()
            .filter(|(_, stake)| stake.is_eligible(cfg.round))
            .map(|(pubkey, stake)| (pubkey, stake.value))
            .collect();

        let total_weight =
            BigInt::from(self.total_eligible_weight(cfg.round));
        if total_weight == BigInt::from(0u64) {
            return committee;
        }

        for counter in 0..cfg.committee_size {
            let hash = sortition::create_sortition_hash(cfg, counter as u32);
            let mut score =
                sortition::generate_sortition_score(hash, &total_weight);

            // Walk the cumulative-stake intervals; the draw lands in
            // exactly one of them since score < total_weight.
            for (pubkey, value) in eligible.iter() {
                let value = BigInt::from(*value);
                if score < value {
                    committee.push(**pubkey);
                    break;
                }

                score -= value;
            }
        }

        committee
    }
}

#[cfg(test)]
mod tests {
    use node_data::ledger::Seed;

    use super::*;
    use crate::user::stake::DUSK;

    fn generate_provisioners(n: u64) -> Provisioners {
        let mut p = Provisioners::empty();
        for i in 1..=n {
            p.add_member_with_value(
                PublicKey::from_seed_u64(i),
                1000 * i * DUSK,
            );
        }
        p
    }

    #[test]
    fn test_deterministic_committee() {
        let p = generate_provisioners(5);
        let cfg =
            sortition::Config::new(Seed::from([3u8; 33]), 7777, 8, 45);

        let a = p.create_committee(&cfg);
        let b = p.create_committee(&cfg);

        // Extraction is a pure function of (seed, round, step, stakes)
        assert_eq!(a, b);
        assert_eq!(a.len(), 45);
    }

    #[test]
    fn test_single_staker_owns_all_slots() {
        let mut p = Provisioners::empty();
        let pubkey = PublicKey::from_seed_u64(9);
        p.add_member_with_value(pubkey, 1000 * DUSK);

        let cfg = sortition::Config::new(Seed::default(), 1, 1, 64);
        let committee = p.create_committee(&cfg);

        assert_eq!(committee, vec![pubkey; 64]);
    }

    #[test]
    fn test_locked_stakes_are_skipped() {
        let mut p = Provisioners::empty();
        let active = PublicKey::from_seed_u64(1);
        let locked = PublicKey::from_seed_u64(2);
        p.add_member_with_value(active, 1000 * DUSK);
        p.add_member(locked, Stake::new(1000 * DUSK, 100));

        let cfg = sortition::Config::new(Seed::default(), 10, 1, 64);
        let committee = p.create_committee(&cfg);

        assert!(committee.iter().all(|pk| *pk == active));
        assert_eq!(p.total_eligible_weight(10), 1000 * DUSK);
        assert_eq!(p.total_eligible_weight(100), 2000 * DUSK);
    }
}
