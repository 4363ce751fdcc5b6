// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::collections::BTreeMap;

use node_data::bls::PublicKey;
use node_data::ledger::Seed;
use tokio::sync::RwLock;

use crate::config;
use crate::user::provisioners::Provisioners;
use crate::user::sortition;

/// The voting committee of a single (round, step): a multiset of
/// provisioner keys, where the multiplicity of a member is the number of
/// credits it was drawn for.
#[derive(Default, Debug, Clone)]
pub struct Committee {
    members: BTreeMap<PublicKey, usize>,
    this_member_key: PublicKey,
    total: usize,
}

impl Committee {
    pub fn new(
        pubkey_bls: PublicKey,
        provisioners: &Provisioners,
        cfg: &sortition::Config,
    ) -> Self {
        // Generate committee using deterministic sortition.
        let extracted = provisioners.create_committee(cfg);

        // Turn the raw vector into a map of a member to its credits.
        let mut committee = Self {
            members: BTreeMap::new(),
            this_member_key: pubkey_bls,
            total: 0,
        };

        for member_key in extracted {
            *committee.members.entry(member_key).or_insert(0) += 1;
            committee.total += 1;
        }

        committee
    }

    pub fn is_member(&self, pubkey_bls: &PublicKey) -> bool {
        self.members.contains_key(pubkey_bls)
    }

    pub fn am_member(&self) -> bool {
        self.is_member(&self.this_member_key)
    }

    // get_my_pubkey returns this provisioner BLS public key.
    pub fn get_my_pubkey(&self) -> &PublicKey {
        &self.this_member_key
    }

    /// Credits of a member, if it belongs to the committee. A single vote
    /// of a member counts for all its credits.
    pub fn votes_for(&self, pubkey_bls: &PublicKey) -> Option<usize> {
        self.members.get(pubkey_bls).copied()
    }

    // get_occurrences returns the member credits in key order.
    pub fn get_occurrences(&self) -> Vec<usize> {
        self.members.values().copied().collect()
    }

    /// Count of distinct committee members.
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// Count of distributed committee credits.
    pub fn total_credits(&self) -> usize {
        self.total
    }

    pub fn quorum(&self) -> usize {
        let credits = self.total as f64;
        (credits * config::CONSENSUS_QUORUM_THRESHOLD).ceil() as usize
    }

    /// Builds a committee with explicit member credits, bypassing
    /// sortition. Test-only.
    #[cfg(test)]
    pub(crate) fn from_credits(
        this_member_key: PublicKey,
        credits: &[(PublicKey, usize)],
    ) -> Self {
        let members: BTreeMap<PublicKey, usize> =
            credits.iter().copied().collect();
        let total = members.values().sum();

        Self {
            members,
            this_member_key,
            total,
        }
    }
}

/// The committee extractor: memoises committees per (round, step) so that
/// repeated lookups of the same step do not re-run sortition. Readers and
/// writers synchronise through a reader-writer lock; writes occur only on
/// a cache miss.
pub struct CommitteeSet {
    provisioners: Provisioners,
    this_member_key: PublicKey,
    committees: RwLock<BTreeMap<(u64, u8), Committee>>,
}

impl CommitteeSet {
    pub fn new(pubkey_bls: PublicKey, provisioners: Provisioners) -> Self {
        Self {
            provisioners,
            this_member_key: pubkey_bls,
            committees: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn get_or_create(&self, cfg: &sortition::Config) -> Committee {
        let key = (cfg.round, cfg.step);

        if let Some(committee) = self.committees.read().await.get(&key) {
            return committee.clone();
        }

        let mut guard = self.committees.write().await;
        guard
            .entry(key)
            .or_insert_with(|| {
                Committee::new(self.this_member_key, &self.provisioners, cfg)
            })
            .clone()
    }

    /// Precomputes the committees for steps
    /// `[starting_step, starting_step + count)` to amortise sortition.
    pub async fn pregenerate(
        &self,
        seed: Seed,
        round: u64,
        starting_step: u8,
        count: u8,
    ) {
        for step in starting_step..starting_step + count {
            let cfg = sortition::Config::reduction(seed, round, step);
            self.get_or_create(&cfg).await;
        }
    }

    /// Evicts all committees extracted for rounds lower than `round`.
    pub async fn prune(&self, round: u64) {
        let mut guard = self.committees.write().await;
        let kept = guard.split_off(&(round, 0));
        *guard = kept;
    }

    pub async fn is_member(
        &self,
        pubkey_bls: &PublicKey,
        cfg: &sortition::Config,
    ) -> bool {
        self.get_or_create(cfg).await.is_member(pubkey_bls)
    }

    pub async fn votes_for(
        &self,
        pubkey_bls: &PublicKey,
        cfg: &sortition::Config,
    ) -> Option<usize> {
        self.get_or_create(cfg).await.votes_for(pubkey_bls)
    }

    pub async fn quorum(&self, cfg: &sortition::Config) -> usize {
        self.get_or_create(cfg).await.quorum()
    }
}

#[cfg(test)]
mod tests {
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
    fn test_extraction_is_deterministic() {
        let p = generate_provisioners(5);
        let cfg = sortition::Config::new(Seed::from([3u8; 33]), 7777, 8, 64);

        let a = Committee::new(PublicKey::default(), &p, &cfg);
        let b = Committee::new(PublicKey::default(), &p, &cfg);

        assert_eq!(a.get_occurrences(), b.get_occurrences());
        assert_eq!(a.total_credits(), 64);
        assert_eq!(
            a.get_occurrences().iter().sum::<usize>(),
            a.total_credits()
        );
    }

    #[test]
    fn test_quorum_rounds_up() {
        let mut p = Provisioners::empty();
        let this_key = PublicKey::from_seed_u64(1);
        p.add_member_with_value(this_key, 1000 * DUSK);

        let cfg = sortition::Config::reduction(Seed::default(), 1, 1);
        let c = Committee::new(this_key, &p, &cfg);

        // 64 credits, all held by the only eligible provisioner
        assert_eq!(c.total_credits(), 64);
        assert_eq!(c.size(), 1);
        assert_eq!(c.quorum(), 48);
        assert!(c.am_member());
        assert_eq!(c.votes_for(&this_key), Some(64));
        assert_eq!(c.votes_for(&PublicKey::from_seed_u64(2)), None);
    }

    #[tokio::test]
    async fn test_committee_set_memoisation_and_prune() {
        let set = CommitteeSet::new(
            PublicKey::from_seed_u64(1),
            generate_provisioners(5),
        );

        let seed = Seed::from([7u8; 33]);
        set.pregenerate(seed, 10, 1, 5).await;
        assert_eq!(set.committees.read().await.len(), 5);

        // A pregenerated committee is returned as-is
        let cfg = sortition::Config::reduction(seed, 10, 3);
        let hit = set.get_or_create(&cfg).await;
        assert_eq!(set.committees.read().await.len(), 5);
        assert_eq!(
            hit.get_occurrences(),
            set.get_or_create(&cfg).await.get_occurrences()
        );

        // The membership and quorum views agree with the extraction
        assert_eq!(hit.quorum(), set.quorum(&cfg).await);
        for i in 1..=5u64 {
            let key = PublicKey::from_seed_u64(i);
            assert_eq!(
                set.is_member(&key, &cfg).await,
                hit.votes_for(&key).is_some()
            );
            assert_eq!(set.votes_for(&key, &cfg).await, hit.votes_for(&key));
        }

        // Advancing the round evicts stale entries
        set.prune(11).await;
        assert!(set.committees.read().await.is_empty());
    }
}
