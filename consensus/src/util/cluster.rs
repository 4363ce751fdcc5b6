// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::collections::BTreeMap;

/// A multiset of voters with their weights.
#[derive(Debug, Default)]
pub struct Cluster<T>(pub BTreeMap<T, usize>);

impl<T> Cluster<T>
where
    T: Default + std::cmp::Ord + Copy + std::fmt::Debug,
{
    pub fn new() -> Self {
        Self(Default::default())
    }

    pub fn contains_key(&self, key: &T) -> bool {
        self.0.contains_key(key)
    }

    pub fn total_occurrences(&self) -> usize {
        self.0.values().sum()
    }

    /// set_weight can set weight only once.
    pub fn set_weight(&mut self, key: &T, weight: usize) -> Option<usize> {
        let entry = self.0.entry(*key).or_insert(0);
        if *entry > 0 {
            // already updated
            return None;
        }

        *entry = weight;
        Some(*entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn test_set_weight() {
        let mut a = Cluster::<char>::new();

        a.set_weight(&'a', 3);
        a.set_weight(&'b', 11);
        assert_eq!(a.total_occurrences(), 14);

        let res = a.set_weight(&'b', 1);
        assert!(res.is_none());
        assert_eq!(a.total_occurrences(), 14);
    }
}
