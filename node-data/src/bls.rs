// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::cmp::Ordering;
use std::io::{self, Read, Write};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::Serializable;

/// Size of a compressed BLS public key on the wire.
pub const PUBLIC_BLS_SIZE: usize = 33;

/// A provisioner BLS public key in its compressed byte form.
///
/// The actual curve arithmetic lives behind the verifier interfaces; the
/// consensus core only orders, compares and serializes keys.
#[derive(Eq, PartialEq, Clone, Copy, Hash)]
pub struct PublicKey([u8; PUBLIC_BLS_SIZE]);

impl Default for PublicKey {
    fn default() -> Self {
        Self([0u8; PUBLIC_BLS_SIZE])
    }
}

impl PublicKey {
    pub const fn new(bytes: [u8; PUBLIC_BLS_SIZE]) -> Self {
        Self(bytes)
    }

    /// Generates a key from the specified seed. Useful to reproduce a
    /// deterministic set of provisioner keys.
    pub fn from_seed_u64(state: u64) -> Self {
        let rng = &mut StdRng::seed_from_u64(state);
        let mut bytes = [0u8; PUBLIC_BLS_SIZE];
        rng.fill_bytes(&mut bytes);

        Self(bytes)
    }

    pub fn bytes(&self) -> &[u8; PUBLIC_BLS_SIZE] {
        &self.0
    }

    /// Truncated base58 representation of the key.
    pub fn to_bs58(&self) -> String {
        let mut bs = bs58::encode(&self.0).into_string();
        bs.truncate(16);
        bs
    }
}

impl PartialOrd<PublicKey> for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("bs58", &self.to_bs58())
            .finish()
    }
}

impl Serializable for PublicKey {
    fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.0[..])
    }

    fn read<R: Read>(r: &mut R) -> io::Result<Self>
    where
        Self: Sized,
    {
        Ok(Self(Self::read_bytes(r)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_seed_is_deterministic() {
        assert_eq!(PublicKey::from_seed_u64(42), PublicKey::from_seed_u64(42));
        assert_ne!(PublicKey::from_seed_u64(42), PublicKey::from_seed_u64(43));
    }

    #[test]
    fn test_ordering_follows_bytes() {
        let a = PublicKey::new([1; PUBLIC_BLS_SIZE]);
        let b = PublicKey::new([2; PUBLIC_BLS_SIZE]);

        assert!(a < b);
    }
}
