// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::io::{self, Read, Write};

use crate::message::{self, payload, StepVote};
use crate::Serializable;

pub type Hash = [u8; 32];

/// Encode a byte array into a shortened HEX representation.
pub fn to_str(bytes: &[u8]) -> String {
    const OFFSET: usize = 16;
    let hex = hex::encode(bytes);
    if bytes.len() <= OFFSET {
        return hex;
    }

    let len = hex.len();

    let first = &hex[0..OFFSET];
    let last = &hex[len - OFFSET..];

    format!("{first}...{last}")
}

/// Public randomness of a round. Carried as the generator's BLS signature
/// over the previous seed, hence the compressed-signature width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Seed([u8; 33]);

impl Default for Seed {
    fn default() -> Self {
        Self([0u8; 33])
    }
}

impl From<[u8; 33]> for Seed {
    fn from(bytes: [u8; 33]) -> Self {
        Self(bytes)
    }
}

impl Seed {
    pub fn inner(&self) -> &[u8; 33] {
        &self.0
    }
}

impl Serializable for Seed {
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

/// The header fields of the most recently accepted block the consensus
/// core needs to start negotiating the next height. The full block model
/// lives outside this crate.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Header {
    pub height: u64,
    pub timestamp: i64,
    pub prev_block_hash: Hash,
    pub seed: Seed,
    pub hash: Hash,
}

impl Serializable for Header {
    fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.height.to_le_bytes())?;
        w.write_all(&self.timestamp.to_le_bytes())?;
        w.write_all(&self.prev_block_hash[..])?;
        self.seed.write(w)?;
        w.write_all(&self.hash[..])?;

        Ok(())
    }

    fn read<R: Read>(r: &mut R) -> io::Result<Self>
    where
        Self: Sized,
    {
        let height = Self::read_u64_le(r)?;
        let timestamp = Self::read_u64_le(r)? as i64;
        let prev_block_hash = Self::read_bytes(r)?;
        let seed = Seed::read(r)?;
        let hash = Self::read_bytes(r)?;

        Ok(Header {
            height,
            timestamp,
            prev_block_hash,
            seed,
            hash,
        })
    }
}

/// A candidate block as the consensus moves it around: its hash and the
/// opaque block body. Cached until the block either wins agreement or its
/// round expires.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub hash: Hash,
    pub data: Vec<u8>,
}

impl Serializable for Candidate {
    fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.hash[..])?;
        Self::write_var_bytes(w, &self.data)?;

        Ok(())
    }

    fn read<R: Read>(r: &mut R) -> io::Result<Self>
    where
        Self: Sized,
    {
        let hash = Self::read_bytes(r)?;
        let data = Self::read_var_bytes(r)?;

        Ok(Candidate { hash, data })
    }
}

/// Proof that a block won its round: the vote sets that crossed quorum in
/// the second block-reduction step and in the second sigset-reduction
/// step, bound to the winning hash.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub round: u64,
    /// Step of the last vote included in the certificate.
    pub step: u8,
    pub block_hash: Hash,
    pub block_votes: Vec<StepVote<payload::Reduction>>,
    pub sig_set_votes: Vec<StepVote<payload::SigSet>>,
}

impl Serializable for Certificate {
    fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.round.to_le_bytes())?;
        w.write_all(&[self.step])?;
        w.write_all(&self.block_hash[..])?;
        message::write_vote_set(w, &self.block_votes)?;
        message::write_vote_set(w, &self.sig_set_votes)?;

        Ok(())
    }

    fn read<R: Read>(r: &mut R) -> io::Result<Self>
    where
        Self: Sized,
    {
        let round = Self::read_u64_le(r)?;
        let step = Self::read_u8(r)?;
        let block_hash = Self::read_bytes(r)?;
        let block_votes = message::read_vote_set(r)?;
        let sig_set_votes = message::read_vote_set(r)?;

        Ok(Certificate {
            round,
            step,
            block_hash,
            block_votes,
            sig_set_votes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bls::PublicKey;

    #[test]
    fn test_to_str_shortens_long_input() {
        let long = to_str(&[0xABu8; 32]);
        assert_eq!(long, "abababababababab...abababababababab");

        let short = to_str(&[0xABu8; 4]);
        assert_eq!(short, "abababab");
    }

    #[test]
    fn test_certificate_roundtrip() {
        let cert = Certificate {
            round: 42,
            step: 5,
            block_hash: [7; 32],
            block_votes: vec![StepVote {
                round: 42,
                step: 3,
                pubkey_bls: PublicKey::from_seed_u64(1),
                payload: payload::Reduction {
                    voted_hash: [7; 32],
                    signed_hash: vec![1; 33],
                },
            }],
            sig_set_votes: vec![StepVote {
                round: 42,
                step: 5,
                pubkey_bls: PublicKey::from_seed_u64(2),
                payload: payload::SigSet {
                    voted_hash: [9; 32],
                    signed_hash: vec![2; 33],
                    block_hash: [7; 32],
                },
            }],
        };

        let mut buf = vec![];
        assert!(cert.write(&mut buf).is_ok());
        let dup = Certificate::read(&mut &buf[..]).expect("deserialize is ok");
        assert_eq!(cert, dup);

        let mut buf2 = vec![];
        assert!(dup.write(&mut buf2).is_ok());
        assert_eq!(buf, buf2);
    }

    #[test]
    fn test_header_roundtrip() {
        let header = Header {
            height: 1888881,
            timestamp: 123456789,
            prev_block_hash: [1; 32],
            seed: Seed::from([2; 33]),
            hash: [5; 32],
        };

        let mut buf = vec![];
        assert!(header.write(&mut buf).is_ok());
        assert_eq!(
            Header::read(&mut &buf[..]).expect("deserialize is ok"),
            header
        );
    }
}
