// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

#![deny(unused_crate_dependencies)]
#![deny(unused_extern_crates)]

pub mod bls;
pub mod encoding;
pub mod ledger;
pub mod message;

use std::io::{self, Read, Write};

/// Bit-exact binary codec used by every wire event.
///
/// Multi-byte integers are little-endian. Variable-length fields are
/// prefixed with a `VarInt` (see [`encoding`]).
pub trait Serializable {
    fn write<W: Write>(&self, w: &mut W) -> io::Result<()>;
    fn read<R: Read>(r: &mut R) -> io::Result<Self>
    where
        Self: Sized;

    /// Serializes self into a detached buffer.
    fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        Ok(buf)
    }

    fn read_bytes<R: Read, const N: usize>(r: &mut R) -> io::Result<[u8; N]> {
        let mut buf = [0u8; N];
        r.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
        let mut num = [0u8; 1];
        r.read_exact(&mut num)?;
        Ok(num[0])
    }

    fn read_u64_le<R: Read>(r: &mut R) -> io::Result<u64> {
        let data = Self::read_bytes(r)?;
        Ok(u64::from_le_bytes(data))
    }

    fn write_var_bytes<W: Write>(w: &mut W, buf: &[u8]) -> io::Result<()> {
        encoding::write_var_bytes(w, buf)
    }

    fn read_var_bytes<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
        encoding::read_var_bytes(r)
    }
}

impl<const N: usize> Serializable for [u8; N] {
    fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self[..])
    }

    fn read<R: Read>(r: &mut R) -> io::Result<Self>
    where
        Self: Sized,
    {
        Self::read_bytes(r)
    }
}
