// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Compact-size `VarInt` and var-bytes primitives of the wire encoding.
//!
//! Values below 0xFD are a single byte; larger values carry a marker byte
//! followed by the little-endian u16/u32/u64 representation.

use std::io::{self, Read, Write};

pub fn write_varint<W: Write>(w: &mut W, value: u64) -> io::Result<()> {
    if value < 0xFD {
        w.write_all(&[value as u8])
    } else if value <= u16::MAX as u64 {
        w.write_all(&[0xFD])?;
        w.write_all(&(value as u16).to_le_bytes())
    } else if value <= u32::MAX as u64 {
        w.write_all(&[0xFE])?;
        w.write_all(&(value as u32).to_le_bytes())
    } else {
        w.write_all(&[0xFF])?;
        w.write_all(&value.to_le_bytes())
    }
}

pub fn read_varint<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut marker = [0u8; 1];
    r.read_exact(&mut marker)?;

    match marker[0] {
        0xFD => {
            let mut buf = [0u8; 2];
            r.read_exact(&mut buf)?;
            Ok(u16::from_le_bytes(buf) as u64)
        }
        0xFE => {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf)?;
            Ok(u32::from_le_bytes(buf) as u64)
        }
        0xFF => {
            let mut buf = [0u8; 8];
            r.read_exact(&mut buf)?;
            Ok(u64::from_le_bytes(buf))
        }
        value => Ok(value as u64),
    }
}

pub fn write_var_bytes<W: Write>(w: &mut W, buf: &[u8]) -> io::Result<()> {
    write_varint(w, buf.len() as u64)?;
    w.write_all(buf)
}

pub fn read_var_bytes<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
    let len = read_varint(r)? as usize;

    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_boundaries() {
        let values = [
            (0u64, 1usize),
            (0xFC, 1),
            (0xFD, 3),
            (u16::MAX as u64, 3),
            (u16::MAX as u64 + 1, 5),
            (u32::MAX as u64, 5),
            (u32::MAX as u64 + 1, 9),
            (u64::MAX, 9),
        ];

        for (value, encoded_len) in values {
            let mut buf = vec![];
            write_varint(&mut buf, value).expect("write to vec");
            assert_eq!(buf.len(), encoded_len, "encoding {value}");
            assert_eq!(read_varint(&mut &buf[..]).expect("read back"), value);
        }
    }

    #[test]
    fn test_var_bytes_roundtrip() {
        let data = vec![7u8; 300];
        let mut buf = vec![];
        write_var_bytes(&mut buf, &data).expect("write to vec");

        // 300 > 0xFC, so a 3-byte prefix is expected
        assert_eq!(buf.len(), 3 + data.len());
        assert_eq!(read_var_bytes(&mut &buf[..]).expect("read back"), data);
    }
}
