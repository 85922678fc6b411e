// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RFC 6455 client-side frame codec.
//!
//! Send path writes single FIN frames with a fresh 4-byte mask per frame, as
//! the client side of the protocol requires. Receive path tolerates masked
//! server frames even though a conforming server never masks.

use anyhow::bail;
use bytes::Bytes;
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const FIN: u8 = 0x80;
const MASK_BIT: u8 = 0x80;

/// Frame opcodes the bus session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u8 {
        match self {
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: Opcode,
    pub payload: Bytes,
}

/// Encode a single-frame client message with the given mask.
pub fn encode_frame(opcode: Opcode, payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 14);
    out.push(FIN | opcode.as_raw());

    if payload.len() <= 125 {
        out.push(MASK_BIT | payload.len() as u8);
    } else if payload.len() <= u16::MAX as usize {
        out.push(MASK_BIT | 126);
        out.extend((payload.len() as u16).to_be_bytes());
    } else {
        out.push(MASK_BIT | 127);
        out.extend((payload.len() as u64).to_be_bytes());
    }

    out.extend(mask);
    out.extend(payload.iter().enumerate().map(|(i, &b)| b ^ mask[i % 4]));
    out
}

/// Encode with a freshly generated mask.
pub fn encode_masked(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
    let mut mask = [0u8; 4];
    rand::rng().fill_bytes(&mut mask);
    encode_frame(opcode, payload, mask)
}

/// Decode one frame from the front of `buf`. Returns the frame and the
/// number of bytes consumed, or `None` if the buffer is still incomplete.
pub fn decode_frame(buf: &[u8]) -> anyhow::Result<Option<(Frame, usize)>> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let opcode = match Opcode::from_raw(buf[0] & 0x0F) {
        Some(op) => op,
        None => bail!("unsupported opcode {:#x}", buf[0] & 0x0F),
    };
    let masked = buf[1] & MASK_BIT != 0;
    let len7 = (buf[1] & 0x7F) as usize;

    let (len, mut off) = match len7 {
        126 => {
            if buf.len() < 4 {
                return Ok(None);
            }
            (u16::from_be_bytes([buf[2], buf[3]]) as usize, 4)
        }
        127 => {
            if buf.len() < 10 {
                return Ok(None);
            }
            let mut be = [0u8; 8];
            be.copy_from_slice(&buf[2..10]);
            (u64::from_be_bytes(be) as usize, 10)
        }
        n => (n, 2),
    };

    let mask = if masked {
        if buf.len() < off + 4 {
            return Ok(None);
        }
        let m = [buf[off], buf[off + 1], buf[off + 2], buf[off + 3]];
        off += 4;
        Some(m)
    } else {
        None
    };

    if buf.len() < off + len {
        return Ok(None);
    }
    let mut payload = buf[off..off + len].to_vec();
    if let Some(mask) = mask {
        for (i, b) in payload.iter_mut().enumerate() {
            *b ^= mask[i % 4];
        }
    }
    Ok(Some((Frame { opcode, payload: Bytes::from(payload) }, off + len)))
}

/// Read exactly one frame from the stream.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> anyhow::Result<Frame> {
    let mut header = [0u8; 2];
    reader.read_exact(&mut header).await?;

    let opcode = match Opcode::from_raw(header[0] & 0x0F) {
        Some(op) => op,
        None => bail!("unsupported opcode {:#x}", header[0] & 0x0F),
    };
    let masked = header[1] & MASK_BIT != 0;
    let len = match header[1] & 0x7F {
        126 => {
            let mut ext = [0u8; 2];
            reader.read_exact(&mut ext).await?;
            u16::from_be_bytes(ext) as usize
        }
        127 => {
            let mut ext = [0u8; 8];
            reader.read_exact(&mut ext).await?;
            u64::from_be_bytes(ext) as usize
        }
        n => n as usize,
    };

    let mask = if masked {
        let mut m = [0u8; 4];
        reader.read_exact(&mut m).await?;
        Some(m)
    } else {
        None
    };

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    if let Some(mask) = mask {
        for (i, b) in payload.iter_mut().enumerate() {
            *b ^= mask[i % 4];
        }
    }
    Ok(Frame { opcode, payload: Bytes::from(payload) })
}

/// Write one masked client frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    opcode: Opcode,
    payload: &[u8],
) -> anyhow::Result<()> {
    let encoded = encode_masked(opcode, payload);
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
