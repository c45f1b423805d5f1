//! OpenPGP packet framing.
//!
//! Handles both old and new packet headers, including new-format partial
//! body lengths, which are concatenated into a single body.

use super::error::{malformed, DecryptResult};

pub(crate) const TAG_SKESK: u8 = 3;
pub(crate) const TAG_COMPRESSED: u8 = 8;
pub(crate) const TAG_SED: u8 = 9;
pub(crate) const TAG_MARKER: u8 = 10;
pub(crate) const TAG_LITERAL: u8 = 11;
pub(crate) const TAG_SEIPD: u8 = 18;

/// One packet with its body fully assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Packet {
    pub tag: u8,
    pub body: Vec<u8>,
}

enum BodyLength {
    Fixed(usize),
    Partial(usize),
}

struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    fn byte(&mut self) -> DecryptResult<u8> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| malformed("unexpected end of packet header"))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, len: usize) -> DecryptResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                malformed(format!(
                    "packet body of {} bytes runs past the end of the data",
                    len
                ))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn be_u32(&mut self) -> DecryptResult<usize> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize)
    }

    fn new_format_length(&mut self) -> DecryptResult<BodyLength> {
        let first = self.byte()? as usize;
        Ok(match first {
            0..=191 => BodyLength::Fixed(first),
            192..=223 => {
                let second = self.byte()? as usize;
                BodyLength::Fixed(((first - 192) << 8) + second + 192)
            }
            255 => BodyLength::Fixed(self.be_u32()?),
            _ => BodyLength::Partial(1 << (first & 0x1f)),
        })
    }

    fn next_packet(&mut self) -> DecryptResult<Packet> {
        let ctb = self.byte()?;
        if ctb & 0x80 == 0 {
            return Err(malformed(format!("invalid packet tag byte 0x{:02x}", ctb)));
        }

        if ctb & 0x40 != 0 {
            let tag = ctb & 0x3f;
            let mut body = Vec::new();
            loop {
                match self.new_format_length()? {
                    BodyLength::Partial(len) => body.extend_from_slice(self.take(len)?),
                    BodyLength::Fixed(len) => {
                        body.extend_from_slice(self.take(len)?);
                        break;
                    }
                }
            }
            Ok(Packet { tag, body })
        } else {
            let tag = (ctb >> 2) & 0x0f;
            let len = match ctb & 0x03 {
                0 => self.byte()? as usize,
                1 => {
                    let b = self.take(2)?;
                    u16::from_be_bytes([b[0], b[1]]) as usize
                }
                2 => self.be_u32()?,
                // indeterminate: runs to the end of the enclosing data
                _ => self.data.len() - self.pos,
            };
            Ok(Packet {
                tag,
                body: self.take(len)?.to_vec(),
            })
        }
    }
}

/// Split `data` into packets.
pub(crate) fn read_packets(data: &[u8]) -> DecryptResult<Vec<Packet>> {
    let mut reader = PacketReader { data, pos: 0 };
    let mut packets = Vec::new();
    while reader.pos < data.len() {
        packets.push(reader.next_packet()?);
    }
    Ok(packets)
}

/// Append a new-format packet with a definite length.
pub(crate) fn write_packet(out: &mut Vec<u8>, tag: u8, body: &[u8]) {
    out.push(0xc0 | tag);
    let len = body.len();
    if len < 192 {
        out.push(len as u8);
    } else if len < 8384 {
        let rest = len - 192;
        out.push(((rest >> 8) + 192) as u8);
        out.push((rest & 0xff) as u8);
    } else {
        out.push(0xff);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
    out.extend_from_slice(body);
}
