//! Sub-block command decoding.
//!
//! A block payload is a stream of sub-blocks, each starting with a selector
//! byte and an opcode byte:
//!
//! ```text
//! 0x1 single write  [sel][01][n:be16]{[book][page][reg][val]} × n
//! 0x2 burst         [sel][02][len:be16][book][page][reg][rsvd][data × len]
//! 0x3 delay         [sel][03][ms:be16]
//! 0x4 field write   [sel][04][rsvd][mask][book][page][reg][val]
//! ```
//!
//! [`decode`] validates the full extent of a command against the bytes left
//! in the block before handing out any field, so executing and printing a
//! program share the same bounds checks.

use core::fmt;
use core::slice::ChunksExact;

use tas_platform::RegAddr;

use crate::cursor::Cursor;
use crate::error::SubBlockError;

/// Selector and opcode bytes in front of every command.
pub const SUBBLOCK_HEADER_LEN: usize = 2;

/// Sub-block command kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Opcode {
    /// N independent register writes.
    SingleWrite,
    /// Consecutive registers from one start address.
    Burst,
    /// Sleep.
    Delay,
    /// Masked read-modify-write.
    FieldWrite,
}

impl Opcode {
    /// Wire value.
    pub const fn raw(self) -> u8 {
        match self {
            Opcode::SingleWrite => 0x1,
            Opcode::Burst => 0x2,
            Opcode::Delay => 0x3,
            Opcode::FieldWrite => 0x4,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = SubBlockError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0x1 => Ok(Opcode::SingleWrite),
            0x2 => Ok(Opcode::Burst),
            0x3 => Ok(Opcode::Delay),
            0x4 => Ok(Opcode::FieldWrite),
            other => Err(SubBlockError::UnknownOpcode(other)),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Opcode::SingleWrite => "SING_W",
            Opcode::Burst => "CMD_BURST",
            Opcode::Delay => "CMD_DELAY",
            Opcode::FieldWrite => "FIELD_W",
        })
    }
}

/// One `(register, value)` pair of a single-write command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegWrite {
    /// Target register.
    pub reg: RegAddr,
    /// Value written.
    pub value: u8,
}

/// Iterator over the 4-byte records of a single-write command.
#[derive(Debug, Clone)]
pub struct SingleWrites<'a> {
    records: ChunksExact<'a, u8>,
}

impl Iterator for SingleWrites<'_> {
    type Item = RegWrite;

    fn next(&mut self) -> Option<RegWrite> {
        match *self.records.next()? {
            [book, page, reg, value] => Some(RegWrite {
                reg: RegAddr::new(book, page, reg),
                value,
            }),
            _ => None,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

impl ExactSizeIterator for SingleWrites<'_> {}

/// A decoded command.
#[derive(Debug, Clone)]
pub enum Command<'a> {
    /// Independent register writes, in order.
    SingleWrite(SingleWrites<'a>),
    /// `data` written to consecutive registers starting at `reg`.
    Burst {
        /// First register.
        reg: RegAddr,
        /// Payload, a multiple of 4 bytes.
        data: &'a [u8],
    },
    /// Sleep for `ms` milliseconds.
    Delay {
        /// Duration.
        ms: u16,
    },
    /// `update_bits(reg, mask, value)`.
    FieldWrite {
        /// Target register.
        reg: RegAddr,
        /// Bits touched.
        mask: u8,
        /// New value of the masked bits.
        value: u8,
    },
}

impl Command<'_> {
    /// Command kind.
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::SingleWrite(_) => Opcode::SingleWrite,
            Command::Burst { .. } => Opcode::Burst,
            Command::Delay { .. } => Opcode::Delay,
            Command::FieldWrite { .. } => Opcode::FieldWrite,
        }
    }
}

/// A sub-block with its framing.
#[derive(Debug, Clone)]
pub struct SubBlock<'a> {
    /// Leading selector byte as stored in the stream.
    pub selector: u8,
    /// Decoded command.
    pub command: Command<'a>,
    /// Bytes consumed from the stream, header included.
    pub len: usize,
}

fn ensure(opcode: Opcode, needed: usize, available: usize) -> Result<(), SubBlockError> {
    if needed > available {
        return Err(SubBlockError::OutOfBounds {
            opcode,
            needed,
            available,
        });
    }
    Ok(())
}

/// Decode the sub-block at the start of `stream`.
///
/// `stream` runs from the sub-block's selector byte to the end of the block
/// payload; nothing beyond it is ever read.
pub fn decode(stream: &[u8]) -> Result<SubBlock<'_>, SubBlockError> {
    let available = stream.len();
    let mut cur = Cursor::new(stream);
    let (selector, raw_opcode) = match (cur.read_u8(), cur.read_u8()) {
        (Ok(selector), Ok(opcode)) => (selector, opcode),
        _ => return Err(SubBlockError::HeaderTruncated { available }),
    };
    let opcode = Opcode::try_from(raw_opcode)?;
    let oob = |needed: usize| SubBlockError::OutOfBounds {
        opcode,
        needed,
        available,
    };

    let (command, len) = match opcode {
        Opcode::SingleWrite => {
            let count = cur.read_be16().map_err(|_| oob(4))?;
            let body = usize::from(count).saturating_mul(4);
            let needed = body.saturating_add(4);
            ensure(opcode, needed, available)?;
            let records = cur.take(body).map_err(|_| oob(needed))?;
            (
                Command::SingleWrite(SingleWrites {
                    records: records.chunks_exact(4),
                }),
                needed,
            )
        }
        Opcode::Burst => {
            let count = cur.read_be16().map_err(|_| oob(4))?;
            let needed = usize::from(count).saturating_add(8);
            ensure(opcode, needed, available)?;
            if count % 4 != 0 {
                return Err(SubBlockError::MisalignedBurst { len: count });
            }
            let [book, page, reg, _reserved] = cur.read_array::<4>().map_err(|_| oob(needed))?;
            let data = cur.take(usize::from(count)).map_err(|_| oob(needed))?;
            (
                Command::Burst {
                    reg: RegAddr::new(book, page, reg),
                    data,
                },
                needed,
            )
        }
        Opcode::Delay => {
            let ms = cur.read_be16().map_err(|_| oob(4))?;
            (Command::Delay { ms }, 4)
        }
        Opcode::FieldWrite => {
            ensure(opcode, 8, available)?;
            let [_reserved, mask, book, page, reg, value] =
                cur.read_array::<6>().map_err(|_| oob(8))?;
            (
                Command::FieldWrite {
                    reg: RegAddr::new(book, page, reg),
                    mask,
                    value,
                },
                8,
            )
        }
    };

    Ok(SubBlock {
        selector,
        command,
        len,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn single_write_yields_records_in_order() {
        let stream = [0x00, 0x01, 0x00, 0x02, 0, 0, 0x02, 0x11, 0, 1, 0x05, 0x22];
        let sub = decode(&stream).unwrap();
        assert_eq!(sub.len, 12);
        let Command::SingleWrite(writes) = sub.command else {
            unreachable!("decoded a single write");
        };
        let writes: std::vec::Vec<_> = writes.collect();
        assert_eq!(
            writes,
            [
                RegWrite {
                    reg: RegAddr::new(0, 0, 0x02),
                    value: 0x11
                },
                RegWrite {
                    reg: RegAddr::new(0, 1, 0x05),
                    value: 0x22
                },
            ]
        );
    }

    #[test]
    fn single_write_count_past_end_is_rejected() {
        // Declares two records, carries one.
        let stream = [0x00, 0x01, 0x00, 0x02, 0, 0, 0x02, 0x11];
        assert_eq!(
            decode(&stream).unwrap_err(),
            SubBlockError::OutOfBounds {
                opcode: Opcode::SingleWrite,
                needed: 12,
                available: 8
            }
        );
    }

    #[test]
    fn burst_exactly_filling_block_is_accepted() {
        let stream = [0x01, 0x02, 0x00, 0x04, 0x00, 0x01, 0x10, 0x00, 1, 2, 3, 4];
        let sub = decode(&stream).unwrap();
        assert_eq!(sub.selector, 1);
        assert_eq!(sub.len, 12);
        match sub.command {
            Command::Burst { reg, data } => {
                assert_eq!(reg, RegAddr::new(0, 1, 0x10));
                assert_eq!(data, &[1, 2, 3, 4]);
            }
            other => unreachable!("unexpected {other:?}"),
        }
    }

    #[test]
    fn burst_one_byte_short_is_out_of_bounds() {
        let stream = [0x01, 0x02, 0x00, 0x04, 0x00, 0x01, 0x10, 0x00, 1, 2, 3];
        assert!(matches!(
            decode(&stream),
            Err(SubBlockError::OutOfBounds {
                opcode: Opcode::Burst,
                needed: 12,
                available: 11
            })
        ));
    }

    #[test]
    fn burst_length_not_multiple_of_four_is_rejected() {
        let stream = [0x00, 0x02, 0x00, 0x03, 0x00, 0x00, 0x10, 0x00, 1, 2, 3];
        assert_eq!(
            decode(&stream).unwrap_err(),
            SubBlockError::MisalignedBurst { len: 3 }
        );
    }

    #[test]
    fn delay_and_field_write_decode() {
        let delay = decode(&[0x00, 0x03, 0x00, 0x64]).unwrap();
        assert!(matches!(delay.command, Command::Delay { ms: 100 }));
        assert_eq!(delay.len, 4);

        let field = decode(&[0x02, 0x04, 0x00, 0x0F, 0x00, 0x00, 0x03, 0x05]).unwrap();
        assert_eq!(field.len, 8);
        assert!(matches!(
            field.command,
            Command::FieldWrite {
                mask: 0x0F,
                value: 0x05,
                ..
            }
        ));
    }

    #[test]
    fn truncated_header_and_unknown_opcode() {
        assert_eq!(
            decode(&[0x00]).unwrap_err(),
            SubBlockError::HeaderTruncated { available: 1 }
        );
        assert_eq!(
            decode(&[0x00, 0x09, 0x00, 0x00]).unwrap_err(),
            SubBlockError::UnknownOpcode(0x09)
        );
        assert!(decode(&[0x00, 0x03, 0x00]).is_err());
        assert!(decode(&[0x00, 0x04, 0, 0, 0, 0, 0]).is_err());
    }
}
