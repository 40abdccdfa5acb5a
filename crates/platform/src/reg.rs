//! Book / page / register addressing.
//!
//! TAS2xxx, TAS58xx and PCM9211 parts expose a three-level register space:
//! 256 books × 256 pages × 128 registers. The driver carries addresses as a
//! single flat integer so register tables and firmware programs can be keyed
//! by one value.
//!
//! ```text
//! flat = book * 256 * 128 + page * 128 + reg
//!        └─ bits 22..15 ─┘  └ 14..7 ┘    └ 6..0 ┘
//! ```
//!
//! Within a book, [`RegAddr::page_reg`] is the 15-bit offset the bus layer
//! uses; the book itself is switched separately through [`BOOK_SELECT`].

use core::fmt;

/// Registers per page.
pub const PAGE_SIZE: u16 = 128;
/// Pages per book.
pub const PAGES_PER_BOOK: u32 = 256;

/// Flat register address `book * 32768 + page * 128 + reg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegAddr(u32);

/// Page-select register: in-page offset 0 of every page.
pub const PAGE_SELECT: RegAddr = RegAddr::new(0, 0, 0);
/// Book-select register: book 0, page 0, register 127.
pub const BOOK_SELECT: RegAddr = RegAddr::new(0, 0, 127);
/// Software reset register of the TAS2xxx / TAS58xx families.
pub const SW_RESET: RegAddr = RegAddr::new(0, 0, 1);

impl RegAddr {
    /// Largest encodable flat address (book 255, page 255, reg 127).
    pub const MAX: u32 = 255 * PAGES_PER_BOOK * 128 + 255 * 128 + 127;

    /// Build an address from its book, page and register parts.
    ///
    /// `reg` is masked to its 7 significant bits.
    #[must_use]
    #[allow(clippy::arithmetic_side_effects)] // max value 0x7F_FFFF fits in u32
    pub const fn new(book: u8, page: u8, reg: u8) -> Self {
        Self(
            (book as u32) * PAGES_PER_BOOK * (PAGE_SIZE as u32)
                + (page as u32) * (PAGE_SIZE as u32)
                + (reg as u32 & 0x7F),
        )
    }

    /// Wrap a flat address, rejecting values above [`RegAddr::MAX`].
    #[must_use]
    pub const fn from_flat(flat: u32) -> Option<Self> {
        if flat > Self::MAX {
            None
        } else {
            Some(Self(flat))
        }
    }

    /// Flat address.
    #[must_use]
    pub const fn flat(self) -> u32 {
        self.0
    }

    /// Book number.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // from_flat/new bound the value to 23 bits
    pub const fn book(self) -> u8 {
        (self.0 >> 15) as u8
    }

    /// Page number within the book.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn page(self) -> u8 {
        (self.0 >> 7) as u8
    }

    /// Register offset within the page (0..=127).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn reg(self) -> u8 {
        (self.0 & 0x7F) as u8
    }

    /// In-book offset `page * 128 + reg`, as seen by the bus layer.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn page_reg(self) -> u16 {
        (self.0 & 0x7FFF) as u16
    }
}

impl fmt::Display for RegAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "B0x{:02x}P0x{:02x}R0x{:02x}",
            self.book(),
            self.page(),
            self.reg()
        )
    }
}

/// Split an in-book offset into `(page, reg)`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn split_page_reg(offset: u16) -> (u8, u8) {
    (((offset >> 7) & 0xFF) as u8, (offset & 0x7F) as u8)
}
