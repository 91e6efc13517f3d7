//! Command and response frames.
//!
//! The SD specification numbers frame bits so that the first bit on the wire
//! carries the highest index: a 48-bit command transmits bit 47 first. Both
//! frame types here expose MSB-labelled slice accessors over a plain backing
//! integer to keep that numbering explicit.

use log::warn;

/// Memory-card commands the SDIO subset does not support. Frames for them are
/// still produced, with a warning, so a harness can probe illegal-command
/// handling in a DUT.
pub const UNSUPPORTED_ON_SDIO: &[u8] = &[2, 4, 9, 10, 12, 13, 16, 17, 18, 24];

/// A 48-bit command frame under construction.
///
/// [CommandFrame::new] fills in the start, direction and stop bits and the
/// command number; callers set the argument fields; the PHY computes and
/// inserts the CRC7 immediately before transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandFrame(u64);

impl CommandFrame {
    pub fn new(cmd_num: u8) -> Self {
        debug_assert!(cmd_num < 64);
        if UNSUPPORTED_ON_SDIO.contains(&cmd_num) {
            warn!("CMD{} is not supported on SDIO, sending anyway", cmd_num);
        }
        let mut frame = CommandFrame(0);
        frame.set_bit(47, false); // start
        frame.set_bit(46, true); // direction, host to device
        frame.set_field(45, 40, cmd_num as u64);
        frame.set_bit(0, true); // stop
        frame
    }

    /// The full 48-bit frame, bit 47 in the integer's bit 47.
    #[inline]
    pub const fn raw(&self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn bit(&self, index: u8) -> bool {
        debug_assert!(index < 48);
        self.0 >> index & 1 != 0
    }

    #[inline]
    pub fn set_bit(&mut self, index: u8, value: bool) {
        debug_assert!(index < 48);
        self.0 = self.0 & !(1 << index) | (value as u64) << index;
    }

    /// Read bits `hi..=lo` (inclusive, `hi >= lo`) as a right-aligned value.
    #[inline]
    pub const fn field(&self, hi: u8, lo: u8) -> u64 {
        debug_assert!(hi >= lo && hi < 48);
        self.0 >> lo & (u64::MAX >> (63 - (hi - lo)))
    }

    /// Write bits `hi..=lo` from the low bits of `value`.
    #[inline]
    pub fn set_field(&mut self, hi: u8, lo: u8, value: u64) {
        debug_assert!(hi >= lo && hi < 48);
        let mask = u64::MAX >> (63 - (hi - lo));
        debug_assert!(value <= mask);
        self.0 = self.0 & !(mask << lo) | (value & mask) << lo;
    }

    #[inline]
    pub const fn cmd_num(&self) -> u8 {
        self.field(45, 40) as u8
    }
}

/// A received response of up to 136 bits, indexed the same way as
/// [CommandFrame]: bit `len - 1` arrived first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Response {
    bits: u128,
    len: u16,
}

impl Response {
    pub const fn from_bits(bits: u128, len: u16) -> Self {
        debug_assert!(len <= 136);
        Response { bits, len }
    }

    #[inline]
    pub const fn len_bits(&self) -> u16 {
        self.len
    }

    #[inline]
    pub const fn raw(&self) -> u128 {
        self.bits
    }

    #[inline]
    pub const fn bit(&self, index: u16) -> bool {
        debug_assert!(index < self.len);
        self.bits >> index & 1 != 0
    }

    /// Read bits `hi..=lo` (inclusive, at most 64 wide) as a right-aligned
    /// value.
    #[inline]
    pub const fn field(&self, hi: u16, lo: u16) -> u64 {
        debug_assert!(hi >= lo && hi < self.len && hi - lo < 64);
        (self.bits >> lo) as u64 & (u64::MAX >> (63 - (hi - lo)))
    }
}

/// Response frame layouts of the SD/SDIO specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResponseKind {
    R1,
    /// R1 with a possible busy indication on the data line.
    R1b,
    /// CID/CSD register response. Not used by SDIO, reserved for completeness.
    R2,
    R4,
    R5,
    R6,
    R7,
}

/// Expected response layout and bit length for one command number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResponseSpec {
    pub kind: ResponseKind,
    pub bits: u16,
}

impl ResponseSpec {
    const fn new(kind: ResponseKind, bits: u16) -> Self {
        ResponseSpec { kind, bits }
    }
}

/// Native-mode response lookup. `None` means no response is expected.
pub const fn response_spec(cmd_num: u8) -> Option<ResponseSpec> {
    use ResponseKind::*;
    match cmd_num {
        0 | 15 => None,
        11 | 13 | 16 | 17 | 18 | 19 | 23 | 55 | 56 => Some(ResponseSpec::new(R1, 48)),
        7 | 12 | 20 => Some(ResponseSpec::new(R1b, 48)),
        2 | 9 | 10 => Some(ResponseSpec::new(R2, 136)),
        4 | 5 => Some(ResponseSpec::new(R4, 48)),
        52 | 53 => Some(ResponseSpec::new(R5, 48)),
        3 => Some(ResponseSpec::new(R6, 48)),
        8 => Some(ResponseSpec::new(R7, 48)),
        _ => None,
    }
}

/// SPI-mode response lookup. Every command answers with at least an R1 byte.
pub const fn spi_response_spec(cmd_num: u8) -> Option<ResponseSpec> {
    use ResponseKind::*;
    match cmd_num {
        5 => Some(ResponseSpec::new(R4, 40)),
        8 => Some(ResponseSpec::new(R7, 40)),
        52 | 53 => Some(ResponseSpec::new(R5, 16)),
        _ => Some(ResponseSpec::new(R1, 8)),
    }
}
