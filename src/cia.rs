//! Card common control registers (CCCR), function basic registers (FBR) and
//! the response/status flag bytes of the common I/O area.

use arbitrary_int::{u2, u3, u4};

/// CCCR register file base address.
pub const CCCR_BASE: u32 = 0x000;
/// Card information structure window, as commonly mapped by SDIO devices.
pub const CIS_BASE: u32 = 0x1000;

/// FBR base address for a function: `function << 8`.
#[inline]
pub const fn fbr_base(function: u3) -> u32 {
    (function.value() as u32) << 8
}

// CCCR byte addresses.
pub const CCCR_REVISION: u8 = 0;
pub const SD_SPEC_REVISION: u8 = 1;
pub const IO_ENABLE: u8 = 2;
pub const IO_READY: u8 = 3;
pub const INT_ENABLE: u8 = 4;
pub const INT_PENDING: u8 = 5;
pub const IO_ABORT: u8 = 6;
pub const BUS_INTERFACE_CONTROL: u8 = 7;
pub const CARD_CAPABILITY: u8 = 8;
pub const COMMON_CIS_PTR: u8 = 9;
pub const FN0_BLOCK_SIZE: u8 = 16;

// Byte offsets within a function's FBR.
pub const FBR_STD_FUNCTION_CODE: u8 = 0;
pub const FBR_POWER_SUPPORT: u8 = 2;
pub const FBR_CIS_PTR: u8 = 9;
pub const FBR_CSA_PTR: u8 = 12;
pub const FBR_BLOCK_SIZE: u8 = 16;

/// Card capability register (CCCR address 8).
#[bitbybit::bitfield(u8)]
#[derive(Debug, PartialEq, Eq)]
pub struct CardCapability {
    /// 4-bit support for low-speed cards.
    #[bit(7, r)]
    b4ls: bool,
    /// Low-speed card; a full-speed card leaves this clear.
    #[bit(6, r)]
    lsc: bool,
    /// Interrupts between the gaps of 4-bit block data.
    #[bit(4, r)]
    s4mi: bool,
    /// Bus control (suspend/resume).
    #[bit(3, r)]
    sbs: bool,
    /// Read wait.
    #[bit(2, r)]
    srw: bool,
    /// Multiple block transfer.
    #[bit(1, r)]
    smb: bool,
    /// Direct commands (CMD52) during data transfer.
    #[bit(0, r)]
    sdc: bool,
}

/// Encodings of the bus width field of the bus interface control register.
#[bitbybit::bitenum(u2)]
#[derive(Debug, PartialEq, Eq)]
pub enum BusWidthField {
    OneBit = 0b00,
    FourBits = 0b10,
}

/// Bus interface control register (CCCR address 7).
#[bitbybit::bitfield(u8, default = 0x0)]
#[derive(Debug, PartialEq, Eq)]
pub struct BusInterfaceControl {
    #[bit(7, rw)]
    cd_disable: bool,
    #[bits(0..=1, rw)]
    width: Option<BusWidthField>,
}

/// I/O abort register (CCCR address 6).
#[bitbybit::bitfield(u8, default = 0x0)]
#[derive(Debug, PartialEq, Eq)]
pub struct IoAbort {
    /// RES: resets all I/O functions.
    #[bit(3, rw)]
    reset: bool,
    /// AS: selects the function whose transfer is aborted.
    #[bits(0..=2, rw)]
    abort_select: u3,
}

/// Response flag byte of an R5 (CMD52/CMD53) response.
#[bitbybit::bitfield(u8)]
#[derive(Debug, PartialEq, Eq)]
pub struct R5Flags {
    #[bit(7, r)]
    com_crc_error: bool,
    #[bit(6, r)]
    illegal_command: bool,
    /// Informational: the I/O state the card reported while answering.
    #[bits(4..=5, r)]
    io_current_state: u2,
    #[bit(3, r)]
    error: bool,
    #[bit(1, r)]
    function_number: bool,
    #[bit(0, r)]
    out_of_range: bool,
}

/// The 32-bit card status carried in R1/R1b responses. Only the bits an SDIO
/// card can legally raise are modelled.
#[bitbybit::bitfield(u32)]
#[derive(Debug, PartialEq, Eq)]
pub struct CardStatus {
    #[bit(31, r)]
    out_of_range: bool,
    #[bit(23, r)]
    com_crc_error: bool,
    #[bit(22, r)]
    illegal_command: bool,
    #[bit(19, r)]
    error: bool,
    /// Must read 0xf (the I/O-only state) in every R1 an SDIO card sends.
    #[bits(9..=12, r)]
    current_state: u4,
}

/// Pretty-printing metadata for one CIA register.
#[derive(Debug, Clone, Copy)]
pub struct RegDesc {
    pub name: &'static str,
    pub addr: u8,
    /// Print the value in binary rather than hex.
    pub binary: bool,
}

const fn reg(name: &'static str, addr: u8, binary: bool) -> RegDesc {
    RegDesc { name, addr, binary }
}

/// CCCR register names for register dumps. Kept out of the hot path.
pub static CCCR_REGS: &[RegDesc] = &[
    reg("CCCR/SDIO revision", 0, false),
    reg("SD spec revision", 1, false),
    reg("I/O enables", 2, true),
    reg("I/O ready", 3, true),
    reg("Int enable", 4, true),
    reg("Int pending", 5, true),
    reg("I/O abort", 6, true),
    reg("Bus interface control", 7, true),
    reg("Card capability", 8, true),
    reg("Common CIS pointer byte 0", 9, false),
    reg("Common CIS pointer byte 1", 10, false),
    reg("Common CIS pointer byte 2", 11, false),
    reg("Bus suspend", 12, true),
    reg("Function select", 13, false),
    reg("Exec flags", 14, true),
    reg("Ready flags", 15, true),
    reg("FN0 block size byte 0", 16, false),
    reg("FN0 block size byte 1", 17, false),
    reg("Power control", 18, true),
    reg("Bus speed select", 19, true),
    reg("UHS-I support", 20, false),
    reg("Driver strength", 21, true),
    reg("Interrupt extension", 22, true),
];

/// FBR register names for register dumps.
pub static FBR_REGS: &[RegDesc] = &[
    reg("Standard function code", 0, false),
    reg("Standard function code extended", 1, false),
    reg("Power state support", 2, true),
    reg("Function CIS pointer byte 0", 9, false),
    reg("Function CIS pointer byte 1", 10, false),
    reg("Function CIS pointer byte 2", 11, false),
    reg("Function CSA pointer byte 0", 12, false),
    reg("Function CSA pointer byte 1", 13, false),
    reg("Function CSA pointer byte 2", 14, false),
    reg("Function I/O block size byte 0", 16, false),
    reg("Function I/O block size byte 1", 17, false),
];
