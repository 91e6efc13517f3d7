//! Host-side bus functional model of the SDIO 2.0 protocol.
//!
//! The crate drives a cycle-accurate pad-level interface (clock, command line,
//! four data lanes with per-lane direction control) and layers the SDIO
//! command/response protocol, the card initialization sequence, and single-
//! and multi-block data transfers on top of it. A parallel SPI-mode binding
//! over the same pins is provided as well.
//!
//! The simulator harness supplies the clock and the pad wiring by implementing
//! [bus::SdioBus]; everything above that — bit-serial PHY drivers, the host
//! command state machine, and the initialization/CIS sequencer — lives here.
//! Operations are `async` and suspend at named clock edges, so a
//! single-threaded cooperative executor driven by the simulator is all that is
//! required to run them.
#![cfg_attr(not(test), no_std)]

pub mod bus;
pub mod cia;
pub mod crc;
pub mod frame;
pub mod host;
pub mod phy;

pub use bus::SdioBus;
pub use host::{ExtendedTransfer, InitConfig, SdioHost};
pub use phy::{BusWidth, NativePhy, PhyDriver, SpiPhy};

/// Wire framing was violated: the response cannot be trusted at all.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    #[error("timeout waiting for response to CMD{cmd}")]
    ResponseTimeout { cmd: u8 },
    #[error("CMD{cmd} response CRC7 was {received:#04x}, computed {computed:#04x}")]
    ResponseCrc {
        cmd: u8,
        computed: u8,
        received: u8,
    },
    #[error("response to CMD{sent} echoed command number {echoed}")]
    CommandNumberMismatch { sent: u8, echoed: u8 },
    #[error("R4 reserved field [45:40] was {got:#04x} instead of all-ones")]
    ReservedFieldNotOnes { got: u8 },
    #[error("expected a response frame for CMD{cmd} but none was captured")]
    MissingResponse { cmd: u8 },
}

/// The wire was valid but the device reported an error condition.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResponseError {
    #[error("card status OUT_OF_RANGE set in response to CMD{cmd}")]
    OutOfRange { cmd: u8 },
    #[error("card status COM_CRC_ERROR set in response to CMD{cmd}")]
    ComCrc { cmd: u8 },
    #[error("card status ILLEGAL_COMMAND set in response to CMD{cmd}")]
    IllegalCommand { cmd: u8 },
    #[error("card status ERROR set in response to CMD{cmd}")]
    GeneralError { cmd: u8 },
    #[error("card status CURRENT_STATE was {state:#x}, expected 0xf for an SDIO card")]
    BadCurrentState { state: u8 },
    #[error("IO_RW response flags: COM_CRC_ERROR")]
    R5ComCrc,
    #[error("IO_RW response flags: ILLEGAL_COMMAND")]
    R5IllegalCommand,
    #[error("IO_RW response flags: ERROR")]
    R5Error,
    #[error("IO_RW response flags: FUNCTION_NUMBER (invalid function {function})")]
    R5FunctionNumber { function: u8 },
    #[error("IO_RW response flags: OUT_OF_RANGE")]
    R5OutOfRange,
    #[error("SPI R1 for CMD{cmd} indicated a parameter error")]
    SpiParameter { cmd: u8 },
    #[error("SPI R1 for CMD{cmd} indicated a function number error")]
    SpiFunctionNumber { cmd: u8 },
    #[error("SPI R1 for CMD{cmd} indicated a command CRC error")]
    SpiCrc { cmd: u8 },
    #[error("SPI R1 for CMD{cmd} indicated an illegal instruction")]
    SpiIllegalInstruction { cmd: u8 },
    #[error("bus interface control readback was {read:#04x} after writing {wrote:#04x}")]
    BusWidthRejected { wrote: u8, read: u8 },
}

/// A data-phase failure, including CIS decoding problems.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataError {
    #[error("timeout waiting for the start bit of a data transfer")]
    StartBitTimeout,
    #[error("data CRC16 on lane {lane} was {received:#06x}, computed {computed:#06x}")]
    ReadCrc {
        lane: u8,
        computed: u16,
        received: u16,
    },
    #[error("write data response token was malformed ({token:#04x})")]
    WriteTokenMalformed { token: u8 },
    #[error("block transfer requested without a block size")]
    MissingBlockSize,
    #[error("CIS tuple link value was zero")]
    TupleLinkZero,
    #[error("CIS tuple of {len} bytes exceeds the run-on guard")]
    TupleTooLong { len: usize },
    #[error("no FUNCE tuple with a block size for function {function}")]
    MaxBlockSizeNotFound { function: u8 },
    #[error("block size {requested} exceeds the maximum {max} of function {function}")]
    BlockSizeExceedsMax {
        function: u8,
        requested: u16,
        max: u16,
    },
    #[error("function {function} was not discovered during initialization")]
    UnknownFunction { function: u8 },
}

/// Top-level error type surfaced to the harness.
///
/// The three categories mirror how a failure should be judged: a
/// [ProtocolError] means the host/DUT framing itself broke, a [ResponseError]
/// means the device answered with an error indication, and a [DataError] means
/// a data phase or CIS structure was bad. Command timeouts that the caller
/// declared possible are *returned* (as `None`/[phy::CmdReply::Timeout]), not
/// raised.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SdioError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Response(#[from] ResponseError),
    #[error(transparent)]
    Data(#[from] DataError),
}
