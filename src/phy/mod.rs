//! Physical-layer drivers for the SDIO pad group.
//!
//! Two bindings share one interface: [NativePhy] speaks the native SDIO
//! protocol (commands on the command line, one or four data lanes), [SpiPhy]
//! speaks the SPI rendition of the same protocol over the same pads. The host
//! controller is generic over [PhyDriver] and never needs to know which one it
//! is talking through.

use core::sync::atomic::Ordering;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use portable_atomic::{AtomicBool, AtomicU8};

use crate::SdioError;
use crate::bus::SdioBus;
use crate::frame::{CommandFrame, Response, ResponseSpec};

mod native;
mod spi;

pub use native::NativePhy;
pub use spi::SpiPhy;

/// Default cycle budget when waiting for a command response.
pub const DEFAULT_CMD_TIMEOUT: u32 = 1000;
/// Default cycle budget for the busy phase after a block write.
pub const DEFAULT_WRITE_TIMEOUT: u32 = 4000;
/// Hard real-time ceiling on the data start-bit wait when the caller does not
/// supply a cycle count.
pub const DATA_START_TIMEOUT: crate::bus::SimTime = crate::bus::SimTime::millis(1);

/// Data bus width of the native binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusWidth {
    One,
    Four,
}

impl BusWidth {
    #[inline]
    pub const fn lanes(self) -> u8 {
        match self {
            BusWidth::One => 1,
            BusWidth::Four => 4,
        }
    }
}

/// Outcome of a command/response exchange at the PHY level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CmdReply {
    /// The command expects no response at all.
    None,
    /// No start bit arrived within the cycle budget and the caller declared
    /// that possible.
    Timeout,
    Frame(Response),
}

/// How a data read ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataStatus {
    Okay,
    /// The transfer was unwound by an abort (sticky flag or start-bit
    /// timeout with `could_abort`); the byte count is a partial result.
    Aborted,
}

/// Decoded write-status token of a data block write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteResponse {
    Accepted,
    CrcRejected,
    Other(u8),
}

impl WriteResponse {
    /// Decode the three status bits of the CRC token (native) or the data
    /// response token's bits 3..1 (SPI).
    pub const fn from_status_bits(bits: u8) -> Self {
        match bits & 0x7 {
            0b010 => WriteResponse::Accepted,
            0b101 => WriteResponse::CrcRejected,
            other => WriteResponse::Other(other),
        }
    }
}

/// Guard holding the command-bus lease.
pub type CmdBusGuard<'a> = MutexGuard<'a, NoopRawMutex, ()>;

/// State shared by both PHY bindings: the command-bus lease, the bus width
/// and the sticky abort flags.
///
/// The lease serializes command/response exchanges in FIFO order of the
/// waiters. The abort flags are set by a *different* fibre than the one
/// running the data transfer; the only synchronization points are the
/// transfer's polling boundaries, so relaxed atomics suffice.
pub struct PhyCommon {
    cmd_lock: Mutex<NoopRawMutex, ()>,
    bus_width: AtomicU8,
    data_read_aborted: AtomicBool,
    data_write_aborted: AtomicBool,
}

impl PhyCommon {
    pub fn new() -> Self {
        PhyCommon {
            cmd_lock: Mutex::new(()),
            bus_width: AtomicU8::new(BusWidth::One.lanes()),
            data_read_aborted: AtomicBool::new(false),
            data_write_aborted: AtomicBool::new(false),
        }
    }

    pub async fn lock(&self) -> CmdBusGuard<'_> {
        self.cmd_lock.lock().await
    }

    #[inline]
    pub fn bus_width(&self) -> BusWidth {
        match self.bus_width.load(Ordering::Relaxed) {
            4 => BusWidth::Four,
            _ => BusWidth::One,
        }
    }

    #[inline]
    pub fn set_bus_width(&self, width: BusWidth) {
        self.bus_width.store(width.lanes(), Ordering::Relaxed);
    }

    #[inline]
    pub fn data_read_aborted(&self) -> bool {
        self.data_read_aborted.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_data_read_aborted(&self, aborted: bool) {
        self.data_read_aborted.store(aborted, Ordering::Relaxed);
    }

    #[inline]
    pub fn data_write_aborted(&self) -> bool {
        self.data_write_aborted.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_data_write_aborted(&self, aborted: bool) {
        self.data_write_aborted.store(aborted, Ordering::Relaxed);
    }
}

impl Default for PhyCommon {
    fn default() -> Self {
        Self::new()
    }
}

/// The interface the host controller drives. Implemented by [NativePhy] and
/// [SpiPhy].
#[allow(async_fn_in_trait)]
pub trait PhyDriver {
    type Bus: SdioBus;

    /// Whether this binding speaks the SPI rendition of the protocol.
    const SPI_MODE: bool;

    fn bus(&self) -> &Self::Bus;

    fn common(&self) -> &PhyCommon;

    /// Response layout expected for a command number under this binding.
    fn response_spec(cmd_num: u8) -> Option<ResponseSpec>;

    /// Compute and insert the CRC7, then shift the frame out.
    async fn send_cmd(&self, cmd: &mut CommandFrame);

    /// Sample the response to `cmd` from the bus.
    ///
    /// Waits up to `timeout` cycles for the start bit. On expiry the result is
    /// [CmdReply::Timeout] when `timeout_possible`, otherwise a
    /// [crate::ProtocolError::ResponseTimeout].
    async fn cmd_response(
        &self,
        cmd: &CommandFrame,
        timeout: u32,
        timeout_possible: bool,
    ) -> Result<CmdReply, SdioError>;

    /// Read `buf.len()` data bytes plus CRC off the bus.
    ///
    /// `timeout` is a cycle budget for the start-bit wait; `None` applies the
    /// [DATA_START_TIMEOUT] simulation-time ceiling instead. Returns the
    /// number of bytes captured and how the transfer ended.
    async fn data_read(
        &self,
        buf: &mut [u8],
        timeout: Option<u32>,
        could_abort: bool,
        final_block: bool,
    ) -> Result<(usize, DataStatus), SdioError>;

    /// Write `data` plus CRC onto the bus and collect the write-status token.
    async fn data_write(
        &self,
        data: &[u8],
        timeout: u32,
        could_abort: bool,
        final_block: bool,
    ) -> Result<WriteResponse, SdioError>;

    /// Assert or release the read-wait signal on data lane 2.
    fn read_wait(&self, asserting: bool);

    /// Suspend until the command bus is free, then take the lease. Waiters
    /// are served in FIFO order; dropping the guard releases the bus.
    async fn lock_cmd_bus(&self) -> CmdBusGuard<'_> {
        self.common().lock().await
    }

    fn bus_width(&self) -> BusWidth {
        self.common().bus_width()
    }

    fn set_bus_width(&self, width: BusWidth) {
        self.common().set_bus_width(width);
    }

    fn data_read_aborted(&self) -> bool {
        self.common().data_read_aborted()
    }

    fn set_data_read_aborted(&self, aborted: bool) {
        self.common().set_data_read_aborted(aborted);
    }

    fn data_write_aborted(&self) -> bool {
        self.common().data_write_aborted()
    }

    fn set_data_write_aborted(&self, aborted: bool) {
        self.common().set_data_write_aborted(aborted);
    }
}
