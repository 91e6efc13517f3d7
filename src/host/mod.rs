//! Command-level SDIO host controller.
//!
//! Each command method acquires the command-bus lease, builds a frame, hands
//! it to the PHY, validates the response and returns a decoded value. Data
//! commands (CMD53) interleave the PHY's data phases with the sequencing
//! rules of the SDIO specification. The controller also carries the
//! initialization sequencer ([SdioHost::sdio_init]) and the discovered card
//! state it produces.

use core::cell::RefCell;

use arbitrary_int::{u3, u17};
use log::{debug, info, warn};
use rand_core::RngCore;

use crate::bus::SdioBus;
use crate::cia::{self, BusInterfaceControl, BusWidthField, CardCapability, IoAbort, R5Flags};
use crate::frame::{CommandFrame, Response, ResponseKind};
use crate::phy::{
    CmdReply, DEFAULT_CMD_TIMEOUT, DEFAULT_WRITE_TIMEOUT, DataStatus, PhyDriver, WriteResponse,
};
use crate::{BusWidth, DataError, ProtocolError, ResponseError, SdioError};

mod cis;
mod init;

pub use cis::{CisTuples, TUPLE_END, TUPLE_FUNCE};
pub use init::InitConfig;

/// Size of the cached CIS window fetched during initialization.
pub const CIS_WINDOW: usize = 256;

/// Byte count implied by a CMD53 byte-mode transfer with `count == 0`.
const BYTE_MODE_ZERO_COUNT: usize = 512;

//==================================================================================================
// Transfer configuration
//==================================================================================================

/// Parameters of a CMD53 (IO_RW_EXTENDED) transfer.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExtendedTransfer {
    pub function: u3,
    /// Transfer whole blocks instead of bytes. Requires `blocksize` and the
    /// SMB card capability.
    pub block_mode: bool,
    /// Access an incrementing address instead of a fixed one.
    pub op_incr: bool,
    /// 17-bit register address.
    pub addr: u17,
    /// Wire count field. Blocks when `block_mode`, bytes otherwise; zero
    /// means 512 bytes in byte mode and buffer-bounded in block mode.
    pub count: u16,
    pub blocksize: Option<u16>,
    /// Assert read-wait on data lane 2 for this many falling edges between
    /// read blocks.
    pub read_wait: Option<u32>,
    /// Whether a start-bit timeout or sticky abort flag is a legitimate end
    /// of the transfer rather than an error.
    pub could_abort: bool,
}

impl ExtendedTransfer {
    /// Byte-mode transfer to an incrementing address.
    pub fn bytes(function: u3, addr: u17, count: u16) -> Self {
        debug_assert!(count < 512);
        ExtendedTransfer {
            function,
            block_mode: false,
            op_incr: true,
            addr,
            count,
            blocksize: None,
            read_wait: None,
            could_abort: true,
        }
    }

    /// Block-mode transfer of `count` blocks to an incrementing address.
    pub fn blocks(function: u3, addr: u17, count: u16, blocksize: u16) -> Self {
        debug_assert!(count < 512);
        ExtendedTransfer {
            function,
            block_mode: true,
            op_incr: true,
            addr,
            count,
            blocksize: Some(blocksize),
            read_wait: None,
            could_abort: true,
        }
    }

    /// Address the same register for every unit instead of incrementing.
    pub fn fixed_address(mut self) -> Self {
        self.op_incr = false;
        self
    }

    pub fn read_wait(mut self, edges: u32) -> Self {
        self.read_wait = Some(edges);
        self
    }

    pub fn no_abort(mut self) -> Self {
        self.could_abort = false;
        self
    }
}

//==================================================================================================
// Frame builders
//==================================================================================================

fn io_rw_direct_frame(rw: bool, function: u3, raw: bool, addr: u17, data: Option<u8>) -> CommandFrame {
    debug_assert!(!rw || data.is_some(), "a direct write needs a data byte");
    let mut cmd = CommandFrame::new(52);
    cmd.set_bit(39, rw);
    cmd.set_field(38, 36, function.value() as u64);
    cmd.set_bit(35, raw);
    cmd.set_field(33, 17, addr.value() as u64);
    if let Some(data) = data {
        cmd.set_field(15, 8, data as u64);
    }
    cmd
}

fn io_rw_extended_frame(rw: bool, xfer: &ExtendedTransfer) -> CommandFrame {
    let mut cmd = CommandFrame::new(53);
    cmd.set_bit(39, rw);
    cmd.set_field(38, 36, xfer.function.value() as u64);
    cmd.set_bit(35, xfer.block_mode);
    cmd.set_bit(34, xfer.op_incr);
    cmd.set_field(33, 17, xfer.addr.value() as u64);
    cmd.set_field(16, 8, (xfer.count & 0x1ff) as u64);
    cmd
}

//==================================================================================================
// Host controller
//==================================================================================================

/// SDIO host model according to the simplified SD/SDIO 2.0 specifications.
///
/// Generic over the PHY binding (native or SPI) and the random source used
/// for echo patterns and inter-command gaps. Command methods take `&self` so
/// that a data transfer and an abort command can run as two concurrent
/// fibres against the same host.
pub struct SdioHost<P: PhyDriver, R: RngCore> {
    phy: P,
    rng: RefCell<R>,
    pub(crate) rca: Option<u16>,
    pub(crate) caps: CardCapability,
    pub(crate) fn_cis_addrs: [u32; 8],
    pub(crate) fn_max_blocksizes: [u16; 8],
    pub(crate) fn_count: u8,
    pub(crate) cis_data: heapless::Vec<u8, CIS_WINDOW>,
}

impl<P: PhyDriver, R: RngCore> SdioHost<P, R> {
    pub fn new(phy: P, rng: R) -> Self {
        let mut host = SdioHost {
            phy,
            rng: RefCell::new(rng),
            rca: None,
            caps: CardCapability::new_with_raw_value(0),
            fn_cis_addrs: [0; 8],
            fn_max_blocksizes: [0; 8],
            fn_count: 1,
            cis_data: heapless::Vec::new(),
        };
        host.init_state();
        host
    }

    /// Forget everything discovered about the card. Called on construction
    /// and by [SdioHost::soft_reset].
    pub fn init_state(&mut self) {
        self.rca = None;
        self.caps = CardCapability::new_with_raw_value(0);
        self.fn_cis_addrs = [0; 8];
        self.fn_max_blocksizes = [0; 8];
        self.fn_count = 1;
        self.cis_data.clear();
    }

    pub fn phy(&self) -> &P {
        &self.phy
    }

    /// Relative card address assigned via CMD3, once initialized.
    pub fn rca(&self) -> Option<u16> {
        self.rca
    }

    /// Card capability register as read during initialization.
    pub fn capability(&self) -> CardCapability {
        self.caps
    }

    /// Number of I/O functions discovered (function 0 included).
    pub fn fn_count(&self) -> u8 {
        self.fn_count
    }

    pub fn fn_cis_addr(&self, function: u3) -> u32 {
        self.fn_cis_addrs[function.value() as usize]
    }

    /// Maximum block size the function's FUNCE tuple advertises.
    pub fn fn_max_blocksize(&self, function: u3) -> u16 {
        self.fn_max_blocksizes[function.value() as usize]
    }

    /// The CIS window cached during initialization.
    pub fn cis_data(&self) -> &[u8] {
        &self.cis_data
    }

    pub(crate) fn random_range(&self, lo: u32, hi: u32) -> u32 {
        lo + self.rng.borrow_mut().next_u32() % (hi - lo + 1)
    }

    /// Random 8..16 rising-edge gap between initialization commands.
    pub(crate) async fn random_gap(&self) {
        for _ in 0..self.random_range(8, 16) {
            self.phy.bus().rising_edge().await;
        }
    }

    /// Quiet period before surfacing a failure, so in-flight bus activity
    /// settles before the simulator sees it.
    async fn settle(&self) {
        for _ in 0..4 {
            self.phy.bus().falling_edge().await;
        }
    }

    fn expect_frame(reply: CmdReply, cmd_num: u8) -> Result<Response, SdioError> {
        match reply {
            CmdReply::Frame(response) => Ok(response),
            _ => Err(ProtocolError::MissingResponse { cmd: cmd_num }.into()),
        }
    }

    /// One command/response exchange under the command-bus lease.
    async fn transact(
        &self,
        cmd: &mut CommandFrame,
        timeout_possible: bool,
    ) -> Result<CmdReply, SdioError> {
        let _lease = self.phy.lock_cmd_bus().await;
        self.phy.send_cmd(cmd).await;
        self.get_cmd_response(cmd, DEFAULT_CMD_TIMEOUT, timeout_possible)
            .await
    }

    /// Await the response to `cmd` and run the standard checks on it.
    async fn get_cmd_response(
        &self,
        cmd: &CommandFrame,
        timeout: u32,
        timeout_possible: bool,
    ) -> Result<CmdReply, SdioError> {
        let cmd_num = cmd.cmd_num();
        let reply = self.phy.cmd_response(cmd, timeout, timeout_possible).await?;
        let CmdReply::Frame(response) = reply else {
            return Ok(reply);
        };
        let Some(spec) = P::response_spec(cmd_num) else {
            return Ok(reply);
        };

        if P::SPI_MODE {
            // SPI responses are unprotected by CRC; only the R1 status bits
            // can be checked. Locate the R1 byte within the frame.
            let r1 = match spec.kind {
                ResponseKind::R4 | ResponseKind::R7 => 32,
                ResponseKind::R5 => 8,
                _ => 0,
            };
            if response.bit(r1 + 7) {
                self.settle().await;
                return Err(ResponseError::SpiParameter { cmd: cmd_num }.into());
            }
            if response.bit(r1 + 4) {
                self.settle().await;
                return Err(ResponseError::SpiFunctionNumber { cmd: cmd_num }.into());
            }
            if response.bit(r1 + 3) {
                self.settle().await;
                return Err(ResponseError::SpiCrc { cmd: cmd_num }.into());
            }
            if response.bit(r1 + 2) {
                self.settle().await;
                return Err(ResponseError::SpiIllegalInstruction { cmd: cmd_num }.into());
            }
            return Ok(reply);
        }

        let computed = crate::crc::crc7(response.field(47, 8));
        let received = response.field(7, 1) as u8;
        if computed != received {
            self.settle().await;
            return Err(ProtocolError::ResponseCrc {
                cmd: cmd_num,
                computed,
                received,
            }
            .into());
        }

        let echoed = response.field(45, 40) as u8;
        if spec.kind == ResponseKind::R4 {
            if echoed != 0x3f {
                self.settle().await;
                return Err(ProtocolError::ReservedFieldNotOnes { got: echoed }.into());
            }
        } else if echoed != cmd_num {
            self.settle().await;
            return Err(ProtocolError::CommandNumberMismatch {
                sent: cmd_num,
                echoed,
            }
            .into());
        }

        if matches!(spec.kind, ResponseKind::R1 | ResponseKind::R1b) {
            // Only the bits an SDIO card can raise matter here; see the card
            // status definition in [cia].
            let status = cia::CardStatus::new_with_raw_value(response.field(39, 8) as u32);
            debug!("R1 card status: {:#010x}", status.raw_value());
            if status.out_of_range() {
                self.settle().await;
                return Err(ResponseError::OutOfRange { cmd: cmd_num }.into());
            }
            if status.com_crc_error() {
                self.settle().await;
                return Err(ResponseError::ComCrc { cmd: cmd_num }.into());
            }
            if status.illegal_command() {
                self.settle().await;
                return Err(ResponseError::IllegalCommand { cmd: cmd_num }.into());
            }
            if status.error() {
                self.settle().await;
                return Err(ResponseError::GeneralError { cmd: cmd_num }.into());
            }
            if status.current_state().value() != 0xf {
                self.settle().await;
                return Err(ResponseError::BadCurrentState {
                    state: status.current_state().value(),
                }
                .into());
            }
        }
        Ok(reply)
    }

    async fn check_r5_flags(&self, flags: R5Flags, function: u3) -> Result<(), SdioError> {
        if flags.com_crc_error() {
            self.settle().await;
            return Err(ResponseError::R5ComCrc.into());
        }
        if flags.illegal_command() {
            self.settle().await;
            return Err(ResponseError::R5IllegalCommand.into());
        }
        if flags.error() {
            self.settle().await;
            return Err(ResponseError::R5Error.into());
        }
        if flags.function_number() {
            self.settle().await;
            return Err(ResponseError::R5FunctionNumber {
                function: function.value(),
            }
            .into());
        }
        if flags.out_of_range() {
            self.settle().await;
            return Err(ResponseError::R5OutOfRange.into());
        }
        debug!("IO_CURRENT_STATE: {}", flags.io_current_state());
        Ok(())
    }

    //==============================================================================================
    // Basic commands
    //==============================================================================================

    /// CMD0, GO_IDLE_STATE. An I/O-only card is not reset by it; in SD mode
    /// it is only used to signal entry into SPI mode.
    pub async fn cmd_go_idle(&self) -> Result<(), SdioError> {
        let mut cmd = CommandFrame::new(0);
        if P::SPI_MODE {
            self.transact(&mut cmd, false).await?;
        } else {
            // No response in native mode.
            let _lease = self.phy.lock_cmd_bus().await;
            self.phy.send_cmd(&mut cmd).await;
        }
        Ok(())
    }

    /// CMD3, SEND_RELATIVE_ADDR: ask the card to publish a new RCA.
    pub async fn cmd_send_relative_addr(&self) -> Result<Response, SdioError> {
        let mut cmd = CommandFrame::new(3);
        let reply = self.transact(&mut cmd, false).await?;
        Self::expect_frame(reply, 3)
    }

    /// CMD8, SEND_IF_COND, with the 2.7–3.6 V VHS nibble and a random echo
    /// pattern in the low byte.
    pub async fn cmd_send_if_cond(&self) -> Result<Response, SdioError> {
        let mut cmd = CommandFrame::new(8);
        cmd.set_bit(16, true);
        cmd.set_field(15, 8, (self.rng.borrow_mut().next_u32() & 0xff) as u64);
        let reply = self.transact(&mut cmd, false).await?;
        Self::expect_frame(reply, 8)
    }

    /// CMD5, SEND_OP_COND: inquire about the I/O card's voltage range. The
    /// OCR request is hardcoded to the ~3.3 V window.
    pub async fn cmd_send_op_cond(&self) -> Result<Response, SdioError> {
        let mut cmd = CommandFrame::new(5);
        cmd.set_field(8 + 22, 8 + 18, 0b11111);
        let reply = self.transact(&mut cmd, false).await?;
        Self::expect_frame(reply, 5)
    }

    /// CMD7, SELECT_CARD: move the card at `rca` into the transfer state.
    pub async fn cmd_select_card(&self, rca: u16) -> Result<Response, SdioError> {
        let mut cmd = CommandFrame::new(7);
        cmd.set_field(39, 24, rca as u64);
        let reply = self.transact(&mut cmd, false).await?;
        Self::expect_frame(reply, 7)
    }

    //==============================================================================================
    // CMD52 / CMD53
    //==============================================================================================

    /// CMD52, IO_RW_DIRECT: single-byte register access within the 17-bit
    /// address space of a function.
    ///
    /// With `timeout_possible` a missing response yields `Ok(None)` instead
    /// of an error, which the initializer uses to probe a device that may
    /// not answer yet. Otherwise the result is the data byte of the R5
    /// response (the written value's readback for `raw` writes).
    pub async fn cmd_io_rw_direct(
        &self,
        rw: bool,
        function: u3,
        raw: bool,
        addr: u17,
        data: Option<u8>,
        timeout_possible: bool,
    ) -> Result<Option<u8>, SdioError> {
        let mut cmd = io_rw_direct_frame(rw, function, raw, addr, data);
        let reply = self.transact(&mut cmd, timeout_possible).await?;
        if reply == CmdReply::Timeout {
            return Ok(None);
        }
        let response = Self::expect_frame(reply, 52)?;

        if P::SPI_MODE {
            return Ok(Some(response.field(7, 0) as u8));
        }
        let flags = R5Flags::new_with_raw_value(response.field(23, 16) as u8);
        self.check_r5_flags(flags, function).await?;
        Ok(Some(response.field(15, 8) as u8))
    }

    /// CMD53 read, IO_RW_EXTENDED: fill `buf` from the device.
    ///
    /// Byte mode reads `count` bytes (512 for `count == 0`); block mode reads
    /// `count` blocks of `blocksize` (buffer-bounded for `count == 0`).
    /// Returns the number of bytes captured, which is short of the request
    /// exactly when the transfer was aborted; the sticky read-abort flag is
    /// cleared before returning.
    pub async fn io_read_extended(
        &self,
        xfer: &ExtendedTransfer,
        buf: &mut [u8],
    ) -> Result<usize, SdioError> {
        let mut cmd = io_rw_extended_frame(false, xfer);
        let reply = self.transact(&mut cmd, false).await?;
        let response = Self::expect_frame(reply, 53)?;
        if !P::SPI_MODE {
            let flags = R5Flags::new_with_raw_value(response.field(23, 16) as u8);
            self.check_r5_flags(flags, xfer.function).await?;
        }

        let (blocks, chunk) = if xfer.block_mode {
            let blocksize = xfer.blocksize.ok_or(DataError::MissingBlockSize)? as usize;
            let blocks = match xfer.count {
                0 => buf.len() / blocksize,
                count => count as usize,
            };
            (blocks, blocksize)
        } else {
            let bytes = match xfer.count {
                0 => BYTE_MODE_ZERO_COUNT,
                count => count as usize,
            };
            (1, bytes)
        };
        debug_assert!(buf.len() >= blocks * chunk);

        let mut total = 0usize;
        for block in 0..blocks {
            if xfer.block_mode {
                debug!("reading block {}", block);
            }
            let (read, status) = self
                .phy
                .data_read(
                    &mut buf[total..total + chunk],
                    None,
                    xfer.could_abort,
                    block + 1 == blocks,
                )
                .await?;
            total += read;
            if status == DataStatus::Aborted || self.phy.data_read_aborted() {
                self.phy.set_data_read_aborted(false);
                info!("block read aborted after {} bytes", total);
                return Ok(total);
            }
            if xfer.block_mode {
                // Give the device a moment before polling for the next block.
                if P::SPI_MODE {
                    for _ in 0..8 {
                        self.phy.bus().rising_edge().await;
                    }
                } else {
                    self.phy.bus().falling_edge().await;
                    self.phy.bus().falling_edge().await;
                }
            }
            if let Some(edges) = xfer.read_wait {
                self.phy.read_wait(true);
                for _ in 0..edges {
                    self.phy.bus().falling_edge().await;
                }
                self.phy.read_wait(false);
            }
        }
        Ok(total)
    }

    /// CMD53 write, IO_RW_EXTENDED: send `data` to the device.
    ///
    /// Block mode cuts `data` into `blocksize` chunks and inserts a random
    /// 1..4 bytes' worth of clocks before each block. Returns the number of
    /// bytes written; a write observed as aborted at a block boundary stops
    /// early, clearing the sticky flag.
    pub async fn io_write_extended(
        &self,
        xfer: &ExtendedTransfer,
        data: &[u8],
    ) -> Result<usize, SdioError> {
        let mut cmd = io_rw_extended_frame(true, xfer);
        let reply = self.transact(&mut cmd, false).await?;
        let response = Self::expect_frame(reply, 53)?;
        if !P::SPI_MODE {
            let flags = R5Flags::new_with_raw_value(response.field(23, 16) as u8);
            self.check_r5_flags(flags, xfer.function).await?;
        }

        let (blocks, chunk) = if xfer.block_mode {
            let blocksize = xfer.blocksize.ok_or(DataError::MissingBlockSize)? as usize;
            let blocks = match xfer.count {
                0 => data.len() / blocksize,
                count => count as usize,
            };
            (blocks, blocksize)
        } else {
            (1, data.len())
        };
        debug_assert!(data.len() >= blocks * chunk);

        let mut written = 0usize;
        for block in 0..blocks {
            for _ in 0..self.random_range(1, 4) * 8 {
                self.phy.bus().rising_edge().await;
            }
            if xfer.block_mode {
                debug!("writing block {}", block);
                if self.phy.data_write_aborted() {
                    self.phy.set_data_write_aborted(false);
                    info!("block write aborted after {} blocks", block);
                    return Ok(written);
                }
            }
            let status = self
                .phy
                .data_write(
                    &data[written..written + chunk],
                    DEFAULT_WRITE_TIMEOUT,
                    xfer.could_abort,
                    block + 1 == blocks,
                )
                .await?;
            if status != WriteResponse::Accepted {
                warn!("block {} write reported {:?}", block, status);
            }
            written += chunk;
        }
        Ok(written)
    }

    //==============================================================================================
    // Register helpers and control operations
    //==============================================================================================

    /// Read an 8-bit CIA register through CMD52.
    pub async fn read_reg(&self, function: u3, addr: u17) -> Result<u8, SdioError> {
        let data = self
            .cmd_io_rw_direct(false, function, false, addr, None, false)
            .await?;
        data.ok_or_else(|| ProtocolError::MissingResponse { cmd: 52 }.into())
    }

    /// Write an 8-bit CIA register through CMD52.
    pub async fn write_reg(&self, function: u3, addr: u17, data: u8) -> Result<(), SdioError> {
        self.cmd_io_rw_direct(true, function, false, addr, Some(data), false)
            .await?;
        Ok(())
    }

    /// Switch the card and the PHY to the given bus width.
    ///
    /// Rewrites the width field of the bus interface control register and
    /// confirms it by reading back before the PHY starts driving the wide
    /// bus.
    pub async fn set_bus_width(&self, width: BusWidth) -> Result<(), SdioError> {
        let field = match width {
            BusWidth::Four => BusWidthField::FourBits,
            BusWidth::One => BusWidthField::OneBit,
        };
        let addr = u17::new(cia::BUS_INTERFACE_CONTROL as u32);
        let reg = self.read_reg(u3::new(0), addr).await?;
        let wrote = BusInterfaceControl::new_with_raw_value(reg).with_width(field);
        self.write_reg(u3::new(0), addr, wrote.raw_value()).await?;
        let read = self.read_reg(u3::new(0), addr).await?;
        if BusInterfaceControl::new_with_raw_value(read).width() != Ok(field) {
            return Err(ResponseError::BusWidthRejected {
                wrote: wrote.raw_value(),
                read,
            }
            .into());
        }
        debug!("bus interface control: {:#010b}", read);
        self.phy.set_bus_width(width);
        Ok(())
    }

    /// Enable an I/O function in the CCCR.
    pub async fn enable_fn(&self, function: u3) -> Result<(), SdioError> {
        let addr = u17::new(cia::IO_ENABLE as u32);
        let reg = self.read_reg(u3::new(0), addr).await?;
        self.write_reg(u3::new(0), addr, reg | 1 << function.value())
            .await?;
        Ok(())
    }

    /// Abort an in-flight transfer on `function` by writing the AS field of
    /// the I/O abort register, then raise the sticky abort flags so the data
    /// fibre unwinds at its next polling point.
    pub async fn send_abort(&self, function: u3) -> Result<(), SdioError> {
        let addr = u17::new(cia::IO_ABORT as u32);
        let reg = self.read_reg(u3::new(0), addr).await?;
        let reg = IoAbort::new_with_raw_value(reg).with_abort_select(function);
        self.write_reg(u3::new(0), addr, reg.raw_value()).await?;
        self.phy.set_data_read_aborted(true);
        self.phy.set_data_write_aborted(true);
        info!("abort sent to function {}", function);
        Ok(())
    }

    /// Reset all I/O functions via the RES bit and invalidate every piece of
    /// discovered card state.
    pub async fn soft_reset(&mut self) -> Result<(), SdioError> {
        let addr = u17::new(cia::IO_ABORT as u32);
        let reg = IoAbort::new_with_raw_value(0).with_reset(true);
        self.write_reg(u3::new(0), addr, reg.raw_value()).await?;
        info!("soft reset sent to device");
        self.init_state();
        Ok(())
    }

    /// Program the transfer block size of a function (CCCR slot for function
    /// 0, the function's FBR slot otherwise), little-endian.
    pub async fn set_block_size(&self, function: u3, blocksize: u16) -> Result<(), SdioError> {
        let f = function.value();
        let base = if f == 0 {
            cia::FN0_BLOCK_SIZE as u32
        } else if f < self.fn_count {
            cia::fbr_base(function) + cia::FBR_BLOCK_SIZE as u32
        } else {
            return Err(DataError::UnknownFunction { function: f }.into());
        };
        let max = self.fn_max_blocksizes[f as usize];
        if blocksize > max {
            return Err(DataError::BlockSizeExceedsMax {
                function: f,
                requested: blocksize,
                max,
            }
            .into());
        }
        self.write_reg(u3::new(0), u17::new(base), blocksize as u8)
            .await?;
        self.write_reg(u3::new(0), u17::new(base + 1), (blocksize >> 8) as u8)
            .await?;
        info!("block size of function {} set to {}", f, blocksize);
        Ok(())
    }
}
