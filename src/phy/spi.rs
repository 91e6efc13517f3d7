//! SPI-mode binding of the SDIO protocol.
//!
//! Pin mapping onto the SDIO pad group: chip select on data lane 3, MOSI on
//! the command line, MISO on data lane 0. Command bits shift on rising edges
//! and responses are byte-aligned; data blocks are framed by a start token
//! and acknowledged with a data-response token instead of the native
//! CRC-status handshake. SPI responses carry no CRC7.

use log::{debug, error, info, warn};

use crate::bus::SdioBus;
use crate::crc::{crc7, crc16};
use crate::frame::{CommandFrame, Response, ResponseSpec, spi_response_spec};
use crate::phy::{
    BusWidth, CmdReply, DATA_START_TIMEOUT, DataStatus, PhyCommon, PhyDriver, WriteResponse,
};
use crate::{DataError, ProtocolError, SdioError};

/// Chip select lives on data lane 3.
const CS_LANE: u8 = 3;

/// SPI-mode host PHY over a harness-provided bus.
pub struct SpiPhy<B: SdioBus> {
    bus: B,
    common: PhyCommon,
}

impl<B: SdioBus> SpiPhy<B> {
    /// Take over the pad group: the command line (MOSI) is always driven by
    /// the host in SPI mode and chip select idles deasserted (high).
    pub fn new(bus: B) -> Self {
        bus.set_cmd_dir(true);
        bus.set_cmd_out(true);
        bus.set_data_dir(1 << CS_LANE);
        bus.set_data_out(1 << CS_LANE);
        SpiPhy {
            bus,
            common: PhyCommon::new(),
        }
    }

    pub fn release(self) -> B {
        self.bus
    }

    /// Chip select is active low; callers pass the raw line level.
    fn set_cs_n(&self, level: bool) {
        self.bus.set_data_out_lane(CS_LANE, level);
    }

    fn set_mosi(&self, level: bool) {
        self.bus.set_cmd_out(level);
    }

    fn miso(&self) -> bool {
        self.bus.data_in() & 0x1 != 0
    }

    /// Deassert chip select and give the device eight clocks of idle.
    async fn deselect(&self) {
        self.set_cs_n(true);
        for _ in 0..8 {
            self.bus.rising_edge().await;
        }
    }
}

impl<B: SdioBus> PhyDriver for SpiPhy<B> {
    type Bus = B;

    const SPI_MODE: bool = true;

    fn bus(&self) -> &B {
        &self.bus
    }

    fn common(&self) -> &PhyCommon {
        &self.common
    }

    fn response_spec(cmd_num: u8) -> Option<ResponseSpec> {
        spi_response_spec(cmd_num)
    }

    async fn send_cmd(&self, cmd: &mut CommandFrame) {
        cmd.set_field(7, 1, crc7(cmd.field(47, 8)) as u64);
        debug!("sending SPI CMD{}: {:#014x}", cmd.cmd_num(), cmd.raw());
        // Chip select stays asserted through the response (and through the
        // whole data phase for CMD53).
        self.set_cs_n(false);
        for x in (0..48u8).rev() {
            self.bus.rising_edge().await;
            self.set_mosi(cmd.bit(x));
        }
        self.bus.rising_edge().await;
        self.set_mosi(true);
    }

    async fn cmd_response(
        &self,
        cmd: &CommandFrame,
        timeout: u32,
        timeout_possible: bool,
    ) -> Result<CmdReply, SdioError> {
        let Some(spec) = spi_response_spec(cmd.cmd_num()) else {
            return Ok(CmdReply::None);
        };
        let length = spec.bits;
        let mut bits_left = length;
        let mut raw: u128 = 0;
        let mut cycles = 0u32;
        while cycles < timeout {
            self.bus.rising_edge().await;
            if bits_left == length {
                if !self.miso() {
                    // Start bit of the byte-aligned response.
                    bits_left -= 1;
                }
            } else if bits_left > 0 {
                if self.miso() {
                    raw |= 1u128 << (bits_left - 1);
                }
                bits_left -= 1;
            } else {
                break;
            }
            cycles += 1;
        }
        if cycles == timeout {
            if timeout_possible {
                info!("timeout waiting for response to SPI CMD{}", cmd.cmd_num());
                return Ok(CmdReply::Timeout);
            }
            return Err(ProtocolError::ResponseTimeout { cmd: cmd.cmd_num() }.into());
        }
        if cmd.cmd_num() != 53 {
            // Bulk transfers keep the device selected; everything else ends
            // the frame here.
            self.deselect().await;
        }
        Ok(CmdReply::Frame(Response::from_bits(raw, length)))
    }

    async fn data_read(
        &self,
        buf: &mut [u8],
        timeout: Option<u32>,
        could_abort: bool,
        final_block: bool,
    ) -> Result<(usize, DataStatus), SdioError> {
        let bus = &self.bus;
        let mut received = 0usize;

        // The start token is seven 1-bits then a 0; scanning for the 0 finds
        // its end regardless of byte alignment.
        let started = bus.now();
        let mut cycles = 0u32;
        while self.miso() {
            bus.rising_edge().await;
            let timed_out = match timeout {
                Some(limit) => {
                    cycles += 1;
                    cycles == limit
                }
                None => bus.now() - started >= DATA_START_TIMEOUT,
            };
            if timed_out {
                if could_abort {
                    info!("timed out waiting for a data start token, assuming aborted transfer");
                    return Ok((received, DataStatus::Aborted));
                }
                return Err(DataError::StartBitTimeout.into());
            }
        }

        while received < buf.len() {
            let mut byte = 0u8;
            for bit in (0..8u8).rev() {
                bus.rising_edge().await;
                byte |= (self.miso() as u8) << bit;
            }
            buf[received] = byte;
            received += 1;
            if could_abort && self.data_read_aborted() {
                info!("data read aborted after {} bytes", received);
                return Ok((received, DataStatus::Aborted));
            }
        }

        let mut wire_crc = 0u16;
        for bit in (0..16u16).rev() {
            bus.rising_edge().await;
            wire_crc |= (self.miso() as u16) << bit;
            if could_abort && self.data_read_aborted() {
                info!("data read aborted during CRC, {} bytes captured", received);
                return Ok((received, DataStatus::Aborted));
            }
        }

        let computed = crc16(&buf[..received], received * 8);
        debug!("CRC received {:#06x}, computed {:#06x}", wire_crc, computed);
        if wire_crc != computed {
            if self.data_read_aborted() {
                info!("data CRC mismatch explained by an aborted block read");
                return Ok((received, DataStatus::Aborted));
            }
            return Err(DataError::ReadCrc {
                lane: 0,
                computed,
                received: wire_crc,
            }
            .into());
        }

        if final_block {
            bus.rising_edge().await;
            self.deselect().await;
        }
        Ok((received, DataStatus::Okay))
    }

    async fn data_write(
        &self,
        data: &[u8],
        timeout: u32,
        _could_abort: bool,
        final_block: bool,
    ) -> Result<WriteResponse, SdioError> {
        let bus = &self.bus;
        debug!("writing {} bytes onto the SPI bus", data.len());

        // Start token: seven 1-bits then a 0.
        self.set_mosi(true);
        for _ in 0..7 {
            bus.rising_edge().await;
        }
        self.set_mosi(false);
        bus.rising_edge().await;

        let mut num_bits = 0usize;
        for &byte in data {
            for bit in (0..8u8).rev() {
                self.set_mosi(byte >> bit & 0x1 != 0);
                bus.rising_edge().await;
                num_bits += 1;
            }
        }

        let crc = crc16(data, num_bits);
        for bit in (0..16u16).rev() {
            self.set_mosi(crc >> bit & 1 != 0);
            bus.rising_edge().await;
        }
        self.set_mosi(true);

        // Data-response token: xxx0sss1. Scan byte groups until bit 4 drops.
        let mut status: u8;
        let mut cycles = 0u32;
        loop {
            status = 0;
            for bit in (0..8u8).rev() {
                bus.rising_edge().await;
                status |= (self.miso() as u8) << bit;
            }
            if status & 0x10 == 0 {
                if status & 0x01 == 0 {
                    return Err(DataError::WriteTokenMalformed { token: status }.into());
                }
                match WriteResponse::from_status_bits(status >> 1) {
                    WriteResponse::Accepted => debug!("SPI block write accepted"),
                    WriteResponse::CrcRejected => {
                        error!("SPI block write rejected: incorrect CRC")
                    }
                    WriteResponse::Other(bits) => {
                        info!("SPI data-response token reported {:#05b}", bits)
                    }
                }
                break;
            }
            cycles += 8;
            if cycles >= timeout {
                error!("timeout waiting for the SPI data-response token");
                break;
            }
        }

        // The device signals busy by holding MISO low in whole byte times.
        let mut cycles = 0u32;
        loop {
            let mut busy = 0u8;
            for bit in (0..8u8).rev() {
                bus.rising_edge().await;
                busy |= (self.miso() as u8) << bit;
            }
            if busy & 0x01 != 0 {
                break;
            }
            cycles += 8;
            if cycles >= timeout {
                error!("timeout waiting for the device to finish a block write");
                break;
            }
        }

        if final_block {
            bus.rising_edge().await;
            self.deselect().await;
        }
        Ok(WriteResponse::from_status_bits(status >> 1))
    }

    /// Read-wait uses data lane 2, which SPI mode does not own.
    fn read_wait(&self, _asserting: bool) {
        warn!("read-wait is not available in SPI mode");
    }

    /// The SPI binding is a single-lane protocol; wide mode is refused.
    fn set_bus_width(&self, width: BusWidth) {
        if width != BusWidth::One {
            warn!("bus width {} is not supported in SPI mode", width.lanes());
            return;
        }
        self.common().set_bus_width(width);
    }
}
