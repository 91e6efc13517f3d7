//! Native-mode SDIO physical layer.
//!
//! Commands shift out on falling clock edges and responses are sampled on
//! rising edges. Data moves over one or four lanes, each lane carrying its
//! own CRC16 in 4-bit mode.

use log::{debug, error, info};

use crate::bus::SdioBus;
use crate::crc::{crc7, crc16, crc16_lanes};
use crate::frame::{CommandFrame, Response, ResponseSpec, response_spec};
use crate::phy::{
    BusWidth, CmdReply, DATA_START_TIMEOUT, DataStatus, PhyCommon, PhyDriver, WriteResponse,
};
use crate::{DataError, ProtocolError, SdioError};

/// Native SDIO host PHY over a harness-provided bus.
pub struct NativePhy<B: SdioBus> {
    bus: B,
    common: PhyCommon,
}

impl<B: SdioBus> NativePhy<B> {
    /// Take over the pad group and establish the reset values: command line
    /// released high, all data lanes released, pads pulled up.
    pub fn new(bus: B) -> Self {
        bus.set_cmd_dir(false);
        bus.set_data_dir(0x00);
        bus.set_data_out(0xff);
        bus.set_cmd_out(true);
        NativePhy {
            bus,
            common: PhyCommon::new(),
        }
    }

    pub fn release(self) -> B {
        self.bus
    }

    /// Compare received against locally computed data CRCs.
    fn check_read_crc(&self, data: &[u8], wire: &[u16; 4]) -> Result<(), DataError> {
        match self.bus_width() {
            BusWidth::Four => {
                let computed = crc16_lanes(data);
                for lane in 0..4 {
                    debug!(
                        "lane {} CRC received {:#06x}, computed {:#06x}",
                        lane, wire[lane], computed[lane]
                    );
                    if wire[lane] != computed[lane] {
                        return Err(DataError::ReadCrc {
                            lane: lane as u8,
                            computed: computed[lane],
                            received: wire[lane],
                        });
                    }
                }
                Ok(())
            }
            BusWidth::One => {
                let computed = crc16(data, data.len() * 8);
                debug!(
                    "lane 0 CRC received {:#06x}, computed {:#06x}",
                    wire[0], computed
                );
                if wire[0] != computed {
                    return Err(DataError::ReadCrc {
                        lane: 0,
                        computed,
                        received: wire[0],
                    });
                }
                Ok(())
            }
        }
    }
}

impl<B: SdioBus> PhyDriver for NativePhy<B> {
    type Bus = B;

    const SPI_MODE: bool = false;

    fn bus(&self) -> &B {
        &self.bus
    }

    fn common(&self) -> &PhyCommon {
        &self.common
    }

    fn response_spec(cmd_num: u8) -> Option<ResponseSpec> {
        response_spec(cmd_num)
    }

    async fn send_cmd(&self, cmd: &mut CommandFrame) {
        cmd.set_field(7, 1, crc7(cmd.field(47, 8)) as u64);
        debug!("sending CMD{}: {:#014x}", cmd.cmd_num(), cmd.raw());
        self.bus.set_cmd_dir(true);
        for x in (0..48u8).rev() {
            self.bus.falling_edge().await;
            self.bus.set_cmd_out(cmd.bit(x));
            if x == 0 {
                // Release the line together with the final bit.
                self.bus.set_cmd_dir(false);
            }
        }
    }

    async fn cmd_response(
        &self,
        cmd: &CommandFrame,
        timeout: u32,
        timeout_possible: bool,
    ) -> Result<CmdReply, SdioError> {
        let Some(spec) = response_spec(cmd.cmd_num()) else {
            return Ok(CmdReply::None);
        };
        let length = spec.bits;
        let mut bits_left = length;
        let mut raw: u128 = 0;
        let mut cycles = 0u32;
        while cycles < timeout {
            self.bus.rising_edge().await;
            if bits_left == length {
                // Response not started yet; a sampled 0 is the start bit.
                if !self.bus.cmd_in() {
                    bits_left -= 1;
                }
            } else if bits_left > 0 {
                // The reserved 136-bit R2 keeps only its low 128 bits; SDIO
                // never issues one and its leading byte is constant anyway.
                if self.bus.cmd_in() && bits_left <= 128 {
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
                info!("timeout waiting for response to CMD{}", cmd.cmd_num());
                return Ok(CmdReply::Timeout);
            }
            return Err(ProtocolError::ResponseTimeout { cmd: cmd.cmd_num() }.into());
        }
        Ok(CmdReply::Frame(Response::from_bits(raw, length)))
    }

    async fn data_read(
        &self,
        buf: &mut [u8],
        timeout: Option<u32>,
        could_abort: bool,
        _final_block: bool,
    ) -> Result<(usize, DataStatus), SdioError> {
        let bus = &self.bus;
        let mut received = 0usize;

        let started = bus.now();
        let mut cycles = 0u32;
        while bus.data_in() & 0x1 != 0 {
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
                    info!("timed out waiting for a data start bit, assuming aborted transfer");
                    return Ok((received, DataStatus::Aborted));
                }
                return Err(DataError::StartBitTimeout.into());
            }
        }

        while received < buf.len() {
            let mut byte = 0u8;
            match self.bus_width() {
                BusWidth::Four => {
                    bus.rising_edge().await;
                    byte |= (bus.data_in() & 0x0f) << 4;
                    bus.rising_edge().await;
                    byte |= bus.data_in() & 0x0f;
                }
                BusWidth::One => {
                    for bit in (0..8u8).rev() {
                        bus.rising_edge().await;
                        byte |= (bus.data_in() & 0x1) << bit;
                    }
                }
            }
            buf[received] = byte;
            received += 1;
            if could_abort && self.data_read_aborted() {
                info!("data read aborted after {} bytes", received);
                return Ok((received, DataStatus::Aborted));
            }
        }

        let mut wire_crc = [0u16; 4];
        let wide = self.bus_width() == BusWidth::Four;
        for bit in (0..16u16).rev() {
            bus.rising_edge().await;
            let sample = bus.data_in();
            wire_crc[0] |= ((sample & 0x1) as u16) << bit;
            if wide {
                for lane in 1..4 {
                    wire_crc[lane] |= ((sample >> lane & 0x1) as u16) << bit;
                }
            }
            if could_abort && self.data_read_aborted() {
                info!("data read aborted during CRC, {} bytes captured", received);
                return Ok((received, DataStatus::Aborted));
            }
        }

        match self.check_read_crc(&buf[..received], &wire_crc) {
            Ok(()) => Ok((received, DataStatus::Okay)),
            // A mismatch is expected when the device cut the block short.
            Err(_) if self.data_read_aborted() => {
                info!("data CRC mismatch explained by an aborted block read");
                Ok((received, DataStatus::Aborted))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn data_write(
        &self,
        data: &[u8],
        timeout: u32,
        _could_abort: bool,
        _final_block: bool,
    ) -> Result<WriteResponse, SdioError> {
        let bus = &self.bus;
        let width = self.bus_width();
        debug!("writing {} bytes onto the data bus", data.len());

        for lane in 0..width.lanes() {
            bus.set_data_dir_lane(lane, true);
        }

        // Start bit on every driven lane.
        bus.falling_edge().await;
        for lane in 0..width.lanes() {
            bus.set_data_out_lane(lane, false);
        }

        match width {
            BusWidth::Four => {
                for &byte in data {
                    bus.falling_edge().await;
                    bus.set_data_out(byte >> 4 | 0xf0);
                    bus.falling_edge().await;
                    bus.set_data_out(byte & 0x0f | 0xf0);
                }
                let crc = crc16_lanes(data);
                for bit in (0..16u16).rev() {
                    bus.falling_edge().await;
                    for (lane, value) in crc.iter().enumerate() {
                        bus.set_data_out_lane(lane as u8, value >> bit & 1 != 0);
                    }
                }
            }
            BusWidth::One => {
                for &byte in data {
                    for bit in (0..8u8).rev() {
                        bus.falling_edge().await;
                        bus.set_data_out(byte >> bit & 0x1 | 0xfe);
                    }
                }
                let crc = crc16(data, data.len() * 8);
                for bit in (0..16u16).rev() {
                    bus.falling_edge().await;
                    bus.set_data_out((crc >> bit & 1) as u8 | 0xfe);
                }
            }
        }

        // Stop bit on the driven lanes, then let the bus go high-impedance.
        bus.falling_edge().await;
        for lane in 0..width.lanes() {
            bus.set_data_out_lane(lane, true);
        }
        bus.falling_edge().await;
        bus.set_data_dir(0x00);

        // Two cycles of turnaround before the CRC-status token on lane 0.
        bus.rising_edge().await;
        bus.rising_edge().await;
        bus.rising_edge().await;
        if bus.data_in() & 0x1 != 0 {
            error!("write CRC-status token did not start in the expected slot");
        }
        let mut token = 0u8;
        for i in 0..5 {
            bus.rising_edge().await;
            if i < 3 {
                token |= (bus.data_in() & 0x1) << i;
            }
        }
        let response = WriteResponse::from_status_bits(token);
        if response != WriteResponse::Accepted {
            info!("write CRC-status token reported {:#05b}", token);
            return Ok(response);
        }

        // Busy: the device holds lane 0 low until it has committed the block.
        let mut cycles = 0u32;
        while bus.data_in() & 0x1 == 0 {
            bus.rising_edge().await;
            cycles += 1;
            if cycles == timeout {
                error!("timeout waiting for the device to finish a block write");
                break;
            }
        }
        Ok(response)
    }

    /// Lane 2 doubles as the read-wait signal: held low it tells the device
    /// not to start the next block of a multi-block read.
    fn read_wait(&self, asserting: bool) {
        if asserting {
            self.bus.set_data_dir_lane(2, true);
            self.bus.set_data_out_lane(2, false);
        } else {
            self.bus.set_data_dir_lane(2, false);
            self.bus.set_data_out_lane(2, true);
        }
    }
}
