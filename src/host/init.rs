//! The SDIO initialization sequencer and the CIA register dumps.

use arbitrary_int::{u3, u17};
use log::{debug, info, warn};
use rand_core::RngCore;

use crate::cia::{self, IoAbort};
use crate::host::cis::{CisTuples, TUPLE_FUNCE};
use crate::host::{CIS_WINDOW, ExtendedTransfer, SdioHost};
use crate::phy::PhyDriver;
use crate::{DataError, SdioError};

/// Knobs of [SdioHost::sdio_init].
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InitConfig {
    /// Probe the I/O abort register first and soft-reset the card if it
    /// answers (native mode only).
    pub reset: bool,
    /// Log the CCCR/FBR register files and the parsed CIS once discovery is
    /// done.
    pub dump_regs: bool,
    /// Re-issue CMD3 this many extra times to exercise RCA reassignment.
    pub rca_changes: u32,
}

impl Default for InitConfig {
    fn default() -> Self {
        InitConfig {
            reset: true,
            dump_regs: false,
            rca_changes: 0,
        }
    }
}

impl<P: PhyDriver, R: RngCore> SdioHost<P, R> {
    /// Run the full SDIO initialization sequence.
    ///
    /// Reset probe, CMD0/CMD8/CMD5 handshake, RCA assignment and card
    /// selection (native mode), capability decode, CIS fetch, function
    /// discovery through the FBRs and per-function maximum block size
    /// extraction. On success every function in `0..fn_count()` has a
    /// strictly positive [SdioHost::fn_max_blocksize].
    pub async fn sdio_init(&mut self, config: &InitConfig) -> Result<(), SdioError> {
        info!("beginning SDIO device initialization");
        let io_abort = u17::new(cia::IO_ABORT as u32);
        if !P::SPI_MODE && config.reset {
            // Best-effort: the device may not be in a state to answer yet.
            let probe = self
                .cmd_io_rw_direct(false, u3::new(0), false, io_abort, None, true)
                .await?;
            if let Some(reg) = probe {
                let reg = IoAbort::new_with_raw_value(reg).with_reset(true);
                self.write_reg(u3::new(0), io_abort, reg.raw_value()).await?;
                self.random_gap().await;
            }
        }

        self.cmd_go_idle().await?;
        self.random_gap().await;
        self.cmd_go_idle().await?;
        self.random_gap().await;

        self.cmd_send_if_cond().await?;
        self.random_gap().await;
        self.cmd_send_op_cond().await?;
        self.random_gap().await;

        if !P::SPI_MODE {
            let response = self.cmd_send_relative_addr().await?;
            let mut rca = response.field(39, 24) as u16;
            info!("SDIO device RCA: {:#06x}", rca);
            for _ in 0..config.rca_changes {
                let response = self.cmd_send_relative_addr().await?;
                rca = response.field(39, 24) as u16;
                info!("SDIO device RCA reassigned: {:#06x}", rca);
            }
            self.rca = Some(rca);
            // The card moves to the transfer state once selected.
            self.cmd_select_card(rca).await?;
        }

        let caps = self
            .read_reg(u3::new(0), u17::new(cia::CARD_CAPABILITY as u32))
            .await?;
        self.caps = cia::CardCapability::new_with_raw_value(caps);
        self.log_capability();

        let mut cis_addr = 0u32;
        for byte in 0..3u32 {
            let reg = self
                .read_reg(u3::new(0), u17::new(cia::COMMON_CIS_PTR as u32 + byte))
                .await?;
            cis_addr |= (reg as u32) << (8 * byte);
        }
        self.fn_cis_addrs[0] = cis_addr;
        debug!("function 0 CIS address: {:#x}", cis_addr);

        // One byte-mode burst is much faster than 256 direct reads; the
        // window is assumed to hold every CIS chain of the card.
        let mut window = [0u8; CIS_WINDOW];
        let xfer = ExtendedTransfer::bytes(
            u3::new(0),
            u17::new(cis_addr & 0x1_ffff),
            CIS_WINDOW as u16,
        );
        let read = self.io_read_extended(&xfer, &mut window).await?;
        self.cis_data.clear();
        self.cis_data.extend_from_slice(&window[..read]).ok();

        for function in 1..8u8 {
            let base = cia::fbr_base(u3::new(function));
            let code = self.read_reg(u3::new(0), u17::new(base)).await?;
            if code & 0x0f == 0 {
                continue;
            }
            debug!("function {} detected as present", function);
            self.fn_count += 1;
            let mut addr = 0u32;
            for byte in 0..3u32 {
                let reg = self
                    .read_reg(u3::new(0), u17::new(base + cia::FBR_CIS_PTR as u32 + byte))
                    .await?;
                addr |= (reg as u32) << (8 * byte);
            }
            self.fn_cis_addrs[function as usize] = addr;
            debug!("function {} CIS address: {:#x}", function, addr);
        }

        if config.dump_regs {
            self.dump_cccrs().await?;
            for function in 0..self.fn_count {
                self.dump_cis(self.fn_cis_addrs[function as usize]);
                if function > 0 {
                    self.dump_fbrs(u3::new(function)).await?;
                }
            }
        }

        for function in 0..self.fn_count {
            let size = self.find_max_blocksize(function)?;
            self.fn_max_blocksizes[function as usize] = size;
            info!("function {} max block size is {} bytes", function, size);
        }

        info!("SDIO initialized");
        Ok(())
    }

    /// Locate the FUNCE tuple of a function in the cached CIS window and pull
    /// its maximum block size out.
    fn find_max_blocksize(&self, function: u8) -> Result<u16, SdioError> {
        let offset = (self.fn_cis_addrs[function as usize] & 0xff) as usize;
        let window = self.cis_data.get(offset..).unwrap_or(&[]);
        for tuple in CisTuples::new(window) {
            let tuple = tuple?;
            if tuple[0] != TUPLE_FUNCE {
                continue;
            }
            // The block size field sits at the end of the function-extension
            // body: right after the type byte for function 0, after the
            // function info block for the others.
            let lo = if function == 0 { 2 } else { 13 };
            if let (Some(&low), Some(&high)) = (tuple.get(lo), tuple.get(lo + 1)) {
                return Ok(low as u16 | (high as u16) << 8);
            }
            break;
        }
        Err(DataError::MaxBlockSizeNotFound { function }.into())
    }

    fn log_capability(&self) {
        let caps = self.caps;
        info!("card capability register:");
        info!("  SDC  - direct commands during transfer: {}", caps.sdc() as u8);
        info!("  SMB  - multiple block transfer: {}", caps.smb() as u8);
        info!("  SRW  - read wait: {}", caps.srw() as u8);
        info!("  SBS  - bus control (suspend/resume): {}", caps.sbs() as u8);
        info!("  S4MI - 4-bit block gap interrupt: {}", caps.s4mi() as u8);
        info!("  LSC  - low-speed card: {}", caps.lsc() as u8);
        info!("  4BLS - 4-bit low-speed support: {}", caps.b4ls() as u8);
    }

    /// Log the card common control registers.
    pub async fn dump_cccrs(&self) -> Result<(), SdioError> {
        info!("CCCRs:");
        for desc in cia::CCCR_REGS {
            let value = self
                .read_reg(u3::new(0), u17::new(desc.addr as u32))
                .await?;
            if desc.binary {
                info!("{:#04x} {:<30}: {:08b}", desc.addr, desc.name, value);
            } else {
                info!("{:#04x} {:<30}: {:02x}", desc.addr, desc.name, value);
            }
        }
        Ok(())
    }

    /// Log the function basic registers of one function.
    pub async fn dump_fbrs(&self, function: u3) -> Result<(), SdioError> {
        let base = cia::fbr_base(function);
        info!("FBR for function {}:", function);
        for desc in cia::FBR_REGS {
            let value = self
                .read_reg(u3::new(0), u17::new(base + desc.addr as u32))
                .await?;
            if desc.binary {
                info!("{:#04x} {:<35}: {:08b}", desc.addr, desc.name, value);
            } else {
                info!("{:#04x} {:<35}: {:02x}", desc.addr, desc.name, value);
            }
        }
        Ok(())
    }

    /// Log the CIS tuples reachable from `addr` in the cached window.
    pub fn dump_cis(&self, addr: u32) {
        let offset = (addr & 0xff) as usize;
        let window = self.cis_data.get(offset..).unwrap_or(&[]);
        info!("CIS tuples from address {:#x}:", addr);
        for tuple in CisTuples::new(window) {
            match tuple {
                Ok(tuple) => info!("tuple type {:02x}, body {:02x?}", tuple[0], &tuple[2..]),
                Err(err) => {
                    warn!("CIS dump stopped: {}", err);
                    break;
                }
            }
        }
    }
}
