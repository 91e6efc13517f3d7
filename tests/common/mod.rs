//! Shared test fixture: a software rendition of the pad group plus a clocked
//! SDIO slave card that answers the host model over it.
//!
//! The card is deliberately written against the raw wire protocol (its own
//! edge waits, its own bit assembly) so that host-side framing bugs cannot
//! cancel out against themselves; only the CRC generators are shared with the
//! crate under test.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::rc::Rc;

use embassy_futures::join::join;
use embassy_futures::select::{Either3, select3};
use embassy_futures::yield_now;

use sdio_host_bfm::SdioBus;
use sdio_host_bfm::bus::SimTime;
use sdio_host_bfm::crc::{crc7, crc16, crc16_lanes};

pub const HALF_PERIOD_NS: u64 = 250;

//==================================================================================================
// Simulated bus
//==================================================================================================

/// Pad group + clock with host-side and card-side drivers and pull-ups.
pub struct SimBus {
    time_ns: Cell<u64>,
    level: Cell<bool>,
    rising: Cell<u64>,
    falling: Cell<u64>,
    // Host-side pad drivers.
    cmd_dir: Cell<bool>,
    cmd_out: Cell<bool>,
    data_dir: Cell<u8>,
    data_out: Cell<u8>,
    // Card-side drivers; `None` is high-impedance.
    card_cmd: Cell<Option<bool>>,
    card_data: [Cell<Option<bool>>; 4],
}

/// Local newtype around `Rc<SimBus>` so [`SdioBus`] can be implemented for
/// it from this test crate (the orphan rules forbid implementing a foreign
/// trait directly on `Rc<SimBus>`, since `Rc` is foreign too).
#[derive(Clone)]
pub struct BusHandle(Rc<SimBus>);

impl core::ops::Deref for BusHandle {
    type Target = SimBus;

    fn deref(&self) -> &SimBus {
        &self.0
    }
}

impl SimBus {
    pub fn new() -> BusHandle {
        BusHandle(Rc::new(SimBus {
            time_ns: Cell::new(0),
            level: Cell::new(false),
            rising: Cell::new(0),
            falling: Cell::new(0),
            cmd_dir: Cell::new(false),
            cmd_out: Cell::new(true),
            data_dir: Cell::new(0),
            data_out: Cell::new(0xff),
            card_cmd: Cell::new(None),
            card_data: [const { Cell::new(None) }; 4],
        }))
    }

    pub fn step(&self) {
        let level = !self.level.get();
        self.level.set(level);
        self.time_ns.set(self.time_ns.get() + HALF_PERIOD_NS);
        if level {
            self.rising.set(self.rising.get() + 1);
        } else {
            self.falling.set(self.falling.get() + 1);
        }
    }

    pub async fn wait_rising(&self) {
        let seen = self.rising.get();
        while self.rising.get() == seen {
            yield_now().await;
        }
    }

    pub async fn wait_falling(&self) {
        let seen = self.falling.get();
        while self.falling.get() == seen {
            yield_now().await;
        }
    }

    /// The card's view of the command line.
    pub fn card_cmd_in(&self) -> bool {
        if self.cmd_dir.get() {
            self.cmd_out.get()
        } else {
            true
        }
    }

    pub fn card_drive_cmd(&self, level: Option<bool>) {
        self.card_cmd.set(level);
    }

    /// The card's view of one data lane.
    pub fn card_data_in(&self, lane: u8) -> bool {
        if self.data_dir.get() >> lane & 1 != 0 {
            self.data_out.get() >> lane & 1 != 0
        } else {
            self.card_data[lane as usize].get().unwrap_or(true)
        }
    }

    pub fn card_drive_data(&self, lane: u8, level: Option<bool>) {
        self.card_data[lane as usize].set(level);
    }
}

impl SdioBus for BusHandle {
    async fn rising_edge(&self) {
        self.wait_rising().await;
    }

    async fn falling_edge(&self) {
        self.wait_falling().await;
    }

    fn now(&self) -> SimTime {
        SimTime::from_ticks(self.time_ns.get())
    }

    fn set_cmd_dir(&self, drive: bool) {
        self.cmd_dir.set(drive);
    }

    fn set_cmd_out(&self, level: bool) {
        self.cmd_out.set(level);
    }

    fn cmd_in(&self) -> bool {
        self.card_cmd.get().unwrap_or(true)
    }

    fn set_data_dir(&self, lanes: u8) {
        self.data_dir.set(lanes);
    }

    fn data_dir(&self) -> u8 {
        self.data_dir.get()
    }

    fn set_data_out(&self, value: u8) {
        self.data_out.set(value);
    }

    fn data_out(&self) -> u8 {
        self.data_out.get()
    }

    /// Host view: card drive wins on lanes the host has released, host's own
    /// drive is looped back otherwise, pull-ups everywhere else.
    fn data_in(&self) -> u8 {
        let mut value = 0xf0u8;
        for lane in 0..4u8 {
            let bit = if self.data_dir.get() >> lane & 1 != 0 {
                self.data_out.get() >> lane & 1 != 0
            } else {
                self.card_data[lane as usize].get().unwrap_or(true)
            };
            value |= (bit as u8) << lane;
        }
        value
    }
}

pub async fn run_clock(bus: &SimBus) {
    loop {
        yield_now().await;
        bus.step();
    }
}

/// Drive the clock, the card, and the test body together until the body
/// finishes.
pub fn run_sim<F, T>(bus: &BusHandle, card: &Card, body: F) -> T
where
    F: Future<Output = T>,
{
    embassy_futures::block_on(async {
        match select3(run_clock(bus), card.run(), body).await {
            Either3::Third(value) => value,
            _ => unreachable!("clock and card never terminate"),
        }
    })
}

//==================================================================================================
// Card model
//==================================================================================================

const CIS_BASE: u32 = 0x1000;
pub const FN1_CIS_OFFSET: u32 = 0x40;

#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub function: u8,
    pub addr: u32,
    pub data: Vec<u8>,
    /// Clock slots occupied after the start bit: data + CRC + stop.
    pub bits_after_start: usize,
    pub wire_crc: [u16; 4],
    pub crc_ok: bool,
    pub stop_bit: bool,
}

#[derive(Debug, Clone, Copy)]
enum DataJob {
    Read {
        function: u8,
        addr: u32,
        incr: bool,
        block: bool,
        count: u16,
    },
    Write {
        function: u8,
        addr: u32,
        incr: bool,
        block: bool,
        count: u16,
    },
}

/// A behavioural SDIO slave with one I/O function (besides function 0), a
/// 256-byte CIS window at 0x1000 and a small register memory on function 1.
pub struct Card {
    bus: BusHandle,
    cccr: RefCell<[u8; 32]>,
    fbr1: RefCell<[u8; 32]>,
    cis: Vec<u8>,
    fn1_mem: RefCell<Vec<u8>>,
    rca: Cell<u16>,
    width: Cell<u8>,
    abort_req: Cell<bool>,
    jobs: RefCell<VecDeque<DataJob>>,
    /// Stop a block read after this many blocks even without an abort, to
    /// stage deterministic abort scenarios.
    pub stop_read_after: Cell<Option<u32>>,
    pub blocks_sent: Cell<u32>,
    pub blocks_received: Cell<u32>,
    pub abort_writes_seen: Cell<u32>,
    pub commands_seen: RefCell<Vec<u8>>,
    pub write_records: RefCell<Vec<WriteRecord>>,
}

/// Capability byte the fixture advertises: SDC, SMB, SRW, S4MI.
pub const CARD_CAPS: u8 = 0x17;
pub const FIRST_RCA: u16 = 0x1234;
pub const FN0_MAX_BLOCKSIZE: u16 = 512;
pub const FN1_MAX_BLOCKSIZE: u16 = 256;

impl Card {
    pub fn new(bus: BusHandle) -> Self {
        let mut cccr = [0u8; 32];
        cccr[0] = 0x11; // CCCR/SDIO revision
        cccr[8] = CARD_CAPS;
        cccr[9] = (CIS_BASE & 0xff) as u8;
        cccr[10] = (CIS_BASE >> 8) as u8;
        cccr[11] = (CIS_BASE >> 16) as u8;

        let mut fbr1 = [0u8; 32];
        fbr1[0] = 0x02; // standard function code
        let fn1_cis = CIS_BASE + FN1_CIS_OFFSET;
        fbr1[9] = (fn1_cis & 0xff) as u8;
        fbr1[10] = (fn1_cis >> 8) as u8;
        fbr1[11] = (fn1_cis >> 16) as u8;
        fbr1[0x10] = (FN1_MAX_BLOCKSIZE & 0xff) as u8;
        fbr1[0x11] = (FN1_MAX_BLOCKSIZE >> 8) as u8;

        let mut cis = vec![0xffu8; 256];
        // Function 0 chain: a manufacturer-id tuple, then the function
        // extension carrying the maximum block size.
        let fn0_chain = [
            0x20, 0x04, 0xaa, 0xbb, 0xcc, 0xdd, //
            0x22, 0x02, (FN0_MAX_BLOCKSIZE & 0xff) as u8, (FN0_MAX_BLOCKSIZE >> 8) as u8, //
            0xff,
        ];
        cis[..fn0_chain.len()].copy_from_slice(&fn0_chain);
        // Function 1 chain at its own offset inside the same window.
        let mut fn1_chain = vec![0x22u8, 0x0d];
        fn1_chain.extend_from_slice(&[0; 11]);
        fn1_chain.push((FN1_MAX_BLOCKSIZE & 0xff) as u8);
        fn1_chain.push((FN1_MAX_BLOCKSIZE >> 8) as u8);
        fn1_chain.push(0xff);
        let offset = FN1_CIS_OFFSET as usize;
        cis[offset..offset + fn1_chain.len()].copy_from_slice(&fn1_chain);

        Card {
            bus,
            cccr: RefCell::new(cccr),
            fbr1: RefCell::new(fbr1),
            cis,
            fn1_mem: RefCell::new(vec![0u8; 4096]),
            rca: Cell::new(FIRST_RCA),
            width: Cell::new(1),
            abort_req: Cell::new(false),
            jobs: RefCell::new(VecDeque::new()),
            stop_read_after: Cell::new(None),
            blocks_sent: Cell::new(0),
            blocks_received: Cell::new(0),
            abort_writes_seen: Cell::new(0),
            commands_seen: RefCell::new(Vec::new()),
            write_records: RefCell::new(Vec::new()),
        }
    }

    pub fn fn1_mem(&self, addr: usize, len: usize) -> Vec<u8> {
        self.fn1_mem.borrow()[addr..addr + len].to_vec()
    }

    pub fn preload_fn1(&self, addr: usize, data: &[u8]) {
        self.fn1_mem.borrow_mut()[addr..addr + data.len()].copy_from_slice(data);
    }

    pub async fn run(&self) {
        join(self.cmd_loop(), self.data_loop()).await;
    }

    //==============================================================================================
    // Register file
    //==============================================================================================

    fn reg_read(&self, function: u8, addr: u32) -> u8 {
        if function == 0 {
            match addr {
                0x000..=0x01f => self.cccr.borrow()[addr as usize],
                0x100..=0x11f => self.fbr1.borrow()[(addr - 0x100) as usize],
                0x1000..=0x10ff => self.cis[(addr - CIS_BASE) as usize],
                _ => 0,
            }
        } else if function == 1 {
            self.fn1_mem
                .borrow()
                .get(addr as usize)
                .copied()
                .unwrap_or(0xff)
        } else {
            0
        }
    }

    fn reg_write(&self, function: u8, addr: u32, value: u8) {
        if function == 0 {
            match addr {
                0x000..=0x01f => {
                    self.cccr.borrow_mut()[addr as usize] = value;
                    if addr == 6 && value & 0x07 != 0 {
                        self.abort_req.set(true);
                        self.abort_writes_seen.set(self.abort_writes_seen.get() + 1);
                    }
                    if addr == 7 {
                        self.width.set(if value & 0x03 == 0x02 { 4 } else { 1 });
                    }
                }
                0x100..=0x11f => self.fbr1.borrow_mut()[(addr - 0x100) as usize] = value,
                _ => {}
            }
        } else if function == 1 {
            if let Some(slot) = self.fn1_mem.borrow_mut().get_mut(addr as usize) {
                *slot = value;
            }
        }
    }

    fn blocksize(&self, function: u8) -> usize {
        if function == 0 {
            let cccr = self.cccr.borrow();
            (cccr[16] as usize) | (cccr[17] as usize) << 8
        } else {
            let fbr1 = self.fbr1.borrow();
            (fbr1[0x10] as usize) | (fbr1[0x11] as usize) << 8
        }
    }

    //==============================================================================================
    // Command engine
    //==============================================================================================

    async fn cmd_loop(&self) {
        loop {
            self.bus.wait_rising().await;
            if self.bus.card_cmd_in() {
                continue;
            }
            // Start bit seen; the remaining 47 bits follow on rising edges.
            let mut frame = 0u64;
            for _ in 0..47 {
                self.bus.wait_rising().await;
                frame = frame << 1 | self.bus.card_cmd_in() as u64;
            }
            let cmd_num = (frame >> 40 & 0x3f) as u8;
            self.commands_seen.borrow_mut().push(cmd_num);
            assert!(frame & 1 != 0, "command stop bit missing");
            assert_eq!(
                crc7(frame >> 8),
                (frame >> 1 & 0x7f) as u8,
                "host sent a bad command CRC7"
            );
            self.dispatch(frame, cmd_num).await;
        }
    }

    async fn dispatch(&self, frame: u64, cmd_num: u8) {
        let arg = |hi: u32, lo: u32| frame >> lo & (u64::MAX >> (63 - (hi - lo)));
        match cmd_num {
            0 => {} // go idle; nothing to answer in native mode
            3 => {
                let rca = self.rca.get();
                self.send_response(3, (rca as u32) << 16).await;
                self.rca.set(rca.wrapping_add(1));
            }
            5 => {
                // R4: reserved field all-ones, card ready, one extra function.
                self.send_response(0x3f, 0x9000_0000 | arg(23, 8) as u32)
                    .await;
            }
            7 => {
                assert_eq!(
                    arg(39, 24) as u16,
                    self.rca.get().wrapping_sub(1),
                    "selected with a stale RCA"
                );
                self.send_response(7, 0xf << 9).await;
            }
            8 => {
                // R7 echoes the condition argument.
                self.send_response(8, arg(39, 8) as u32).await;
            }
            52 => {
                let rw = frame >> 39 & 1 != 0;
                let function = (arg(38, 36)) as u8;
                let addr = arg(33, 17) as u32;
                if rw {
                    self.reg_write(function, addr, arg(15, 8) as u8);
                }
                let data = self.reg_read(function, addr);
                self.send_response(52, (data as u32) << 8).await;
            }
            53 => {
                let rw = frame >> 39 & 1 != 0;
                let function = arg(38, 36) as u8;
                let block = frame >> 35 & 1 != 0;
                let incr = frame >> 34 & 1 != 0;
                let addr = arg(33, 17) as u32;
                let count = arg(16, 8) as u16;
                self.send_response(53, 0).await;
                let job = if rw {
                    DataJob::Write {
                        function,
                        addr,
                        incr,
                        block,
                        count,
                    }
                } else {
                    DataJob::Read {
                        function,
                        addr,
                        incr,
                        block,
                        count,
                    }
                };
                self.jobs.borrow_mut().push_back(job);
            }
            other => panic!("card model does not speak CMD{other}"),
        }
    }

    /// Drive a 48-bit response: `{start 0, dir 0, cmd_bits, body, CRC7,
    /// stop 1}` on falling edges after a short idle gap.
    async fn send_response(&self, cmd_bits: u8, body: u32) {
        let mut raw = 0u64;
        raw |= (cmd_bits as u64) << 40;
        raw |= (body as u64) << 8;
        raw |= (crc7(raw >> 8) as u64) << 1;
        raw |= 1;
        for _ in 0..4 {
            self.bus.wait_falling().await;
        }
        for bit in (0..48u8).rev() {
            self.bus.wait_falling().await;
            self.bus.card_drive_cmd(Some(raw >> bit & 1 != 0));
        }
        self.bus.wait_falling().await;
        self.bus.card_drive_cmd(None);
    }

    //==============================================================================================
    // Data engine
    //==============================================================================================

    async fn data_loop(&self) {
        loop {
            let job = self.jobs.borrow_mut().pop_front();
            let Some(job) = job else {
                self.bus.wait_rising().await;
                continue;
            };
            match job {
                DataJob::Read {
                    function,
                    addr,
                    incr,
                    block,
                    count,
                } => self.serve_read(function, addr, incr, block, count).await,
                DataJob::Write {
                    function,
                    addr,
                    incr,
                    block,
                    count,
                } => self.serve_write(function, addr, incr, block, count).await,
            }
        }
    }

    async fn serve_read(&self, function: u8, addr: u32, incr: bool, block: bool, count: u16) {
        let (blocks, chunk) = if block {
            (count as u32, self.blocksize(function))
        } else {
            (1, if count == 0 { 512 } else { count as usize })
        };
        let mut addr = addr;
        for index in 0..blocks {
            if self.abort_req.get() {
                self.abort_req.set(false);
                return;
            }
            if let Some(limit) = self.stop_read_after.get() {
                if index >= limit {
                    return;
                }
            }
            let bytes: Vec<u8> = (0..chunk)
                .map(|i| self.reg_read(function, addr + if incr { i as u32 } else { 0 }))
                .collect();
            if incr {
                addr += chunk as u32;
            }
            self.drive_block(&bytes).await;
            if block {
                self.blocks_sent.set(self.blocks_sent.get() + 1);
            }
        }
    }

    async fn drive_block(&self, bytes: &[u8]) {
        let width = self.width.get();
        // Lead-in, and honour read-wait: the host parks lane 2 low while it
        // does not want the next block yet.
        for _ in 0..3 {
            self.bus.wait_falling().await;
        }
        while !self.bus.card_data_in(2) {
            self.bus.wait_falling().await;
        }
        self.bus.wait_falling().await;
        for lane in 0..width {
            self.bus.card_drive_data(lane, Some(false)); // start bit
        }
        if width == 4 {
            for &byte in bytes {
                self.bus.wait_falling().await;
                for lane in 0..4 {
                    self.bus
                        .card_drive_data(lane, Some(byte >> (4 + lane) & 1 != 0));
                }
                self.bus.wait_falling().await;
                for lane in 0..4 {
                    self.bus.card_drive_data(lane, Some(byte >> lane & 1 != 0));
                }
            }
            let crc = crc16_lanes(bytes);
            for bit in (0..16u16).rev() {
                self.bus.wait_falling().await;
                for lane in 0..4 {
                    self.bus
                        .card_drive_data(lane, Some(crc[lane as usize] >> bit & 1 != 0));
                }
            }
        } else {
            for &byte in bytes {
                for bit in (0..8u8).rev() {
                    self.bus.wait_falling().await;
                    self.bus.card_drive_data(0, Some(byte >> bit & 1 != 0));
                }
            }
            let crc = crc16(bytes, bytes.len() * 8);
            for bit in (0..16u16).rev() {
                self.bus.wait_falling().await;
                self.bus.card_drive_data(0, Some(crc >> bit & 1 != 0));
            }
        }
        self.bus.wait_falling().await;
        for lane in 0..width {
            self.bus.card_drive_data(lane, Some(true)); // stop bit
        }
        self.bus.wait_falling().await;
        for lane in 0..width {
            self.bus.card_drive_data(lane, None);
        }
    }

    async fn serve_write(&self, function: u8, addr: u32, incr: bool, block: bool, count: u16) {
        let (blocks, chunk) = if block {
            (count as u32, self.blocksize(function))
        } else {
            (1, if count == 0 { 512 } else { count as usize })
        };
        let mut addr = addr;
        for _ in 0..blocks {
            let record = self.receive_block(function, addr, chunk).await;
            for (i, &byte) in record.data.iter().enumerate() {
                self.reg_write(function, addr + if incr { i as u32 } else { 0 }, byte);
            }
            if incr {
                addr += chunk as u32;
            }
            self.write_records.borrow_mut().push(record);
            self.blocks_received.set(self.blocks_received.get() + 1);
            if self.abort_req.get() {
                self.abort_req.set(false);
                return;
            }
        }
    }

    async fn receive_block(&self, function: u8, addr: u32, len: usize) -> WriteRecord {
        let width = self.width.get();
        // Start bit: lane 0 drops while the host drives.
        loop {
            if !self.bus.card_data_in(0) {
                break;
            }
            self.bus.wait_rising().await;
        }
        let mut bits = 0usize;
        let mut data = Vec::with_capacity(len);
        for _ in 0..len {
            let mut byte = 0u8;
            if width == 4 {
                self.bus.wait_rising().await;
                for lane in 0..4 {
                    byte |= (self.bus.card_data_in(lane) as u8) << (4 + lane);
                }
                self.bus.wait_rising().await;
                for lane in 0..4 {
                    byte |= (self.bus.card_data_in(lane) as u8) << lane;
                }
                bits += 2;
            } else {
                for bit in (0..8u8).rev() {
                    self.bus.wait_rising().await;
                    byte |= (self.bus.card_data_in(0) as u8) << bit;
                    bits += 1;
                }
            }
            data.push(byte);
        }
        let mut wire_crc = [0u16; 4];
        for bit in (0..16u16).rev() {
            self.bus.wait_rising().await;
            for lane in 0..if width == 4 { 4u8 } else { 1 } {
                wire_crc[lane as usize] |= (self.bus.card_data_in(lane) as u16) << bit;
            }
            bits += 1;
        }
        self.bus.wait_rising().await;
        let stop_bit = self.bus.card_data_in(0);
        bits += 1;

        let crc_ok = if width == 4 {
            wire_crc == crc16_lanes(&data)
        } else {
            wire_crc[0] == crc16(&data, data.len() * 8)
        };

        // CRC-status token: the host samples it a fixed number of edges
        // after releasing the bus, so the alignment below matters.
        self.bus.wait_falling().await;
        self.bus.wait_falling().await;
        let token = if crc_ok { 0b010u8 } else { 0b101 };
        self.bus.wait_falling().await;
        self.bus.card_drive_data(0, Some(false)); // token start
        for bit in 0..3 {
            self.bus.wait_falling().await;
            self.bus.card_drive_data(0, Some(token >> bit & 1 != 0));
        }
        self.bus.wait_falling().await;
        self.bus.card_drive_data(0, Some(true)); // token end
        // Busy for a few byte times.
        self.bus.wait_falling().await;
        self.bus.card_drive_data(0, Some(false));
        for _ in 0..6 {
            self.bus.wait_falling().await;
        }
        self.bus.card_drive_data(0, Some(true));
        self.bus.wait_falling().await;
        self.bus.card_drive_data(0, None);

        WriteRecord {
            function,
            addr,
            data,
            bits_after_start: bits,
            wire_crc,
            crc_ok,
            stop_bit,
        }
    }
}
