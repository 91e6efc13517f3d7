//! The pad-level seam between this model and the simulator harness.

/// Simulation time since the start of the run.
pub type SimTime = fugit::NanosDurationU64;

/// Clock and pad access provided by the simulator harness.
///
/// The model drives commands on falling clock edges and samples responses on
/// rising edges (native mode); every suspension point of the protocol drivers
/// is one of the two edge waits below, so the harness's executor fully owns
/// scheduling. All accessors take `&self`: several protocol fibres (a data
/// transfer and an abort command, for instance) legitimately poke the bus
/// concurrently.
///
/// Expected pad values at reset, before the first clock edge:
/// `cmd_dir = 0`, `data_dir = 0`, `data_out = 0xff`, `cmd_out = 1`,
/// `clock = 0`. The PHY constructors establish these.
#[allow(async_fn_in_trait)]
pub trait SdioBus {
    /// Suspend until the next rising edge of the bus clock.
    async fn rising_edge(&self);

    /// Suspend until the next falling edge of the bus clock.
    async fn falling_edge(&self);

    /// Current simulation time, used for the millisecond-scale data timeout.
    fn now(&self) -> SimTime;

    /// Drive (`true`) or release (`false`) the command line.
    fn set_cmd_dir(&self, drive: bool);

    /// Value presented on the command line while it is driven.
    fn set_cmd_out(&self, level: bool);

    /// Sampled value of the command line.
    fn cmd_in(&self) -> bool;

    /// Per-lane direction vector, bit `n` drives data lane `n`. The upper
    /// four bits of the 8-bit pad group are reserved tri-state pads.
    fn set_data_dir(&self, lanes: u8);

    /// Currently configured direction vector.
    fn data_dir(&self) -> u8;

    /// Per-lane driven values.
    fn set_data_out(&self, value: u8);

    /// Currently driven values.
    fn data_out(&self) -> u8;

    /// Sampled per-lane data. Undriven lanes read as pulled-up (1).
    fn data_in(&self) -> u8;

    /// Read-modify-write of a single lane's direction bit.
    fn set_data_dir_lane(&self, lane: u8, drive: bool) {
        debug_assert!(lane < 8);
        let dir = self.data_dir();
        self.set_data_dir(dir & !(1 << lane) | (drive as u8) << lane);
    }

    /// Read-modify-write of a single lane's driven value.
    fn set_data_out_lane(&self, lane: u8, level: bool) {
        debug_assert!(lane < 8);
        let out = self.data_out();
        self.set_data_out(out & !(1 << lane) | (level as u8) << lane);
    }
}
