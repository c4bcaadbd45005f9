//! The session value threaded through every command.
//!
//! One user-driven command session owns the sample buffer, the demod buffer
//! and its framing, the plot grid and cursor markers, the snapshot slots and
//! the debug log. Commands receive the session explicitly; there is no
//! hidden global state.

use crate::buffer::SampleBuffer;
use crate::config::CoreConfig;
use crate::demodbuf::{DemodBuffer, DemodSnapshot, Framing};
use crate::errors::Result;
use crate::logging::DebugLog;

/// Plot-grid overlay state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Grid {
    pub x: f64,
    pub y: f64,
    pub locked: bool,
    pub offset: usize,
}

/// The two cursor markers shown in the plot window.
#[derive(Debug, Clone, Copy, Default)]
pub struct Markers {
    pub a: usize,
    pub b: usize,
}

/// Cursor timescale: differential readings are `samples / factor` in `unit`.
#[derive(Debug, Clone)]
pub struct Timescale {
    pub factor: f64,
    pub unit: String,
}

impl Default for Timescale {
    fn default() -> Self {
        Self {
            factor: 1.0,
            unit: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub config: CoreConfig,
    pub graph: SampleBuffer,
    pub demod: DemodBuffer,
    pub framing: Framing,
    pub grid: Grid,
    pub markers: Markers,
    pub timescale: Timescale,
    pub log: DebugLog,
    graph_snapshot: Option<(Vec<i32>, Framing)>,
    demod_snapshot: Option<DemodSnapshot>,
}

impl Session {
    pub fn new(config: CoreConfig) -> Self {
        let graph = SampleBuffer::new(config.max_graph_len);
        let demod = DemodBuffer::new(config.max_demod_len);
        Self {
            config,
            graph,
            demod,
            framing: Framing::default(),
            grid: Grid::default(),
            markers: Markers::default(),
            timescale: Timescale::default(),
            log: DebugLog::default(),
            graph_snapshot: None,
            demod_snapshot: None,
        }
    }

    pub fn properties(&self) -> crate::buffer::SignalProperties {
        self.graph.properties(self.config.noise_floor)
    }

    /// Record the demod framing and align the plot grid with it.
    ///
    /// The offset is reduced modulo the clock (negative offsets wrap up);
    /// clocks outside `[8, N]` unlock the grid instead.
    pub fn set_clock_grid(&mut self, clock: usize, offset: i64) {
        let normalized = if clock > 0 {
            let c = clock as i64;
            offset.rem_euclid(c) as usize
        } else {
            offset.max(0) as usize
        };
        self.framing = Framing {
            clock,
            start_idx: normalized,
        };
        if clock < 8 || clock > self.graph.len() {
            self.grid.locked = false;
            self.grid.offset = 0;
            self.grid.x = 0.0;
        } else {
            self.grid.locked = true;
            self.grid.offset = normalized;
            self.grid.x = clock as f64;
        }
    }

    /// Install a freshly demodulated bit stream along with its framing.
    pub fn install_demod(&mut self, bits: &[u8], clock: usize, start_idx: i64) {
        self.demod.set(bits, 0);
        self.set_clock_grid(clock, start_idx);
    }

    /// Reset graph, demod, framing and markers.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.demod.clear();
        self.set_clock_grid(0, 0);
        self.markers = Markers::default();
    }

    /// Drop `n` samples from the front, keeping the framing anchored.
    pub fn ltrim(&mut self, n: usize) -> Result<()> {
        self.graph.ltrim(n)?;
        self.framing.start_idx = self.framing.start_idx.saturating_sub(n);
        Ok(())
    }

    pub fn rtrim(&mut self, n: usize) -> Result<()> {
        self.graph.rtrim(n)
    }

    pub fn mtrim(&mut self, start: usize, end: usize) -> Result<()> {
        self.graph.mtrim(start, end)?;
        self.set_clock_grid(0, 0);
        Ok(())
    }

    /// Snapshot the whole sample buffer plus framing.
    pub fn save_graph(&mut self) {
        self.graph_snapshot = Some((self.graph.as_slice().to_vec(), self.framing));
    }

    /// Restore the last graph snapshot, if any.
    pub fn restore_graph(&mut self) {
        if let Some((samples, framing)) = self.graph_snapshot.clone() {
            self.graph.load(samples);
            self.framing = framing;
        }
    }

    /// Snapshot the demod buffer, its length, clock and start index.
    pub fn save_demod(&mut self) {
        self.demod_snapshot = Some(DemodSnapshot {
            bits: self.demod.as_slice().to_vec(),
            framing: self.framing,
        });
    }

    /// Restore the last demod snapshot, if any.
    pub fn restore_demod(&mut self) {
        if let Some(snap) = self.demod_snapshot.clone() {
            self.demod.set(&snap.bits, 0);
            self.framing = snap.framing;
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(CoreConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_grid_wraps_negative_offsets() {
        let mut session = Session::default();
        session.graph.load(vec![0; 1000]);
        session.set_clock_grid(64, -10);
        assert_eq!(session.framing.clock, 64);
        assert_eq!(session.framing.start_idx, 54);
        assert!(session.grid.locked);
        assert_eq!(session.grid.offset, 54);
    }

    #[test]
    fn tiny_clock_unlocks_grid() {
        let mut session = Session::default();
        session.graph.load(vec![0; 1000]);
        session.set_clock_grid(4, 2);
        assert!(!session.grid.locked);
        assert_eq!(session.grid.x, 0.0);
    }

    #[test]
    fn demod_snapshot_round_trip() {
        let mut session = Session::default();
        session.graph.load(vec![0; 100]);
        session.install_demod(&[1, 0, 1, 1], 32, 5);
        session.save_demod();

        session.install_demod(&[0, 0, 0], 64, 9);
        session.restore_demod();

        assert_eq!(session.demod.as_slice(), &[1, 0, 1, 1]);
        assert_eq!(session.framing.clock, 32);
        assert_eq!(session.framing.start_idx, 5);
    }

    #[test]
    fn graph_snapshot_round_trip() {
        let mut session = Session::default();
        session.graph.load(vec![1, 2, 3, 4, 5, 6, 7, 8]);
        session.save_graph();
        session.graph.ltrim(4).unwrap();
        session.restore_graph();
        assert_eq!(session.graph.as_slice(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn ltrim_pulls_framing_back() {
        let mut session = Session::default();
        session.graph.load(vec![0; 1000]);
        session.set_clock_grid(50, 120);
        session.ltrim(100).unwrap();
        assert_eq!(session.framing.start_idx, 0);
    }
}
