//! Device-link implementations for the console.
//!
//! The real acquisition hardware is out of scope; the console ships a
//! null device plus a replay device that serves a raw capture file.

use std::path::Path;

use ferrite_core::errors::{Result, TraceError};
use ferrite_core::trace::{DeviceLink, FetchResult, TuningReport};

/// No hardware attached; every operation reports a missing device.
pub struct NullDevice;

impl DeviceLink for NullDevice {
    fn fetch_big_buffer(&mut self, _start: usize, _n: usize) -> Result<FetchResult> {
        Err(TraceError::NoDevice.into())
    }

    fn measure_tuning(&mut self) -> Result<TuningReport> {
        Err(TraceError::NoDevice.into())
    }

    fn clear_buffer(&mut self) -> Result<()> {
        Err(TraceError::NoDevice.into())
    }
}

/// Serves big-buffer reads from a raw capture file.
pub struct ReplayDevice {
    data: Vec<u8>,
    bits_per_sample: u8,
}

impl ReplayDevice {
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(TraceError::from)?;
        Ok(Self {
            data,
            bits_per_sample: 8,
        })
    }
}

impl DeviceLink for ReplayDevice {
    fn fetch_big_buffer(&mut self, start: usize, n: usize) -> Result<FetchResult> {
        if start >= self.data.len() {
            return Err(TraceError::Empty.into());
        }
        let end = (start + n).min(self.data.len());
        Ok(FetchResult {
            bytes: self.data[start..end].to_vec(),
            bits_per_sample: self.bits_per_sample,
        })
    }

    fn measure_tuning(&mut self) -> Result<TuningReport> {
        Err(TraceError::NoDevice.into())
    }

    fn clear_buffer(&mut self) -> Result<()> {
        self.data.clear();
        Ok(())
    }
}
