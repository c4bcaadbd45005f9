//! The time-domain sample buffer and its derived signal statistics.
//!
//! Samples are signed values in `[-127, 127]`; every write path saturates to
//! that range. Statistics skip the first few samples, which routinely carry
//! front-of-trace artefacts from the acquisition hardware.

use serde::{Deserialize, Serialize};

use crate::errors::{ArgError, Result};

/// Lowest / highest representable sample value.
pub const SAMPLE_MIN: i32 = -127;
pub const SAMPLE_MAX: i32 = 127;

/// Samples ignored at the front of the trace when computing statistics.
pub const STATS_SKIP: usize = 10;

/// Statistics require at least this many samples to be meaningful.
const STATS_MIN_SAMPLES: usize = 20;

/// Saturate an arbitrary wide value into the sample range.
#[inline]
pub fn clamp_sample(v: i64) -> i32 {
    v.clamp(SAMPLE_MIN as i64, SAMPLE_MAX as i64) as i32
}

/// Saturating sample addition.
#[inline]
pub fn sat_add(a: i32, b: i32) -> i32 {
    clamp_sample(a as i64 + b as i64)
}

/// Derived statistics of a [`SampleBuffer`]; a pure function of its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalProperties {
    pub min: i32,
    pub max: i32,
    pub mean: i32,
    /// `max - mean`; the headroom the demodulators slice against.
    pub amplitude: i32,
    pub is_noise: bool,
}

impl Default for SignalProperties {
    fn default() -> Self {
        Self {
            min: 0,
            max: 0,
            mean: 0,
            amplitude: 0,
            is_noise: true,
        }
    }
}

impl SignalProperties {
    /// Scan `samples` once, skipping the first [`STATS_SKIP`] entries.
    pub fn compute(samples: &[i32], noise_floor: i32) -> Self {
        if samples.len() < STATS_MIN_SAMPLES {
            return Self::default();
        }
        let mut min = SAMPLE_MAX;
        let mut max = SAMPLE_MIN;
        let mut sum: i64 = 0;
        for &s in &samples[STATS_SKIP..] {
            min = min.min(s);
            max = max.max(s);
            sum += s as i64;
        }
        let mean = (sum / (samples.len() - STATS_SKIP) as i64) as i32;
        let amplitude = max - mean;
        Self {
            min,
            max,
            mean,
            amplitude,
            is_noise: amplitude < noise_floor,
        }
    }

    /// Slicing thresholds at `fuzz_hi` / `fuzz_lo` percent of the peaks.
    ///
    /// Waves are rarely clipped symmetrically, so the low threshold is pulled
    /// up into the signal range when the whole trace sits above zero.
    pub fn hi_lo(&self, fuzz_hi: i32, fuzz_lo: i32) -> Option<(i32, i32)> {
        let mut high = self.max * fuzz_hi / 100;
        let mut low = if self.min < 0 {
            self.min * fuzz_lo / 100
        } else {
            let range = self.max - self.min;
            self.min + range * (100 - fuzz_lo) / 100
        };
        if high <= low {
            high = self.max;
            low = self.min;
        }
        if high > low {
            Some((high, low))
        } else {
            None
        }
    }
}

/// Owner of the time-domain trace all conditioners and demodulators read.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: Vec<i32>,
    max_len: usize,
}

impl SampleBuffer {
    pub fn new(max_len: usize) -> Self {
        Self {
            samples: Vec::new(),
            max_len,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn get(&self, i: usize) -> Option<i32> {
        self.samples.get(i).copied()
    }

    pub fn set(&mut self, i: usize, v: i32) -> Result<()> {
        let len = self.len();
        match self.samples.get_mut(i) {
            Some(slot) => {
                *slot = clamp_sample(v as i64);
                Ok(())
            }
            None => Err(ArgError::IndexOutOfBounds { index: i, len }.into()),
        }
    }

    /// Replace the contents, saturating each value and truncating at the
    /// buffer maximum.
    pub fn load<I>(&mut self, samples: I)
    where
        I: IntoIterator<Item = i32>,
    {
        self.samples.clear();
        for s in samples {
            if self.samples.len() >= self.max_len {
                break;
            }
            self.samples.push(clamp_sample(s as i64));
        }
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.samples
    }

    pub fn as_mut_slice(&mut self) -> &mut [i32] {
        &mut self.samples
    }

    /// Replace contents with an already-clamped vector (transform results).
    pub(crate) fn replace(&mut self, mut samples: Vec<i32>) {
        samples.truncate(self.max_len);
        self.samples = samples;
    }

    pub fn properties(&self, noise_floor: i32) -> SignalProperties {
        SignalProperties::compute(&self.samples, noise_floor)
    }

    /// Drop the first `n` samples.
    pub fn ltrim(&mut self, n: usize) -> Result<()> {
        if n == 0 || self.samples.len() <= n {
            return Err(ArgError::IndexOutOfBounds {
                index: n,
                len: self.samples.len(),
            }
            .into());
        }
        self.samples.drain(..n);
        Ok(())
    }

    /// Keep only the first `n` samples.
    pub fn rtrim(&mut self, n: usize) -> Result<()> {
        if n == 0 || self.samples.len() <= n {
            return Err(ArgError::IndexOutOfBounds {
                index: n,
                len: self.samples.len(),
            }
            .into());
        }
        self.samples.truncate(n);
        Ok(())
    }

    /// Keep the span `(start, end]`, leaving the start-position sample out.
    pub fn mtrim(&mut self, start: usize, end: usize) -> Result<()> {
        if start >= end || end > self.samples.len() {
            return Err(ArgError::IndexOutOfBounds {
                index: end,
                len: self.samples.len(),
            }
            .into());
        }
        let kept: Vec<i32> = self.samples[start + 1..end].to_vec();
        self.samples = kept;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_saturates_and_truncates() {
        let mut buf = SampleBuffer::new(4);
        buf.load([300, -300, 5, 6, 7]);
        assert_eq!(buf.as_slice(), &[127, -127, 5, 6]);
    }

    #[test]
    fn properties_skip_leading_artefacts() {
        let mut samples = vec![127; STATS_SKIP];
        samples.extend(vec![10; 100]);
        let props = SignalProperties::compute(&samples, 8);
        assert_eq!(props.max, 10);
        assert_eq!(props.mean, 10);
        assert!(props.is_noise);
    }

    #[test]
    fn dead_antenna_is_noise() {
        let samples = vec![0; 1000];
        let props = SignalProperties::compute(&samples, 8);
        assert!(props.is_noise);
    }

    #[test]
    fn square_wave_is_signal() {
        let samples: Vec<i32> = (0..1000).map(|i| if (i / 32) % 2 == 0 { 100 } else { -100 }).collect();
        let props = SignalProperties::compute(&samples, 8);
        assert!(!props.is_noise);
        assert_eq!(props.max, 100);
        assert_eq!(props.min, -100);
    }

    #[test]
    fn hi_lo_falls_back_on_overlap() {
        let props = SignalProperties {
            min: -1,
            max: 1,
            mean: 0,
            amplitude: 1,
            is_noise: true,
        };
        // 75% of +-1 truncates to 0/0, so the raw peaks are used
        assert_eq!(props.hi_lo(75, 75), Some((1, -1)));
    }

    #[test]
    fn mtrim_keeps_open_interval() {
        let mut buf = SampleBuffer::new(100);
        buf.load(0..10);
        buf.mtrim(2, 6).unwrap();
        assert_eq!(buf.as_slice(), &[3, 4, 5]);
    }

    #[test]
    fn trims_reject_out_of_bounds() {
        let mut buf = SampleBuffer::new(100);
        buf.load(0..10);
        assert!(buf.ltrim(10).is_err());
        assert!(buf.rtrim(12).is_err());
        assert!(buf.mtrim(6, 3).is_err());
    }
}
