//! Configuration for the signal core.
use serde::{Deserialize, Serialize};

/// Tunables shared by every operation in a session.
///
/// The defaults mirror the console this core was built for: traces of up to
/// 40 000 signed 8-bit samples and demodulated frames of up to 1024 bits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Maximum number of samples held by a [`SampleBuffer`](crate::buffer::SampleBuffer).
    pub max_graph_len: usize,
    /// Maximum number of bit-valued bytes held by the demod buffer.
    pub max_demod_len: usize,
    /// Amplitude (max − mean) under which a trace counts as noise.
    /// Chosen so a dead antenna trace classifies as noisy.
    pub noise_floor: i32,
    /// Samples trimmed from the front before probe-time PSK demodulation,
    /// letting the antenna settle.
    pub psk_settle_trim: usize,
    /// Default decode error budget for the raw demodulators.
    pub default_max_err: usize,
    /// Default decode error budget for the Manchester / biphase post-decoders.
    pub default_decode_max_err: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_graph_len: 40_000,
            max_demod_len: 1024,
            noise_floor: 8,
            psk_settle_trim: 160,
            default_max_err: 100,
            default_decode_max_err: 20,
        }
    }
}
