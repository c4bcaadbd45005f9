//! Per-modulation symbol extractors and bit-stream post-decoders.
//!
//! The raw demodulators (`ask`, `fsk`, `nrz`, `psk`) consume a conditioned
//! sample trace and produce a bit-per-byte stream plus framing. The
//! post-decoders (`decode`, `em410x`) operate purely on an existing bit
//! stream.

pub mod ask;
pub mod decode;
pub mod em410x;
pub mod fsk;
pub mod nrz;
pub mod psk;
