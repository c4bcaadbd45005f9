//! Ferrite core library
//!
//! Signal conditioning, clock recovery and demodulation for an LF/HF RFID
//! research console. A [`Session`] owns the sample trace, the demodulated
//! bit stream and the plot state; every operation takes the session (or its
//! buffers) explicitly so tests can run against a fresh one.
//!
//! The usual flow: load samples into the graph buffer, condition them
//! ([`conditioning`]), recover timing ([`clock`]), demodulate
//! ([`demod`]), then post-decode or print the bit stream.

pub mod bits;
pub mod buffer;
pub mod clock;
pub mod conditioning;
pub mod config;
pub mod demod;
pub mod demodbuf;
pub mod errors;
pub mod logging;
pub mod ndef;
pub mod probe;
pub mod session;
pub mod trace;

pub use buffer::{SampleBuffer, SignalProperties};
pub use config::CoreConfig;
pub use demodbuf::{DemodBuffer, Framing};
pub use errors::{CoreError, Result};
pub use session::Session;
