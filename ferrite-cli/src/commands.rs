//! The flat `data` command namespace and its dispatcher.
//!
//! Each console line is tokenized and fed back through the clap parser, so
//! the interactive session and `-x` batch mode share one grammar.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ferrite_core::clock;
use ferrite_core::conditioning;
use ferrite_core::demod::{ask, decode, em410x, fsk, nrz, psk};
use ferrite_core::demodbuf::PrintOptions;
use ferrite_core::errors::{ArgError, CoreError, Result, TraceError};
use ferrite_core::logging::DebugLevel;
use ferrite_core::trace::{self, DeviceLink};
use ferrite_core::{bits, ndef, probe, Session};

use crate::logging::{LogEvent, StructuredLogger};

/// Outcome vocabulary every command maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    InvArg,
    Soft,
    Malloc,
    Timeout,
    File,
}

impl ExitStatus {
    pub fn name(self) -> &'static str {
        match self {
            ExitStatus::Success => "SUCCESS",
            ExitStatus::InvArg => "INVARG",
            ExitStatus::Soft => "ESOFT",
            ExitStatus::Malloc => "EMALLOC",
            ExitStatus::Timeout => "ETIMEOUT",
            ExitStatus::File => "EFILE",
        }
    }

    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::InvArg => 1,
            ExitStatus::Soft => 2,
            ExitStatus::Malloc => 3,
            ExitStatus::Timeout => 4,
            ExitStatus::File => 5,
        }
    }
}

fn status_of(err: &CoreError) -> ExitStatus {
    match err {
        CoreError::Arg(_) => ExitStatus::InvArg,
        CoreError::Demod(_) | CoreError::Clock(_) => ExitStatus::Soft,
        CoreError::Trace(t) => match t {
            TraceError::Timeout { .. } | TraceError::NoDevice => ExitStatus::Timeout,
            _ => ExitStatus::File,
        },
    }
}

#[derive(Parser, Debug)]
#[command(name = "data", about = "Graph and demodulation commands")]
struct DataCli {
    #[command(subcommand)]
    cmd: DataCommand,
}

#[derive(Subcommand, Debug)]
enum DataCommand {
    /// Demodulate the graph buffer: ab|am|ar|fs|nr|p1|p2 plus modulation args
    Rawdemod {
        /// Two-character modulation tag
        tag: String,
        /// Modulation-specific arguments (clock, invert, maxErr, ...)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Manchester decode the bit stream in the demod buffer
    Manrawdecode {
        #[arg(short = 'i', long = "inv")]
        invert: bool,
        #[arg(long = "err", default_value_t = 20)]
        max_err: usize,
    },
    /// Biphase decode the bit stream in the demod buffer
    Biphaserawdecode {
        /// Adjust the decode start position by one
        #[arg(short = 'o', long = "offset")]
        offset: bool,
        #[arg(short = 'i', long = "inv")]
        invert: bool,
        #[arg(long = "err", default_value_t = 20)]
        max_err: usize,
    },
    /// Detect the bit clock of the wave in the graph buffer
    Detectclock {
        #[arg(short = 'A', long = "ASK")]
        ask: bool,
        #[arg(short = 'F', long = "FSK")]
        fsk: bool,
        #[arg(short = 'N', long = "NRZ")]
        nrz: bool,
        #[arg(short = 'P', long = "PSK")]
        psk: bool,
    },
    /// Autocorrelate over a window to find repeating sequences
    Autocorr {
        /// Save the correlation trace back to the graph buffer
        #[arg(short = 'g')]
        graph: bool,
        #[arg(short = 'w', long = "win", default_value_t = 4000)]
        window: usize,
    },
    /// Rail the wave on steep sample-to-sample edges
    Askedgedetect {
        #[arg(short = 't', long = "thres", default_value_t = 25)]
        threshold: i32,
    },
    /// Keep every n-th sample
    Decimate {
        #[arg(default_value_t = 2)]
        factor: usize,
    },
    /// Expand each sample pair into n interpolated samples
    Undecimate {
        #[arg(default_value_t = 2)]
        factor: usize,
    },
    /// Two-sided threshold into a -1/0/+1 wave
    Dirthreshold {
        #[arg(short = 'u', long = "up")]
        up: i32,
        #[arg(short = 'd', long = "down")]
        down: i32,
    },
    /// Shift every sample up or down, saturating
    Shiftgraphzero {
        #[arg(short = 'n')]
        shift: i32,
    },
    /// Trim samples from the left of the trace
    Ltrim {
        #[arg(short = 'i', long = "idx")]
        index: usize,
    },
    /// Trim samples from the right of the trace
    Rtrim {
        #[arg(short = 'i', long = "idx")]
        index: usize,
    },
    /// Keep only the span between two points
    Mtrim {
        #[arg(short = 's', long = "start")]
        start: usize,
        #[arg(short = 'e', long = "end")]
        end: usize,
    },
    /// Normalize the trace to a 256-count swing
    Norm,
    /// Remove the DC offset from the trace
    Hpf,
    /// Show the plot window
    Plot,
    /// Hide the plot window
    Hide,
    /// Clear the graph buffer (and the device big buffer, if attached)
    Clear,
    /// Overlay a grid on the plot window
    Grid {
        #[arg(short = 'x', default_value_t = 0.0)]
        x: f64,
        #[arg(short = 'y', default_value_t = 0.0)]
        y: f64,
    },
    /// Set the two cursor markers
    Setgraphmarkers {
        #[arg(short = 'a', default_value_t = 0)]
        a: usize,
        #[arg(short = 'b', default_value_t = 0)]
        b: usize,
    },
    /// Set the cursor timescale from the sampling rate
    Timescale {
        #[arg(long = "sr")]
        sample_rate: f64,
        #[arg(short = 'u', long = "unit")]
        unit: Option<String>,
    },
    /// Hard-slice the graph buffer into a 0/1 stream
    Getbitstream,
    /// Convert a 0/1 graph buffer to -127/127 levels
    Convertbitstream,
    /// Replace samples with the running zero-crossing period
    Zerocrossings,
    /// Project an FSK wave onto an NRZ-style wave
    Fsktonrz {
        #[arg(short = 'c', long = "clk", default_value_t = 0)]
        clock: usize,
        #[arg(long = "low", default_value_t = 0)]
        fc_low: usize,
        #[arg(long = "hi", default_value_t = 0)]
        fc_high: usize,
    },
    /// Apply the one-register low-pass IIR filter
    Iir {
        #[arg(short = 'n')]
        factor: u8,
    },
    /// Convert a binary string to hex
    Bin2hex {
        #[arg(short = 'd', long = "data")]
        data: String,
    },
    /// Convert hex to a binary string
    Hex2bin {
        #[arg(short = 'd', long = "data")]
        data: String,
    },
    /// Print the demod buffer
    Print {
        #[arg(short = 'i', long = "inv")]
        invert: bool,
        #[arg(short = 'o', long = "offset", default_value_t = 0)]
        offset: usize,
        /// Strip leading zeroes before printing
        #[arg(short = 's', long = "strip")]
        strip: bool,
        /// Output hex instead of binary
        #[arg(short = 'x', long = "hex")]
        hex: bool,
    },
    /// Load a text trace into the graph buffer
    Load {
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// Save the graph buffer to a text trace or WAV file
    Save {
        #[arg(short = 'w', long = "wave")]
        wave: bool,
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// Fetch raw samples from the device into the graph buffer
    Samples {
        #[arg(short = 'n', default_value_t = 0)]
        count: usize,
        #[arg(short = 'v', long = "verbose")]
        verbose: bool,
    },
    /// Fetch device samples as a bit string, one graph point per bit
    Bitsamples,
    /// Dump the device big buffer as hex
    Hexsamples {
        #[arg(short = 'b', long = "breaks", default_value_t = 16)]
        breaks: usize,
        #[arg(short = 'n', default_value_t = 8)]
        count: usize,
        #[arg(short = 'o', long = "offset", default_value_t = 0)]
        offset: usize,
    },
    /// Identify clock and modulation of the wave in the graph buffer
    Modulation,
    /// Decode NDEF records from hex
    Ndef {
        #[arg(short = 'd', long = "data")]
        data: String,
        #[arg(short = 'v', long = "verbose")]
        verbose: bool,
    },
    /// Set the client-side debug level
    Setdebugmode {
        #[arg(short = '0')]
        off: bool,
        #[arg(short = '1')]
        debug: bool,
        #[arg(short = '2')]
        verbose: bool,
    },
    /// Measure antenna tuning
    Tune,
}

pub struct Console {
    pub session: Session,
    pub device: Box<dyn DeviceLink>,
    pub logger: StructuredLogger,
    plot_visible: bool,
}

impl Console {
    pub fn new(session: Session, device: Box<dyn DeviceLink>, logger: StructuredLogger) -> Self {
        Self {
            session,
            device,
            logger,
            plot_visible: false,
        }
    }

    /// Run one console line; returns the command's exit status.
    pub fn run_line(&mut self, line: &str) -> ExitStatus {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return ExitStatus::Success;
        }
        self.logger.log(LogEvent::CommandStart { line: trimmed });
        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        let tokens = if tokens.first() == Some(&"data") {
            &tokens[1..]
        } else {
            &tokens[..]
        };
        let parsed = DataCli::try_parse_from(std::iter::once("data").chain(tokens.iter().copied()));
        let status = match parsed {
            Ok(cli) => match self.dispatch(cli.cmd) {
                Ok(()) => ExitStatus::Success,
                Err(err) => {
                    println!("failed: {err}");
                    status_of(&err)
                }
            },
            Err(err) => {
                // clap renders its own help / usage text
                let _ = err.print();
                ExitStatus::InvArg
            }
        };
        self.logger.log(LogEvent::CommandResult {
            line: trimmed,
            status: status.name(),
        });
        status
    }

    fn dispatch(&mut self, cmd: DataCommand) -> Result<()> {
        match cmd {
            DataCommand::Rawdemod { tag, args } => self.cmd_rawdemod(&tag, &args),
            DataCommand::Manrawdecode { invert, max_err } => self.cmd_manrawdecode(invert, max_err),
            DataCommand::Biphaserawdecode {
                offset,
                invert,
                max_err,
            } => self.cmd_biphaserawdecode(offset as usize, invert, max_err),
            DataCommand::Detectclock { ask, fsk, nrz, psk } => {
                self.cmd_detectclock(ask, fsk, nrz, psk)
            }
            DataCommand::Autocorr { graph, window } => self.cmd_autocorr(graph, window),
            DataCommand::Askedgedetect { threshold } => {
                println!("using threshold {threshold}");
                conditioning::edge_detect(&mut self.session.graph, threshold);
                Ok(())
            }
            DataCommand::Decimate { factor } => {
                conditioning::decimate(&mut self.session.graph, factor)?;
                println!("decimated by {factor}");
                Ok(())
            }
            DataCommand::Undecimate { factor } => {
                conditioning::interpolate(&mut self.session.graph, factor)?;
                println!("interpolated by {factor}, {} samples", self.session.graph.len());
                Ok(())
            }
            DataCommand::Dirthreshold { up, down } => {
                println!("applying up threshold {up}, down threshold {down}");
                conditioning::directional_threshold(&mut self.session.graph, up, down);
                Ok(())
            }
            DataCommand::Shiftgraphzero { shift } => {
                conditioning::shift(&mut self.session.graph, shift);
                conditioning::normalize(&mut self.session.graph);
                Ok(())
            }
            DataCommand::Ltrim { index } => self.session.ltrim(index),
            DataCommand::Rtrim { index } => self.session.rtrim(index),
            DataCommand::Mtrim { start, end } => self.session.mtrim(start, end),
            DataCommand::Norm => {
                conditioning::normalize(&mut self.session.graph);
                Ok(())
            }
            DataCommand::Hpf => {
                conditioning::hpf(&mut self.session.graph);
                Ok(())
            }
            DataCommand::Plot => {
                self.plot_visible = true;
                println!("graph window shown");
                Ok(())
            }
            DataCommand::Hide => {
                self.plot_visible = false;
                println!("graph window hidden");
                Ok(())
            }
            DataCommand::Clear => {
                if let Err(err) = self.device.clear_buffer() {
                    self.session.log.debug("DEVICE", format!("clear skipped: {err}"));
                }
                self.session.clear();
                Ok(())
            }
            DataCommand::Grid { x, y } => {
                println!("setting X {x:.0} Y {y:.0}");
                self.session.grid.x = x;
                self.session.grid.y = y;
                Ok(())
            }
            DataCommand::Setgraphmarkers { a, b } => {
                println!("setting orange {a} blue {b}");
                self.session.markers.a = a;
                self.session.markers.b = b;
                Ok(())
            }
            DataCommand::Timescale { sample_rate, unit } => {
                if sample_rate <= 0.0 {
                    return Err(ArgError::InvalidValue {
                        name: "timescale factor",
                        value: sample_rate as i64,
                    }
                    .into());
                }
                self.session.timescale.factor = sample_rate;
                self.session.timescale.unit = unit.unwrap_or_default();
                Ok(())
            }
            DataCommand::Getbitstream => {
                conditioning::hpf(&mut self.session.graph);
                for s in self.session.graph.as_mut_slice() {
                    *s = if *s >= 1 { 1 } else { 0 };
                }
                Ok(())
            }
            DataCommand::Convertbitstream => {
                for s in self.session.graph.as_mut_slice() {
                    *s = if *s >= 1 { 127 } else { -127 };
                }
                Ok(())
            }
            DataCommand::Zerocrossings => {
                conditioning::hpf(&mut self.session.graph);
                conditioning::zero_crossings(&mut self.session.graph);
                Ok(())
            }
            DataCommand::Fsktonrz {
                clock,
                fc_low,
                fc_high,
            } => {
                self.session.set_clock_grid(0, 0);
                self.session.demod.clear();
                let noise_floor = self.session.config.noise_floor;
                let (clk, high, low) = conditioning::fsk_to_nrz(
                    &mut self.session.graph,
                    noise_floor,
                    clock,
                    fc_high,
                    fc_low,
                )?;
                conditioning::normalize(&mut self.session.graph);
                println!("converted with clock {clk}, FC/{high} FC/{low}");
                Ok(())
            }
            DataCommand::Iir { factor } => {
                conditioning::iir_lowpass(&mut self.session.graph, factor);
                Ok(())
            }
            DataCommand::Bin2hex { data } => {
                let parsed = bits::parse_bin(&data)?;
                let (hex, padded) = bits::bin_to_hex(&parsed);
                if padded > 0 {
                    println!("[right padded with {padded} zeroes]");
                }
                println!("{hex}");
                Ok(())
            }
            DataCommand::Hex2bin { data } => {
                let parsed = bits::hex_to_bin(&data)?;
                let text: String = parsed.iter().map(|b| if *b == 1 { '1' } else { '0' }).collect();
                println!("{text}");
                Ok(())
            }
            DataCommand::Print {
                invert,
                offset,
                strip,
                hex,
            } => {
                let rendered = self.session.demod.render(PrintOptions {
                    offset,
                    strip_leading_zeroes: strip,
                    invert,
                    hex,
                })?;
                println!("demod buffer:\n{rendered}");
                Ok(())
            }
            DataCommand::Load { file } => self.cmd_load(&file),
            DataCommand::Save { wave, file } => self.cmd_save(wave, &file),
            DataCommand::Samples { count, verbose } => self.cmd_samples(count, verbose),
            DataCommand::Bitsamples => self.cmd_bitsamples(),
            DataCommand::Hexsamples {
                breaks,
                count,
                offset,
            } => self.cmd_hexsamples(breaks, count, offset),
            DataCommand::Modulation => self.cmd_modulation(),
            DataCommand::Ndef { data, verbose } => self.cmd_ndef(&data, verbose),
            DataCommand::Setdebugmode { off, debug, verbose } => {
                if off as u8 + debug as u8 + verbose as u8 > 1 {
                    return Err(ArgError::ConflictingFlags { flags: "-0, -1, -2" }.into());
                }
                let level = if verbose {
                    DebugLevel::Verbose
                } else if debug {
                    DebugLevel::Debug
                } else {
                    DebugLevel::Off
                };
                self.session.log.set_level(level);
                println!("client debug level... {} ( {} )", level.as_u8(), level);
                Ok(())
            }
            DataCommand::Tune => self.cmd_tune(),
        }
    }

    fn cmd_rawdemod(&mut self, tag: &str, args: &[String]) -> Result<()> {
        let (nums, amplify, _st) = split_demod_args(args);
        let pick = |idx: usize, default: i64| nums.get(idx).copied().unwrap_or(default);
        match tag {
            "am" | "ar" => {
                let (clock, invert) = clock_invert_quirk(pick(0, 0), pick(1, 0))?;
                let opts = ask::AskOptions {
                    clock,
                    invert,
                    max_err: pick(2, 100).max(0) as usize,
                    max_len: pick(3, 0).max(0) as usize,
                    amplify,
                    variant: if tag == "am" {
                        ask::AskVariant::Manchester
                    } else {
                        ask::AskVariant::Raw
                    },
                    em_search: tag == "am",
                };
                let report = ask::run_ask(&mut self.session, &opts)?;
                let kind = if tag == "am" { "ASK/Manchester" } else { "ASK/Raw" };
                println!(
                    "{kind} - clock RF/{} - {} bits ({} errors)",
                    report.clock, report.bits, report.errors
                );
                self.print_demod_quiet();
                if let Some(em) = report.em {
                    println!("EM410x pattern found");
                    print_em410x(&em);
                }
                Ok(())
            }
            "ab" => {
                let (clk, invert) = clock_invert_quirk(pick(1, 0), pick(2, 0))?;
                let opts = ask::AskBiphaseOptions {
                    offset: pick(0, 0).max(0) as usize,
                    clock: clk,
                    invert,
                    max_err: pick(3, 50).max(0) as usize,
                    max_len: pick(4, 0).max(0) as usize,
                    amplify,
                };
                let report = ask::run_ask_biphase(&mut self.session, &opts)?;
                println!(
                    "ASK/Biphase - clock RF/{} - {} bits ({} errors)",
                    report.clock, report.bits, report.errors
                );
                self.print_demod_quiet();
                Ok(())
            }
            "fs" => {
                let (clock, invert) = if nums.len() == 1 && nums[0] == 1 {
                    (0, true)
                } else {
                    clock_invert_quirk(pick(0, 0), pick(1, 0))?
                };
                let opts = fsk::FskOptions {
                    clock,
                    invert,
                    fc_high: pick(2, 0).max(0) as u8,
                    fc_low: pick(3, 0).max(0) as u8,
                };
                let report = fsk::run_fsk(&mut self.session, &opts)?;
                println!(
                    "{} - clock RF/{} FC/{}/{} - {} bits",
                    report.variant, report.clock, report.fc_high, report.fc_low, report.bits
                );
                self.print_demod_quiet();
                Ok(())
            }
            "nr" => {
                let (clock, invert) = clock_invert_quirk(pick(0, 0), pick(1, 0))?;
                let opts = nrz::NrzOptions {
                    clock,
                    invert,
                    max_err: pick(2, 100).max(0) as usize,
                };
                let report = nrz::run_nrz(&mut self.session, &opts)?;
                println!("NRZ - clock RF/{} - {} bits", report.clock, report.bits);
                self.print_demod_quiet();
                Ok(())
            }
            "p1" | "p2" => {
                let (clock, invert) = clock_invert_quirk(pick(0, 0), pick(1, 0))?;
                let opts = psk::PskOptions {
                    clock,
                    invert,
                    max_err: pick(2, 100).max(0) as usize,
                };
                let report = psk::run_psk(&mut self.session, &opts)?;
                if tag == "p2" {
                    let mut stream = self.session.demod.as_slice().to_vec();
                    decode::psk1_to_psk2(&mut stream);
                    let clock = self.session.framing.clock;
                    let start = self.session.framing.start_idx as i64;
                    self.session.install_demod(&stream, clock, start);
                }
                println!(
                    "PSK{} - clock RF/{} carrier {} - {} bits ({} errors)",
                    if tag == "p2" { 2 } else { 1 },
                    report.clock,
                    report.carrier,
                    report.bits,
                    report.errors
                );
                self.print_demod_quiet();
                Ok(())
            }
            _ => Err(ArgError::UnknownModulation {
                tag: tag.to_string(),
            }
            .into()),
        }
    }

    fn print_demod_quiet(&self) {
        if let Ok(rendered) = self.session.demod.render(PrintOptions::default()) {
            println!("{rendered}");
        }
    }

    fn cmd_manrawdecode(&mut self, invert: bool, max_err: usize) -> Result<()> {
        if self.session.demod.is_empty() {
            return Err(ferrite_core::errors::DemodError::EmptyDemodBuffer.into());
        }
        if !self.session.demod.is_bit_stream() {
            return Err(ferrite_core::errors::DemodError::NotBinary.into());
        }
        let dec = decode::manchester_decode(self.session.demod.as_slice(), invert)?;
        if dec.errors > max_err {
            return Err(ferrite_core::errors::DemodError::TooManyErrors {
                errors: dec.errors,
                budget: max_err,
            }
            .into());
        }
        if dec.errors > 0 {
            println!(
                "# {} errors found during demod (shown as . in the stream) at {:?}",
                dec.errors, dec.error_positions
            );
        }
        let clock = self.session.framing.clock;
        let start = self.session.framing.start_idx as i64 + (clock * dec.offset) as i64 / 2;
        self.session.install_demod(&dec.bits, clock, start);
        println!("manchester decoded {}", if invert { "( inverted )" } else { "" });
        self.print_demod_quiet();
        if dec.errors == 0 {
            if let Some(em) = em410x::decode(self.session.demod.as_slice()) {
                print_em410x(&em);
            }
        }
        Ok(())
    }

    fn cmd_biphaserawdecode(&mut self, offset: usize, invert: bool, max_err: usize) -> Result<()> {
        if self.session.demod.is_empty() {
            return Err(ferrite_core::errors::DemodError::EmptyDemodBuffer.into());
        }
        let dec = decode::biphase_decode(self.session.demod.as_slice(), offset, invert)?;
        if dec.errors > max_err {
            return Err(ferrite_core::errors::DemodError::TooManyErrors {
                errors: dec.errors,
                budget: max_err,
            }
            .into());
        }
        if dec.errors > 0 {
            println!(
                "# {} errors found during demod (shown as . in the stream)",
                dec.errors
            );
        }
        let clock = self.session.framing.clock;
        let start = self.session.framing.start_idx as i64 + (clock * dec.offset) as i64 / 2;
        self.session.install_demod(&dec.bits, clock, start);
        println!(
            "biphase decoded using offset {}{}",
            dec.offset,
            if invert { " ( inverted )" } else { "" }
        );
        self.print_demod_quiet();
        Ok(())
    }

    fn cmd_detectclock(&mut self, ask: bool, fsk: bool, nrz: bool, psk: bool) -> Result<()> {
        if ask as u8 + fsk as u8 + nrz as u8 + psk as u8 != 1 {
            return Err(ArgError::ConflictingFlags {
                flags: "-A, -F, -N, -P",
            }
            .into());
        }
        let props = self.session.properties();
        let samples: Vec<i32> = self.session.graph.as_slice().to_vec();
        if ask {
            let est = clock::detect_ask_clock(&samples, &props, 0)?;
            self.session.set_clock_grid(est.clock, est.start as i64);
            println!("ASK clock RF/{}", est.clock);
        } else if fsk {
            let timing = clock::fsk_clocks(&samples, &props)?;
            self.session
                .set_clock_grid(timing.clock, timing.first_edge as i64);
            println!(
                "FSK clock RF/{} (FC/{} FC/{})",
                timing.clock, timing.fc_high, timing.fc_low
            );
        } else if nrz {
            let est = clock::detect_nrz_clock(&samples, &props, 0)?;
            self.session.set_clock_grid(est.clock, est.start as i64);
            println!("NRZ clock RF/{}", est.clock);
        } else {
            let est = clock::detect_psk_clock(&samples, &props, 0)?;
            self.session.set_clock_grid(est.clock, est.start as i64);
            println!("PSK clock RF/{} carrier {}", est.clock, est.carrier);
        }
        Ok(())
    }

    fn cmd_autocorr(&mut self, save_graph: bool, window: usize) -> Result<()> {
        println!("using window size {window}");
        let samples: Vec<i32> = self.session.graph.as_slice().to_vec();
        if samples.is_empty() {
            return Err(TraceError::Empty.into());
        }
        let ac = clock::autocorrelate(&samples, window)?;
        let estimate = match ac.distance {
            Some(d) => {
                println!("possible visible correlation {d} samples");
                d
            }
            None if ac.tracked > 1 => {
                println!("possible correlation {} samples", ac.tracked);
                ac.tracked
            }
            None => {
                println!("no repeating pattern found, try increasing the window");
                0
            }
        };
        if save_graph {
            self.session.graph.load(ac.trace.iter().copied());
            self.session.set_clock_grid(estimate, ac.peak as i64);
            self.session.markers.a = ac.second_peak;
            self.session.markers.b = ac.second_peak + estimate;
            self.session.demod.clear();
        }
        Ok(())
    }

    fn cmd_load(&mut self, file: &PathBuf) -> Result<()> {
        let reader = BufReader::new(File::open(file).map_err(TraceError::from)?);
        let samples = trace::load_text_trace(reader, self.session.config.max_graph_len)?;
        self.session.graph.load(samples);
        conditioning::hpf(&mut self.session.graph);
        self.session.set_clock_grid(0, 0);
        self.session.demod.clear();
        println!("loaded {} samples", self.session.graph.len());
        Ok(())
    }

    fn cmd_save(&mut self, wave: bool, file: &PathBuf) -> Result<()> {
        if wave {
            let spec = hound::WavSpec {
                channels: 1,
                sample_rate: 125_000,
                bits_per_sample: 8,
                sample_format: hound::SampleFormat::Int,
            };
            let mut writer = hound::WavWriter::create(file, spec)
                .map_err(|e| TraceError::Io(std::io::Error::other(e)))?;
            for &s in self.session.graph.as_slice() {
                writer
                    .write_sample(s.clamp(-127, 127) as i8)
                    .map_err(|e| TraceError::Io(std::io::Error::other(e)))?;
            }
            writer
                .finalize()
                .map_err(|e| TraceError::Io(std::io::Error::other(e)))?;
        } else {
            let writer = BufWriter::new(File::create(file).map_err(TraceError::from)?);
            trace::save_text_trace(writer, self.session.graph.as_slice())?;
        }
        println!("saved {} samples to {}", self.session.graph.len(), file.display());
        Ok(())
    }

    fn cmd_samples(&mut self, count: usize, verbose: bool) -> Result<()> {
        let n = if count == 0 {
            self.session.config.max_graph_len
        } else {
            count
        };
        if verbose {
            println!("reading {n} bytes from device memory");
        }
        let fetched = self.device.fetch_big_buffer(0, n)?;
        if verbose {
            println!(
                "data fetched, {} bits per sample",
                fetched.bits_per_sample
            );
        }
        let samples = trace::unpack_device_samples(&fetched.bytes, fetched.bits_per_sample);
        self.session.graph.load(samples);
        self.session.set_clock_grid(0, 0);
        self.session.demod.clear();
        println!("got {} samples", self.session.graph.len());
        Ok(())
    }

    fn cmd_bitsamples(&mut self) -> Result<()> {
        let fetched = self.device.fetch_big_buffer(0, 12_288)?;
        let samples = trace::unpack_bit_samples(&fetched.bytes);
        self.session.graph.load(samples);
        println!("got {} bit samples", self.session.graph.len());
        Ok(())
    }

    fn cmd_hexsamples(&mut self, breaks: usize, count: usize, offset: usize) -> Result<()> {
        if breaks == 0 {
            return Err(ArgError::InvalidValue {
                name: "row break",
                value: 0,
            }
            .into());
        }
        let fetched = self.device.fetch_big_buffer(offset, count)?;
        for row in fetched.bytes.chunks(breaks) {
            let line: Vec<String> = row.iter().map(|b| format!("{b:02x}")).collect();
            println!("{}", line.join(" "));
        }
        Ok(())
    }

    fn cmd_modulation(&mut self) -> Result<()> {
        let hits = probe::probe(&mut self.session)?;
        println!("found [{}] possible matches for modulation", hits.len());
        for (i, hit) in hits.iter().enumerate() {
            println!("--[{}]--------------------", i + 1);
            println!(" {hit}");
        }
        Ok(())
    }

    fn cmd_ndef(&mut self, data: &str, verbose: bool) -> Result<()> {
        let bytes = parse_hex_bytes(data)?;
        let records = ndef::parse_message(&bytes)?;
        println!("decoded {} NDEF records", records.len());
        for (i, record) in records.iter().enumerate() {
            println!("[{}] {}", i + 1, record.describe());
            if verbose {
                println!(
                    "    tnf {:?}, type {} bytes, id {} bytes, payload {} bytes{}",
                    record.tnf,
                    record.record_type.len(),
                    record.id.len(),
                    record.payload.len(),
                    if record.chunked { ", chunked" } else { "" }
                );
            }
        }
        Ok(())
    }

    fn cmd_tune(&mut self) -> Result<()> {
        self.session.demod.clear();
        self.session.set_clock_grid(0, 0);
        let report = self.device.measure_tuning()?;
        println!("---------- LF Antenna ----------");
        if report.v_lf125_mv > 1000 {
            println!("LF antenna: {:5.2} V - 125.00 kHz", report.v_lf125_mv as f64 / 1000.0);
        }
        if report.v_lf134_mv > 1000 {
            println!("LF antenna: {:5.2} V - 134.83 kHz", report.v_lf134_mv as f64 / 1000.0);
        }
        if report.peak_v_mv > 1000 && report.peak_divisor > 0 {
            println!(
                "LF optimal: {:5.2} V - {:6.2} kHz",
                report.peak_v_mv as f64 / 1000.0,
                12_000.0 / (report.peak_divisor as f64 + 1.0)
            );
        }
        println!("LF antenna is {}", report.lf_verdict());
        println!("---------- HF Antenna ----------");
        if report.v_hf_mv > 1000 {
            println!("HF antenna: {:5.2} V - 13.56 MHz", report.v_hf_mv as f64 / 1000.0);
        }
        println!("HF antenna is {}", report.hf_verdict());

        // show the divisor sweep in the plot window
        let sweep: Vec<i32> = report.sweep.iter().map(|&v| v as i32 - 128).collect();
        if sweep.iter().any(|&v| v != -128) {
            self.session.graph.load(sweep);
            self.session.markers.a = 95; // 125 kHz divisor
            self.session.markers.b = 88; // 134 kHz divisor
        }
        Ok(())
    }
}

/// Split loose rawdemod arguments into numbers and the amplify/terminator
/// letters.
fn split_demod_args(args: &[String]) -> (Vec<i64>, bool, bool) {
    let mut nums = Vec::new();
    let mut amplify = false;
    let mut st = false;
    for a in args {
        match a.as_str() {
            "a" => amplify = true,
            "s" => st = true,
            other => {
                if let Ok(v) = other.parse::<i64>() {
                    nums.push(v);
                }
            }
        }
    }
    (nums, amplify, st)
}

/// A lone `1` in the clock position means "invert, autodetect clock".
fn clock_invert_quirk(clock: i64, invert: i64) -> Result<(usize, bool)> {
    let (clock, invert) = if clock == 1 { (0, 1) } else { (clock, invert) };
    if invert != 0 && invert != 1 {
        return Err(ArgError::InvalidValue {
            name: "invert",
            value: invert,
        }
        .into());
    }
    if clock < 0 {
        return Err(ArgError::InvalidValue {
            name: "clock",
            value: clock,
        }
        .into());
    }
    Ok((clock as usize, invert == 1))
}

fn parse_hex_bytes(text: &str) -> Result<Vec<u8>> {
    let digits: Vec<u8> = text
        .chars()
        .filter_map(|c| c.to_digit(16).map(|d| d as u8))
        .collect();
    if digits.is_empty() || digits.len() % 2 != 0 {
        return Err(ArgError::InvalidValue {
            name: "hex data",
            value: digits.len() as i64,
        }
        .into());
    }
    Ok(digits.chunks(2).map(|p| (p[0] << 4) | p[1]).collect())
}

fn print_em410x(em: &em410x::Em410x) {
    println!("EM TAG ID      : {:010x}", em.id);
    println!("Unique TAG ID  : {:02x}{:08x}", em.version(), em.card());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demod_args_split_letters_and_numbers() {
        let args: Vec<String> = ["64", "1", "0", "a"].iter().map(|s| s.to_string()).collect();
        let (nums, amplify, st) = split_demod_args(&args);
        assert_eq!(nums, vec![64, 1, 0]);
        assert!(amplify);
        assert!(!st);
    }

    #[test]
    fn lone_one_means_invert() {
        assert_eq!(clock_invert_quirk(1, 0).unwrap(), (0, true));
        assert_eq!(clock_invert_quirk(64, 1).unwrap(), (64, true));
        assert!(clock_invert_quirk(64, 2).is_err());
    }

    #[test]
    fn hex_bytes_parse_in_pairs() {
        assert_eq!(parse_hex_bytes("d101").unwrap(), vec![0xd1, 0x01]);
        assert!(parse_hex_bytes("d1 0").is_err());
    }

    #[test]
    fn unknown_modulation_is_invarg() {
        let err = CoreError::Arg(ArgError::UnknownModulation {
            tag: "zz".to_string(),
        });
        assert_eq!(status_of(&err), ExitStatus::InvArg);
    }
}
