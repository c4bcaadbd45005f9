//! Modulation probe: try each family against the current trace and return
//! every plausible match, ranked in trial order. Ties are left to the user.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::clock;
use crate::demod::{ask, fsk, nrz, psk};
use crate::errors::{DemodError, Result};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modulation {
    Fsk1a,
    Fsk2,
    Ask,
    Biphase,
    BiphaseAlt,
    Nrz,
    Psk1,
}

impl fmt::Display for Modulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Modulation::Fsk1a => "FSK1a",
            Modulation::Fsk2 => "FSK2",
            Modulation::Ask => "ASK",
            Modulation::Biphase => "BI",
            Modulation::BiphaseAlt => "BIa",
            Modulation::Nrz => "NRZ",
            Modulation::Psk1 => "PSK1",
        };
        write!(f, "{name}")
    }
}

/// One plausible modulation match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModulationReport {
    pub modulation: Modulation,
    /// Bit clock (RF divisor).
    pub bitrate: usize,
    /// Carrier cycle length, PSK only.
    pub carrier: Option<usize>,
    /// Field-clock pair, FSK only.
    pub field_clocks: Option<(u8, u8)>,
}

impl fmt::Display for ModulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} RF/{}", self.modulation, self.bitrate)?;
        if let Some(c) = self.carrier {
            write!(f, " carrier {c}")?;
        }
        if let Some((h, l)) = self.field_clocks {
            write!(f, " FC/{h} FC/{l}")?;
        }
        Ok(())
    }
}

/// Try every modulation family against the current trace.
///
/// FSK wins outright when a known field-clock pair is present; otherwise
/// ASK, biphase (both polarities), NRZ and PSK are each attempted with
/// tight error budgets. The PSK attempt trims the configured settle window
/// from the trace front and restores the graph afterwards.
pub fn probe(session: &mut Session) -> Result<Vec<ModulationReport>> {
    let props = session.properties();
    let samples: Vec<i32> = session.graph.as_slice().to_vec();
    let mut hits: Vec<ModulationReport> = Vec::new();

    let fsk_timing = clock::fsk_clocks(&samples, &props).ok();
    if let Some(timing) = fsk_timing {
        if fsk::run_fsk(session, &fsk::FskOptions::default()).is_ok() {
            let modulation = if timing.fc_high == 8 {
                Modulation::Fsk1a
            } else {
                Modulation::Fsk2
            };
            hits.push(ModulationReport {
                modulation,
                bitrate: timing.clock,
                carrier: None,
                field_clocks: Some((timing.fc_high, timing.fc_low)),
            });
        }
    } else {
        if let Ok(est) = clock::detect_ask_clock(&samples, &props, 0) {
            let ask_opts = ask::AskOptions {
                max_err: 1,
                variant: ask::AskVariant::Manchester,
                ..Default::default()
            };
            if ask::run_ask(session, &ask_opts).is_ok() {
                hits.push(ModulationReport {
                    modulation: Modulation::Ask,
                    bitrate: est.clock,
                    carrier: None,
                    field_clocks: None,
                });
            }
            for (invert, modulation) in [(false, Modulation::Biphase), (true, Modulation::BiphaseAlt)]
            {
                let bi_opts = ask::AskBiphaseOptions {
                    invert,
                    max_err: 2,
                    ..Default::default()
                };
                if ask::run_ask_biphase(session, &bi_opts).is_ok() {
                    hits.push(ModulationReport {
                        modulation,
                        bitrate: est.clock,
                        carrier: None,
                        field_clocks: None,
                    });
                }
            }
        }

        let nrz_opts = nrz::NrzOptions {
            max_err: 1,
            ..Default::default()
        };
        if let Ok(report) = nrz::run_nrz(session, &nrz_opts) {
            hits.push(ModulationReport {
                modulation: Modulation::Nrz,
                bitrate: report.clock,
                carrier: None,
                field_clocks: None,
            });
        }

        if clock::detect_psk_clock(&samples, &props, 0).is_ok() {
            session.save_graph();
            let settle = session.config.psk_settle_trim;
            let trimmed = session.ltrim(settle).is_ok();
            if trimmed {
                let psk_opts = psk::PskOptions {
                    max_err: 6,
                    ..Default::default()
                };
                if let Ok(report) = psk::run_psk(session, &psk_opts) {
                    hits.push(ModulationReport {
                        modulation: Modulation::Psk1,
                        bitrate: report.clock,
                        carrier: Some(report.carrier),
                        field_clocks: None,
                    });
                }
            }
            session.restore_graph();
        }
    }

    if hits.is_empty() {
        Err(DemodError::NoData { bits: 0 }.into())
    } else {
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_rejects_noise() {
        let mut session = Session::default();
        session.graph.load(vec![0; 4000]);
        assert!(probe(&mut session).is_err());
    }

    #[test]
    fn probe_finds_manchester_ask() {
        let mut session = Session::default();
        let bits: Vec<u8> = (0..60).map(|i| ((i ^ (i >> 1)) % 2) as u8).collect();
        let mut wave = Vec::new();
        for &b in &bits {
            let (first, second) = if b == 1 { (127, -127) } else { (-127, 127) };
            wave.extend(std::iter::repeat(first).take(32));
            wave.extend(std::iter::repeat(second).take(32));
        }
        session.graph.load(wave);
        let hits = probe(&mut session).unwrap();
        assert!(hits.iter().any(|h| h.modulation == Modulation::Ask));
    }

    #[test]
    fn report_formats_field_clocks() {
        let report = ModulationReport {
            modulation: Modulation::Fsk2,
            bitrate: 50,
            carrier: None,
            field_clocks: Some((10, 8)),
        };
        assert_eq!(report.to_string(), "FSK2 RF/50 FC/10 FC/8");
    }
}
