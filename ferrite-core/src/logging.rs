//! Session diagnostics.
//!
//! The console has a single process-wide debug verbosity (0/1/2) that gates
//! intermediate diagnostic text; final success or failure is always reported
//! by the command layer. The collector keeps a bounded buffer so a long
//! session cannot grow without limit.

use std::fmt;

/// Diagnostic verbosity, set with `data setdebugmode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum DebugLevel {
    #[default]
    Off,
    Debug,
    Verbose,
}

impl DebugLevel {
    pub fn from_u8(level: u8) -> Self {
        match level {
            0 => DebugLevel::Off,
            1 => DebugLevel::Debug,
            _ => DebugLevel::Verbose,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            DebugLevel::Off => 0,
            DebugLevel::Debug => 1,
            DebugLevel::Verbose => 2,
        }
    }
}

impl fmt::Display for DebugLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebugLevel::Off => write!(f, "no debug messages"),
            DebugLevel::Debug => write!(f, "debug messages"),
            DebugLevel::Verbose => write!(f, "verbose debug messages"),
        }
    }
}

/// A single diagnostic entry.
#[derive(Debug, Clone)]
pub struct DebugEntry {
    pub subsystem: &'static str,
    pub message: String,
}

/// Collector for gated diagnostic text.
#[derive(Debug, Clone)]
pub struct DebugLog {
    level: DebugLevel,
    entries: Vec<DebugEntry>,
    max_entries: usize,
}

impl DebugLog {
    pub fn new(level: DebugLevel) -> Self {
        Self {
            level,
            entries: Vec::new(),
            max_entries: 1000,
        }
    }

    pub fn level(&self) -> DebugLevel {
        self.level
    }

    pub fn set_level(&mut self, level: DebugLevel) {
        self.level = level;
    }

    /// Record a message visible at level 1 and up.
    pub fn debug(&mut self, subsystem: &'static str, message: impl fmt::Display) {
        self.push(DebugLevel::Debug, subsystem, message);
    }

    /// Record a message visible at level 2 only.
    pub fn verbose(&mut self, subsystem: &'static str, message: impl fmt::Display) {
        self.push(DebugLevel::Verbose, subsystem, message);
    }

    fn push(&mut self, at: DebugLevel, subsystem: &'static str, message: impl fmt::Display) {
        if self.level < at {
            return;
        }
        if self.entries.len() >= self.max_entries {
            self.entries.remove(0);
        }
        let entry = DebugEntry {
            subsystem,
            message: message.to_string(),
        };
        // echo immediately in test builds for visibility
        #[cfg(any(test, debug_assertions))]
        eprintln!("[{}] {}", entry.subsystem, entry.message);
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[DebugEntry] {
        &self.entries
    }

    /// Drain the collected entries, oldest first.
    pub fn take(&mut self) -> Vec<DebugEntry> {
        std::mem::take(&mut self.entries)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for DebugLog {
    fn default() -> Self {
        Self::new(DebugLevel::Off)
    }
}
