use std::path::PathBuf;

use thiserror::Error;

/// Why a single source tuple was refused by the scheduler.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    #[error("note ends at {end}s but starts at {start}s")]
    NonPositiveDuration { start: f64, end: f64 },

    #[error("note timing is not a finite number")]
    NonFiniteTime,

    #[error("pitch {0} is outside the MIDI range 0-127")]
    PitchOutOfRange(u8),

    #[error("velocity {0} is outside the MIDI range 0-127")]
    VelocityOutOfRange(u8),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write settings: {0}")]
    Write(#[from] std::io::Error),

    #[error("invalid settings file: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] ron::Error),

    #[error("invalid setting `{field}`: {message}")]
    Invalid { field: &'static str, message: String },

    #[error("failed to watch settings file: {0}")]
    Watch(#[from] notify::Error),
}

#[derive(Error, Debug)]
pub enum MidiFileError {
    #[error("failed to read MIDI file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed MIDI file: {0}")]
    Parse(#[from] midly::Error),

    #[error("MIDI file contains no notes")]
    Empty,
}

#[derive(Error, Debug)]
pub enum InputError {
    #[error("failed to initialise MIDI input: {0}")]
    Init(String),

    #[error("no MIDI input port available")]
    NoPort,

    #[error("failed to connect to MIDI port {port}: {message}")]
    Connect { port: String, message: String },
}
