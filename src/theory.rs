//! Note naming plus scale and chord generation for practice exercises.

use std::fmt;

use crate::notes::{MAX_PITCH, SourceNote};

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Scientific pitch name, e.g. `C4` for 60.
pub fn note_name(pitch: u8) -> String {
    if pitch > MAX_PITCH {
        return "Invalid".into();
    }
    let octave = (pitch / 12) as i32 - 1;
    format!("{}{}", NOTE_NAMES[(pitch % 12) as usize], octave)
}

pub fn is_black_key(pitch: u8) -> bool {
    matches!(pitch % 12, 1 | 3 | 6 | 8 | 10)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleKind {
    Major,
    NaturalMinor,
    HarmonicMinor,
    MelodicMinor,
    PentatonicMajor,
    PentatonicMinor,
    Blues,
    Chromatic,
}

impl ScaleKind {
    pub const ALL: [ScaleKind; 8] = [
        ScaleKind::Major,
        ScaleKind::NaturalMinor,
        ScaleKind::HarmonicMinor,
        ScaleKind::MelodicMinor,
        ScaleKind::PentatonicMajor,
        ScaleKind::PentatonicMinor,
        ScaleKind::Blues,
        ScaleKind::Chromatic,
    ];

    /// Semitone offsets within one octave, root included, octave excluded.
    pub fn intervals(self) -> &'static [u8] {
        match self {
            ScaleKind::Major => &[0, 2, 4, 5, 7, 9, 11],
            ScaleKind::NaturalMinor => &[0, 2, 3, 5, 7, 8, 10],
            ScaleKind::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            ScaleKind::MelodicMinor => &[0, 2, 3, 5, 7, 9, 11],
            ScaleKind::PentatonicMajor => &[0, 2, 4, 7, 9],
            ScaleKind::PentatonicMinor => &[0, 3, 5, 7, 10],
            ScaleKind::Blues => &[0, 3, 5, 6, 7, 10],
            ScaleKind::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }
}

impl fmt::Display for ScaleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ScaleKind::Major => "Major",
            ScaleKind::NaturalMinor => "Natural minor",
            ScaleKind::HarmonicMinor => "Harmonic minor",
            ScaleKind::MelodicMinor => "Melodic minor",
            ScaleKind::PentatonicMajor => "Major pentatonic",
            ScaleKind::PentatonicMinor => "Minor pentatonic",
            ScaleKind::Blues => "Blues",
            ScaleKind::Chromatic => "Chromatic",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChordKind {
    Major,
    Minor,
    Diminished,
    Augmented,
    Major7,
    Minor7,
    Dominant7,
    Diminished7,
    HalfDiminished7,
    Sus2,
    Sus4,
}

impl ChordKind {
    pub const ALL: [ChordKind; 11] = [
        ChordKind::Major,
        ChordKind::Minor,
        ChordKind::Diminished,
        ChordKind::Augmented,
        ChordKind::Major7,
        ChordKind::Minor7,
        ChordKind::Dominant7,
        ChordKind::Diminished7,
        ChordKind::HalfDiminished7,
        ChordKind::Sus2,
        ChordKind::Sus4,
    ];

    pub fn intervals(self) -> &'static [u8] {
        match self {
            ChordKind::Major => &[0, 4, 7],
            ChordKind::Minor => &[0, 3, 7],
            ChordKind::Diminished => &[0, 3, 6],
            ChordKind::Augmented => &[0, 4, 8],
            ChordKind::Major7 => &[0, 4, 7, 11],
            ChordKind::Minor7 => &[0, 3, 7, 10],
            ChordKind::Dominant7 => &[0, 4, 7, 10],
            ChordKind::Diminished7 => &[0, 3, 6, 9],
            ChordKind::HalfDiminished7 => &[0, 3, 6, 10],
            ChordKind::Sus2 => &[0, 2, 7],
            ChordKind::Sus4 => &[0, 5, 7],
        }
    }
}

impl fmt::Display for ChordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChordKind::Major => "maj",
            ChordKind::Minor => "min",
            ChordKind::Diminished => "dim",
            ChordKind::Augmented => "aug",
            ChordKind::Major7 => "maj7",
            ChordKind::Minor7 => "min7",
            ChordKind::Dominant7 => "7",
            ChordKind::Diminished7 => "dim7",
            ChordKind::HalfDiminished7 => "m7b5",
            ChordKind::Sus2 => "sus2",
            ChordKind::Sus4 => "sus4",
        };
        f.write_str(label)
    }
}

fn offset(root: u8, semitones: u32) -> Option<u8> {
    let pitch = root as u32 + semitones;
    (pitch <= MAX_PITCH as u32).then_some(pitch as u8)
}

/// Ascending scale over `octaves`, closed by the top root. Pitches above
/// 127 are dropped.
pub fn scale(root: u8, kind: ScaleKind, octaves: u8) -> Vec<u8> {
    let mut pitches: Vec<u8> = (0..octaves as u32)
        .flat_map(|octave| {
            kind.intervals()
                .iter()
                .map(move |&interval| octave * 12 + interval as u32)
        })
        .filter_map(|semitones| offset(root, semitones))
        .collect();
    pitches.extend(offset(root, octaves as u32 * 12));
    pitches
}

pub fn chord(root: u8, kind: ChordKind) -> Vec<u8> {
    kind.intervals()
        .iter()
        .filter_map(|&interval| offset(root, interval as u32))
        .collect()
}

/// One note per scale degree, up then back down, each lasting `step`
/// seconds.
pub fn scale_exercise(root: u8, kind: ScaleKind, octaves: u8, step: f64) -> Vec<SourceNote> {
    let ascending = scale(root, kind, octaves);
    let descending = ascending.iter().rev().skip(1).copied();

    ascending
        .iter()
        .copied()
        .chain(descending)
        .enumerate()
        .map(|(i, pitch)| {
            let start = i as f64 * step;
            SourceNote::new(start, start + step * 0.9, pitch, 100)
        })
        .collect()
}

/// The chord struck `repeats` times, `step` seconds apart.
pub fn chord_exercise(root: u8, kind: ChordKind, repeats: usize, step: f64) -> Vec<SourceNote> {
    let pitches = chord(root, kind);
    (0..repeats)
        .flat_map(|i| {
            let start = i as f64 * step;
            pitches
                .iter()
                .map(move |&pitch| SourceNote::new(start, start + step * 0.9, pitch, 100))
        })
        .collect()
}
