//! Standard MIDI File loading: turns note-on/note-off pairs into timed
//! [`SourceNote`]s.

use midly::{Format, Fps, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::MidiFileError;
use crate::notes::SourceNote;
use crate::theory::note_name;

const DEFAULT_TEMPO_US: u32 = 500_000;

/// Notes starting this close to a chord's average start join the chord.
pub const CHORD_THRESHOLD_S: f64 = 0.05;

const MAJOR_KEYS: [&str; 15] = [
    "Cb", "Gb", "Db", "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#",
];
const MINOR_KEYS: [&str; 15] = [
    "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#", "G#", "D#", "A#",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackNote {
    pub track: usize,
    pub note: SourceNote,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TempoChange {
    pub time: f64,
    pub micros_per_beat: u32,
}

impl TempoChange {
    pub fn bpm(&self) -> f64 {
        60_000_000.0 / self.micros_per_beat as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSignature {
    pub time: f64,
    pub numerator: u8,
    pub denominator: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeySignature {
    pub time: f64,
    /// Sharps when positive, flats when negative.
    pub sharps: i8,
    pub minor: bool,
}

impl KeySignature {
    pub fn name(&self) -> String {
        let index = (self.sharps.clamp(-7, 7) + 7) as usize;
        if self.minor {
            format!("{}m", MINOR_KEYS[index])
        } else {
            MAJOR_KEYS[index].to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgramChange {
    pub time: f64,
    pub track: usize,
    pub channel: u8,
    pub program: u8,
}

/// Notes that start together.
#[derive(Debug, Clone, PartialEq)]
pub struct Chord {
    /// Average start of the grouped notes.
    pub time: f64,
    pub pitches: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MidiSong {
    /// SMF format: 0, 1 or 2.
    pub format: u8,
    pub track_names: Vec<String>,
    /// Last program selected on each track.
    pub track_instruments: Vec<Option<u8>>,
    /// All notes, ordered by start time.
    pub notes: Vec<TrackNote>,
    pub tempo_changes: Vec<TempoChange>,
    pub time_signatures: Vec<TimeSignature>,
    pub key_signatures: Vec<KeySignature>,
    pub program_changes: Vec<ProgramChange>,
    /// End of the last note, in seconds.
    pub duration: f64,
    pub max_polyphony: usize,
}

impl MidiSong {
    /// Notes of one track, or of every track when `track` is `None`.
    pub fn notes_for_track(&self, track: Option<usize>) -> Vec<SourceNote> {
        self.notes
            .iter()
            .filter(|n| track.is_none_or(|t| n.track == t))
            .map(|n| n.note)
            .collect()
    }

    /// Indices of tracks that carry at least one note.
    pub fn tracks_with_notes(&self) -> Vec<usize> {
        let mut tracks: Vec<usize> = self.notes.iter().map(|n| n.track).collect();
        tracks.sort_unstable();
        tracks.dedup();
        tracks
    }

    /// Notes sounding at any point of `[start, end]`.
    pub fn notes_in_range(&self, start: f64, end: f64) -> Vec<TrackNote> {
        self.notes
            .iter()
            .take_while(|n| n.note.start <= end)
            .filter(|n| n.note.end >= start)
            .copied()
            .collect()
    }

    /// Chords of one track, or of every track, grouped with
    /// [`CHORD_THRESHOLD_S`].
    pub fn chord_sequence(&self, track: Option<usize>) -> Vec<Chord> {
        group_chords(&self.notes_for_track(track), CHORD_THRESHOLD_S)
    }

    /// Human-readable analysis, one line per entry.
    pub fn report(&self) -> Vec<String> {
        let chords = self.chord_sequence(None);
        let widest = chords.iter().map(|c| c.pitches.len()).max().unwrap_or(0);
        let mut lines = vec![
            format!("Format: {}", self.format),
            format!("Tracks: {}", self.track_names.len()),
            format!("Duration: {:.2}s", self.duration),
            format!("Notes: {}", self.notes.len()),
            format!("Chords: {} (up to {} notes)", chords.len(), widest),
            format!("Max polyphony: {}", self.max_polyphony),
        ];

        lines.push("Tracks:".into());
        for (index, name) in self.track_names.iter().enumerate() {
            let instrument = match self.track_instruments.get(index).copied().flatten() {
                Some(program) => format!("program {}", program),
                None => "no program".into(),
            };
            lines.push(format!("  {}: {} ({})", index, name, instrument));
        }

        if !self.tempo_changes.is_empty() {
            lines.push("Tempo changes:".into());
            for change in &self.tempo_changes {
                lines.push(format!("  {:.2}s: {:.1} BPM", change.time, change.bpm()));
            }
        }
        if !self.time_signatures.is_empty() {
            lines.push("Time signatures:".into());
            for sig in &self.time_signatures {
                lines.push(format!("  {:.2}s: {}/{}", sig.time, sig.numerator, sig.denominator));
            }
        }
        if !self.key_signatures.is_empty() {
            lines.push("Key signatures:".into());
            for sig in &self.key_signatures {
                lines.push(format!("  {:.2}s: {}", sig.time, sig.name()));
            }
        }
        lines
    }
}

/// Groups notes sorted by start into chords. A note joins the current chord
/// while it starts within `threshold` of the chord's average start.
pub fn group_chords(notes: &[SourceNote], threshold: f64) -> Vec<Chord> {
    let mut chords = Vec::new();
    let mut starts: Vec<f64> = Vec::new();
    let mut pitches: Vec<u8> = Vec::new();
    let mut chord_time = 0.0;

    for note in notes {
        if !starts.is_empty() && (note.start - chord_time).abs() >= threshold {
            chords.push(Chord {
                time: chord_time,
                pitches: std::mem::take(&mut pitches),
            });
            starts.clear();
        }
        starts.push(note.start);
        pitches.push(note.pitch);
        chord_time = starts.iter().sum::<f64>() / starts.len() as f64;
    }
    if !pitches.is_empty() {
        chords.push(Chord {
            time: chord_time,
            pitches,
        });
    }
    chords
}

/// Note names of `chord`, lowest first.
pub fn chord_label(chord: &Chord) -> String {
    let mut pitches = chord.pitches.clone();
    pitches.sort_unstable();
    pitches.dedup();
    pitches
        .into_iter()
        .map(note_name)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tick to seconds conversion shared by all tracks.
struct TempoMap {
    ticks_per_beat: Option<f64>,
    seconds_per_tick: f64,
    /// (tick, seconds at tick, tempo from tick on)
    segments: Vec<(u64, f64, u32)>,
}

impl TempoMap {
    fn new(smf: &Smf) -> Self {
        let ticks_per_beat = match smf.header.timing {
            Timing::Metrical(tpb) => Some(tpb.as_int().max(1) as f64),
            Timing::Timecode(_, _) => None,
        };
        let seconds_per_tick = match smf.header.timing {
            Timing::Metrical(_) => 0.0,
            Timing::Timecode(fps, subframes) => {
                let fps = match fps {
                    Fps::Fps24 => 24.0,
                    Fps::Fps25 => 25.0,
                    Fps::Fps29 => 29.97,
                    Fps::Fps30 => 30.0,
                };
                1.0 / (fps * subframes.max(1) as f64)
            }
        };

        let mut changes: Vec<(u64, u32)> = Vec::new();
        for track in &smf.tracks {
            let mut tick = 0u64;
            for event in track {
                tick += event.delta.as_int() as u64;
                if let TrackEventKind::Meta(MetaMessage::Tempo(tempo)) = event.kind {
                    changes.push((tick, tempo.as_int().max(1)));
                }
            }
        }
        changes.sort_by_key(|(tick, _)| *tick);

        let mut map = Self {
            ticks_per_beat,
            seconds_per_tick,
            segments: vec![(0, 0.0, DEFAULT_TEMPO_US)],
        };
        for (tick, tempo) in changes {
            let seconds = map.seconds_at(tick);
            match map.segments.last_mut() {
                Some(last) if last.0 == tick => last.2 = tempo,
                _ => map.segments.push((tick, seconds, tempo)),
            }
        }
        map
    }

    fn seconds_at(&self, tick: u64) -> f64 {
        let Some(ticks_per_beat) = self.ticks_per_beat else {
            return tick as f64 * self.seconds_per_tick;
        };
        let index = self.segments.partition_point(|(start, _, _)| *start <= tick);
        let (start, seconds, tempo) = self.segments[index.saturating_sub(1)];
        seconds + (tick - start) as f64 / ticks_per_beat * tempo as f64 / 1_000_000.0
    }

    fn tempo_changes(&self) -> Vec<TempoChange> {
        if self.ticks_per_beat.is_none() {
            return Vec::new();
        }
        self.segments
            .iter()
            .skip_while(|(tick, _, tempo)| *tick == 0 && *tempo == DEFAULT_TEMPO_US)
            .map(|&(_, time, micros_per_beat)| TempoChange {
                time,
                micros_per_beat,
            })
            .collect()
    }
}

struct Pending {
    track: usize,
    channel: u8,
    key: u8,
    start: f64,
    velocity: u8,
}

/// Note-ons waiting for their note-off.
#[derive(Default)]
struct PendingNotes {
    pending: Vec<Pending>,
}

impl PendingNotes {
    fn open(&mut self, note: Pending) {
        self.pending.push(note);
    }

    /// Oldest matching note-on: same channel first, then any channel of the
    /// track, then any track.
    fn close(&mut self, track: usize, channel: u8, key: u8) -> Option<Pending> {
        let exact = |p: &Pending| p.track == track && p.channel == channel && p.key == key;
        let same_track = |p: &Pending| p.track == track && p.key == key;
        let any_track = |p: &Pending| p.key == key;

        let index = self
            .pending
            .iter()
            .position(exact)
            .or_else(|| self.pending.iter().position(same_track))
            .or_else(|| {
                let index = self.pending.iter().position(any_track)?;
                debug!(key, from = self.pending[index].track, to = track, "cross-track note-off");
                Some(index)
            })?;
        Some(self.pending.remove(index))
    }

    fn drain(&mut self) -> impl Iterator<Item = Pending> + '_ {
        self.pending.drain(..)
    }
}

pub fn load(path: &Path) -> Result<MidiSong, MidiFileError> {
    let data = fs::read(path).map_err(|source| MidiFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let song = parse(&data)?;
    info!(
        path = %path.display(),
        notes = song.notes.len(),
        duration = song.duration,
        "MIDI file loaded"
    );
    Ok(song)
}

pub fn parse(data: &[u8]) -> Result<MidiSong, MidiFileError> {
    let smf = Smf::parse(data)?;
    let tempo = TempoMap::new(&smf);

    let mut notes = Vec::new();
    let mut track_names = Vec::with_capacity(smf.tracks.len());
    let mut track_instruments = Vec::with_capacity(smf.tracks.len());
    let mut time_signatures = Vec::new();
    let mut key_signatures = Vec::new();
    let mut program_changes = Vec::new();
    let mut pending = PendingNotes::default();
    let mut last_event = 0.0f64;

    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let mut name = None;
        let mut instrument = None;
        let mut tick = 0u64;

        for event in track {
            tick += event.delta.as_int() as u64;
            let time = tempo.seconds_at(tick);
            last_event = last_event.max(time);

            match event.kind {
                TrackEventKind::Meta(MetaMessage::TrackName(raw)) if name.is_none() => {
                    name = Some(String::from_utf8_lossy(raw).trim().to_string());
                }
                TrackEventKind::Meta(MetaMessage::TimeSignature(numerator, power, _, _)) => {
                    time_signatures.push(TimeSignature {
                        time,
                        numerator,
                        denominator: 2u32.saturating_pow(power as u32),
                    });
                }
                TrackEventKind::Meta(MetaMessage::KeySignature(sharps, minor)) => {
                    key_signatures.push(KeySignature {
                        time,
                        sharps,
                        minor,
                    });
                }
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            pending.open(Pending {
                                track: track_idx,
                                channel,
                                key: key.as_int(),
                                start: time,
                                velocity: vel.as_int(),
                            });
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            match pending.close(track_idx, channel, key.as_int()) {
                                Some(open) => notes.push(TrackNote {
                                    track: open.track,
                                    note: SourceNote::new(
                                        open.start,
                                        time,
                                        open.key,
                                        open.velocity,
                                    ),
                                }),
                                None => debug!(
                                    key = key.as_int(),
                                    track = track_idx,
                                    "unmatched note-off"
                                ),
                            }
                        }
                        MidiMessage::ProgramChange { program } => {
                            program_changes.push(ProgramChange {
                                time,
                                track: track_idx,
                                channel,
                                program: program.as_int(),
                            });
                            instrument = Some(program.as_int());
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        track_names.push(name.unwrap_or_else(|| format!("Track {}", track_idx)));
        track_instruments.push(instrument);
    }

    for open in pending.drain() {
        notes.push(TrackNote {
            track: open.track,
            note: SourceNote::new(open.start, last_event, open.key, open.velocity),
        });
    }

    // zero-length pairs carry nothing to play
    notes.retain(|n| n.note.end > n.note.start);
    if notes.is_empty() {
        return Err(MidiFileError::Empty);
    }
    notes.sort_by(|a, b| a.note.start.total_cmp(&b.note.start));

    let duration = notes.iter().map(|n| n.note.end).fold(0.0, f64::max);

    time_signatures.sort_by(|a, b| a.time.total_cmp(&b.time));
    key_signatures.sort_by(|a, b| a.time.total_cmp(&b.time));
    program_changes.sort_by(|a, b| a.time.total_cmp(&b.time));

    Ok(MidiSong {
        format: match smf.header.format {
            Format::SingleTrack => 0,
            Format::Parallel => 1,
            Format::Sequential => 2,
        },
        track_names,
        track_instruments,
        max_polyphony: max_polyphony(&notes),
        tempo_changes: tempo.tempo_changes(),
        time_signatures,
        key_signatures,
        program_changes,
        notes,
        duration,
    })
}

fn max_polyphony(notes: &[TrackNote]) -> usize {
    let mut edges: Vec<(f64, i32)> = notes
        .iter()
        .flat_map(|n| [(n.note.start, 1), (n.note.end, -1)])
        .collect();
    edges.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut current = 0i32;
    let mut max = 0i32;
    for (_, change) in edges {
        current += change;
        max = max.max(current);
    }
    max as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::{Header, TrackEvent};

    fn event(delta: u32, kind: TrackEventKind<'static>) -> TrackEvent<'static> {
        TrackEvent {
            delta: delta.into(),
            kind,
        }
    }

    fn note_on(delta: u32, channel: u8, key: u8, vel: u8) -> TrackEvent<'static> {
        event(
            delta,
            TrackEventKind::Midi {
                channel: channel.into(),
                message: MidiMessage::NoteOn {
                    key: key.into(),
                    vel: vel.into(),
                },
            },
        )
    }

    fn note_off(delta: u32, channel: u8, key: u8) -> TrackEvent<'static> {
        event(
            delta,
            TrackEventKind::Midi {
                channel: channel.into(),
                message: MidiMessage::NoteOff {
                    key: key.into(),
                    vel: 0u8.into(),
                },
            },
        )
    }

    fn end() -> TrackEvent<'static> {
        event(0, TrackEventKind::Meta(MetaMessage::EndOfTrack))
    }

    fn encode(format: Format, tracks: Vec<Vec<TrackEvent<'static>>>) -> Vec<u8> {
        let mut smf = Smf::new(Header::new(format, Timing::Metrical(480u16.into())));
        smf.tracks = tracks;
        let mut bytes = Vec::new();
        smf.write_std(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn pairs_notes_at_default_tempo() {
        let bytes = encode(
            Format::SingleTrack,
            vec![vec![
                event(0, TrackEventKind::Meta(MetaMessage::TrackName(&b"Piano"[..]))),
                note_on(0, 0, 60, 100),
                note_off(480, 0, 60),
                note_on(0, 0, 62, 90),
                // note-on with velocity 0 ends the note
                note_on(240, 0, 62, 0),
                end(),
            ]],
        );

        let song = parse(&bytes).unwrap();
        assert_eq!(song.track_names, vec!["Piano".to_string()]);
        assert_eq!(song.notes.len(), 2);
        assert_eq!(song.notes[0].note, SourceNote::new(0.0, 0.5, 60, 100));
        assert_eq!(song.notes[1].note, SourceNote::new(0.5, 0.75, 62, 90));
        assert_eq!(song.duration, 0.75);
        assert_eq!(song.max_polyphony, 1);
        assert!(song.tempo_changes.is_empty());
    }

    #[test]
    fn tempo_track_applies_to_every_track() {
        let bytes = encode(
            Format::Parallel,
            vec![
                vec![
                    event(0, TrackEventKind::Meta(MetaMessage::Tempo(250_000u32.into()))),
                    end(),
                ],
                vec![note_on(480, 0, 64, 80), note_off(480, 0, 64), end()],
            ],
        );

        let song = parse(&bytes).unwrap();
        assert_eq!(song.notes[0].track, 1);
        assert_eq!(song.notes[0].note.start, 0.25);
        assert_eq!(song.notes[0].note.end, 0.5);
        assert_eq!(song.tempo_changes.len(), 1);
        assert_eq!(song.tempo_changes[0].bpm(), 240.0);
        assert_eq!(song.track_names[0], "Track 0");
    }

    #[test]
    fn note_off_on_another_channel_still_closes() {
        let bytes = encode(
            Format::SingleTrack,
            vec![vec![note_on(0, 2, 60, 100), note_off(480, 5, 60), end()]],
        );
        let song = parse(&bytes).unwrap();
        assert_eq!(song.notes.len(), 1);
        assert_eq!(song.notes[0].note.end, 0.5);
    }

    #[test]
    fn dangling_notes_close_at_the_end() {
        let bytes = encode(
            Format::SingleTrack,
            vec![vec![
                note_on(0, 0, 60, 100),
                note_on(0, 0, 64, 100),
                note_off(960, 0, 64),
                end(),
            ]],
        );
        let song = parse(&bytes).unwrap();
        assert_eq!(song.notes.len(), 2);
        assert!(song.notes.iter().all(|n| n.note.end == 1.0));
        assert_eq!(song.max_polyphony, 2);
    }

    #[test]
    fn per_track_selection() {
        let bytes = encode(
            Format::Parallel,
            vec![
                vec![note_on(0, 0, 48, 100), note_off(480, 0, 48), end()],
                vec![note_on(0, 1, 72, 100), note_off(480, 1, 72), end()],
            ],
        );
        let song = parse(&bytes).unwrap();
        assert_eq!(song.tracks_with_notes(), vec![0, 1]);
        assert_eq!(song.notes_for_track(Some(1))[0].pitch, 72);
        assert_eq!(song.notes_for_track(None).len(), 2);
    }

    #[test]
    fn reads_signatures_and_programs() {
        let bytes = encode(
            Format::Parallel,
            vec![
                vec![
                    event(0, TrackEventKind::Meta(MetaMessage::TimeSignature(3, 2, 24, 8))),
                    event(0, TrackEventKind::Meta(MetaMessage::KeySignature(-3, true))),
                    event(960, TrackEventKind::Meta(MetaMessage::TimeSignature(6, 3, 24, 8))),
                    event(0, TrackEventKind::Meta(MetaMessage::KeySignature(2, false))),
                    end(),
                ],
                vec![
                    event(
                        0,
                        TrackEventKind::Midi {
                            channel: 0u8.into(),
                            message: MidiMessage::ProgramChange { program: 0u8.into() },
                        },
                    ),
                    note_on(0, 0, 60, 100),
                    note_off(480, 0, 60),
                    event(
                        0,
                        TrackEventKind::Midi {
                            channel: 0u8.into(),
                            message: MidiMessage::ProgramChange { program: 40u8.into() },
                        },
                    ),
                    note_on(0, 0, 67, 100),
                    note_off(480, 0, 67),
                    end(),
                ],
            ],
        );

        let song = parse(&bytes).unwrap();
        assert_eq!(song.format, 1);
        assert_eq!(
            song.time_signatures,
            vec![
                TimeSignature {
                    time: 0.0,
                    numerator: 3,
                    denominator: 4,
                },
                TimeSignature {
                    time: 1.0,
                    numerator: 6,
                    denominator: 8,
                },
            ]
        );
        assert_eq!(song.key_signatures[0].name(), "Cm");
        assert_eq!(song.key_signatures[1].name(), "D");
        assert_eq!(song.program_changes.len(), 2);
        assert_eq!(song.program_changes[1].time, 0.5);
        assert_eq!(song.track_instruments, vec![None, Some(40)]);

        let report = song.report();
        assert!(report.contains(&"  1: Track 1 (program 40)".to_string()));
        assert!(report.contains(&"  0: Track 0 (no program)".to_string()));
        assert!(report.contains(&"  1.00s: 6/8".to_string()));
        assert!(report.contains(&"  0.00s: Cm".to_string()));
        assert!(report.contains(&"Chords: 2 (up to 1 notes)".to_string()));
    }

    #[test]
    fn close_starts_form_one_chord() {
        let notes = [
            SourceNote::new(1.0, 2.0, 60, 100),
            SourceNote::new(1.02, 2.0, 64, 100),
            SourceNote::new(1.05, 2.0, 67, 100),
            SourceNote::new(1.2, 2.0, 72, 100),
        ];
        let chords = group_chords(&notes, CHORD_THRESHOLD_S);
        assert_eq!(chords.len(), 2);
        assert_eq!(chords[0].pitches, vec![60, 64, 67]);
        assert!((chords[0].time - 1.0233).abs() < 1e-3);
        assert_eq!(chords[1].pitches, vec![72]);
        assert_eq!(chord_label(&chords[0]), "C4 E4 G4");
        assert!(group_chords(&[], CHORD_THRESHOLD_S).is_empty());
    }

    #[test]
    fn range_includes_overlapping_notes() {
        let bytes = encode(
            Format::SingleTrack,
            vec![vec![
                note_on(0, 0, 60, 100),
                note_off(960, 0, 60),
                note_on(0, 0, 62, 100),
                note_off(480, 0, 62),
                note_on(480, 0, 64, 100),
                note_off(480, 0, 64),
                end(),
            ]],
        );
        let song = parse(&bytes).unwrap();
        let pitches =
            |notes: Vec<TrackNote>| notes.iter().map(|n| n.note.pitch).collect::<Vec<u8>>();
        assert_eq!(pitches(song.notes_in_range(0.5, 0.9)), vec![60]);
        assert_eq!(pitches(song.notes_in_range(1.0, 1.0)), vec![60, 62]);
        assert_eq!(pitches(song.notes_in_range(1.6, 1.9)), Vec::<u8>::new());
        assert_eq!(pitches(song.notes_in_range(0.0, 10.0)), vec![60, 62, 64]);
    }

    #[test]
    fn file_without_notes_is_rejected() {
        let bytes = encode(Format::SingleTrack, vec![vec![end()]]);
        assert!(matches!(parse(&bytes), Err(MidiFileError::Empty)));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(parse(b"not a midi file"), Err(MidiFileError::Parse(_))));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = load(Path::new("/nonexistent/song.mid")).unwrap_err();
        assert!(matches!(err, MidiFileError::Read { .. }));
    }
}
