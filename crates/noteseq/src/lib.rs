//! Timestamped note-sequence event model.
//!
//! A [`NoteSequence`] is the common sink for score parsers: an ordered
//! collection of pitched notes with absolute start/end times in seconds,
//! together with the key signatures, time signatures, tempos, and free-text
//! annotations that were in effect while the notes were produced.
//!
//! The types here are deliberately plain data. Producers fill them in;
//! consumers (renderers, analysis, training pipelines) read them back. All
//! types serialize with serde.

use serde::{Deserialize, Serialize};

/// A parsed tune as a stream of timestamped events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteSequence {
    /// Reference number of the tune within its source collection.
    pub reference_number: u32,
    pub metadata: SequenceMetadata,
    /// Key signatures in source order; `time` is seconds from sequence start.
    pub key_signatures: Vec<KeySignature>,
    /// Time signatures in source order.
    pub time_signatures: Vec<TimeSignature>,
    /// Tempo changes in source order.
    pub tempos: Vec<Tempo>,
    /// Notes in non-decreasing `start_time` order.
    pub notes: Vec<Note>,
    /// Opaque text annotations captured from the source, with timestamps.
    pub text_annotations: Vec<TextAnnotation>,
    pub source_info: SourceInfo,
    /// Tick resolution the producing parser quantizes against.
    pub ticks_per_quarter: u32,
}

impl NoteSequence {
    /// An empty sequence carrying the given provenance and tick resolution.
    pub fn new(source_info: SourceInfo, ticks_per_quarter: u32) -> Self {
        NoteSequence {
            reference_number: 0,
            metadata: SequenceMetadata::default(),
            key_signatures: Vec::new(),
            time_signatures: Vec::new(),
            tempos: Vec::new(),
            notes: Vec::new(),
            text_annotations: Vec::new(),
            source_info,
            ticks_per_quarter,
        }
    }

    /// End time of the latest note, or 0.0 for a sequence with no notes.
    pub fn total_time(&self) -> f64 {
        self.notes.iter().map(|n| n.end_time).fold(0.0, f64::max)
    }
}

/// Descriptive metadata for a sequence.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SequenceMetadata {
    pub title: String,
    pub artist: String,
    pub composers: Vec<String>,
}

/// A single pitched note.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// MIDI pitch number (middle C = 60).
    pub pitch: u8,
    /// MIDI velocity (1-127).
    pub velocity: u8,
    /// Onset in seconds from sequence start.
    pub start_time: f64,
    /// Release in seconds; always greater than `start_time`.
    pub end_time: f64,
}

impl Note {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// A time signature change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
    pub time: f64,
}

/// A tempo change, in quarter notes per minute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tempo {
    pub qpm: f64,
    pub time: f64,
}

/// A key signature change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeySignature {
    pub key: Key,
    pub mode: Mode,
    pub time: f64,
}

/// Free text attached to a point in time (chord symbols, directions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAnnotation {
    pub text: String,
    pub time: f64,
}

/// The twelve chromatic keys. Sharp-side keys use their sharp spelling,
/// flat-side keys their flat spelling, matching common signature usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    C,
    CSharp,
    D,
    EFlat,
    E,
    F,
    FSharp,
    G,
    AFlat,
    A,
    BFlat,
    B,
}

impl Key {
    /// Key for a pitch class 0-11 (C = 0).
    pub fn from_pitch_class(pc: u8) -> Key {
        match pc % 12 {
            0 => Key::C,
            1 => Key::CSharp,
            2 => Key::D,
            3 => Key::EFlat,
            4 => Key::E,
            5 => Key::F,
            6 => Key::FSharp,
            7 => Key::G,
            8 => Key::AFlat,
            9 => Key::A,
            10 => Key::BFlat,
            _ => Key::B,
        }
    }

    /// Pitch class 0-11 (C = 0).
    pub fn pitch_class(&self) -> u8 {
        match self {
            Key::C => 0,
            Key::CSharp => 1,
            Key::D => 2,
            Key::EFlat => 3,
            Key::E => 4,
            Key::F => 5,
            Key::FSharp => 6,
            Key::G => 7,
            Key::AFlat => 8,
            Key::A => 9,
            Key::BFlat => 10,
            Key::B => 11,
        }
    }
}

/// Diatonic modes. Ionian and aeolian keys are normalized to `Major` and
/// `Minor` by producers, so only the seven distinct tags appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Major,
    Minor,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Locrian,
}

/// How the underlying material was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SourceType {
    #[default]
    Unknown,
    /// Derived from symbolic notation (a score).
    ScoreBased,
    /// Derived from a recorded performance.
    PerformanceBased,
}

/// The notation format the material was encoded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EncodingType {
    #[default]
    Unknown,
    Abc,
    MusicXml,
    Midi,
}

/// Which parser produced the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Parser {
    #[default]
    Unknown,
    /// The ABC notation parser in this workspace.
    AbcEvents,
}

/// Provenance of a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceInfo {
    pub source_type: SourceType,
    pub encoding_type: EncodingType,
    pub parser: Parser,
}
