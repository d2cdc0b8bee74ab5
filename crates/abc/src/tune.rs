//! The per-tune state machine.
//!
//! A tune is parsed in a single forward pass. Information fields are
//! applied until the first K: field (or the first music line) ends the
//! header; music lines are then scanned token by token, left to right.
//! The machine keeps the running key and measure accidentals, the time
//! cursor, and the queued broken-rhythm carry, and emits timestamped
//! events into a [`NoteSequence`].
//!
//! All duration arithmetic is exact rational; seconds are computed once
//! per emitted event.

use num_rational::Rational64;
use tracing::debug;

use noteseq::{
    EncodingType, KeySignature, Note, NoteSequence, Parser, SourceInfo, SourceType, Tempo,
    TextAnnotation, TimeSignature,
};

use crate::error::{ParseError, Result};
use crate::fields::{self, TempoSpec};
use crate::key::{self, Accidentals, PITCH_CLASSES};
use crate::note::{self, NoteToken};

/// Tick resolution stamped on every sequence this parser produces.
pub const TICKS_PER_QUARTER: u32 = 220;

/// Velocity stamped on every note this parser produces.
pub const DEFAULT_VELOCITY: u8 = 90;

const DEFAULT_QPM: i64 = 120;

/// State for one tune, live only for the duration of its parse.
#[derive(Debug, Clone)]
pub struct TuneParser {
    seq: NoteSequence,
    in_header: bool,
    continued_line: bool,
    key_accidentals: Accidentals,
    /// Inline accidentals override the key for the rest of the measure.
    measure_accidentals: [Option<i8>; PITCH_CLASSES],
    meter: (u32, u32),
    explicit_unit: Option<Rational64>,
    unit_seen: bool,
    qpm: Rational64,
    /// A deprecated `Q:<number>` waiting for the unit length to settle.
    pending_tempo: Option<i64>,
    /// Seconds from tune start, exact.
    cursor: Rational64,
    /// Multiplier queued by a broken-rhythm operator for the next note.
    broken_carry: Option<Rational64>,
    /// Pitch a trailing tie wants the next note to merge into.
    tie_pitch: Option<u8>,
    last: Option<Emitted>,
    tuplet: Option<TupletState>,
}

/// The most recent emission, kept so broken rhythms and ties can stretch it.
#[derive(Debug, Clone)]
struct Emitted {
    start: Rational64,
    duration: Rational64,
    /// Index of the first note of the emission and how many notes share it.
    first: usize,
    count: usize,
    pitch: u8,
}

#[derive(Debug, Clone)]
struct TupletState {
    ratio: Rational64,
    remaining: u32,
}

impl Default for TuneParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TuneParser {
    pub fn new() -> Self {
        let source_info = SourceInfo {
            source_type: SourceType::ScoreBased,
            encoding_type: EncodingType::Abc,
            parser: Parser::AbcEvents,
        };
        TuneParser {
            seq: NoteSequence::new(source_info, TICKS_PER_QUARTER),
            in_header: true,
            continued_line: false,
            key_accidentals: [0; PITCH_CLASSES],
            measure_accidentals: [None; PITCH_CLASSES],
            meter: (4, 4),
            explicit_unit: None,
            unit_seen: false,
            qpm: Rational64::from_integer(DEFAULT_QPM),
            pending_tempo: None,
            cursor: Rational64::new(0, 1),
            broken_carry: None,
            tie_pitch: None,
            last: None,
            tuplet: None,
        }
    }

    /// Apply a file-header field as a book-level default. Reference numbers
    /// and keys are per-tune concerns and are ignored here; an L: default
    /// does not count against the one-unit-length-per-tune rule.
    pub fn apply_book_default(&mut self, letter: char, value: &str) -> Result<()> {
        match letter {
            'X' | 'K' => Ok(()),
            _ => {
                self.apply_field(letter, value)?;
                self.unit_seen = false;
                Ok(())
            }
        }
    }

    /// Parse one tune record. The first line must be its X: field.
    pub fn parse(mut self, lines: &[&str]) -> Result<NoteSequence> {
        let first = lines
            .first()
            .ok_or_else(|| ParseError::TuneStructure("empty tune record".to_string()))?;
        match split_field(first) {
            Some(('X', value)) => {
                self.seq.reference_number = strip_comment(value).trim().parse().map_err(|_| {
                    ParseError::TuneStructure(format!("invalid reference number {value:?}"))
                })?;
            }
            _ => {
                return Err(ParseError::TuneStructure(
                    "tune record does not start with an X: reference field".to_string(),
                ))
            }
        }

        for line in &lines[1..] {
            self.parse_line(line)?;
        }

        // A deprecated tempo in a tune with no body resolves at the end.
        self.resolve_pending_tempo();
        Ok(self.seq)
    }

    fn parse_line(&mut self, raw: &str) -> Result<()> {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('%') {
            return Ok(());
        }

        let continued = std::mem::take(&mut self.continued_line);
        if !continued {
            if let Some((letter, value)) = split_field(line) {
                return self.apply_field(letter, value);
            }
        }

        if self.in_header {
            self.begin_body();
        }

        let body = match line.strip_suffix('\\') {
            Some(joined) => {
                self.continued_line = true;
                joined
            }
            None => line,
        };
        self.parse_music(body)
    }

    /// The header is over; settle anything that was waiting on it.
    fn begin_body(&mut self) {
        self.in_header = false;
        self.resolve_pending_tempo();
    }

    fn apply_field(&mut self, letter: char, value: &str) -> Result<()> {
        let value = strip_comment(value).trim();
        match letter {
            'X' => {
                // The splitter starts a new record at X: lines, so a second
                // X inside one record does not occur; tolerate it anyway.
                debug!(value, "ignoring repeated X: field");
            }
            'T' => {
                if self.seq.metadata.title.is_empty() {
                    self.seq.metadata.title = value.to_string();
                } else {
                    self.seq.metadata.title.push_str("; ");
                    self.seq.metadata.title.push_str(value);
                }
            }
            'C' => {
                self.seq.metadata.composers.push(value.to_string());
                self.seq.metadata.artist = self.seq.metadata.composers.join("; ");
            }
            'M' => match fields::parse_meter(value) {
                Some((numerator, denominator)) => {
                    self.meter = (numerator, denominator);
                    self.seq.time_signatures.push(TimeSignature {
                        numerator,
                        denominator,
                        time: to_f64(self.cursor),
                    });
                }
                None => debug!(value, "ignoring unparseable M: field"),
            },
            'L' => {
                if self.unit_seen {
                    return Err(ParseError::MultipleNoteLength);
                }
                match fields::parse_unit_length(value) {
                    Some(unit) => {
                        self.explicit_unit = Some(unit);
                        self.unit_seen = true;
                    }
                    None => debug!(value, "ignoring unparseable L: field"),
                }
            }
            'Q' => match fields::parse_tempo(value)? {
                TempoSpec::Qpm(qpm) => {
                    self.qpm = qpm;
                    self.seq.tempos.push(Tempo {
                        qpm: to_f64(qpm),
                        time: to_f64(self.cursor),
                    });
                }
                TempoSpec::Deprecated(number) => {
                    self.pending_tempo = Some(number);
                    if !self.in_header {
                        self.resolve_pending_tempo();
                    }
                }
                TempoSpec::LabelOnly => {}
            },
            'K' => {
                let (accidentals, key, mode) = key::parse_key(value)?;
                self.key_accidentals = accidentals;
                self.measure_accidentals = [None; PITCH_CLASSES];
                self.seq.key_signatures.push(KeySignature {
                    key,
                    mode,
                    time: to_f64(self.cursor),
                });
                if self.in_header {
                    self.begin_body();
                }
            }
            'P' => return Err(ParseError::Part(value.to_string())),
            other => {
                debug!(field = %other, value, "ignoring information field");
            }
        }
        Ok(())
    }

    /// Resolve a pending deprecated `Q:<number>` against the unit length
    /// now in effect, emitting the tempo event it stood for.
    fn resolve_pending_tempo(&mut self) {
        if let Some(number) = self.pending_tempo.take() {
            // The number counts unit notes per minute; scale to quarters.
            let qpm = Rational64::from_integer(number) * self.unit_length() * 4;
            self.qpm = qpm;
            self.seq.tempos.push(Tempo {
                qpm: to_f64(qpm),
                time: to_f64(self.cursor),
            });
        }
    }

    /// The unit note length in whole notes: explicit L:, or derived from
    /// the meter (1/16 below three quarters, 1/8 at or above).
    fn unit_length(&self) -> Rational64 {
        self.explicit_unit.unwrap_or_else(|| {
            let ratio = Rational64::new(self.meter.0 as i64, self.meter.1 as i64);
            if ratio < Rational64::new(3, 4) {
                Rational64::new(1, 16)
            } else {
                Rational64::new(1, 8)
            }
        })
    }

    /// Seconds taken by one unit note at the current tempo.
    fn seconds_per_unit(&self) -> Rational64 {
        // unit (whole notes) * 4 quarters/whole * 60/qpm seconds/quarter.
        self.unit_length() * Rational64::from_integer(240) / self.qpm
    }

    fn compound_meter(&self) -> bool {
        self.meter.0 >= 6 && self.meter.0 % 3 == 0
    }

    /// Scan one music line token by token.
    fn parse_music(&mut self, line: &str) -> Result<()> {
        let mut rest = line;
        loop {
            rest = rest.trim_start_matches([' ', '\t']);
            let Some(c) = rest.chars().next() else {
                return Ok(());
            };

            match c {
                '%' => return Ok(()),
                '"' => self.scan_annotation(&mut rest),
                '|' | ':' => self.scan_bar(&mut rest)?,
                '[' => self.scan_bracket(&mut rest)?,
                '(' => self.scan_paren(&mut rest)?,
                ')' => {
                    // Slur end; no effect on timing.
                    rest = &rest[1..];
                }
                '>' | '<' => self.scan_broken_rhythm(&mut rest, c)?,
                '-' => {
                    rest = &rest[1..];
                    self.queue_tie();
                }
                'z' | 'x' => {
                    let duration = note::parse_rest(&mut rest)
                        .map_err(|_| ParseError::InvalidCharacter(c))?;
                    let seconds = self.apply_multipliers(duration) * self.seconds_per_unit();
                    self.cursor += seconds;
                }
                'A'..='G' | 'a'..='g' | '^' | '_' | '=' => {
                    let token = note::parse_note(&mut rest)
                        .map_err(|_| ParseError::InvalidCharacter(c))?;
                    self.emit_note(token);
                }
                '.' | '~' => {
                    // Single-character decorations.
                    rest = &rest[1..];
                }
                '!' | '+' => skip_delimited(&mut rest, c),
                'H'..='Z' => {
                    debug!(ornament = %c, "skipping ornament letter");
                    rest = &rest[1..];
                }
                _ => return Err(ParseError::InvalidCharacter(c)),
            }
        }
    }

    fn scan_annotation(&mut self, rest: &mut &str) {
        match note::parse_annotation(rest) {
            Ok(text) => self.seq.text_annotations.push(TextAnnotation {
                text,
                time: to_f64(self.cursor),
            }),
            Err(_) => {
                // Unterminated quote; drop the remainder of the line.
                debug!("discarding unterminated annotation");
                *rest = "";
            }
        }
    }

    /// Bar lines and repeat markers. All of them reset the measure
    /// accidentals; repeats are recognized but not executed.
    fn scan_bar(&mut self, rest: &mut &str) -> Result<()> {
        const BARS: [&str; 7] = ["[|", "|]", "||", "|:", ":|", "::", "|"];
        let Some(token) = BARS.iter().find(|tok| rest.starts_with(**tok)) else {
            return Err(ParseError::RepeatParse(format!(
                "unexpected {:?}",
                truncated(rest)
            )));
        };
        *rest = &rest[token.len()..];

        if rest.starts_with(|ch: char| ch.is_ascii_digit()) {
            return Err(ParseError::VariantEnding(format!(
                "{token}{}",
                truncated(rest)
            )));
        }

        self.measure_accidentals = [None; PITCH_CLASSES];
        Ok(())
    }

    /// Dispatch a `[`: bar start, variant ending, inline field, or chord.
    fn scan_bracket(&mut self, rest: &mut &str) -> Result<()> {
        if rest.starts_with("[|") {
            return self.scan_bar(rest);
        }

        let mut chars = rest.chars();
        chars.next();
        let second = chars.next();
        let third = chars.next();

        if second.is_some_and(|ch| ch.is_ascii_digit()) {
            return Err(ParseError::VariantEnding(truncated(rest).to_string()));
        }

        if second.is_some_and(|ch| ch.is_ascii_alphabetic()) && third == Some(':') {
            return self.scan_inline_field(rest);
        }

        let (tokens, duration) = note::parse_chord(rest)
            .map_err(|_| ParseError::Chord(truncated(rest).to_string()))?;
        if tokens.is_empty() {
            return Err(ParseError::Chord("empty chord".to_string()));
        }
        self.emit_chord(&tokens, duration);
        Ok(())
    }

    /// An inline field like `[M:3/4]`, applied at the current cursor.
    fn scan_inline_field(&mut self, rest: &mut &str) -> Result<()> {
        let Some(end) = rest.find(']') else {
            return Err(ParseError::Chord(format!(
                "unterminated inline field {:?}",
                truncated(rest)
            )));
        };
        let content = &rest[1..end];
        *rest = &rest[end + 1..];

        match content.split_once(':') {
            Some((letter, value)) if letter.len() == 1 => {
                let letter = letter.chars().next().unwrap_or_default();
                self.apply_field(letter, value)
            }
            _ => {
                debug!(content, "ignoring malformed inline field");
                Ok(())
            }
        }
    }

    /// Dispatch a `(`: a tuplet marker when followed by a digit, otherwise
    /// a slur start (which has no effect on timing).
    fn scan_paren(&mut self, rest: &mut &str) -> Result<()> {
        let after = &rest[1..];
        if !after.starts_with(|ch: char| ch.is_ascii_digit()) {
            *rest = after;
            return Ok(());
        }

        *rest = after;
        let p = take_number(rest);
        if p == 0 {
            return Err(ParseError::Tuplet("zero-length tuplet".to_string()));
        }

        // Optional :q and :r. Empty positions take their defaults.
        let mut q = None;
        let mut r = None;
        if let Some(after) = rest.strip_prefix(':') {
            *rest = after;
            let digits = take_number(rest);
            if digits > 0 {
                q = Some(digits);
            }
            if let Some(after) = rest.strip_prefix(':') {
                *rest = after;
                let digits = take_number(rest);
                if digits > 0 {
                    r = Some(digits);
                }
            }
        }

        let q = q.unwrap_or_else(|| self.default_tuplet_q(p));
        let r = r.unwrap_or(p);
        self.tuplet = Some(TupletState {
            ratio: Rational64::new(q as i64, p as i64),
            remaining: r,
        });
        Ok(())
    }

    /// Default `q` per abc v2.1 when a tuplet gives only `p`.
    fn default_tuplet_q(&self, p: u32) -> u32 {
        match p {
            2 | 4 | 8 => 3,
            3 | 6 => 2,
            5 | 7 | 9 => {
                if self.compound_meter() {
                    2
                } else {
                    3
                }
            }
            _ => 2,
        }
    }

    /// A run of `>` or `<`: stretch the previous emission by the long
    /// factor and queue the short factor for the next note (or mirrored).
    fn scan_broken_rhythm(&mut self, rest: &mut &str, which: char) -> Result<()> {
        let run = rest.chars().take_while(|&ch| ch == which).count();
        *rest = &rest[run..];

        let Some(last) = self.last.as_mut() else {
            return Err(ParseError::InvalidCharacter(which));
        };

        let short = Rational64::new(1, 1 << run.min(3));
        let long = Rational64::from_integer(2) - short;
        let (previous_factor, carry) = if which == '>' {
            (long, short)
        } else {
            (short, long)
        };

        let delta = last.duration * (previous_factor - Rational64::from_integer(1));
        last.duration += delta;
        let end = to_f64(last.start + last.duration);
        for note in &mut self.seq.notes[last.first..last.first + last.count] {
            note.end_time = end;
        }
        self.cursor += delta;
        self.broken_carry = Some(carry);
        Ok(())
    }

    fn queue_tie(&mut self) {
        match &self.last {
            Some(emitted) if emitted.count == 1 => self.tie_pitch = Some(emitted.pitch),
            _ => debug!("ignoring tie with no preceding single note"),
        }
    }

    /// Fold the queued broken-rhythm carry and any active tuplet into a
    /// duration multiplier, consuming both.
    fn apply_multipliers(&mut self, mut multiplier: Rational64) -> Rational64 {
        if let Some(carry) = self.broken_carry.take() {
            multiplier *= carry;
        }
        if let Some(tuplet) = self.tuplet.as_mut() {
            multiplier *= tuplet.ratio;
            tuplet.remaining -= 1;
            if tuplet.remaining == 0 {
                self.tuplet = None;
            }
        }
        multiplier
    }

    /// The effective semitone offset for a pitch class: the measure
    /// override when one was written this measure, else the key signature.
    fn effective_accidental(&mut self, token: &NoteToken) -> i8 {
        if let Some(accidental) = token.accidental {
            self.measure_accidentals[token.class] = Some(accidental);
        }
        self.measure_accidentals[token.class].unwrap_or(self.key_accidentals[token.class])
    }

    fn emit_note(&mut self, token: NoteToken) {
        let accidental = self.effective_accidental(&token);
        let pitch = (token.midi + accidental as i32).clamp(0, 127) as u8;
        let seconds = self.apply_multipliers(token.duration) * self.seconds_per_unit();
        if seconds <= Rational64::new(0, 1) {
            debug!("skipping zero-length note");
            self.tie_pitch = None;
            return;
        }

        // A tie joins same-pitch neighbors into one longer note.
        if self.tie_pitch.take() == Some(pitch) {
            if let Some(last) = self.last.as_mut() {
                last.duration += seconds;
                let end = to_f64(last.start + last.duration);
                for note in &mut self.seq.notes[last.first..last.first + last.count] {
                    note.end_time = end;
                }
                self.cursor += seconds;
                return;
            }
        }

        let start = self.cursor;
        let end = start + seconds;
        let first = self.seq.notes.len();
        self.seq.notes.push(Note {
            pitch,
            velocity: DEFAULT_VELOCITY,
            start_time: to_f64(start),
            end_time: to_f64(end),
        });
        self.last = Some(Emitted {
            start,
            duration: seconds,
            first,
            count: 1,
            pitch,
        });
        self.cursor = end;
    }

    /// Emit a chord: all members share one start and one end, and the
    /// cursor moves by a single note's worth of time.
    fn emit_chord(&mut self, tokens: &[NoteToken], chord_duration: Rational64) {
        let seconds =
            self.apply_multipliers(tokens[0].duration * chord_duration) * self.seconds_per_unit();
        if seconds <= Rational64::new(0, 1) {
            debug!("skipping zero-length chord");
            self.tie_pitch = None;
            return;
        }

        let start = self.cursor;
        let end = start + seconds;
        let first = self.seq.notes.len();
        let mut pitch = 0;
        for token in tokens {
            let accidental = self.effective_accidental(token);
            pitch = (token.midi + accidental as i32).clamp(0, 127) as u8;
            self.seq.notes.push(Note {
                pitch,
                velocity: DEFAULT_VELOCITY,
                start_time: to_f64(start),
                end_time: to_f64(end),
            });
        }
        self.last = Some(Emitted {
            start,
            duration: seconds,
            first,
            count: tokens.len(),
            pitch,
        });
        self.tie_pitch = None;
        self.cursor = end;
    }
}

/// Skip a `!...!` or `+...+` decoration span. Without a closing delimiter
/// only the opening character is dropped.
fn skip_delimited(rest: &mut &str, delim: char) {
    let after = &rest[delim.len_utf8()..];
    match after.find(delim) {
        Some(end) => *rest = &after[end + delim.len_utf8()..],
        None => *rest = after,
    }
}

/// Split an information-field line `X:value` into its letter and value.
fn split_field(line: &str) -> Option<(char, &str)> {
    let mut chars = line.chars();
    let letter = chars.next()?;
    if letter.is_ascii_alphabetic() && chars.next() == Some(':') {
        Some((letter, &line[2..]))
    } else {
        None
    }
}

/// Drop a trailing `%` comment from a field value.
fn strip_comment(value: &str) -> &str {
    value.split('%').next().unwrap_or(value)
}

/// Consume a run of leading digits; zero when there are none.
fn take_number(rest: &mut &str) -> u32 {
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    *rest = &rest[digits.len()..];
    digits.parse().unwrap_or(0)
}

/// A short prefix of the remaining input for error messages.
fn truncated(rest: &str) -> &str {
    let end = rest
        .char_indices()
        .nth(12)
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    &rest[..end]
}

fn to_f64(value: Rational64) -> f64 {
    *value.numer() as f64 / *value.denom() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_tune(lines: &[&str]) -> NoteSequence {
        TuneParser::new().parse(lines).expect("tune should parse")
    }

    fn pitches(seq: &NoteSequence) -> Vec<u8> {
        seq.notes.iter().map(|n| n.pitch).collect()
    }

    fn end_times(seq: &NoteSequence) -> Vec<f64> {
        seq.notes.iter().map(|n| n.end_time).collect()
    }

    #[test]
    fn test_minimal_tune() {
        let seq = parse_tune(&["X:1", "T:Test", "K:C"]);
        assert_eq!(seq.reference_number, 1);
        assert_eq!(seq.metadata.title, "Test");
        assert_eq!(seq.key_signatures.len(), 1);
        assert_eq!(seq.key_signatures[0].key, noteseq::Key::C);
        assert_eq!(seq.ticks_per_quarter, TICKS_PER_QUARTER);
        assert!(seq.notes.is_empty());
    }

    #[test]
    fn test_titles_join_and_composers() {
        let seq = parse_tune(&["X:1", "T:First", "T:Second", "C:Trad.", "K:G"]);
        assert_eq!(seq.metadata.title, "First; Second");
        assert_eq!(seq.metadata.composers, vec!["Trad.".to_string()]);
        assert_eq!(seq.metadata.artist, "Trad.");
    }

    #[test]
    fn test_default_timing() {
        // No L:, M:, or Q:. Meter defaults to 4/4, so the unit is 1/8;
        // at 120 qpm each unit note is a quarter second.
        let seq = parse_tune(&["X:1", "CDEF"]);
        assert_eq!(pitches(&seq), vec![60, 62, 64, 65]);
        assert_eq!(end_times(&seq), vec![0.25, 0.5, 0.75, 1.0]);
        // Defaults emit no events.
        assert!(seq.tempos.is_empty());
        assert!(seq.time_signatures.is_empty());
        assert!(seq.key_signatures.is_empty());
    }

    #[test]
    fn test_octave_marks() {
        let seq = parse_tune(&["X:1", "T:Test", "CC,',C,C'c"]);
        assert_eq!(pitches(&seq), vec![60, 48, 48, 72, 72]);
        assert_eq!(end_times(&seq), vec![0.25, 0.5, 0.75, 1.0, 1.25]);
        assert_eq!(seq.notes[0].velocity, DEFAULT_VELOCITY);
    }

    #[test]
    fn test_key_accidentals_apply() {
        let seq = parse_tune(&["X:1", "L:1/4", "K:D", "DFAd"]);
        // D major sharpens F and C.
        assert_eq!(pitches(&seq), vec![62, 66, 69, 74]);
    }

    #[test]
    fn test_measure_accidentals_reset_at_bar() {
        let seq = parse_tune(&["X:1", "L:1/4", "K:D", "F=FF|F^GG|"]);
        assert_eq!(pitches(&seq), vec![66, 65, 65, 66, 68, 68]);
    }

    #[test]
    fn test_broken_rhythm() {
        let seq = parse_tune(&["X:1", "Q:1/4=120", "L:1/4", "M:3/4", "T:Test", "B>cd B<cd"]);
        assert_eq!(pitches(&seq), vec![71, 72, 74, 71, 72, 74]);
        assert_eq!(end_times(&seq), vec![0.75, 1.0, 1.5, 1.75, 2.5, 3.0]);
        assert_eq!(seq.time_signatures.len(), 1);
        assert_eq!(seq.time_signatures[0].numerator, 3);
        assert_eq!(seq.tempos.len(), 1);
        assert_eq!(seq.tempos[0].qpm, 120.0);
    }

    #[test]
    fn test_double_broken_rhythm_preserves_total() {
        let seq = parse_tune(&["X:1", "L:1/4", "Q:1/4=120", "A>>B A<<B"]);
        // 7/4 + 1/4 and 1/4 + 7/4 of a half second each.
        assert_eq!(end_times(&seq), vec![0.875, 1.0, 1.125, 2.0]);
    }

    #[test]
    fn test_slash_durations() {
        let seq = parse_tune(&["X:1", "Q:1/4=120", "L:1/4", "T:Test", "CC/C//C///C////"]);
        assert_eq!(pitches(&seq), vec![60; 5]);
        assert_eq!(end_times(&seq), vec![0.5, 0.75, 0.875, 0.9375, 0.96875]);
    }

    #[test]
    fn test_rests_advance_time() {
        let seq = parse_tune(&["X:1", "L:1/4", "Q:1/4=120", "C z C x2 C"]);
        assert_eq!(pitches(&seq), vec![60, 60, 60]);
        let starts: Vec<f64> = seq.notes.iter().map(|n| n.start_time).collect();
        assert_eq!(starts, vec![0.0, 1.0, 2.5]);
    }

    #[test]
    fn test_tie_joins_same_pitch() {
        let seq = parse_tune(&["X:1", "L:1/4", "Q:1/4=120", "C2-C|C-D"]);
        assert_eq!(pitches(&seq), vec![60, 60, 62]);
        assert_eq!(end_times(&seq), vec![1.5, 2.0, 2.5]);
        assert_eq!(seq.notes[1].start_time, 1.5);
    }

    #[test]
    fn test_chord_shares_times() {
        let seq = parse_tune(&["X:1", "L:1/4", "Q:1/4=120", "[CEG]C|[ce]2"]);
        assert_eq!(pitches(&seq), vec![60, 64, 67, 60, 72, 76]);
        let starts: Vec<f64> = seq.notes.iter().map(|n| n.start_time).collect();
        assert_eq!(starts, vec![0.0, 0.0, 0.0, 0.5, 1.0, 1.0]);
        assert_eq!(seq.notes[4].end_time, 2.0);
        assert_eq!(seq.notes[5].end_time, 2.0);
    }

    #[test]
    fn test_triplet_timing() {
        let seq = parse_tune(&["X:1", "L:1/8", "Q:1/4=120", "M:4/4", "(3CDE C"]);
        assert_eq!(pitches(&seq), vec![60, 62, 64, 60]);
        let expected = [1.0 / 6.0, 1.0 / 3.0, 0.5, 0.75];
        for (note, want) in seq.notes.iter().zip(expected) {
            assert!(
                (note.end_time - want).abs() < 1e-9,
                "end {} vs {want}",
                note.end_time
            );
        }
    }

    #[test]
    fn test_tuplet_defaults_depend_on_meter() {
        // Simple meter: 5 notes in the time of 3.
        let simple = parse_tune(&["X:1", "L:1/4", "Q:1/4=120", "M:4/4", "(5CCCCC"]);
        assert!((simple.total_time() - 1.5).abs() < 1e-9);

        // Compound meter: 5 notes in the time of 2.
        let compound = parse_tune(&["X:1", "L:1/4", "Q:1/4=120", "M:6/8", "(5CCCCC"]);
        assert!((compound.total_time() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_explicit_tuplet_ratio() {
        let seq = parse_tune(&["X:1", "L:1/4", "Q:1/4=120", "(3:2:2CC C"]);
        // Two notes at 2/3 of a half second, then a plain half second.
        let expected = [1.0 / 3.0, 2.0 / 3.0, 7.0 / 6.0];
        for (note, want) in seq.notes.iter().zip(expected) {
            assert!((note.end_time - want).abs() < 1e-9);
        }
    }

    #[test]
    fn test_inline_fields() {
        let seq = parse_tune(&["X:1", "L:1/4", "Q:1/4=120", "K:C", "CC[M:3/4]C[K:D]FC"]);
        assert_eq!(seq.time_signatures.len(), 1);
        assert_eq!(seq.time_signatures[0].time, 1.0);
        assert_eq!(seq.key_signatures.len(), 2);
        assert_eq!(seq.key_signatures[1].key, noteseq::Key::D);
        assert_eq!(seq.key_signatures[1].time, 1.5);
        // F and C after the key change pick up the D-major sharps.
        assert_eq!(pitches(&seq), vec![60, 60, 60, 66, 61]);
    }

    #[test]
    fn test_inline_tempo_change() {
        let seq = parse_tune(&["X:1", "L:1/4", "Q:1/4=120", "C[Q:1/4=60]C"]);
        assert_eq!(seq.tempos.len(), 2);
        assert_eq!(seq.tempos[1].qpm, 60.0);
        assert_eq!(seq.tempos[1].time, 0.5);
        assert_eq!(end_times(&seq), vec![0.5, 1.5]);
    }

    #[test]
    fn test_deprecated_tempo_resolves_against_meter() {
        // M: after Q:, no L:. 2/4 is below 3/4, so the unit is 1/16
        // and Q:100 means 25 qpm.
        let seq = parse_tune(&["X:1", "Q:100", "M:2/4"]);
        assert_eq!(seq.tempos.len(), 1);
        assert_eq!(seq.tempos[0].qpm, 25.0);
    }

    #[test]
    fn test_deprecated_tempo_resolves_against_unit_length() {
        let seq = parse_tune(&["X:1", "Q:100", "L:1/4"]);
        assert_eq!(seq.tempos.len(), 1);
        assert_eq!(seq.tempos[0].qpm, 100.0);
    }

    #[test]
    fn test_label_only_tempo_emits_nothing() {
        let seq = parse_tune(&["X:1", "Q:\"Andante\""]);
        assert!(seq.tempos.is_empty());
    }

    #[test]
    fn test_annotations_capture_time() {
        let seq = parse_tune(&["X:1", "L:1/4", "Q:1/4=120", "\"Am\"C\"G7\"C"]);
        assert_eq!(seq.text_annotations.len(), 2);
        assert_eq!(seq.text_annotations[0].text, "Am");
        assert_eq!(seq.text_annotations[0].time, 0.0);
        assert_eq!(seq.text_annotations[1].text, "G7");
        assert_eq!(seq.text_annotations[1].time, 0.5);
    }

    #[test]
    fn test_decorations_and_slurs_are_skipped() {
        let seq = parse_tune(&["X:1", "L:1/4", "(.C~D)!trill!E"]);
        assert_eq!(pitches(&seq), vec![60, 62, 64]);
    }

    #[test]
    fn test_line_continuation() {
        let seq = parse_tune(&["X:1", "L:1/4", "CD\\", "EF"]);
        assert_eq!(pitches(&seq), vec![60, 62, 64, 65]);
    }

    #[test]
    fn test_comments_are_discarded() {
        let seq = parse_tune(&["X:1", "L:1/4", "CD % two notes", "% a full comment line", "EF"]);
        assert_eq!(pitches(&seq), vec![60, 62, 64, 65]);
    }

    #[test]
    fn test_multiple_note_lengths_error() {
        let result = TuneParser::new().parse(&["X:1", "L:1/4", "L:1/8", "K:C"]);
        assert_eq!(result.unwrap_err(), ParseError::MultipleNoteLength);
    }

    #[test]
    fn test_part_field_errors() {
        let result = TuneParser::new().parse(&["X:1", "P:A", "K:C"]);
        assert!(matches!(result.unwrap_err(), ParseError::Part(_)));
    }

    #[test]
    fn test_variant_ending_errors() {
        let result = TuneParser::new().parse(&["X:1", "K:C", "C|1 D"]);
        assert!(matches!(result.unwrap_err(), ParseError::VariantEnding(_)));

        let result = TuneParser::new().parse(&["X:1", "K:C", "[1 C"]);
        assert!(matches!(result.unwrap_err(), ParseError::VariantEnding(_)));
    }

    #[test]
    fn test_malformed_tuplet_errors() {
        let result = TuneParser::new().parse(&["X:1", "K:C", "(0CDE"]);
        assert!(matches!(result.unwrap_err(), ParseError::Tuplet(_)));
    }

    #[test]
    fn test_malformed_chord_errors() {
        let result = TuneParser::new().parse(&["X:1", "K:C", "[]"]);
        assert!(matches!(result.unwrap_err(), ParseError::Chord(_)));

        let result = TuneParser::new().parse(&["X:1", "K:C", "[CE"]);
        assert!(matches!(result.unwrap_err(), ParseError::Chord(_)));
    }

    #[test]
    fn test_stray_colon_errors() {
        let result = TuneParser::new().parse(&["X:1", "K:C", "C : D"]);
        assert!(matches!(result.unwrap_err(), ParseError::RepeatParse(_)));
    }

    #[test]
    fn test_invalid_character_errors() {
        let result = TuneParser::new().parse(&["X:1", "K:C", "C & D"]);
        assert_eq!(result.unwrap_err(), ParseError::InvalidCharacter('&'));
    }

    #[test]
    fn test_broken_rhythm_without_note_errors() {
        let result = TuneParser::new().parse(&["X:1", "K:C", "> C"]);
        assert_eq!(result.unwrap_err(), ParseError::InvalidCharacter('>'));
    }

    #[test]
    fn test_repeat_markers_tolerated() {
        let seq = parse_tune(&["X:1", "L:1/4", "|:CD:|EF|]"]);
        assert_eq!(pitches(&seq), vec![60, 62, 64, 65]);
    }

    #[test]
    fn test_notes_sorted_and_positive_length() {
        let seq = parse_tune(&[
            "X:1",
            "L:1/8",
            "M:6/8",
            "Q:3/8=120",
            "K:G",
            "d2B G>AB|[GB]c (3ded z d|",
        ]);
        for pair in seq.notes.windows(2) {
            assert!(pair[1].start_time >= pair[0].start_time);
        }
        for note in &seq.notes {
            assert!(note.end_time > note.start_time);
        }
    }
}
