//! Key signature resolution for the K: field.
//!
//! A key designator like `F# mixolydian` or `D exp _b _e ^f` resolves to a
//! per-pitch-class accidental vector plus canonical key and mode tags. The
//! vector is indexed alphabetically `A..G` in semitone offsets.

use noteseq::{Key, Mode};

use crate::error::{ParseError, Result};

/// Number of natural pitch classes.
pub const PITCH_CLASSES: usize = 7;

/// Accidental offsets per natural pitch class, indexed `A..G`.
pub type Accidentals = [i8; PITCH_CLASSES];

/// Sharps enter the signature in this order: F C G D A E B.
const SHARP_ORDER: [usize; 7] = [5, 2, 6, 3, 0, 4, 1];

/// Flats enter the signature in this order: B E A D G C F.
const FLAT_ORDER: [usize; 7] = [1, 4, 0, 3, 6, 2, 5];

/// Mode tokens are matched case-insensitively by prefix, in this order.
/// The bare `m` must come last so `mix`/`min`/`maj` win over it.
const MODE_PREFIXES: [(&str, Mode); 10] = [
    ("maj", Mode::Major),
    ("ion", Mode::Major),
    ("min", Mode::Minor),
    ("aeo", Mode::Minor),
    ("mix", Mode::Mixolydian),
    ("dor", Mode::Dorian),
    ("phr", Mode::Phrygian),
    ("lyd", Mode::Lydian),
    ("loc", Mode::Locrian),
    ("m", Mode::Minor),
];

/// Parse a key designator into `(accidentals, key, mode)`.
///
/// The accidentals vector is indexed alphabetically `A..G`; entries are
/// semitone offsets established by the signature. `key` is the canonical
/// chromatic key (sharp-side spelling, so `F#` stays `FSharp`) and `mode`
/// the canonical mode with ionian and aeolian folded into major and minor.
pub fn parse_key(designator: &str) -> Result<(Accidentals, Key, Mode)> {
    let err = || ParseError::KeyParse(designator.to_string());

    let mut rest = designator.trim();
    let tonic = rest.chars().next().ok_or_else(err)?;
    let tonic_class = class_index(tonic).ok_or_else(err)?;
    rest = rest[tonic.len_utf8()..].trim_start();

    // Tonic accidental: # or b directly after the letter.
    let tonic_offset: i8 = if let Some(r) = rest.strip_prefix('#') {
        rest = r.trim_start();
        1
    } else if let Some(r) = rest.strip_prefix('b') {
        rest = r.trim_start();
        -1
    } else {
        0
    };

    // Mode is at most the first whitespace-delimited token.
    let mut mode = Mode::Major;
    if let Some(token) = rest.split_whitespace().next() {
        if let Some(matched) = match_mode(token) {
            mode = matched;
            rest = rest[token.len()..].trim_start();
        }
    }

    // Remaining tokens: the `exp` keyword and explicit accidentals.
    let mut explicit: Vec<(usize, i8)> = Vec::new();
    let mut explicit_only = false;
    for token in rest.split_whitespace() {
        if token.eq_ignore_ascii_case("exp") {
            explicit_only = true;
            continue;
        }
        parse_accidental_token(token, &mut explicit).ok_or_else(err)?;
    }

    let mut accidentals = [0i8; PITCH_CLASSES];
    if !explicit_only {
        fill_signature(&mut accidentals, sharp_count(tonic_class, tonic_offset, mode));
    }
    for (class, offset) in explicit {
        accidentals[class] = offset;
    }

    let pitch_class = (letter_semitone(tonic_class) + tonic_offset as i16).rem_euclid(12) as u8;
    Ok((accidentals, Key::from_pitch_class(pitch_class), mode))
}

/// Alphabetical class index for a tonic letter (`A` = 0 .. `G` = 6).
fn class_index(letter: char) -> Option<usize> {
    let upper = letter.to_ascii_uppercase();
    if upper.is_ascii_uppercase() && ('A'..='G').contains(&upper) {
        Some((upper as u8 - b'A') as usize)
    } else {
        None
    }
}

/// Semitone of the natural pitch class relative to C (A=9 .. G=7).
fn letter_semitone(class: usize) -> i16 {
    [9, 11, 0, 2, 4, 5, 7][class]
}

fn match_mode(token: &str) -> Option<Mode> {
    let lowered = token.to_ascii_lowercase();
    MODE_PREFIXES
        .iter()
        .find(|(prefix, _)| lowered.starts_with(prefix))
        .map(|(_, mode)| *mode)
}

/// Signed count of sharps (positive) or flats (negative) in the signature.
fn sharp_count(tonic_class: usize, tonic_offset: i8, mode: Mode) -> i32 {
    // Sharps in the major key of each natural tonic, indexed A..G.
    let base: i32 = [3, 5, 0, 2, 4, -1, 1][tonic_class];
    let mode_offset = match mode {
        Mode::Lydian => 1,
        Mode::Major => 0,
        Mode::Mixolydian => -1,
        Mode::Dorian => -2,
        Mode::Minor => -3,
        Mode::Phrygian => -4,
        Mode::Locrian => -5,
    };
    base + 7 * tonic_offset as i32 + mode_offset
}

fn fill_signature(accidentals: &mut Accidentals, count: i32) {
    if count > 0 {
        for &class in SHARP_ORDER.iter().take(count.min(7) as usize) {
            accidentals[class] = 1;
        }
    } else {
        for &class in FLAT_ORDER.iter().take((-count).min(7) as usize) {
            accidentals[class] = -1;
        }
    }
}

/// Parse one token of explicit accidentals (`^f`, `__b`, `=c`, possibly
/// run together like `^f^c`). Returns `None` on anything unrecognized.
fn parse_accidental_token(token: &str, out: &mut Vec<(usize, i8)>) -> Option<()> {
    let mut rest = token;
    while !rest.is_empty() {
        let (offset, len) = if rest.starts_with("^^") {
            (2, 2)
        } else if rest.starts_with('^') {
            (1, 1)
        } else if rest.starts_with("__") {
            (-2, 2)
        } else if rest.starts_with('_') {
            (-1, 1)
        } else if rest.starts_with('=') {
            (0, 1)
        } else {
            return None;
        };
        rest = &rest[len..];
        let letter = rest.chars().next()?;
        let class = class_index(letter)?;
        out.push((class, offset));
        rest = &rest[letter.len_utf8()..];
    }
    Some(())
}
