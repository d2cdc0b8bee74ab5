//! Token-level parsers for the tune body, built on winnow.
//!
//! These parsers work on `&mut &str` slices and consume exactly one token.
//! The tune state machine decides which parser to try based on the leading
//! character, so a failure here means the token really is malformed.

use num_rational::Rational64;
use winnow::combinator::opt;
use winnow::prelude::*;
use winnow::token::{one_of, take_while};

type TResult<T> = winnow::ModalResult<T>;

/// Base MIDI values for the upper-case letters; lower case adds an octave.
const BASE_MIDI: [i32; 7] = [69, 71, 60, 62, 64, 65, 67]; // A..G

/// A scanned note token, before key and measure accidentals apply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteToken {
    /// Alphabetical pitch class index (`A` = 0 .. `G` = 6).
    pub class: usize,
    /// MIDI value of the written pitch with octave marks applied, but
    /// without any accidental.
    pub midi: i32,
    /// Inline accidental in semitones; `Some(0)` is an explicit natural.
    pub accidental: Option<i8>,
    /// Length multiplier relative to the unit note length.
    pub duration: Rational64,
}

/// Parse a pitch letter into its class index and base MIDI value.
/// Upper case is the middle octave (`C` = 60), lower case one above.
pub fn parse_pitch(input: &mut &str) -> TResult<(usize, i32)> {
    let c = one_of(('A'..='G', 'a'..='g')).parse_next(input)?;
    let class = (c.to_ascii_uppercase() as u8 - b'A') as usize;
    let base = BASE_MIDI[class];
    Ok((class, if c.is_ascii_lowercase() { base + 12 } else { base }))
}

/// Parse an inline accidental (`^^`, `^`, `=`, `_`, `__`) as semitones.
pub fn parse_accidental(input: &mut &str) -> TResult<i8> {
    winnow::combinator::alt((
        "^^".map(|_| 2),
        "^".map(|_| 1),
        "__".map(|_| -2),
        "_".map(|_| -1),
        "=".map(|_| 0),
    ))
    .parse_next(input)
}

/// Parse octave marks. `'` and `,` may interleave in any order; each `'`
/// raises and each `,` lowers by an octave.
pub fn parse_octave_marks(input: &mut &str) -> TResult<i32> {
    let marks: &str = take_while(0.., ['\'', ',']).parse_next(input)?;
    Ok(marks
        .chars()
        .map(|c| if c == '\'' { 1 } else { -1 })
        .sum())
}

/// Parse a duration token into a multiplier: `2`, `3/2`, `/`, `//`, `/4`.
///
/// Bare slashes halve per slash (`//` is a quarter); digits after a slash
/// run divide by that value (`/4` is a quarter, `3/2` is three halves).
/// An absent token is a multiplier of one.
pub fn parse_duration(input: &mut &str) -> TResult<Rational64> {
    let digits: &str = take_while(0.., |c: char| c.is_ascii_digit()).parse_next(input)?;
    let numerator: i64 = digits.parse().unwrap_or(1);

    let slashes: &str = take_while(0.., '/').parse_next(input)?;
    if slashes.is_empty() {
        return Ok(Rational64::from_integer(numerator));
    }
    let shift = slashes.len().min(30) as u32;

    let den_digits: &str = take_while(0.., |c: char| c.is_ascii_digit()).parse_next(input)?;
    let denominator: i64 = match den_digits.parse::<i64>() {
        Ok(d) if d > 0 => d << (shift - 1),
        _ => 1i64 << shift,
    };

    Ok(Rational64::new(numerator, denominator))
}

/// Parse a complete note token: accidental, letter, octave marks, duration.
pub fn parse_note(input: &mut &str) -> TResult<NoteToken> {
    let accidental = opt(parse_accidental).parse_next(input)?;
    let (class, base) = parse_pitch(input)?;
    let octave = parse_octave_marks(input)?;
    let duration = parse_duration(input)?;

    Ok(NoteToken {
        class,
        midi: base + 12 * octave,
        accidental,
        duration,
    })
}

/// Parse a rest (`z` visible, `x` invisible) into its duration multiplier.
pub fn parse_rest(input: &mut &str) -> TResult<Rational64> {
    one_of(['z', 'x']).parse_next(input)?;
    parse_duration(input)
}

/// Parse a chord body `[..notes..]` with its trailing duration token.
/// Structural problems (no closing bracket, junk inside) fail the parse;
/// the caller maps that to a chord error.
pub fn parse_chord(input: &mut &str) -> TResult<(Vec<NoteToken>, Rational64)> {
    '['.parse_next(input)?;

    let mut notes = Vec::new();
    loop {
        *input = input.trim_start_matches(' ');
        if input.starts_with(']') {
            break;
        }
        match parse_note.parse_next(input) {
            Ok(note) => notes.push(note),
            Err(_) => break,
        }
    }

    ']'.parse_next(input)?;
    let duration = parse_duration(input)?;
    Ok((notes, duration))
}

/// Parse a quoted annotation `"..."` into its text.
pub fn parse_annotation(input: &mut &str) -> TResult<String> {
    '"'.parse_next(input)?;
    let text: &str = take_while(0.., |c: char| c != '"').parse_next(input)?;
    '"'.parse_next(input)?;
    Ok(text.to_string())
}
