//! The closed error taxonomy for ABC parsing.
//!
//! Inside a tune the first error aborts that tune's parse; the tune-book
//! dispatcher records the error and continues with the next tune.

use serde::Serialize;
use thiserror::Error;

/// Everything that can go wrong while parsing a tune.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ParseError {
    #[error("could not parse key: {0}")]
    KeyParse(String),

    #[error("could not parse tempo: {0}")]
    Tempo(String),

    #[error("multiple unit note lengths in one tune")]
    MultipleNoteLength,

    #[error("malformed chord: {0}")]
    Chord(String),

    #[error("malformed tuplet: {0}")]
    Tuplet(String),

    #[error("malformed repeat marker: {0}")]
    RepeatParse(String),

    #[error("variant endings are not supported: {0}")]
    VariantEnding(String),

    #[error("part definitions are not supported: {0}")]
    Part(String),

    #[error("invalid character {0:?} in tune body")]
    InvalidCharacter(char),

    #[error("malformed tune structure: {0}")]
    TuneStructure(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;
