//! ABC notation parser emitting timestamped note-sequence events.
//!
//! This crate turns tunes written in ABC notation (abc v2.1, the
//! single-voice subset) into [`noteseq::NoteSequence`] values: pitched
//! notes with absolute start and end times in seconds, plus the key
//! signatures, time signatures, tempos, and metadata that were in effect.
//!
//! Parsing is a single forward pass per tune. Within a tune the first
//! error aborts that tune; across a book, failing tunes are recorded and
//! the rest still parse.
//!
//! # Example
//!
//! ```
//! let book = abc::parse_tunebook("X:1\nT:Scale\nL:1/4\nQ:1/4=120\nK:C\nCDEF|\n");
//! assert!(book.errors.is_empty());
//!
//! let tune = &book.tunes[&1];
//! assert_eq!(tune.metadata.title, "Scale");
//! assert_eq!(tune.notes.len(), 4);
//! assert_eq!(tune.notes[0].pitch, 60);
//! assert_eq!(tune.notes[3].end_time, 2.0);
//! ```

pub mod book;
pub mod error;
pub mod fields;
pub mod key;
pub mod note;
pub mod tune;

pub use book::{parse_tunebook, parse_tunebook_file, Tunebook};
pub use error::{ParseError, Result};
pub use key::{parse_key, Accidentals};
pub use tune::{TuneParser, DEFAULT_VELOCITY, TICKS_PER_QUARTER};
