//! Tune-book splitting and dispatch.
//!
//! A tune book is a text file holding any number of tunes separated by
//! blank lines, with an optional file header (information fields before
//! the first `X:` line) that supplies defaults for every tune. Each tune
//! is parsed against fresh state; a failing tune is recorded and skipped
//! without aborting the rest of the book.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use noteseq::NoteSequence;

use crate::error::ParseError;
use crate::tune::TuneParser;

/// A parsed tune book: tunes keyed by reference number, in numeric order,
/// plus `(record index, error)` pairs for the records that failed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Tunebook {
    pub tunes: BTreeMap<u32, NoteSequence>,
    pub errors: Vec<(usize, ParseError)>,
}

impl Tunebook {
    pub fn is_empty(&self) -> bool {
        self.tunes.is_empty() && self.errors.is_empty()
    }
}

/// Parse a tune book from a string.
pub fn parse_tunebook(text: &str) -> Tunebook {
    let mut records: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            if !current.is_empty() {
                records.push(std::mem::take(&mut current));
            }
        } else if line.starts_with('%') {
            // Comments never contribute to record structure.
            continue;
        } else {
            // An X: line starts a new tune even without a blank separator.
            if is_reference_field(line) && !current.is_empty() {
                records.push(std::mem::take(&mut current));
            }
            current.push(line);
        }
    }
    if !current.is_empty() {
        records.push(current);
    }

    // A leading record that does not open with X: is the file header.
    let mut records = records.into_iter();
    let mut template = TuneParser::new();
    let mut first = records.next();
    if let Some(header) = &first {
        if !header.first().is_some_and(|line| is_reference_field(line)) {
            apply_file_header(&mut template, header);
            first = records.next();
        }
    }

    let mut book = Tunebook::default();
    for (index, record) in first.into_iter().chain(records).enumerate() {
        match template.clone().parse(&record) {
            Ok(seq) => {
                book.tunes.insert(seq.reference_number, seq);
            }
            Err(error) => {
                debug!(index, %error, "skipping unparseable tune");
                book.errors.push((index, error));
            }
        }
    }
    book
}

/// Parse a tune book from a file on disk.
pub fn parse_tunebook_file<P: AsRef<Path>>(path: P) -> io::Result<Tunebook> {
    let text = fs::read_to_string(path)?;
    Ok(parse_tunebook(&text))
}

fn is_reference_field(line: &str) -> bool {
    line.starts_with("X:")
}

fn apply_file_header(template: &mut TuneParser, lines: &[&str]) {
    for &line in lines {
        let mut chars = line.chars();
        let (letter, colon) = (chars.next(), chars.next());
        match (letter, colon) {
            (Some(letter), Some(':')) if letter.is_ascii_alphabetic() => {
                if let Err(error) = template.apply_book_default(letter, &line[2..]) {
                    debug!(%error, line, "ignoring bad file-header field");
                }
            }
            _ => debug!(line, "ignoring non-field line in file header"),
        }
    }
}
