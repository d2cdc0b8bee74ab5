//! Information-field value parsing: meter, unit note length, tempo.
//!
//! These are the header fields whose values feed the timing arithmetic.
//! Field dispatch itself lives in the tune state machine; this module only
//! understands the value syntax.

use num_rational::Rational64;

use crate::error::{ParseError, Result};

/// A parsed M: value. `none` and `C` both mean common time.
pub fn parse_meter(value: &str) -> Option<(u32, u32)> {
    match value.trim() {
        "C" => Some((4, 4)),
        "C|" => Some((2, 2)),
        "none" | "free" => Some((4, 4)),
        v => {
            let (num, den) = v.split_once('/')?;
            let num: u32 = num.trim().parse().ok()?;
            let den: u32 = den.trim().parse().ok()?;
            (num > 0 && den > 0).then_some((num, den))
        }
    }
}

/// A parsed L: value (`1/8`, `1/16`, ...).
pub fn parse_unit_length(value: &str) -> Option<Rational64> {
    parse_fraction(value.trim())
}

/// A parsed Q: value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TempoSpec {
    /// Quarter notes per minute, fully resolved.
    Qpm(Rational64),
    /// Deprecated bare-number form; resolves against the unit note length
    /// in effect when the tune body starts.
    Deprecated(i64),
    /// The field held only a quoted label; no tempo event results.
    LabelOnly,
}

/// Parse a Q: field value.
///
/// Recognized forms, per abc v2.1 with the deprecated bare number kept:
/// `1/4=120`, `1/4 3/8=40` (units summed), `C=100` (`C` is a quarter,
/// `C|` a half), bare `100`, and any of these with a quoted label before
/// or after. A label by itself yields [`TempoSpec::LabelOnly`].
pub fn parse_tempo(value: &str) -> Result<TempoSpec> {
    let err = || ParseError::Tempo(value.trim().to_string());

    let mut rest = value.trim();
    // Labels may lead or trail; strip them from both ends.
    loop {
        if let Some(after) = rest.strip_prefix('"') {
            let close = after.find('"').ok_or_else(err)?;
            rest = after[close + 1..].trim();
        } else if let Some(before) = rest.strip_suffix('"') {
            let open = before.rfind('"').ok_or_else(err)?;
            rest = before[..open].trim();
        } else {
            break;
        }
    }

    if rest.is_empty() {
        return Ok(TempoSpec::LabelOnly);
    }

    if rest.chars().all(|c| c.is_ascii_digit()) {
        let num: i64 = rest.parse().map_err(|_| err())?;
        if num == 0 {
            return Err(err());
        }
        return Ok(TempoSpec::Deprecated(num));
    }

    let (units, bpm) = rest.split_once('=').ok_or_else(err)?;
    let bpm: i64 = bpm.trim().parse().map_err(|_| err())?;
    if bpm <= 0 {
        return Err(err());
    }

    let units = units.trim().trim_start_matches('(').trim_end_matches(')');
    let mut beat = Rational64::new(0, 1);
    for token in units.split_whitespace() {
        beat += match token {
            "C" => Rational64::new(1, 4),
            "C|" => Rational64::new(1, 2),
            _ => parse_fraction(token).ok_or_else(err)?,
        };
    }
    if beat <= Rational64::new(0, 1) {
        return Err(err());
    }

    // One beat unit is `beat` whole notes; a quarter note is 1/4.
    Ok(TempoSpec::Qpm(Rational64::from_integer(bpm) * beat * 4))
}

/// Parse `n/d` into a positive rational.
pub fn parse_fraction(s: &str) -> Option<Rational64> {
    let (num, den) = s.split_once('/')?;
    let num: i64 = num.trim().parse().ok()?;
    let den: i64 = den.trim().parse().ok()?;
    (num > 0 && den > 0).then(|| Rational64::new(num, den))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qpm(spec: TempoSpec) -> f64 {
        match spec {
            TempoSpec::Qpm(q) => *q.numer() as f64 / *q.denom() as f64,
            other => panic!("expected resolved tempo, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_meter_forms() {
        assert_eq!(parse_meter("4/4"), Some((4, 4)));
        assert_eq!(parse_meter("6/8"), Some((6, 8)));
        assert_eq!(parse_meter("C"), Some((4, 4)));
        assert_eq!(parse_meter("C|"), Some((2, 2)));
        assert_eq!(parse_meter("none"), Some((4, 4)));
        assert_eq!(parse_meter("waltz"), None);
        assert_eq!(parse_meter("3/0"), None);
    }

    #[test]
    fn test_parse_unit_length() {
        assert_eq!(parse_unit_length("1/8"), Some(Rational64::new(1, 8)));
        assert_eq!(parse_unit_length(" 1/16 "), Some(Rational64::new(1, 16)));
        assert_eq!(parse_unit_length("eighth"), None);
    }

    #[test]
    fn test_tempo_fraction_forms() {
        assert_eq!(qpm(parse_tempo("1/4=120").unwrap()), 120.0);
        assert_eq!(qpm(parse_tempo("1/2=120").unwrap()), 240.0);
        assert_eq!(qpm(parse_tempo("3/8=50").unwrap()), 75.0);
        assert_eq!(qpm(parse_tempo("5/4=40").unwrap()), 200.0);
    }

    #[test]
    fn test_tempo_summed_units() {
        assert_eq!(qpm(parse_tempo("1/4 3/8 1/4 3/8=40").unwrap()), 200.0);
        assert_eq!(qpm(parse_tempo("(1/4 3/8)=40").unwrap()), 100.0);
    }

    #[test]
    fn test_tempo_common_time_units() {
        assert_eq!(qpm(parse_tempo("C=100").unwrap()), 100.0);
        assert_eq!(qpm(parse_tempo("C|=40").unwrap()), 80.0);
    }

    #[test]
    fn test_tempo_deprecated_number() {
        assert_eq!(parse_tempo("100").unwrap(), TempoSpec::Deprecated(100));
        assert_eq!(parse_tempo(" 60 ").unwrap(), TempoSpec::Deprecated(60));
    }

    #[test]
    fn test_tempo_labels() {
        assert_eq!(qpm(parse_tempo("\"Allegro\" 1/4=120").unwrap()), 120.0);
        assert_eq!(qpm(parse_tempo("1/4=120 \"Allegro\"").unwrap()), 120.0);
        assert_eq!(qpm(parse_tempo("3/8=50 \"Slowly\"").unwrap()), 75.0);
        assert_eq!(parse_tempo("\"Andante\"").unwrap(), TempoSpec::LabelOnly);
    }

    #[test]
    fn test_tempo_errors() {
        assert!(parse_tempo("fast").is_err());
        assert!(parse_tempo("1/4=").is_err());
        assert!(parse_tempo("=120").is_err());
        assert!(parse_tempo("0").is_err());
        assert!(parse_tempo("1/4=0").is_err());
        assert!(parse_tempo("\"unterminated").is_err());
    }
}
