//! Plain-text matrix and vector files.
//!
//! The format is whitespace separated:
//! ```text
//! # comment lines start with '#'
//! <rows> <cols>
//! <a00> <a01> ...
//! <a10> <a11> ...
//! ```
//! Vector files carry a single `<len>` header. Values may be wrapped across
//! lines freely; only the total count is checked against the header.

use std::path::Path;

use thiserror::Error;

use crate::error::CoreError;
use crate::types::{Matrix, Vector};

/// Errors while reading a matrix or vector file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    FormatError { line: usize, message: String },

    #[error(transparent)]
    Shape(#[from] CoreError),
}

/// Non-comment tokens paired with their 1-based line number.
fn tokens(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim_start().starts_with('#'))
        .flat_map(|(idx, line)| line.split_whitespace().map(move |tok| (idx + 1, tok)))
}

fn parse_header<'a>(
    toks: &mut impl Iterator<Item = (usize, &'a str)>,
    name: &str,
) -> Result<usize, ParseError> {
    let (line, tok) = toks.next().ok_or_else(|| ParseError::FormatError {
        line: 1,
        message: format!("Missing {name} in header"),
    })?;
    tok.parse().map_err(|_| ParseError::FormatError {
        line,
        message: format!("Invalid {name}: '{tok}'"),
    })
}

fn parse_values<'a>(
    toks: impl Iterator<Item = (usize, &'a str)>,
    expected: usize,
) -> Result<Vec<f64>, ParseError> {
    // the header is untrusted, so grow with the data instead of reserving
    let mut values = Vec::new();
    let mut last_line = 1;
    for (line, tok) in toks {
        last_line = line;
        if values.len() == expected {
            return Err(ParseError::FormatError {
                line,
                message: format!("Header declares {expected} values but found more"),
            });
        }
        let x: f64 = tok.parse().map_err(|_| ParseError::FormatError {
            line,
            message: format!("Invalid value: '{tok}'"),
        })?;
        values.push(x);
    }
    if values.len() != expected {
        return Err(ParseError::FormatError {
            line: last_line,
            message: format!("Header declares {} values but found {}", expected, values.len()),
        });
    }
    Ok(values)
}

/// Parse a matrix from text.
pub fn parse_matrix(content: &str) -> Result<Matrix, ParseError> {
    let mut toks = tokens(content);
    let rows = parse_header(&mut toks, "row count")?;
    let cols = parse_header(&mut toks, "column count")?;
    let expected = rows.checked_mul(cols).ok_or(CoreError::Allocation {
        elements: usize::MAX,
    })?;
    let values = parse_values(toks, expected)?;
    Ok(Matrix::new(rows, cols, values)?)
}

/// Parse a vector from text.
pub fn parse_vector(content: &str) -> Result<Vector, ParseError> {
    let mut toks = tokens(content);
    let len = parse_header(&mut toks, "length")?;
    let values = parse_values(toks, len)?;
    Ok(Vector::new(values)?)
}

pub fn load_matrix(path: &Path) -> Result<Matrix, ParseError> {
    parse_matrix(&std::fs::read_to_string(path)?)
}

pub fn load_vector(path: &Path) -> Result<Vector, ParseError> {
    parse_vector(&std::fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_matrix() {
        let content = "# 3x2 example\n3 2\n1 2\n3 4\n5 6\n";
        let m = parse_matrix(content).unwrap();
        assert_eq!(m.rows(), 3);
        assert_eq!(m.row(2), &[5.0, 6.0]);
    }

    #[test]
    fn test_values_may_wrap_lines() {
        let m = parse_matrix("2 2\n1 2 3\n4\n").unwrap();
        assert_eq!(m.as_slice(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_parse_vector() {
        let v = parse_vector("4\n1.5 -2 3e2 0\n").unwrap();
        assert_eq!(v.as_slice(), &[1.5, -2.0, 300.0, 0.0]);
    }

    #[test]
    fn test_count_mismatch_reports_line() {
        let err = parse_matrix("2 2\n1 2\n3\n").unwrap_err();
        match err {
            ParseError::FormatError { line, message } => {
                assert_eq!(line, 3);
                assert!(message.contains("declares 4"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_token() {
        let err = parse_vector("2\n1.0 abc\n").unwrap_err();
        assert!(matches!(err, ParseError::FormatError { line: 2, .. }));
    }

    #[test]
    fn test_oversized_header_is_an_error() {
        let err = parse_matrix("2000000000000000000 1\n1.0\n").unwrap_err();
        match err {
            ParseError::FormatError { line, message } => {
                assert_eq!(line, 2);
                assert!(message.contains("found 1"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = parse_matrix("5000000000 5000000000\n1.0\n").unwrap_err();
        assert!(matches!(err, ParseError::Shape(CoreError::Allocation { .. })));
    }

    #[test]
    fn test_extra_values_rejected() {
        let err = parse_vector("2\n1 2\n3\n").unwrap_err();
        assert!(matches!(err, ParseError::FormatError { line: 3, .. }));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let err = parse_matrix("0 3\n").unwrap_err();
        assert!(matches!(
            err,
            ParseError::Shape(CoreError::InvalidDimensions { rows: 0, cols: 3 })
        ));
    }
}
