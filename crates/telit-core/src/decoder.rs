//! # Response Decoder
//!
//! Turns the intermediate lines of an [`AtResponse`] into typed values.
//! A [`Decoder`] walks the response line by line; [`Decoder::next_line`]
//! positions a [`Fields`] cursor just past a required prefix, and the cursor
//! hands out comma-separated fields strictly left to right.
//!
//! Every accessor consumes exactly one field, successful or not, and reports
//! a specific [`DecodeError`] instead of panicking.
//!
//! ## Usage
//!
//! ```
//! use telit_core::decoder::decode_single;
//! use telit_core::transport::AtResponse;
//!
//! let resp = AtResponse::ok(["+CGDCONT: 1,\"IP\",\"internet\""]);
//! let apn = decode_single(&resp, "+CGDCONT:", |f| {
//!     f.skip_fields(2)?;
//!     f.next_quoted_string().map(str::to_owned)
//! })
//! .unwrap();
//! assert_eq!(apn, "internet");
//! ```

use crate::error::{DecodeError, FieldKind};
use crate::transport::AtResponse;

/// Line cursor over one response.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    lines: &'a [String],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(response: &'a AtResponse) -> Self {
        Self {
            lines: &response.lines,
            pos: 0,
        }
    }

    /// Advance to the next line starting with `prefix` and return a field
    /// cursor positioned just past it.
    pub fn next_line(&mut self, prefix: &str) -> Result<Fields<'a>, DecodeError> {
        let lines = self.lines;
        while let Some(line) = lines.get(self.pos) {
            self.pos += 1;
            if let Some(rest) = line.strip_prefix(prefix) {
                return Ok(Fields::new(rest));
            }
        }
        Err(DecodeError::PrefixNotFound {
            prefix: prefix.to_string(),
        })
    }

    /// Next line verbatim, whatever it starts with.
    pub fn next_raw_line(&mut self) -> Option<&'a str> {
        let line = self.lines.get(self.pos)?;
        self.pos += 1;
        Some(line.as_str())
    }

    /// Lines not yet visited.
    pub fn remaining(&self) -> usize {
        self.lines.len().saturating_sub(self.pos)
    }
}

enum RawField<'a> {
    Plain(&'a str),
    Quoted(&'a str),
    Unterminated,
}

/// Field cursor over the remainder of one line.
#[derive(Debug, Clone)]
pub struct Fields<'a> {
    rest: Option<&'a str>,
    index: usize,
}

impl<'a> Fields<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            rest: Some(text),
            index: 0,
        }
    }

    /// Index of the next field to be consumed.
    pub fn index(&self) -> usize {
        self.index
    }

    fn take(&mut self) -> Result<(usize, RawField<'a>), DecodeError> {
        let index = self.index;
        let rest = self
            .rest
            .take()
            .ok_or(DecodeError::FieldMissing { index })?
            .trim_start();
        self.index += 1;

        if let Some(body) = rest.strip_prefix('"') {
            let Some(end) = body.find('"') else {
                return Ok((index, RawField::Unterminated));
            };
            self.rest = body[end + 1..].trim_start().strip_prefix(',');
            return Ok((index, RawField::Quoted(&body[..end])));
        }

        let (field, next) = match rest.find(',') {
            Some(comma) => (&rest[..comma], Some(&rest[comma + 1..])),
            None => (rest, None),
        };
        self.rest = next;
        Ok((index, RawField::Plain(field.trim_end())))
    }

    pub fn next_integer(&mut self) -> Result<i64, DecodeError> {
        match self.take()? {
            (index, RawField::Plain("")) => Err(DecodeError::FieldMissing { index }),
            (index, RawField::Plain(text)) => text
                .parse()
                .map_err(|_| mismatch(index, FieldKind::Integer)),
            (index, _) => Err(mismatch(index, FieldKind::Integer)),
        }
    }

    /// Unquoted numeric token parsed as a float, e.g. `-7.5`.
    pub fn next_float(&mut self) -> Result<f32, DecodeError> {
        match self.take()? {
            (index, RawField::Plain("")) => Err(DecodeError::FieldMissing { index }),
            (index, RawField::Plain(text)) => text
                .parse()
                .map_err(|_| mismatch(index, FieldKind::Float)),
            (index, _) => Err(mismatch(index, FieldKind::Float)),
        }
    }

    pub fn next_quoted_string(&mut self) -> Result<&'a str, DecodeError> {
        match self.take()? {
            (_, RawField::Quoted(text)) => Ok(text),
            (index, RawField::Plain("")) => Err(DecodeError::FieldMissing { index }),
            (index, _) => Err(mismatch(index, FieldKind::QuotedString)),
        }
    }

    pub fn next_unquoted_token(&mut self) -> Result<&'a str, DecodeError> {
        match self.take()? {
            (index, RawField::Plain("")) => Err(DecodeError::FieldMissing { index }),
            (_, RawField::Plain(text)) => Ok(text),
            (index, _) => Err(mismatch(index, FieldKind::Token)),
        }
    }

    pub fn skip_field(&mut self) -> Result<(), DecodeError> {
        self.take().map(|_| ())
    }

    pub fn skip_fields(&mut self, count: usize) -> Result<(), DecodeError> {
        for _ in 0..count {
            self.skip_field()?;
        }
        Ok(())
    }
}

fn mismatch(index: usize, expected: FieldKind) -> DecodeError {
    DecodeError::FieldTypeMismatch { index, expected }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Decode the first line carrying `prefix`.
pub fn decode_single<'a, T>(
    response: &'a AtResponse,
    prefix: &str,
    decode: impl FnOnce(&mut Fields<'a>) -> Result<T, DecodeError>,
) -> Result<T, DecodeError> {
    let mut fields = Decoder::new(response).next_line(prefix)?;
    decode(&mut fields)
}

/// Decode every line carrying `prefix` as one table row, in order.
///
/// More than `cap` rows is a hard failure, never a truncation. The row
/// callback receives the zero-based row index.
pub fn decode_table<'a, T>(
    response: &'a AtResponse,
    prefix: &str,
    cap: usize,
    mut row: impl FnMut(usize, &mut Fields<'a>) -> Result<T, DecodeError>,
) -> Result<Vec<T>, DecodeError> {
    let count = response
        .lines
        .iter()
        .filter(|line| line.starts_with(prefix))
        .count();
    if count > cap {
        return Err(DecodeError::TooManyRows { cap });
    }

    let mut decoder = Decoder::new(response);
    let mut rows = Vec::with_capacity(count);
    for idx in 0..count {
        let mut fields = decoder.next_line(prefix)?;
        rows.push(row(idx, &mut fields)?);
    }
    Ok(rows)
}

/// Map a vendor code onto a closed set of values.
pub fn lookup_code<T: Copy>(code: i64, table: &[(i64, T)]) -> Result<T, DecodeError> {
    table
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, value)| *value)
        .ok_or(DecodeError::UnknownCode { code })
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn resp(lines: &[&str]) -> AtResponse {
        AtResponse::ok(lines.iter().copied())
    }

    #[test]
    fn integer_after_prefix_and_whitespace() {
        let r = resp(&["+WS46: 25"]);
        let value = decode_single(&r, "+WS46:", |f| f.next_integer()).unwrap();
        assert_eq!(value, 25);
    }

    #[test]
    fn prefix_not_found_names_the_prefix() {
        let r = resp(&["+CFUN: 1"]);
        let err = decode_single(&r, "+WS46:", |f| f.next_integer()).unwrap_err();
        assert_eq!(
            err,
            DecodeError::PrefixNotFound {
                prefix: "+WS46:".into()
            }
        );
    }

    #[test]
    fn next_line_skips_unrelated_lines() {
        let r = resp(&["noise", "+COPS: 0,0,\"Operator, Inc\",7"]);
        let tech = decode_single(&r, "+COPS:", |f| {
            f.skip_fields(3)?;
            f.next_integer()
        })
        .unwrap();
        assert_eq!(tech, 7, "quoted commas must not split fields");
    }

    #[test]
    fn mixed_field_sequence_in_declaration_order() {
        let r = resp(&["#RFSTS: \"001 01\",1550,-98,-65,-10.5"]);
        let mut d = Decoder::new(&r);
        let mut f = d.next_line("#RFSTS:").unwrap();
        assert_eq!(f.next_quoted_string().unwrap(), "001 01");
        assert_eq!(f.next_integer().unwrap(), 1550);
        assert_eq!(f.next_unquoted_token().unwrap(), "-98");
        assert_eq!(f.next_integer().unwrap(), -65);
        assert_eq!(f.next_float().unwrap(), -10.5);
        assert_eq!(f.next_integer(), Err(DecodeError::FieldMissing { index: 5 }));
    }

    #[test]
    fn truncated_sequence_reports_field_missing() {
        let r = resp(&["#BND: 0,5"]);
        let err = decode_single(&r, "#BND:", |f| {
            f.skip_field()?;
            f.next_integer()?;
            f.next_integer()
        })
        .unwrap_err();
        assert_eq!(err, DecodeError::FieldMissing { index: 2 });
    }

    #[test]
    fn empty_field_counts_as_missing() {
        let r = resp(&["+CGLA: 4,"]);
        let mut f = Decoder::new(&r).next_line("+CGLA:").unwrap();
        assert_eq!(f.next_integer().unwrap(), 4);
        assert_eq!(
            f.next_quoted_string(),
            Err(DecodeError::FieldMissing { index: 1 })
        );
    }

    #[test]
    fn mistyped_fields_report_type_mismatch() {
        let r = resp(&["+CGDCONT: \"1\",IP"]);
        let mut f = Decoder::new(&r).next_line("+CGDCONT:").unwrap();
        assert_eq!(
            f.next_integer(),
            Err(DecodeError::FieldTypeMismatch {
                index: 0,
                expected: FieldKind::Integer
            })
        );
        assert_eq!(
            f.next_quoted_string(),
            Err(DecodeError::FieldTypeMismatch {
                index: 1,
                expected: FieldKind::QuotedString
            })
        );
    }

    #[test]
    fn unterminated_quote_is_a_mismatch() {
        let r = resp(&["+XTRACECONFIG: \"abc"]);
        let err = decode_single(&r, "+XTRACECONFIG:", |f| f.next_quoted_string()).unwrap_err();
        assert_eq!(
            err,
            DecodeError::FieldTypeMismatch {
                index: 0,
                expected: FieldKind::QuotedString
            }
        );
    }

    #[test]
    fn empty_quoted_string_is_a_value() {
        let r = resp(&["+CGDCONT: 3,\"IP\",\"\""]);
        let apn = decode_single(&r, "+CGDCONT:", |f| {
            f.skip_fields(2)?;
            f.next_quoted_string()
        })
        .unwrap();
        assert_eq!(apn, "");
    }

    #[test]
    fn gpio_table_decodes_rows_in_order() {
        let r = resp(&["#GPIO: 1,0", "#GPIO: 2,1"]);
        let rows = decode_table(&r, "#GPIO:", 20, |idx, f| {
            Ok((idx + 1, f.next_integer()?, f.next_integer()?))
        })
        .unwrap();
        assert_eq!(rows, vec![(1, 1, 0), (2, 2, 1)]);
    }

    #[test]
    fn table_over_cap_is_a_hard_failure() {
        let r = resp(&["#GPIO: 1,0", "#GPIO: 2,1", "#GPIO: 0,0"]);
        let err = decode_table(&r, "#GPIO:", 2, |_, f| f.next_integer()).unwrap_err();
        assert_eq!(err, DecodeError::TooManyRows { cap: 2 });
    }

    #[test]
    fn empty_table_is_valid() {
        let r = resp(&[]);
        let rows = decode_table(&r, "+CGDCONT:", 16, |_, f| f.next_integer()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn lookup_code_rejects_unknown_values() {
        let table = [(0, false), (2, true)];
        assert_eq!(lookup_code(2, &table), Ok(true));
        assert_eq!(
            lookup_code(1, &table),
            Err(DecodeError::UnknownCode { code: 1 })
        );
    }

    #[test]
    fn raw_lines_are_returned_verbatim() {
        let r = resp(&["Network survey started ...", "arfcn: 10 bsic: 7"]);
        let mut d = Decoder::new(&r);
        assert_eq!(d.next_raw_line(), Some("Network survey started ..."));
        assert_eq!(d.remaining(), 1);
        assert_eq!(d.next_raw_line(), Some("arfcn: 10 bsic: 7"));
        assert_eq!(d.next_raw_line(), None);
    }
}
