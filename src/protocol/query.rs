//! The declarative byte-pattern language shared by request encoding and
//! response matching.
//!
//! Every NetMD command is written as a pattern string mixing literal hex
//! digits, whitespace (ignored), and `%`-placeholders:
//!
//! | placeholder | encoding | matching |
//! |-------------|----------|----------|
//! | `%b`        | 1 big-endian byte | unsigned integer |
//! | `%w`        | 2 big-endian bytes | unsigned integer |
//! | `%d`        | 4 big-endian bytes | unsigned integer |
//! | `%q`        | 8 big-endian bytes | unsigned integer |
//! | `%s`        | 2-byte length, payload, trailing NUL | payload without NUL |
//! | `%x`        | 2-byte length, payload | payload |
//! | `%*`        | payload verbatim | remainder of the response |
//! | `%?`        | (matching only) | one byte, discarded |
//!
//! Keeping the patterns as data keeps the protocol table readable; the whole
//! command layer is one-liners over [`format_query`] and [`parse_response`].

use byteorder::{BigEndian, ByteOrder};

use super::Error;

/// A value interpolated into a query or pulled out of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// An unsigned integer field.
    Int(u64),
    /// A byte-string field.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns the integer field, or an error for byte strings.
    pub fn int(&self) -> Result<u64, Error> {
        match self {
            Value::Int(value) => Ok(*value),
            Value::Bytes(_) => Err(Error::InvalidArgument(
                "expected an integer field, got bytes".into(),
            )),
        }
    }

    /// Returns the byte-string field, or an error for integers.
    pub fn bytes(&self) -> Result<&[u8], Error> {
        match self {
            Value::Bytes(bytes) => Ok(bytes),
            Value::Int(_) => Err(Error::InvalidArgument(
                "expected a byte-string field, got an integer".into(),
            )),
        }
    }

    /// Consumes the value, returning the byte string.
    pub fn into_bytes(self) -> Result<Vec<u8>, Error> {
        match self {
            Value::Bytes(bytes) => Ok(bytes),
            Value::Int(_) => Err(Error::InvalidArgument(
                "expected a byte-string field, got an integer".into(),
            )),
        }
    }
}

macro_rules! value_from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Value::Int(value.into())
            }
        })*
    };
}

value_from_int!(u8, u16, u32, u64);

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Value::Bytes(bytes.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Value {
    fn from(bytes: &[u8; N]) -> Self {
        Value::Bytes(bytes.to_vec())
    }
}

/// One element of a compiled pattern.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Token {
    /// A literal byte assembled from two hex digits.
    Literal(u8),
    /// A fixed-width big-endian unsigned integer (`%b`/`%w`/`%d`/`%q`).
    Int(usize),
    /// A length-prefixed, NUL-terminated byte string (`%s`).
    NulString,
    /// A length-prefixed byte string (`%x`).
    Prefixed,
    /// Bytes with no framing at all (`%*`).
    Raw,
    /// One byte consumed and discarded when matching (`%?`).
    Skip,
}

/// Streaming pattern scanner.
///
/// Hex digits may be separated by whitespace, so `"18 00"` and `"1 800"`
/// assemble the same bytes.
struct Tokens<'a> {
    rest: std::str::Bytes<'a>,
}

impl<'a> Tokens<'a> {
    fn new(pattern: &'a str) -> Self {
        Tokens {
            rest: pattern.bytes(),
        }
    }
}

impl Iterator for Tokens<'_> {
    type Item = Result<Token, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut high = None;
        loop {
            let ch = match self.rest.next() {
                Some(ch) => ch,
                None if high.is_some() => {
                    return Some(Err(Error::InvalidArgument(
                        "dangling hex digit in pattern".into(),
                    )))
                }
                None => return None,
            };

            match ch {
                b' ' | b'\t' => continue,
                b'%' if high.is_some() => {
                    return Some(Err(Error::InvalidArgument(
                        "dangling hex digit in pattern".into(),
                    )))
                }
                b'%' => {
                    let token = match self.rest.next() {
                        Some(b'b') => Token::Int(1),
                        Some(b'w') => Token::Int(2),
                        Some(b'd') => Token::Int(4),
                        Some(b'q') => Token::Int(8),
                        Some(b's') => Token::NulString,
                        Some(b'x') => Token::Prefixed,
                        Some(b'*') => Token::Raw,
                        Some(b'?') => Token::Skip,
                        other => {
                            return Some(Err(Error::InvalidArgument(format!(
                                "unrecognized placeholder {:?} in pattern",
                                other.map(char::from)
                            ))))
                        }
                    };
                    return Some(Ok(token));
                }
                _ => {
                    let digit = match (ch as char).to_digit(16) {
                        Some(digit) => digit as u8,
                        None => {
                            return Some(Err(Error::InvalidArgument(format!(
                                "unexpected character {:?} in pattern",
                                ch as char
                            ))))
                        }
                    };
                    match high.take() {
                        None => high = Some(digit),
                        Some(high) => return Some(Ok(Token::Literal(high << 4 | digit))),
                    }
                }
            }
        }
    }
}

fn next_arg<'a>(
    args: &mut std::slice::Iter<'a, Value>,
    token: Token,
) -> Result<&'a Value, Error> {
    args.next().ok_or_else(|| {
        Error::InvalidArgument(format!("missing argument for {token:?} placeholder"))
    })
}

/// Renders a pattern and its arguments into a raw query.
pub fn format_query(pattern: &str, args: &[Value]) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    let mut args = args.iter();

    for token in Tokens::new(pattern) {
        match token? {
            Token::Literal(byte) => out.push(byte),
            Token::Skip => {
                return Err(Error::InvalidArgument(
                    "%? is only meaningful when matching a response".into(),
                ))
            }
            token @ Token::Int(width) => {
                let value = next_arg(&mut args, token)?.int()?;
                if width < 8 && value >> (width * 8) != 0 {
                    return Err(Error::InvalidArgument(format!(
                        "{value} does not fit in {width} byte(s)"
                    )));
                }
                let start = out.len();
                out.resize(start + width, 0);
                BigEndian::write_uint(&mut out[start..], value, width);
            }
            token @ Token::NulString => {
                let bytes = next_arg(&mut args, token)?.bytes()?;
                let length = prefix_length(bytes.len() + 1)?;
                let start = out.len();
                out.resize(start + 2, 0);
                BigEndian::write_u16(&mut out[start..], length);
                out.extend_from_slice(bytes);
                out.push(0);
            }
            token @ Token::Prefixed => {
                let bytes = next_arg(&mut args, token)?.bytes()?;
                let length = prefix_length(bytes.len())?;
                let start = out.len();
                out.resize(start + 2, 0);
                BigEndian::write_u16(&mut out[start..], length);
                out.extend_from_slice(bytes);
            }
            token @ Token::Raw => out.extend_from_slice(next_arg(&mut args, token)?.bytes()?),
        }
    }

    if args.next().is_some() {
        return Err(Error::InvalidArgument(
            "more arguments than placeholders".into(),
        ));
    }
    Ok(out)
}

fn prefix_length(length: usize) -> Result<u16, Error> {
    u16::try_from(length)
        .map_err(|_| Error::InvalidArgument(format!("byte string of {length} bytes is too long")))
}

/// Cursor over a response buffer.
struct Scanner<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        let field = self.data.get(self.pos..self.pos + len).ok_or_else(|| {
            Error::Invalid(format!("response truncated at offset {}", self.data.len()))
        })?;
        self.pos += len;
        Ok(field)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

/// Matches a response against a pattern, extracting the placeholder fields.
///
/// Literal bytes must match exactly and the response must be fully consumed.
pub fn parse_response(pattern: &str, response: &[u8]) -> Result<Vec<Value>, Error> {
    let mut values = Vec::new();
    let mut scanner = Scanner {
        data: response,
        pos: 0,
    };

    for token in Tokens::new(pattern) {
        match token? {
            Token::Literal(expected) => {
                let offset = scanner.pos;
                let actual = scanner.take(1)?[0];
                if actual != expected {
                    return Err(Error::Mismatch {
                        offset,
                        expected,
                        actual,
                    });
                }
            }
            Token::Skip => {
                scanner.take(1)?;
            }
            Token::Int(width) => {
                values.push(Value::Int(BigEndian::read_uint(scanner.take(width)?, width)));
            }
            Token::NulString => {
                let length = BigEndian::read_u16(scanner.take(2)?) as usize;
                let bytes = scanner.take(length)?;
                match bytes.split_last() {
                    Some((0, payload)) => values.push(Value::Bytes(payload.to_vec())),
                    _ => {
                        return Err(Error::Invalid(
                            "string field is not NUL-terminated".into(),
                        ))
                    }
                }
            }
            Token::Prefixed => {
                let length = BigEndian::read_u16(scanner.take(2)?) as usize;
                values.push(Value::Bytes(scanner.take(length)?.to_vec()));
            }
            Token::Raw => {
                let rest = scanner.remaining();
                values.push(Value::Bytes(scanner.take(rest)?.to_vec()));
            }
        }
    }

    if scanner.remaining() != 0 {
        return Err(Error::Invalid(format!(
            "{} unconsumed byte(s) at the end of the response",
            scanner.remaining()
        )));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::protocol::Error;

    #[test]
    fn literals_and_whitespace() {
        let query = format_query("1850 ff 010000 0000 %w", &[7u16.into()]).unwrap();
        assert_eq!(
            query,
            vec![0x18, 0x50, 0xff, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x07]
        );

        // Nibbles may straddle whitespace.
        assert_eq!(format_query("1 8 4 0", &[]).unwrap(), vec![0x18, 0x40]);
    }

    #[test]
    fn integer_widths() {
        let query = format_query(
            "%b %w %d %q",
            &[1u8.into(), 2u16.into(), 3u32.into(), 4u64.into()],
        )
        .unwrap();
        assert_eq!(
            query,
            vec![1, 0, 2, 0, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0, 4],
        );
        assert_eq!(query.len(), 1 + 2 + 4 + 8);
    }

    #[test]
    fn integer_overflow() {
        assert_matches!(
            format_query("%b", &[256u16.into()]),
            Err(Error::InvalidArgument(_))
        );
        assert_matches!(
            format_query("%w", &[0x1_0000u32.into()]),
            Err(Error::InvalidArgument(_))
        );
    }

    #[test]
    fn byte_strings() {
        let hello: &[u8] = b"hello";
        assert_eq!(
            format_query("%s", &[hello.into()]).unwrap(),
            b"\x00\x06hello\x00"
        );
        assert_eq!(
            format_query("%x", &[hello.into()]).unwrap(),
            b"\x00\x05hello"
        );
        assert_eq!(format_query("%*", &[hello.into()]).unwrap(), b"hello");
    }

    #[test]
    fn roundtrip_every_placeholder() {
        let args: Vec<Value> = vec![
            0x7fu8.into(),
            0x1234u16.into(),
            0xdead_beefu32.into(),
            0x0102_0304_0506_0708u64.into(),
            Value::Bytes(b"title".to_vec()),
            Value::Bytes(b"raw".to_vec()),
        ];
        let pattern = "00 %b ff %w %d %q %x %*";
        let encoded = format_query(pattern, &args).unwrap();
        assert_eq!(parse_response(pattern, &encoded).unwrap(), args);

        let args = vec![Value::Bytes(b"disc name".to_vec())];
        let encoded = format_query("1807 %s", &args).unwrap();
        assert_eq!(parse_response("1807 %s", &encoded).unwrap(), args);
    }

    #[test]
    fn skip_discards() {
        let values = parse_response("18 %? %b", &[0x18, 0xaa, 0x07]).unwrap();
        assert_eq!(values, vec![Value::Int(7)]);

        assert_matches!(format_query("%?", &[]), Err(Error::InvalidArgument(_)));
    }

    #[test]
    fn mismatch_carries_offset() {
        assert_matches!(
            parse_response("1850 00", &[0x18, 0x51, 0x00]),
            Err(Error::Mismatch {
                offset: 1,
                expected: 0x50,
                actual: 0x51,
            })
        );
    }

    #[test]
    fn response_must_be_consumed() {
        assert_matches!(
            parse_response("18", &[0x18, 0x00]),
            Err(Error::Invalid(_))
        );
        assert_matches!(parse_response("18 00", &[0x18]), Err(Error::Invalid(_)));
    }

    #[test]
    fn malformed_patterns() {
        assert_matches!(format_query("1", &[]), Err(Error::InvalidArgument(_)));
        assert_matches!(format_query("1 %b", &[1u8.into()]), Err(Error::InvalidArgument(_)));
        assert_matches!(format_query("%z", &[]), Err(Error::InvalidArgument(_)));
        assert_matches!(format_query("xy", &[]), Err(Error::InvalidArgument(_)));
        assert_matches!(format_query("%w", &[]), Err(Error::InvalidArgument(_)));
        assert_matches!(
            format_query("00", &[1u8.into()]),
            Err(Error::InvalidArgument(_))
        );
    }

    #[test]
    fn encoded_length_is_the_sum_of_fields() {
        let title: &[u8] = b"abcdef";
        let query = format_query(
            "1807 02201801 00%b 3000 0a00 5000 %w 0000 %w %*",
            &[1u8.into(), 6u16.into(), 0u16.into(), title.into()],
        )
        .unwrap();
        assert_eq!(query.len(), 15 + 1 + 2 + 2 + title.len());
    }
}
