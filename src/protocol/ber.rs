//! Minimal BER (X.690) codec for LDAP messages.
//!
//! Only definite-length, single-byte-tag elements are supported, which is
//! all LDAPv3 needs.

use thiserror::Error;

pub const BOOLEAN: u8 = 0x01;
pub const INTEGER: u8 = 0x02;
pub const OCTET_STRING: u8 = 0x04;
pub const ENUMERATED: u8 = 0x0a;
pub const SEQUENCE: u8 = 0x30;
pub const SET: u8 = 0x31;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("indefinite lengths are not supported")]
    IndefiniteLength,

    #[error("length field of {0} bytes is too long")]
    LengthTooLong(usize),

    #[error("message of {size} bytes exceeds the {max} byte limit")]
    MessageTooLarge { size: usize, max: usize },

    #[error("multi-byte tags are not supported")]
    HighTagNumber,

    #[error("expected tag {expected:#04x}, found {found:#04x}")]
    UnexpectedTag { expected: u8, found: u8 },

    #[error("element is truncated")]
    Truncated,

    #[error("malformed {0}")]
    Malformed(&'static str),

    #[error("unsupported filter type {0:#04x}")]
    UnsupportedFilter(u8),

    #[error("unsupported protocol operation {0:#04x}")]
    UnsupportedOperation(u8),
}

/// A decoded TLV whose contents are kept raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: u8,
    pub contents: Vec<u8>,
}

impl Element {
    pub fn expect_tag(self, expected: u8) -> Result<Self, ProtocolError> {
        if self.tag != expected {
            return Err(ProtocolError::UnexpectedTag {
                expected,
                found: self.tag,
            });
        }
        Ok(self)
    }

    /// Decode the contents as a sequence of elements.
    pub fn children(&self) -> Result<Vec<Element>, ProtocolError> {
        let mut children = Vec::new();
        let mut rest = self.contents.as_slice();
        while !rest.is_empty() {
            let (element, used) = decode(rest, usize::MAX)?.ok_or(ProtocolError::Truncated)?;
            children.push(element);
            rest = &rest[used..];
        }
        Ok(children)
    }

    pub fn integer(&self) -> Result<i64, ProtocolError> {
        if self.contents.is_empty() || self.contents.len() > 8 {
            return Err(ProtocolError::Malformed("integer"));
        }
        // sign-extend from the first content byte
        let mut value: i64 = if self.contents[0] & 0x80 != 0 { -1 } else { 0 };
        for byte in &self.contents {
            value = (value << 8) | i64::from(*byte);
        }
        Ok(value)
    }

    pub fn boolean(&self) -> Result<bool, ProtocolError> {
        match self.contents.as_slice() {
            [byte] => Ok(*byte != 0),
            _ => Err(ProtocolError::Malformed("boolean")),
        }
    }

    pub fn string(&self) -> Result<String, ProtocolError> {
        String::from_utf8(self.contents.clone()).map_err(|_| ProtocolError::Malformed("UTF-8 string"))
    }
}

/// Decode one element from the front of `input`.
///
/// Returns `None` when more bytes are needed, otherwise the element and the
/// number of bytes it occupied.
pub fn decode(input: &[u8], max_size: usize) -> Result<Option<(Element, usize)>, ProtocolError> {
    let Some(&tag) = input.first() else {
        return Ok(None);
    };
    if tag & 0x1f == 0x1f {
        return Err(ProtocolError::HighTagNumber);
    }
    let Some(&first) = input.get(1) else {
        return Ok(None);
    };

    let (length, header) = if first & 0x80 == 0 {
        (usize::from(first), 2)
    } else {
        let count = usize::from(first & 0x7f);
        if count == 0 {
            return Err(ProtocolError::IndefiniteLength);
        }
        if count > 4 {
            return Err(ProtocolError::LengthTooLong(count));
        }
        let Some(bytes) = input.get(2..2 + count) else {
            return Ok(None);
        };
        let length = bytes.iter().fold(0usize, |acc, b| (acc << 8) | usize::from(*b));
        (length, 2 + count)
    };

    let size = header + length;
    if size > max_size {
        return Err(ProtocolError::MessageTooLarge {
            size,
            max: max_size,
        });
    }
    let Some(contents) = input.get(header..size) else {
        return Ok(None);
    };
    Ok(Some((
        Element {
            tag,
            contents: contents.to_vec(),
        },
        size,
    )))
}

/// Encode a TLV.
pub fn encode(tag: u8, contents: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(contents.len() + 6);
    out.push(tag);
    let length = contents.len();
    if length < 0x80 {
        out.push(length as u8);
    } else {
        let bytes = length.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(contents);
    out
}

pub fn encode_integer(tag: u8, value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    // drop redundant leading bytes while keeping the sign bit
    let mut start = 0;
    while start < 7 {
        let (current, next) = (bytes[start], bytes[start + 1]);
        if (current == 0x00 && next & 0x80 == 0) || (current == 0xff && next & 0x80 != 0) {
            start += 1;
        } else {
            break;
        }
    }
    encode(tag, &bytes[start..])
}

pub fn encode_string(value: impl AsRef<[u8]>) -> Vec<u8> {
    encode(OCTET_STRING, value.as_ref())
}

pub fn encode_constructed(tag: u8, parts: &[Vec<u8>]) -> Vec<u8> {
    encode(tag, &parts.concat())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_use_minimal_twos_complement() {
        assert_eq!(encode_integer(INTEGER, 0), vec![0x02, 0x01, 0x00]);
        assert_eq!(encode_integer(INTEGER, 127), vec![0x02, 0x01, 0x7f]);
        assert_eq!(encode_integer(INTEGER, 128), vec![0x02, 0x02, 0x00, 0x80]);
        assert_eq!(encode_integer(INTEGER, -1), vec![0x02, 0x01, 0xff]);

        let (element, _) = decode(&[0x02, 0x02, 0xff, 0x7f], 64).unwrap().unwrap();
        assert_eq!(element.integer().unwrap(), -129);
    }

    #[test]
    fn long_form_lengths() {
        let contents = vec![0xab; 300];
        let encoded = encode(OCTET_STRING, &contents);
        assert_eq!(&encoded[..4], &[0x04, 0x82, 0x01, 0x2c]);
        let (element, used) = decode(&encoded, 1024).unwrap().unwrap();
        assert_eq!(used, encoded.len());
        assert_eq!(element.contents, contents);
    }

    #[test]
    fn partial_input_needs_more_bytes() {
        let encoded = encode(OCTET_STRING, b"hello");
        assert!(decode(&encoded[..1], 64).unwrap().is_none());
        assert!(decode(&encoded[..4], 64).unwrap().is_none());
        assert!(decode(&[0x30, 0x82, 0x01], 64).unwrap().is_none());
    }

    #[test]
    fn rejects_oversized_and_indefinite() {
        let encoded = encode(OCTET_STRING, &[0u8; 100]);
        assert!(matches!(
            decode(&encoded, 50),
            Err(ProtocolError::MessageTooLarge { .. })
        ));
        assert!(matches!(decode(&[0x30, 0x80], 64), Err(ProtocolError::IndefiniteLength)));
    }

    #[test]
    fn children_of_a_sequence() {
        let sequence = encode_constructed(SEQUENCE, &[encode_integer(INTEGER, 7), encode_string("x")]);
        let (element, _) = decode(&sequence, 64).unwrap().unwrap();
        let children = element.children().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].integer().unwrap(), 7);
        assert_eq!(children[1].string().unwrap(), "x");
    }
}
