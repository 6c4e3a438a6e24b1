//! LDIF content reader.
//!
//! Supports the subset of RFC 2849 used for seeding a directory: an optional
//! `version: 1` line, comments, folded lines, plain and base64 values, and
//! `changetype: add` records. Other change types and URL-valued attributes
//! are rejected.

use std::io::{self, BufRead};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

use crate::directory::entry::{Dn, Entry};

#[derive(Debug, Error)]
pub enum LdifError {
    #[error("I/O error reading LDIF: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
}

impl LdifError {
    fn syntax(line: usize, message: impl Into<String>) -> Self {
        LdifError::Syntax {
            line,
            message: message.into(),
        }
    }
}

/// Streaming reader producing one [`Entry`] per LDIF record.
pub struct LdifReader<R> {
    input: R,
    line_number: usize,
    seen_record: bool,
}

impl<R: BufRead> LdifReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            line_number: 0,
            seen_record: false,
        }
    }

    /// Read the next entry, or `None` at end of input.
    pub fn read_entry(&mut self) -> Result<Option<Entry>, LdifError> {
        loop {
            let record = self.read_record()?;
            if record.is_empty() {
                return Ok(None);
            }
            let first_record = !self.seen_record;
            self.seen_record = true;
            if first_record && record.len() == 1 && record[0].1.starts_with("version:") {
                check_version(&record[0])?;
                continue;
            }
            let mut lines = record.into_iter();
            if first_record {
                // `version: 1` may also open the first entry record
                let mut peek = lines.clone();
                if let Some(first) = peek.next() {
                    if first.1.starts_with("version:") {
                        check_version(&first)?;
                        lines = peek;
                    }
                }
            }
            return parse_entry(lines).map(Some);
        }
    }

    /// Read every remaining entry.
    pub fn read_all(&mut self) -> Result<Vec<Entry>, LdifError> {
        let mut entries = Vec::new();
        while let Some(entry) = self.read_entry()? {
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Collect the logical lines of one record, skipping comments and
    /// unfolding continuations.
    fn read_record(&mut self) -> Result<Vec<(usize, String)>, LdifError> {
        let mut lines: Vec<(usize, String)> = Vec::new();
        let mut in_comment = false;
        while let Some((number, line)) = self.next_physical_line()? {
            if line.trim().is_empty() {
                if lines.is_empty() {
                    in_comment = false;
                    continue;
                }
                break;
            }
            if let Some(rest) = line.strip_prefix(' ') {
                if in_comment {
                    continue;
                }
                match lines.last_mut() {
                    Some((_, previous)) => previous.push_str(rest),
                    None => return Err(LdifError::syntax(number, "continuation without a preceding line")),
                }
                continue;
            }
            if line.starts_with('#') {
                in_comment = true;
                continue;
            }
            in_comment = false;
            lines.push((number, line));
        }
        Ok(lines)
    }

    fn next_physical_line(&mut self) -> Result<Option<(usize, String)>, LdifError> {
        let mut buf = String::new();
        if self.input.read_line(&mut buf)? == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        Ok(Some((self.line_number, buf)))
    }
}

fn check_version((number, line): &(usize, String)) -> Result<(), LdifError> {
    let (_, value) = split_line(*number, line)?;
    if value != b"1" {
        return Err(LdifError::syntax(*number, "unsupported LDIF version"));
    }
    Ok(())
}

fn parse_entry<I>(mut lines: I) -> Result<Entry, LdifError>
where
    I: Iterator<Item = (usize, String)>,
{
    let (number, first) = lines
        .next()
        .ok_or_else(|| LdifError::syntax(0, "empty record"))?;
    let (name, value) = split_line(number, &first)?;
    if !name.eq_ignore_ascii_case("dn") {
        return Err(LdifError::syntax(number, "record does not start with 'dn:'"));
    }
    let raw_dn = String::from_utf8(value)
        .map_err(|_| LdifError::syntax(number, "DN is not valid UTF-8"))?;
    let dn = Dn::parse(&raw_dn).map_err(|e| LdifError::syntax(number, e.to_string()))?;

    let mut entry = Entry::new(dn);
    for (number, line) in lines {
        let (name, value) = split_line(number, &line)?;
        if name.eq_ignore_ascii_case("changetype") {
            if !value.eq_ignore_ascii_case(b"add") {
                return Err(LdifError::syntax(
                    number,
                    format!("unsupported changetype '{}'", String::from_utf8_lossy(&value)),
                ));
            }
            continue;
        }
        if name.eq_ignore_ascii_case("control") {
            return Err(LdifError::syntax(number, "controls are not supported"));
        }
        entry.add_value(name, value);
    }
    Ok(entry)
}

/// Split `name: value`, `name:: base64` into name and decoded value.
fn split_line(number: usize, line: &str) -> Result<(&str, Vec<u8>), LdifError> {
    let (name, rest) = line
        .split_once(':')
        .ok_or_else(|| LdifError::syntax(number, "missing ':' separator"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(LdifError::syntax(number, "missing attribute name"));
    }
    if let Some(encoded) = rest.strip_prefix(':') {
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| LdifError::syntax(number, format!("invalid base64 value: {e}")))?;
        return Ok((name, decoded));
    }
    if rest.starts_with('<') {
        return Err(LdifError::syntax(number, "URL values are not supported"));
    }
    Ok((name, rest.trim_start_matches(' ').as_bytes().to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(input: &str) -> Result<Vec<Entry>, LdifError> {
        LdifReader::new(input.as_bytes()).read_all()
    }

    #[test]
    fn reads_records_with_comments_and_folding() {
        let entries = read(
            "version: 1\n\
             \n\
             # the base\n\
             #  continued comment\n\
             dn: dc=spring,dc=org\n\
             objectClass: top\n\
             objectClass: domain\n\
             dc: spring\n\
             \n\
             dn: ou=groups,dc=spring,\n dc=org\n\
             objectclass: organizationalUnit\n\
             ou: groups\n\
             description:: SGVsbG8gV29ybGQ=\n",
        )
        .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].object_classes(), vec!["top", "domain"]);
        assert_eq!(entries[1].dn().normalized(), "ou=groups,dc=spring,dc=org");
        assert_eq!(
            entries[1].attribute("description").unwrap().values[0],
            b"Hello World".to_vec()
        );
    }

    #[test]
    fn version_may_share_the_first_record() {
        let entries = read("version: 1\ndn: dc=org\ndc: org\n").unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].attribute("version").is_none());
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let entries = read("dn: dc=org\r\ndc: org\r\n\r\n").unwrap();
        assert_eq!(entries[0].attribute("dc").unwrap().values[0], b"org".to_vec());
    }

    #[test]
    fn errors_carry_line_numbers() {
        let err = read("dn: dc=org\ndc org\n").unwrap_err();
        match err {
            LdifError::Syntax { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn record_must_start_with_dn() {
        assert!(read("objectClass: top\n").is_err());
    }

    #[test]
    fn only_add_records_are_supported() {
        assert!(read("dn: dc=org\nchangetype: add\ndc: org\n").is_ok());
        assert!(read("dn: dc=org\nchangetype: delete\n").is_err());
        assert!(read("dn: dc=org\njpegPhoto:< file:///tmp/a.jpg\n").is_err());
    }

    #[test]
    fn empty_input_has_no_entries() {
        assert!(read("").unwrap().is_empty());
        assert!(read("\n\n# nothing here\n").unwrap().is_empty());
    }
}
