// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use bytes::{BufMut, BytesMut};

use crate::message::error::ParseError;

pub const MAX_LABEL_LEN: usize = 63;
pub const MAX_NAME_LEN: usize = 255;

/// Upper bound on compression-pointer hops while decoding one name.
/// A legitimate chain cannot exceed the label count of the longest
/// possible name.
const MAX_POINTER_HOPS: usize = 64;

/// A domain name as a sequence of labels, root excluded.
///
/// Comparison and hashing are case-insensitive per RFC 1035 § 2.3.3;
/// the original octets are preserved for display and rendering.
#[derive(Clone, Default)]
pub struct Name {
    labels: Vec<Vec<u8>>,
}

impl Name {
    pub fn root() -> Self {
        Self { labels: Vec::new() }
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }

    /// Builds a name from presentation format, with or without the
    /// trailing dot. `""` and `"."` both give the root name.
    pub fn from_ascii(s: &str) -> Result<Self, ParseError> {
        let s = s.strip_suffix('.').unwrap_or(s);
        if s.is_empty() {
            return Ok(Self::root());
        }

        let mut labels = Vec::new();
        let mut total = 1usize;
        for part in s.split('.') {
            if part.is_empty() {
                return Err(ParseError::BadName(s.to_string()));
            }
            if part.len() > MAX_LABEL_LEN {
                return Err(ParseError::LabelTooLong(part.len()));
            }
            total += part.len() + 1;
            if total > MAX_NAME_LEN {
                return Err(ParseError::NameTooLong(total));
            }
            labels.push(part.as_bytes().to_vec());
        }
        Ok(Self { labels })
    }

    /// Decodes a wire-format name starting at `*pos`, following
    /// compression pointers. `*pos` is left just past the name as it
    /// appears in the original stream.
    pub fn parse(buf: &[u8], pos: &mut usize) -> Result<Self, ParseError> {
        let mut labels = Vec::new();
        let mut total = 1usize;
        let mut cursor = *pos;
        let mut hops = 0usize;
        let mut jumped = false;

        loop {
            let len = *buf.get(cursor).ok_or(ParseError::UnexpectedEof(cursor))? as usize;

            if len & 0xC0 == 0xC0 {
                let lo = *buf
                    .get(cursor + 1)
                    .ok_or(ParseError::UnexpectedEof(cursor + 1))?
                    as usize;
                let target = ((len & 0x3F) << 8) | lo;
                if !jumped {
                    *pos = cursor + 2;
                    jumped = true;
                }
                if target >= buf.len() {
                    return Err(ParseError::BadPointer(target));
                }
                hops += 1;
                if hops > MAX_POINTER_HOPS {
                    return Err(ParseError::PointerLoop);
                }
                cursor = target;
                continue;
            }
            if len & 0xC0 != 0 {
                return Err(ParseError::BadName(format!("label type 0x{len:02x}")));
            }
            if len == 0 {
                cursor += 1;
                break;
            }

            let end = cursor + 1 + len;
            let bytes = buf
                .get(cursor + 1..end)
                .ok_or(ParseError::UnexpectedEof(end))?;
            total += 1 + len;
            if total > MAX_NAME_LEN {
                return Err(ParseError::NameTooLong(total));
            }
            labels.push(bytes.to_vec());
            cursor = end;
        }

        if !jumped {
            *pos = cursor;
        }
        Ok(Self { labels })
    }

    /// Encoded size on the wire, uncompressed.
    #[inline]
    pub fn wire_len(&self) -> usize {
        self.labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1
    }

    /// Appends the uncompressed wire encoding. The caller is expected to
    /// have checked `wire_len()` against the space it has left.
    pub fn render(&self, out: &mut BytesMut) {
        for label in &self.labels {
            out.put_u8(label.len() as u8);
            out.put_slice(label);
        }
        out.put_u8(0);
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.labels.len() == other.labels.len()
            && self
                .labels
                .iter()
                .zip(&other.labels)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.labels.len());
        for label in &self.labels {
            state.write_usize(label.len());
            for b in label {
                state.write_u8(b.to_ascii_lowercase());
            }
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        for label in &self.labels {
            for &b in label {
                if b.is_ascii_graphic() && b != b'.' && b != b'\\' {
                    write!(f, "{}", b as char)?;
                } else {
                    write!(f, "\\{b:03}")?;
                }
            }
            f.write_str(".")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({self})")
    }
}
