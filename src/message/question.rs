// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::{BufMut, BytesMut};

use crate::message::{error::ParseError, name::Name};

/// One question section entry: QNAME, QTYPE, QCLASS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Question {
    pub name: Name,
    pub qtype: u16,
    pub qclass: u16,
}

impl Question {
    pub fn new(name: Name, qtype: u16, qclass: u16) -> Self {
        Self {
            name,
            qtype,
            qclass,
        }
    }

    pub fn parse(buf: &[u8], pos: &mut usize) -> Result<Self, ParseError> {
        let name = Name::parse(buf, pos)?;
        let tail = buf
            .get(*pos..*pos + 4)
            .ok_or(ParseError::UnexpectedEof(*pos + 4))?;
        let qtype = u16::from_be_bytes([tail[0], tail[1]]);
        let qclass = u16::from_be_bytes([tail[2], tail[3]]);
        *pos += 4;
        Ok(Self {
            name,
            qtype,
            qclass,
        })
    }

    #[inline]
    pub fn wire_len(&self) -> usize {
        self.name.wire_len() + 4
    }

    pub fn render(&self, out: &mut BytesMut) {
        self.name.render(out);
        out.put_u16(self.qtype);
        out.put_u16(self.qclass);
    }
}
