// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{BufMut, Bytes, BytesMut};

use crate::message::{
    error::ParseError,
    name::Name,
    opcode::{RdClass, RecordType},
};

/// A resource record with opaque rdata.
///
/// Records decoded from the wire keep their rdata verbatim, including any
/// compression pointers an embedded name may carry; such rdata is only
/// inspected, never re-rendered. Records built for responses come from
/// the constructors below and always hold pointer-free rdata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub name: Name,
    pub rtype: u16,
    pub rclass: u16,
    pub ttl: u32,
    pub rdata: Bytes,
}

impl Record {
    pub fn new(name: Name, rtype: u16, rclass: u16, ttl: u32, rdata: Bytes) -> Self {
        Self {
            name,
            rtype,
            rclass,
            ttl,
            rdata,
        }
    }

    pub fn a(name: Name, class: RdClass, ttl: u32, addr: Ipv4Addr) -> Self {
        Self::new(
            name,
            RecordType::A as u16,
            class as u16,
            ttl,
            Bytes::copy_from_slice(&addr.octets()),
        )
    }

    pub fn aaaa(name: Name, class: RdClass, ttl: u32, addr: Ipv6Addr) -> Self {
        Self::new(
            name,
            RecordType::Aaaa as u16,
            class as u16,
            ttl,
            Bytes::copy_from_slice(&addr.octets()),
        )
    }

    /// TXT rdata: the text split into length-prefixed character strings
    /// of at most 255 bytes each.
    pub fn txt(name: Name, class: RdClass, ttl: u32, text: &str) -> Self {
        let mut rdata = BytesMut::with_capacity(text.len() + 1);
        for chunk in text.as_bytes().chunks(255) {
            rdata.put_u8(chunk.len() as u8);
            rdata.put_slice(chunk);
        }
        if text.is_empty() {
            rdata.put_u8(0);
        }
        Self::new(
            name,
            RecordType::Txt as u16,
            class as u16,
            ttl,
            rdata.freeze(),
        )
    }

    /// Rdata holding a single uncompressed name (NS, CNAME, PTR).
    pub fn with_name_data(
        name: Name,
        rtype: RecordType,
        class: RdClass,
        ttl: u32,
        target: &Name,
    ) -> Self {
        let mut rdata = BytesMut::with_capacity(target.wire_len());
        target.render(&mut rdata);
        Self::new(name, rtype as u16, class as u16, ttl, rdata.freeze())
    }

    pub fn parse(buf: &[u8], pos: &mut usize) -> Result<Self, ParseError> {
        let name = Name::parse(buf, pos)?;
        let fixed = buf
            .get(*pos..*pos + 10)
            .ok_or(ParseError::UnexpectedEof(*pos + 10))?;
        let rtype = u16::from_be_bytes([fixed[0], fixed[1]]);
        let rclass = u16::from_be_bytes([fixed[2], fixed[3]]);
        let ttl = u32::from_be_bytes([fixed[4], fixed[5], fixed[6], fixed[7]]);
        let rdlength = u16::from_be_bytes([fixed[8], fixed[9]]) as usize;
        *pos += 10;

        let rdata = buf
            .get(*pos..*pos + rdlength)
            .ok_or(ParseError::UnexpectedEof(*pos + rdlength))?;
        *pos += rdlength;

        Ok(Self {
            name,
            rtype,
            rclass,
            ttl,
            rdata: Bytes::copy_from_slice(rdata),
        })
    }

    #[inline]
    pub fn wire_len(&self) -> usize {
        self.name.wire_len() + 10 + self.rdata.len()
    }

    pub fn render(&self, out: &mut BytesMut) {
        self.name.render(out);
        out.put_u16(self.rtype);
        out.put_u16(self.rclass);
        out.put_u32(self.ttl);
        out.put_u16(self.rdata.len() as u16);
        out.put_slice(&self.rdata);
    }
}
