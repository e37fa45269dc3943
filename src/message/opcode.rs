// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Numeric registries for the header fields the frontend interprets:
//! opcodes, response codes, classes and the record types it can serve.
//!
//! Every enum keeps its RFC 1035 discriminant so conversion to the wire
//! is a cast in one direction and a table lookup in the other.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// The 4-bit OPCODE field of the message header.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    #[default]
    Query = 0,
    Iquery = 1,
    Status = 2,
    Notify = 4,
    Update = 5,
}

impl Opcode {
    #[inline]
    pub fn from_u4(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Query,
            1 => Self::Iquery,
            2 => Self::Status,
            4 => Self::Notify,
            5 => Self::Update,
            _ => return None,
        })
    }
}

/// Returned when the OPCODE field carries an unassigned value.
#[derive(Debug, Error)]
#[error("unknown opcode: {0}")]
pub struct UnknownOpcode(pub u8);

impl TryFrom<u8> for Opcode {
    type Error = UnknownOpcode;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Self::from_u4(v).ok_or(UnknownOpcode(v))
    }
}

/// The 4-bit RCODE field of the message header.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Rcode {
    #[default]
    NoError = 0,
    FormErr = 1,
    ServFail = 2,
    NxDomain = 3,
    NotImp = 4,
    Refused = 5,
}

impl Rcode {
    #[inline]
    pub fn from_u4(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::NoError,
            1 => Self::FormErr,
            2 => Self::ServFail,
            3 => Self::NxDomain,
            4 => Self::NotImp,
            5 => Self::Refused,
            _ => return None,
        })
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoError => "NOERROR",
            Self::FormErr => "FORMERR",
            Self::ServFail => "SERVFAIL",
            Self::NxDomain => "NXDOMAIN",
            Self::NotImp => "NOTIMP",
            Self::Refused => "REFUSED",
        };
        f.write_str(s)
    }
}

/// Returned when a class or type mnemonic in configuration is unknown.
#[derive(Debug, Error)]
#[error("unknown mnemonic: {0}")]
pub struct UnknownMnemonic(pub String);

/// Record classes the view registry can be tagged with.
#[repr(u16)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RdClass {
    #[default]
    In = 1,
    Ch = 3,
    Hs = 4,
}

impl RdClass {
    #[inline]
    pub fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            1 => Self::In,
            3 => Self::Ch,
            4 => Self::Hs,
            _ => return None,
        })
    }
}

impl FromStr for RdClass {
    type Err = UnknownMnemonic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "IN" => Self::In,
            "CH" => Self::Ch,
            "HS" => Self::Hs,
            _ => return Err(UnknownMnemonic(s.to_string())),
        })
    }
}

impl fmt::Display for RdClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::In => "IN",
            Self::Ch => "CH",
            Self::Hs => "HS",
        };
        f.write_str(s)
    }
}

/// Record types the frontend knows by name. Anything else travels
/// through the core untouched as a raw `u16`.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    A = 1,
    Ns = 2,
    Cname = 5,
    Soa = 6,
    Ptr = 12,
    Mx = 15,
    Txt = 16,
    Aaaa = 28,
    Opt = 41,
    Any = 255,
}

impl RecordType {
    #[inline]
    pub fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            1 => Self::A,
            2 => Self::Ns,
            5 => Self::Cname,
            6 => Self::Soa,
            12 => Self::Ptr,
            15 => Self::Mx,
            16 => Self::Txt,
            28 => Self::Aaaa,
            41 => Self::Opt,
            255 => Self::Any,
            _ => return None,
        })
    }
}

impl FromStr for RecordType {
    type Err = UnknownMnemonic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "A" => Self::A,
            "NS" => Self::Ns,
            "CNAME" => Self::Cname,
            "SOA" => Self::Soa,
            "PTR" => Self::Ptr,
            "MX" => Self::Mx,
            "TXT" => Self::Txt,
            "AAAA" => Self::Aaaa,
            "ANY" => Self::Any,
            _ => return Err(UnknownMnemonic(s.to_string())),
        })
    }
}
