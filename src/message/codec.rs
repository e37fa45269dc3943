// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The message object the client core works with: parse a request,
//! flip it into a reply skeleton, render the response sections.

use bytes::BytesMut;
use zerocopy::{FromBytes, IntoBytes, U16};

use crate::message::{
    error::{ParseError, RenderError, ReplyError},
    header::{Flags, HEADER_LEN, WireHeader},
    opcode::{Rcode, RecordType},
    question::Question,
    record::Record,
};

/// What the message object is currently for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Parse,
    Render,
}

/// The four message sections, in render order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Question,
    Answer,
    Authority,
    Additional,
}

#[derive(Debug, Clone)]
pub struct Message {
    intent: Intent,
    pub id: u16,
    pub flags: Flags,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authorities: Vec<Record>,
    pub additionals: Vec<Record>,
    question_ok: bool,
}

impl Message {
    pub fn new(intent: Intent) -> Self {
        Self {
            intent,
            id: 0,
            flags: Flags::default(),
            questions: Vec::new(),
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
            question_ok: false,
        }
    }

    #[inline]
    pub fn intent(&self) -> Intent {
        self.intent
    }

    /// Whether the question section survived parsing intact.
    #[inline]
    pub fn question_parsed(&self) -> bool {
        self.question_ok
    }

    /// Drops all request state and re-arms the object for `intent`.
    pub fn reset(&mut self, intent: Intent) {
        self.intent = intent;
        self.id = 0;
        self.flags = Flags::default();
        self.questions.clear();
        self.answers.clear();
        self.authorities.clear();
        self.additionals.clear();
        self.question_ok = false;
    }

    /// Decodes a wire message.
    ///
    /// On a header shorter than 12 bytes the id (and flag word, when
    /// present) is still recovered before the error is reported, so the
    /// caller can echo them in an error response.
    ///
    /// `preserve_order` is accepted for interface stability; sections are
    /// always kept in wire order here.
    pub fn parse(&mut self, buf: &[u8], preserve_order: bool) -> Result<(), ParseError> {
        let _ = preserve_order;
        debug_assert_eq!(self.intent, Intent::Parse);

        if buf.len() >= 2 {
            self.id = u16::from_be_bytes([buf[0], buf[1]]);
        }
        if buf.len() >= 4 {
            self.flags = Flags::from_raw(u16::from_be_bytes([buf[2], buf[3]]));
        }
        if buf.len() < HEADER_LEN {
            return Err(ParseError::HeaderTruncated { have: buf.len() });
        }

        let header = WireHeader::ref_from_bytes(&buf[..HEADER_LEN])
            .map_err(|_| ParseError::HeaderTruncated { have: buf.len() })?;
        self.id = header.id.get();
        self.flags = Flags::from_raw(header.flags.get());

        let mut pos = HEADER_LEN;
        for _ in 0..header.qdcount.get() {
            self.questions.push(Question::parse(buf, &mut pos)?);
        }
        self.question_ok = true;
        for _ in 0..header.ancount.get() {
            self.answers.push(Record::parse(buf, &mut pos)?);
        }
        for _ in 0..header.nscount.get() {
            self.authorities.push(Record::parse(buf, &mut pos)?);
        }
        for _ in 0..header.arcount.get() {
            self.additionals.push(Record::parse(buf, &mut pos)?);
        }
        Ok(())
    }

    /// Turns a parsed request into a reply skeleton: QR is set; id,
    /// opcode and RD survive; the response sections are cleared.
    ///
    /// The message must not already be a response (QR clear), and the
    /// question can only be preserved when it was parsed cleanly.
    pub fn reply(&mut self, preserve_question: bool) -> Result<(), ReplyError> {
        if self.flags.qr() {
            return Err(ReplyError::QrSet);
        }
        if preserve_question && !self.question_ok {
            return Err(ReplyError::QuestionUnavailable);
        }

        self.intent = Intent::Render;
        self.flags.set_qr();
        self.flags.set_aa(false);
        self.flags.set_tc(false);
        self.flags.set_ra(false);
        self.flags.set_rcode(Rcode::NoError);
        if !preserve_question {
            self.questions.clear();
        }
        self.answers.clear();
        self.authorities.clear();
        self.additionals.clear();
        Ok(())
    }

    /// Class of the question, used for view matching.
    #[inline]
    pub fn rdclass(&self) -> Option<u16> {
        self.questions.first().map(|q| q.qclass)
    }

    /// Requestor UDP buffer size advertised through an OPT pseudo-record,
    /// if any. This is the only part of EDNS0 the frontend interprets.
    pub fn requestor_udpsize(&self) -> Option<u16> {
        self.additionals
            .iter()
            .find(|r| r.rtype == RecordType::Opt as u16)
            .map(|r| r.rclass)
    }
}

/// Renders one message into a bounded span of a buffer.
///
/// `begin` reserves the header, `section` appends whole entries while
/// they fit (entries already written stand when space runs out), `end`
/// patches id, flags and the section counts.
pub struct MessageRenderer<'a> {
    msg: &'a Message,
    buf: &'a mut BytesMut,
    base: usize,
    limit: usize,
    counts: [u16; 4],
}

impl<'a> MessageRenderer<'a> {
    pub fn begin(
        msg: &'a Message,
        buf: &'a mut BytesMut,
        limit: usize,
    ) -> Result<Self, RenderError> {
        if limit < HEADER_LEN {
            return Err(RenderError::NoSpace);
        }
        let base = buf.len();
        buf.resize(base + HEADER_LEN, 0);
        Ok(Self {
            msg,
            buf,
            base,
            limit,
            counts: [0; 4],
        })
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.limit - (self.buf.len() - self.base)
    }

    pub fn section(&mut self, section: Section) -> Result<(), RenderError> {
        match section {
            Section::Question => {
                for q in &self.msg.questions {
                    if q.wire_len() > self.remaining() {
                        return Err(RenderError::NoSpace);
                    }
                    q.render(self.buf);
                    self.counts[0] += 1;
                }
                Ok(())
            },
            Section::Answer => self.records(&self.msg.answers, 1),
            Section::Authority => self.records(&self.msg.authorities, 2),
            Section::Additional => self.records(&self.msg.additionals, 3),
        }
    }

    fn records(&mut self, records: &[Record], slot: usize) -> Result<(), RenderError> {
        for r in records {
            if r.wire_len() > self.remaining() {
                return Err(RenderError::NoSpace);
            }
            r.render(self.buf);
            self.counts[slot] += 1;
        }
        Ok(())
    }

    pub fn end(self) {
        let header = WireHeader {
            id: U16::new(self.msg.id),
            flags: U16::new(self.msg.flags.raw()),
            qdcount: U16::new(self.counts[0]),
            ancount: U16::new(self.counts[1]),
            nscount: U16::new(self.counts[2]),
            arcount: U16::new(self.counts[3]),
        };
        self.buf[self.base..self.base + HEADER_LEN].copy_from_slice(header.as_bytes());
    }
}
