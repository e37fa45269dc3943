// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;

/// Errors produced while decoding a wire-format message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Fewer than 12 header bytes. The message id (and, when present, the
    /// flag word) is still recovered so an error response can echo it.
    #[error("message header truncated: {have} bytes")]
    HeaderTruncated { have: usize },
    #[error("unexpected end of message at offset {0}")]
    UnexpectedEof(usize),
    #[error("label of {0} bytes exceeds the 63 byte limit")]
    LabelTooLong(usize),
    #[error("name of {0} bytes exceeds the 255 byte limit")]
    NameTooLong(usize),
    #[error("compression pointer to offset {0} is out of bounds")]
    BadPointer(usize),
    #[error("compression pointer loop")]
    PointerLoop,
    #[error("invalid name: {0}")]
    BadName(String),
}

/// Errors produced while rendering a response into a send buffer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RenderError {
    #[error("no space left in the send buffer")]
    NoSpace,
}

/// Errors produced when turning a parsed request into a reply skeleton.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ReplyError {
    #[error("message already carries a response (QR set)")]
    QrSet,
    #[error("question section was not parsed cleanly")]
    QuestionUnavailable,
}
