// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::BytesMut;

/// Size of one response buffer. The TCP length prefix lives inside the
/// same buffer, so a TCP payload is bounded by two bytes less.
pub const SEND_BUFFER_SIZE: usize = 512;

/// At most this many sends may be in flight per client.
pub const SEND_POOL_CAP: usize = 3;

/// Bounded pool of fixed-size send buffers, private to one client.
///
/// The pool is only ever touched from the owning client's task, so it is
/// a plain struct: no lock, no contention.
#[derive(Debug)]
pub struct SendPool {
    free: Vec<BytesMut>,
}

impl SendPool {
    pub fn new() -> Self {
        Self {
            free: (0..SEND_POOL_CAP)
                .map(|_| BytesMut::with_capacity(SEND_BUFFER_SIZE))
                .collect(),
        }
    }

    /// An empty buffer, or `None` when all of them are in flight.
    pub fn acquire(&mut self) -> Option<BytesMut> {
        self.free.pop()
    }

    /// Returns a buffer. Beyond the cap (a buffer this pool never owned)
    /// it is simply dropped.
    pub fn release(&mut self, mut buffer: BytesMut) {
        buffer.clear();
        if self.free.len() < SEND_POOL_CAP {
            self.free.push(buffer);
        }
    }

    #[inline]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.free.is_empty()
    }
}

impl Default for SendPool {
    fn default() -> Self {
        Self::new()
    }
}
