/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::collections::VecDeque;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use crate::IbbError;
use crate::sync::lock;

/// Sequence numbers further ahead than this are gaps, anything else that
/// does not match is an old chunk seen again.
const GAP_WINDOW: u16 = 0x8000;

#[derive(Debug, PartialEq, Eq)]
pub(super) enum Acceptance {
    Accepted,
    /// The input was already closed, the chunk is dropped.
    Discarded,
    /// In sequence but the payload does not decode, the expected sequence
    /// number stays.
    Invalid,
    Duplicate { expected: u16 },
    Gap { expected: u16 },
}

struct InputState {
    queue: VecDeque<Vec<u8>>,
    current: Vec<u8>,
    position: usize,
    expected_seq: u16,
    closed: bool,
    closed_by_reader: bool,
    gap: Option<(u16, u16)>,
}

pub(super) struct InputSide {
    state: Mutex<InputState>,
    available: Condvar,
    read_timeout: Mutex<Duration>,
}

impl InputSide {
    pub(super) fn new(first_seq: u16, read_timeout: Duration) -> Self {
        InputSide {
            state: Mutex::new(InputState {
                queue: VecDeque::new(),
                current: Vec::new(),
                position: 0,
                expected_seq: first_seq,
                closed: false,
                closed_by_reader: false,
                gap: None,
            }),
            available: Condvar::new(),
            read_timeout: Mutex::new(read_timeout),
        }
    }

    pub(super) fn read_timeout(&self) -> Duration {
        *lock(&self.read_timeout)
    }

    pub(super) fn set_read_timeout(&self, timeout: Duration) {
        *lock(&self.read_timeout) = timeout;
    }

    pub(super) fn expected_seq(&self) -> u16 {
        lock(&self.state).expected_seq
    }

    pub(super) fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Validates the sequence number of a received chunk and queues it.
    /// The payload is only decoded once the sequence number checks out.
    pub(super) fn accept<F>(&self, seq: u16, decode: F) -> Acceptance
    where
        F: FnOnce() -> Option<Vec<u8>>,
    {
        let mut state = lock(&self.state);
        if state.closed {
            return Acceptance::Discarded;
        }
        let expected = state.expected_seq;
        let ahead = seq.wrapping_sub(expected);
        if ahead == 0 {
            let Some(bytes) = decode() else {
                return Acceptance::Invalid;
            };
            state.expected_seq = expected.wrapping_add(1);
            state.queue.push_back(bytes);
            self.available.notify_all();
            Acceptance::Accepted
        } else if ahead < GAP_WINDOW {
            state.gap = Some((expected, seq));
            state.closed = true;
            self.available.notify_all();
            Acceptance::Gap { expected }
        } else {
            Acceptance::Duplicate { expected }
        }
    }

    /// Stops accepting chunks. Queued bytes remain readable.
    pub(super) fn close(&self) {
        let mut state = lock(&self.state);
        state.closed = true;
        self.available.notify_all();
    }

    /// Close invoked by the application on its reading half, further reads
    /// fail.
    pub(super) fn close_by_reader(&self) {
        let mut state = lock(&self.state);
        state.closed = true;
        state.closed_by_reader = true;
        state.queue.clear();
        state.current.clear();
        state.position = 0;
        self.available.notify_all();
    }

    pub(super) fn read(&self, buf: &mut [u8]) -> Result<usize, IbbError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let timeout = self.read_timeout();
        let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);
        let mut state = lock(&self.state);
        loop {
            if state.closed_by_reader {
                return Err(IbbError::StreamClosed);
            }
            if state.position < state.current.len() {
                let start = state.position;
                let size = buf.len().min(state.current.len() - start);
                buf[..size].copy_from_slice(&state.current[start..start + size]);
                state.position += size;
                return Ok(size);
            }
            if let Some(chunk) = state.queue.pop_front() {
                state.current = chunk;
                state.position = 0;
                continue;
            }
            if let Some((expected, received)) = state.gap {
                return Err(IbbError::Sequence { expected, received });
            }
            if state.closed {
                return Ok(0);
            }
            state = match deadline {
                None => self
                    .available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(IbbError::ReadTimeout(timeout));
                    }
                    self.available
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }
}
