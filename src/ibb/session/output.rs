/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use crate::IbbError;
use crate::ibb::codec::Chunk;
use crate::ibb::transport::ChunkTransport;
use crate::sync::lock;

pub(super) struct OutputState {
    buffer: Vec<u8>,
    next_seq: u16,
}

/// Accumulates written bytes into chunks of at most `capacity` bytes.
pub(super) struct OutputSide {
    state: Mutex<OutputState>,
    closed: AtomicBool,
    capacity: usize,
}

impl OutputSide {
    pub(super) fn new(capacity: usize, first_seq: u16) -> Self {
        OutputSide {
            state: Mutex::new(OutputState {
                buffer: Vec::with_capacity(capacity),
                next_seq: first_seq,
            }),
            closed: AtomicBool::new(false),
            capacity,
        }
    }

    pub(super) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(super) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Marks the side closed, returns false if it already was.
    pub(super) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub(super) fn next_seq(&self) -> u16 {
        lock(&self.state).next_seq
    }

    /// Locks the buffer for an application write or flush.
    pub(super) fn open_state(&self) -> Result<MutexGuard<'_, OutputState>, IbbError> {
        let state = lock(&self.state);
        if self.is_closed() {
            return Err(IbbError::StreamClosed);
        }
        Ok(state)
    }

    /// Locks the buffer regardless of the closed flag, for the final flush.
    pub(super) fn final_state(&self) -> MutexGuard<'_, OutputState> {
        lock(&self.state)
    }

    pub(super) fn write(
        &self,
        state: &mut OutputState,
        session_id: &str,
        transport: &dyn ChunkTransport,
        mut bytes: &[u8],
    ) -> Result<(), IbbError> {
        while !bytes.is_empty() {
            let room = self.capacity - state.buffer.len();
            let (head, tail) = bytes.split_at(room.min(bytes.len()));
            state.buffer.extend_from_slice(head);
            bytes = tail;
            if state.buffer.len() == self.capacity {
                self.flush(state, session_id, transport)?;
            }
        }
        Ok(())
    }

    /// Sends the buffered bytes as one chunk. Nothing is sent for an empty
    /// buffer. The buffer is emptied even when sending fails since a failed
    /// session is not resumed.
    pub(super) fn flush(
        &self,
        state: &mut OutputState,
        session_id: &str,
        transport: &dyn ChunkTransport,
    ) -> Result<(), IbbError> {
        if state.buffer.is_empty() {
            return Ok(());
        }
        let bytes = std::mem::replace(&mut state.buffer, Vec::with_capacity(self.capacity));
        let chunk = Chunk {
            session_id: session_id.to_string(),
            seq: state.next_seq,
            bytes,
        };
        transport.send_chunk(&chunk).map_err(IbbError::Transport)?;
        state.next_seq = state.next_seq.wrapping_add(1);
        Ok(())
    }

    pub(super) fn discard(&self, state: &mut OutputState) {
        state.buffer.clear();
    }
}
