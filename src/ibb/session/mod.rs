/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod input;
mod output;

use std::io;
use std::io::Read;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use log::debug;
use log::warn;

use super::codec;
use super::transport;
use super::transport::ChunkTransport;
use crate::Close;
use crate::ConnectionError;
use crate::Data;
use crate::ErrorCondition;
use crate::IbbError;
use crate::Iq;
use crate::Jid;
use crate::Payload;
use crate::Router;
use crate::Stanza;
use crate::StanzaKind;
use crate::sync::lock;
use input::Acceptance;
use input::InputSide;
use output::OutputSide;

/// Observable lifecycle of a session. Sessions only exist once the open
/// handshake succeeded.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
    Open,
    /// One local side is closed, the other still works.
    Closing,
    Closed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Side {
    Reader,
    Writer,
    Both,
}

pub(crate) type Detach = Box<dyn Fn(&str) + Send + Sync>;

pub(crate) struct SessionParams {
    pub(crate) session_id: String,
    pub(crate) peer: Jid,
    pub(crate) block_size: u16,
    pub(crate) kind: StanzaKind,
    pub(crate) capacity: usize,
    pub(crate) close_coupling: bool,
    pub(crate) read_timeout: Duration,
    pub(crate) router: Arc<Router>,
    pub(crate) detach: Detach,
}

pub(crate) struct SessionCore {
    session_id: String,
    peer: Jid,
    block_size: u16,
    router: Arc<Router>,
    transport: Box<dyn ChunkTransport>,
    detach: Detach,
    input: InputSide,
    output: OutputSide,
    close_coupling: AtomicBool,
    close_lock: Mutex<()>,
    closed: AtomicBool,
}

impl SessionCore {
    pub(crate) fn new(params: SessionParams) -> Arc<SessionCore> {
        SessionCore::starting_at(params, 0)
    }

    pub(crate) fn starting_at(params: SessionParams, first_seq: u16) -> Arc<SessionCore> {
        let transport = transport::for_kind(params.kind, params.router.clone(), params.peer.clone());
        Arc::new(SessionCore {
            session_id: params.session_id,
            peer: params.peer,
            block_size: params.block_size,
            router: params.router,
            transport,
            detach: params.detach,
            input: InputSide::new(first_seq, params.read_timeout),
            output: OutputSide::new(params.capacity.max(1), first_seq),
            close_coupling: AtomicBool::new(params.close_coupling),
            close_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn session_id(&self) -> &str {
        &self.session_id
    }

    pub(crate) fn peer(&self) -> &Jid {
        &self.peer
    }

    pub(crate) fn kind(&self) -> StanzaKind {
        self.transport.kind()
    }

    fn write(&self, bytes: &[u8]) -> Result<(), IbbError> {
        let result = {
            let mut state = self.output.open_state()?;
            self.output
                .write(&mut state, &self.session_id, self.transport.as_ref(), bytes)
        };
        result.map_err(|err| self.fail(err))
    }

    fn flush(&self) -> Result<(), IbbError> {
        let result = {
            let mut state = self.output.open_state()?;
            self.output
                .flush(&mut state, &self.session_id, self.transport.as_ref())
        };
        result.map_err(|err| self.fail(err))
    }

    /// Send failures are not retried, the session is closed instead.
    fn fail(&self, err: IbbError) -> IbbError {
        if let IbbError::Transport(cause) = &err {
            warn!("session {} with {} failed: {}", self.session_id, self.peer, cause);
            if let Err(close_err) = self.close(Side::Both) {
                debug!("session {} close after failure: {}", self.session_id, close_err);
            }
        }
        err
    }

    pub(crate) fn close(&self, side: Side) -> Result<(), IbbError> {
        let both_closed = {
            let _guard = lock(&self.close_lock);
            if self.closed.load(Ordering::Acquire) {
                return Ok(());
            }
            let coupled = self.close_coupling.load(Ordering::Acquire);
            if side == Side::Reader {
                self.input.close_by_reader();
            } else if coupled || side == Side::Both {
                self.input.close();
            }
            if side != Side::Reader {
                self.close_output(true);
            } else if coupled {
                self.close_output(false);
            }
            self.input.is_closed() && self.output.is_closed()
        };
        if both_closed {
            self.notify_peer()
        } else {
            Ok(())
        }
    }

    fn close_output(&self, flush: bool) {
        if !self.output.mark_closed() {
            return;
        }
        let mut state = self.output.final_state();
        if !flush {
            self.output.discard(&mut state);
            return;
        }
        // the peer already considers the stream ending
        if let Err(err) = self
            .output
            .flush(&mut state, &self.session_id, self.transport.as_ref())
        {
            warn!("session {} lost its final chunk: {}", self.session_id, err);
        }
    }

    /// Sends the close request exactly once and forgets the session.
    fn notify_peer(&self) -> Result<(), IbbError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!("closing session {} with {}", self.session_id, self.peer);
        let request = Iq::set(
            &self.peer,
            Payload::Close(Close {
                session_id: self.session_id.clone(),
            }),
        );
        let result = match self.router.send_iq_and_wait(request) {
            Ok(_) => Ok(()),
            Err(ConnectionError::ErrorReply(err)) if err.condition == ErrorCondition::ItemNotFound => {
                debug!("session {} was already gone at {}", self.session_id, self.peer);
                Ok(())
            }
            Err(err) => Err(IbbError::Transport(err)),
        };
        (self.detach)(&self.session_id);
        result
    }

    pub(crate) fn close_by_peer(&self, request: &Iq) {
        debug!("session {} closed by {}", self.session_id, self.peer);
        self.input.close();
        self.output.mark_closed();
        self.closed.store(true, Ordering::Release);
        (self.detach)(&self.session_id);
        if let Err(err) = self.router.send(Iq::result_for(request)) {
            debug!("could not confirm close of {}: {}", self.session_id, err);
        }
    }

    /// Connection is gone, nothing can be sent anymore.
    pub(crate) fn abort(&self) {
        self.closed.store(true, Ordering::Release);
        self.input.close();
        self.output.mark_closed();
    }

    pub(crate) fn receive(self: &Arc<Self>, stanza: &Stanza, data: &Data) {
        let seq = data.seq;
        let acceptance = self
            .input
            .accept(seq, || codec::decode_data(data).ok().map(|chunk| chunk.bytes));
        match acceptance {
            Acceptance::Accepted => self.transport.answer(stanza, Ok(())),
            Acceptance::Discarded => {
                debug!("session {} input closed, dropping chunk {}", self.session_id, seq);
                self.transport.answer(stanza, Ok(()));
            }
            Acceptance::Invalid => {
                warn!(
                    "session {} received invalid base64 in chunk {}",
                    self.session_id, seq
                );
                self.transport.answer(stanza, Err(ErrorCondition::BadRequest));
            }
            Acceptance::Duplicate { expected } => {
                warn!(
                    "session {} received old chunk {}, expecting {}",
                    self.session_id, seq, expected
                );
                self.transport
                    .answer(stanza, Err(ErrorCondition::UnexpectedRequest));
            }
            Acceptance::Gap { expected } => {
                warn!(
                    "session {} packets out of sequence: expected {}, received {}",
                    self.session_id, expected, seq
                );
                // the request itself is well formed, the reader sees the gap
                self.transport.answer(stanza, Ok(()));
                // closing waits for the peer, keep the delivery thread free
                let core = self.clone();
                let spawned = thread::Builder::new()
                    .name("ibb-teardown".to_string())
                    .spawn(move || {
                        if let Err(err) = core.close(Side::Both) {
                            debug!("session {} teardown: {}", core.session_id, err);
                        }
                    });
                if let Err(err) = spawned {
                    warn!("session {} teardown thread failed: {}", self.session_id, err);
                }
            }
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        if self.closed.load(Ordering::Acquire) {
            SessionState::Closed
        } else if self.input.is_closed() || self.output.is_closed() {
            SessionState::Closing
        } else {
            SessionState::Open
        }
    }
}

/// An established In-Band Bytestream with one peer.
///
/// The session hands out a [`SessionReader`] and a [`SessionWriter`]
/// that behave as a blocking byte stream pair. Clones share the session.
#[derive(Clone)]
pub struct Session {
    core: Arc<SessionCore>,
}

impl Session {
    pub(crate) fn from_core(core: Arc<SessionCore>) -> Self {
        Session { core }
    }

    pub fn session_id(&self) -> &str {
        self.core.session_id()
    }

    pub fn peer(&self) -> &Jid {
        self.core.peer()
    }

    pub fn block_size(&self) -> u16 {
        self.core.block_size
    }

    pub fn stanza_kind(&self) -> StanzaKind {
        self.core.kind()
    }

    /// Raw bytes carried by one chunk.
    pub fn chunk_capacity(&self) -> usize {
        self.core.output.capacity()
    }

    pub fn state(&self) -> SessionState {
        self.core.state()
    }

    pub fn read_timeout(&self) -> Duration {
        self.core.input.read_timeout()
    }

    /// Zero waits indefinitely.
    pub fn set_read_timeout(&self, timeout: Duration) {
        self.core.input.set_read_timeout(timeout);
    }

    pub fn close_coupling(&self) -> bool {
        self.core.close_coupling.load(Ordering::Acquire)
    }

    /// When enabled, closing either half closes the other one too.
    pub fn set_close_coupling(&self, enabled: bool) {
        self.core.close_coupling.store(enabled, Ordering::Release);
    }

    /// Next sequence number the input side accepts.
    pub fn expected_seq(&self) -> u16 {
        self.core.input.expected_seq()
    }

    /// Sequence number of the next chunk the output side sends.
    pub fn next_seq(&self) -> u16 {
        self.core.output.next_seq()
    }

    pub fn reader(&self) -> SessionReader {
        SessionReader {
            core: self.core.clone(),
        }
    }

    pub fn writer(&self) -> SessionWriter {
        SessionWriter {
            core: self.core.clone(),
        }
    }

    /// Flushes pending output, closes both halves and waits for the peer
    /// to confirm. Closing again does nothing.
    pub fn close(&self) -> Result<(), IbbError> {
        self.core.close(Side::Both)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.core.session_id)
            .field("peer", &self.core.peer)
            .field("block_size", &self.core.block_size)
            .field("state", &self.core.state())
            .finish()
    }
}

/// Receiving half of a session.
pub struct SessionReader {
    core: Arc<SessionCore>,
}

impl SessionReader {
    /// Reads a single byte, `None` at the end of the stream.
    pub fn read_byte(&mut self) -> Result<Option<u8>, IbbError> {
        let mut byte = [0u8; 1];
        match self.core.input.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    pub fn close(&mut self) -> Result<(), IbbError> {
        self.core.close(Side::Reader)
    }
}

impl Read for SessionReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.core.input.read(buf)?)
    }
}

/// Sending half of a session.
pub struct SessionWriter {
    core: Arc<SessionCore>,
}

impl SessionWriter {
    /// Flushes the buffered bytes, then closes this half.
    pub fn close(&mut self) -> Result<(), IbbError> {
        self.core.close(Side::Writer)
    }
}

impl Write for SessionWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.core.write(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.core.flush()?)
    }
}
