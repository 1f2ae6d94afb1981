/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use log::debug;

use super::Shared;
use super::config::check_block_size;
use crate::ErrorCondition;
use crate::IbbError;
use crate::Iq;
use crate::Jid;
use crate::Open;
use crate::Session;
use crate::StanzaKind;
use crate::sync::read;

/// Receives open requests no session exists for yet.
pub trait RequestListener: Send + Sync {
    fn incoming(&self, request: IncomingRequest);
}

impl<F> RequestListener for F
where
    F: Fn(IncomingRequest) + Send + Sync,
{
    fn incoming(&self, request: IncomingRequest) {
        self(request)
    }
}

struct RequestInner {
    shared: Arc<Shared>,
    iq: Iq,
    open: Open,
    from: Jid,
    answered: AtomicBool,
}

/// An open request waiting for the local decision.
///
/// Clones refer to the same request, so with several listeners the first
/// one to answer wins. A request nobody answers leaves the peer waiting
/// until its own timeout.
#[derive(Clone)]
pub struct IncomingRequest {
    inner: Arc<RequestInner>,
}

impl IncomingRequest {
    pub(super) fn new(shared: Arc<Shared>, iq: Iq, open: Open, from: Jid) -> Self {
        IncomingRequest {
            inner: Arc::new(RequestInner {
                shared,
                iq,
                open,
                from,
                answered: AtomicBool::new(false),
            }),
        }
    }

    pub fn from(&self) -> &Jid {
        &self.inner.from
    }

    pub fn session_id(&self) -> &str {
        &self.inner.open.session_id
    }

    pub fn block_size(&self) -> u32 {
        self.inner.open.block_size
    }

    pub fn stanza_kind(&self) -> StanzaKind {
        self.inner.open.stanza
    }

    pub fn is_answered(&self) -> bool {
        self.inner.answered.load(Ordering::Acquire)
    }

    fn answer(&self) -> Result<(), IbbError> {
        if self.inner.answered.swap(true, Ordering::AcqRel) {
            return Err(IbbError::AlreadyAnswered);
        }
        Ok(())
    }

    /// Creates the session and confirms it to the peer.
    pub fn accept(&self) -> Result<Session, IbbError> {
        let inner = &self.inner;
        let block_size = check_block_size(inner.open.block_size)?;
        self.answer()?;
        let settings = read(&inner.shared.settings).clone();
        let core = inner.shared.create_session(
            inner.from.clone(),
            inner.open.session_id.clone(),
            block_size,
            inner.open.stanza,
            &settings,
        );
        // registered before replying, the first chunk may follow the reply
        // right away
        if let Err(err) = inner.shared.insert_session(core.clone()) {
            inner
                .shared
                .reply(&inner.iq, Err(ErrorCondition::NotAcceptable));
            return Err(err);
        }
        if let Err(err) = inner.shared.router.send(Iq::result_for(&inner.iq)) {
            inner.shared.remove_session(&inner.open.session_id);
            core.abort();
            return Err(IbbError::Transport(err));
        }
        debug!(
            "accepted session {} from {} with block size {}",
            inner.open.session_id, inner.from, block_size
        );
        Ok(Session::from_core(core))
    }

    pub fn reject(&self) -> Result<(), IbbError> {
        self.answer()?;
        debug!(
            "rejected session {} from {}",
            self.inner.open.session_id, self.inner.from
        );
        self.inner
            .shared
            .router
            .send(Iq::error_for(&self.inner.iq, ErrorCondition::NotAcceptable))
            .map_err(IbbError::Transport)
    }
}

impl std::fmt::Debug for IncomingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingRequest")
            .field("from", &self.inner.from)
            .field("session_id", &self.inner.open.session_id)
            .field("block_size", &self.inner.open.block_size)
            .field("stanza", &self.inner.open.stanza)
            .finish()
    }
}
