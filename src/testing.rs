/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

//! Simulated connections for tests.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::sync::Weak;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use crate::ConnectionError;
use crate::ErrorCondition;
use crate::Iq;
use crate::IqType;
use crate::Jid;
use crate::Router;
use crate::Stanza;
use crate::StanzaSink;
use crate::sync::lock;

pub(crate) const REPLY_TIMEOUT: Duration = Duration::from_millis(300);

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub(crate) fn jid(s: &str) -> Jid {
    Jid::new(s).unwrap()
}

/// Polls until the condition holds, false if it never did.
pub(crate) fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// How the simulated peer behind a [`RecordingSink`] answers IQ requests.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Responder {
    Silent,
    Acknowledge,
    Fail(ErrorCondition),
}

/// Captures everything a router sends, optionally answering requests as
/// the peer would.
pub(crate) struct RecordingSink {
    peer: Jid,
    sent: Mutex<Vec<Stanza>>,
    responder: Mutex<Responder>,
    router: OnceLock<Weak<Router>>,
}

impl RecordingSink {
    pub(crate) fn connect(local: &str, peer: &str, responder: Responder) -> (Arc<Router>, Arc<RecordingSink>) {
        init_logging();
        let sink = Arc::new(RecordingSink {
            peer: jid(peer),
            sent: Mutex::new(Vec::new()),
            responder: Mutex::new(responder),
            router: OnceLock::new(),
        });
        let router = Router::build(jid(local), sink.clone())
            .reply_timeout(REPLY_TIMEOUT)
            .build();
        let _ = sink.router.set(Arc::downgrade(&router));
        (router, sink)
    }

    pub(crate) fn set_responder(&self, responder: Responder) {
        *lock(&self.responder) = responder;
    }

    pub(crate) fn sent(&self) -> Vec<Stanza> {
        lock(&self.sent).clone()
    }

    pub(crate) fn clear(&self) {
        lock(&self.sent).clear();
    }

    /// Delivers a stanza to the router as if the peer had sent it.
    pub(crate) fn inject(&self, stanza: impl Into<Stanza>) {
        let mut stanza = stanza.into();
        stanza.set_from(self.peer.clone());
        if let Some(router) = self.router.get().and_then(Weak::upgrade) {
            router.deliver(stanza);
        }
    }
}

impl StanzaSink for RecordingSink {
    fn send_stanza(&self, stanza: Stanza) -> Result<(), ConnectionError> {
        lock(&self.sent).push(stanza.clone());
        let Stanza::Iq(iq) = &stanza else {
            return Ok(());
        };
        if !iq.iq_type.is_request() {
            return Ok(());
        }
        let mut request = iq.clone();
        request.from = self.router.get().and_then(Weak::upgrade).map(|r| r.local_jid().clone());
        let reply = match *lock(&self.responder) {
            Responder::Silent => return Ok(()),
            Responder::Acknowledge => Iq::result_for(&request),
            Responder::Fail(condition) => Iq::error_for(&request, condition),
        };
        self.inject(reply);
        Ok(())
    }
}

/// One direction of an in-memory link; delivers synchronously on the
/// sending thread, stamping the sender address like a server would.
pub(crate) struct LoopbackSink {
    from: Jid,
    sent: Mutex<Vec<Stanza>>,
    target: OnceLock<Weak<Router>>,
}

impl LoopbackSink {
    pub(crate) fn sent(&self) -> Vec<Stanza> {
        lock(&self.sent).clone()
    }

    /// Data stanzas sent through this direction.
    pub(crate) fn data_requests(&self) -> Vec<Stanza> {
        self.sent()
            .into_iter()
            .filter(|stanza| crate::ibb::codec::find_data(stanza).is_some())
            .collect()
    }

    pub(crate) fn replies(&self, iq_type: IqType) -> Vec<Iq> {
        self.sent()
            .into_iter()
            .filter_map(|stanza| match stanza {
                Stanza::Iq(iq) if iq.iq_type == iq_type => Some(iq),
                _ => None,
            })
            .collect()
    }
}

impl StanzaSink for LoopbackSink {
    fn send_stanza(&self, mut stanza: Stanza) -> Result<(), ConnectionError> {
        stanza.set_from(self.from.clone());
        lock(&self.sent).push(stanza.clone());
        match self.target.get().and_then(Weak::upgrade) {
            Some(router) => {
                router.deliver(stanza);
                Ok(())
            }
            None => Err(ConnectionError::NotConnected),
        }
    }
}

pub(crate) struct Link {
    pub(crate) a: Arc<Router>,
    pub(crate) b: Arc<Router>,
    pub(crate) a_to_b: Arc<LoopbackSink>,
    pub(crate) b_to_a: Arc<LoopbackSink>,
}

/// Two routers connected to each other.
pub(crate) fn link(a: &str, b: &str) -> Link {
    init_logging();
    let a_to_b = Arc::new(LoopbackSink {
        from: jid(a),
        sent: Mutex::new(Vec::new()),
        target: OnceLock::new(),
    });
    let b_to_a = Arc::new(LoopbackSink {
        from: jid(b),
        sent: Mutex::new(Vec::new()),
        target: OnceLock::new(),
    });
    let router_a = Router::build(jid(a), a_to_b.clone())
        .reply_timeout(REPLY_TIMEOUT)
        .build();
    let router_b = Router::build(jid(b), b_to_a.clone())
        .reply_timeout(REPLY_TIMEOUT)
        .build();
    let _ = a_to_b.target.set(Arc::downgrade(&router_b));
    let _ = b_to_a.target.set(Arc::downgrade(&router_a));
    Link {
        a: router_a,
        b: router_b,
        a_to_b,
        b_to_a,
    }
}
