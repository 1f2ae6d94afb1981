/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

//! Stanza routing for one connection.
//!
//! The router sits between a lower transport, which parses and writes the
//! XML stream, and the protocol extensions built on top of it. It offers
//! the three primitives extensions need:
//!
//! - fire and forget sending with [`Router::send`],
//! - request/reply correlation with [`Router::send_iq_and_wait`],
//! - filtered delivery of incoming stanzas with [`Router::register`].
//!
//! The transport feeds every incoming stanza to [`Router::deliver`], from
//! whatever thread it reads on.

mod error;
mod filter;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use log::debug;
use log::trace;
use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::ErrorCondition;
use crate::Iq;
use crate::IqType;
use crate::Jid;
use crate::Stanza;
use crate::StanzaError;
use crate::sync::lock;
use crate::sync::read;
use crate::sync::write;

pub use error::ConnectionError;
pub use filter::StanzaFilter;

/// Outbound half of the lower transport.
pub trait StanzaSink: Send + Sync {
    fn send_stanza(&self, stanza: Stanza) -> Result<(), ConnectionError>;
}

pub type StanzaHandler = Arc<dyn Fn(Stanza) + Send + Sync>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct PendingReply {
    to: Option<Jid>,
    slot: Mutex<Option<Result<Iq, ConnectionError>>>,
    ready: Condvar,
}

impl PendingReply {
    fn new(to: Option<Jid>) -> Self {
        PendingReply {
            to,
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Whether a reply from `from` can answer the request. Requests to the
    /// own account or the server may be answered without a `from`, requests
    /// to a bare JID by any of its resources.
    fn answered_by(&self, local: &Jid, from: Option<&Jid>) -> bool {
        let own_server = |jid: &Jid| {
            jid.bare() == local.bare()
                || (jid.localpart().is_none() && jid.domainpart() == local.domainpart())
        };
        match (&self.to, from) {
            (None, None) => true,
            (None, Some(from)) => own_server(from),
            (Some(to), None) => to.is_bare() && own_server(to),
            (Some(to), Some(from)) => to == from || (to.is_bare() && to.bare() == from.bare()),
        }
    }

    fn complete(&self, result: Result<Iq, ConnectionError>) {
        let mut slot = lock(&self.slot);
        if slot.is_none() {
            *slot = Some(result);
        }
        self.ready.notify_all();
    }

    fn wait(&self, timeout: Duration) -> Option<Result<Iq, ConnectionError>> {
        let slot = lock(&self.slot);
        let (mut slot, _) = self
            .ready
            .wait_timeout_while(slot, timeout, |slot| slot.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        slot.take()
    }
}

struct Registration {
    id: HandlerId,
    filter: StanzaFilter,
    handler: StanzaHandler,
}

pub struct RouterBuilder {
    local: Jid,
    sink: Arc<dyn StanzaSink>,
    reply_timeout: Duration,
}

impl RouterBuilder {
    pub fn new(local: Jid, sink: Arc<dyn StanzaSink>) -> Self {
        RouterBuilder {
            local,
            sink,
            reply_timeout: Duration::from_secs(5),
        }
    }

    /// How long [`Router::send_iq_and_wait`] blocks for a reply.
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn build(self) -> Arc<Router> {
        let id_prefix = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        Arc::new(Router {
            local: self.local,
            sink: self.sink,
            reply_timeout: self.reply_timeout,
            id_prefix,
            next_id: AtomicU64::new(0),
            connected: AtomicBool::new(true),
            pending: Mutex::new(HashMap::new()),
            handlers: RwLock::new(Vec::new()),
            close_listeners: Mutex::new(Vec::new()),
        })
    }
}

pub struct Router {
    local: Jid,
    sink: Arc<dyn StanzaSink>,
    reply_timeout: Duration,
    id_prefix: String,
    next_id: AtomicU64,
    connected: AtomicBool,
    pending: Mutex<HashMap<String, Arc<PendingReply>>>,
    handlers: RwLock<Vec<Registration>>,
    close_listeners: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl Router {
    pub fn build(local: Jid, sink: Arc<dyn StanzaSink>) -> RouterBuilder {
        RouterBuilder::new(local, sink)
    }

    pub fn local_jid(&self) -> &Jid {
        &self.local
    }

    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn next_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.id_prefix, n)
    }

    pub fn send(&self, stanza: impl Into<Stanza>) -> Result<(), ConnectionError> {
        let mut stanza = stanza.into();
        if !self.is_connected() {
            return Err(ConnectionError::NotConnected);
        }
        match &mut stanza {
            Stanza::Iq(iq) if iq.id.is_empty() => iq.id = self.next_id(),
            Stanza::Message(message) if message.id.is_empty() => message.id = self.next_id(),
            _ => {}
        }
        trace!("{} sending: {}", self.local, stanza);
        self.sink.send_stanza(stanza)
    }

    /// Sends an IQ request and blocks until the correlated reply arrives.
    ///
    /// An `error` reply is returned as [`ConnectionError::ErrorReply`].
    pub fn send_iq_and_wait(&self, mut iq: Iq) -> Result<Iq, ConnectionError> {
        if iq.id.is_empty() {
            iq.id = self.next_id();
        }
        let id = iq.id.clone();
        let pending = Arc::new(PendingReply::new(iq.to.clone()));
        lock(&self.pending).insert(id.clone(), pending.clone());
        if let Err(err) = self.send(iq) {
            lock(&self.pending).remove(&id);
            return Err(err);
        }
        let reply = pending.wait(self.reply_timeout);
        lock(&self.pending).remove(&id);
        match reply {
            None => Err(ConnectionError::NoResponse(self.reply_timeout)),
            Some(Err(err)) => Err(err),
            Some(Ok(reply)) => match reply.iq_type {
                IqType::Error => Err(ConnectionError::ErrorReply(
                    reply
                        .error
                        .unwrap_or_else(|| StanzaError::new(ErrorCondition::InternalServerError)),
                )),
                _ => Ok(reply),
            },
        }
    }

    pub fn register<F>(&self, filter: StanzaFilter, handler: F) -> HandlerId
    where
        F: Fn(Stanza) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        write(&self.handlers).push(Registration {
            id,
            filter,
            handler: Arc::new(handler),
        });
        id
    }

    pub fn unregister(&self, id: HandlerId) {
        write(&self.handlers).retain(|registration| registration.id != id);
    }

    /// Runs the callback once, when the connection is shut down.
    pub fn on_close<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_connected() {
            lock(&self.close_listeners).push(Box::new(callback));
        } else {
            callback();
        }
    }

    /// Entry point for the lower transport, called for every incoming stanza.
    pub fn deliver(&self, stanza: Stanza) {
        trace!("{} received: {}", self.local, stanza);
        if let Stanza::Iq(iq) = &stanza
            && !iq.iq_type.is_request()
        {
            let pending = {
                let mut table = lock(&self.pending);
                match table.get(&iq.id) {
                    Some(pending) if pending.answered_by(&self.local, iq.from.as_ref()) => {
                        table.remove(&iq.id)
                    }
                    Some(_) => {
                        debug!(
                            "{} ignoring reply {} from unexpected sender {:?}",
                            self.local,
                            iq.id,
                            iq.from.as_ref().map(Jid::full)
                        );
                        return;
                    }
                    None => None,
                }
            };
            match pending {
                Some(pending) => pending.complete(Ok(iq.clone())),
                None => debug!("{} dropping unexpected reply {}", self.local, iq.id),
            }
            return;
        }

        let handlers: Vec<StanzaHandler> = read(&self.handlers)
            .iter()
            .filter(|registration| registration.filter.accepts(&stanza))
            .map(|registration| registration.handler.clone())
            .collect();
        if handlers.is_empty() {
            if let Stanza::Iq(iq) = &stanza {
                debug!("{} has no handler for IQ {}", self.local, iq.id);
                let reply = Iq::error_for(iq, ErrorCondition::ServiceUnavailable);
                if let Err(err) = self.send(reply) {
                    debug!("{} could not reject IQ {}: {}", self.local, iq.id, err);
                }
            }
            return;
        }
        for handler in handlers {
            handler(stanza.clone());
        }
    }

    /// Tears the connection down. Blocked requests fail with
    /// [`ConnectionError::NotConnected`] and close callbacks run.
    pub fn shutdown(&self) {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return;
        }
        debug!("{} shutting down", self.local);
        let pending: Vec<Arc<PendingReply>> = lock(&self.pending)
            .drain()
            .map(|(_, pending)| pending)
            .collect();
        for pending in pending {
            pending.complete(Err(ConnectionError::NotConnected));
        }
        let listeners: Vec<Box<dyn FnOnce() + Send>> =
            lock(&self.close_listeners).drain(..).collect();
        for listener in listeners {
            listener();
        }
        write(&self.handlers).clear();
    }
}

#[cfg(test)]
mod tests;
