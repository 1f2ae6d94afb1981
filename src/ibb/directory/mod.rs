/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod config;
mod request;

use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;
use std::sync::Weak;
use std::sync::mpsc;
use std::sync::mpsc::TrySendError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::thread;

use log::debug;
use log::warn;
use rand::Rng;
use rand::distributions::Alphanumeric;

use super::codec;
use super::session::SessionCore;
use super::session::SessionParams;
use crate::ConnectionError;
use crate::ErrorCondition;
use crate::HandlerId;
use crate::IbbError;
use crate::Iq;
use crate::IqType;
use crate::Jid;
use crate::Open;
use crate::Payload;
use crate::Router;
use crate::Session;
use crate::Stanza;
use crate::StanzaFilter;
use crate::StanzaKind;
use crate::constants::SESSION_ID_PREFIX;
use crate::sync::lock;
use crate::sync::read;
use crate::sync::write;
use config::Settings;
use config::check_block_size;

pub use config::ChunkSizing;
pub use config::DirectoryBuilder;
pub use request::IncomingRequest;
pub use request::RequestListener;

/// Threads answering open requests.
const OPEN_WORKERS: usize = 4;
/// Open requests waiting for a worker before new ones are refused.
const OPEN_BACKLOG: usize = 64;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A fresh session id, `jibb_` followed by random alphanumerics.
pub(crate) fn new_session_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("{SESSION_ID_PREFIX}{suffix}")
}

fn has_payload(stanza: &Stanza, pick: fn(&Payload) -> bool) -> bool {
    stanza.payloads().iter().any(pick)
}

struct Shared {
    router: Arc<Router>,
    settings: RwLock<Settings>,
    sessions: RwLock<HashMap<String, Arc<SessionCore>>>,
    reserved: Mutex<HashSet<String>>,
    opens: Mutex<Option<mpsc::SyncSender<(Iq, Open)>>>,
    peer_listeners: RwLock<HashMap<Jid, Arc<dyn RequestListener>>>,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn RequestListener>)>>,
    next_listener: AtomicU64,
    ignored: Mutex<HashSet<String>>,
    handlers: Mutex<Vec<HandlerId>>,
    shut_down: AtomicBool,
}

/// A session id claimed by an outgoing open request still waiting for
/// its answer.
struct Reservation<'a> {
    shared: &'a Shared,
    session_id: String,
}

impl Reservation<'_> {
    fn commit(self, core: Arc<SessionCore>) {
        let mut sessions = write(&self.shared.sessions);
        lock(&self.shared.reserved).remove(&self.session_id);
        sessions.insert(self.session_id.clone(), core);
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        lock(&self.shared.reserved).remove(&self.session_id);
    }
}

impl Shared {
    fn create_session(
        self: &Arc<Self>,
        peer: Jid,
        session_id: String,
        block_size: u16,
        kind: StanzaKind,
        settings: &Settings,
    ) -> Arc<SessionCore> {
        let directory = Arc::downgrade(self);
        SessionCore::new(SessionParams {
            session_id,
            peer,
            block_size,
            kind,
            capacity: settings.chunk_sizing.capacity(block_size),
            close_coupling: settings.close_coupling,
            read_timeout: settings.read_timeout,
            router: self.router.clone(),
            detach: Box::new(move |session_id| {
                if let Some(shared) = directory.upgrade() {
                    shared.remove_session(session_id);
                }
            }),
        })
    }

    fn insert_session(&self, core: Arc<SessionCore>) -> Result<(), IbbError> {
        let mut sessions = write(&self.sessions);
        if lock(&self.reserved).contains(core.session_id()) {
            return Err(IbbError::SessionExists(core.session_id().to_string()));
        }
        match sessions.entry(core.session_id().to_string()) {
            Entry::Occupied(entry) => Err(IbbError::SessionExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(core);
                Ok(())
            }
        }
    }

    fn reserve(&self, session_id: &str) -> Result<Reservation<'_>, IbbError> {
        let sessions = read(&self.sessions);
        if sessions.contains_key(session_id)
            || !lock(&self.reserved).insert(session_id.to_string())
        {
            return Err(IbbError::SessionExists(session_id.to_string()));
        }
        Ok(Reservation {
            shared: self,
            session_id: session_id.to_string(),
        })
    }

    fn remove_session(&self, session_id: &str) {
        if write(&self.sessions).remove(session_id).is_some() {
            debug!("session {session_id} removed");
        }
    }

    /// The session a stanza from `from` carried in `kind` belongs to.
    fn lookup(&self, session_id: &str, from: Option<&Jid>, kind: StanzaKind) -> Option<Arc<SessionCore>> {
        let core = read(&self.sessions).get(session_id).cloned()?;
        if from == Some(core.peer()) && core.kind() == kind {
            Some(core)
        } else {
            None
        }
    }

    fn reply(&self, request: &Iq, outcome: Result<(), ErrorCondition>) {
        let reply = match outcome {
            Ok(()) => Iq::result_for(request),
            Err(condition) => Iq::error_for(request, condition),
        };
        if let Err(err) = self.router.send(reply) {
            debug!("could not answer {}: {}", request.id, err);
        }
    }

    /// Listeners may block, open requests are answered on the workers so
    /// the delivery thread stays free.
    fn start_workers(self: &Arc<Self>) {
        let (tx, rx) = mpsc::sync_channel::<(Iq, Open)>(OPEN_BACKLOG);
        let rx = Arc::new(Mutex::new(rx));
        for n in 0..OPEN_WORKERS {
            let rx = rx.clone();
            let weak = Arc::downgrade(self);
            let spawned = thread::Builder::new()
                .name(format!("ibb-open-{n}"))
                .spawn(move || {
                    loop {
                        let job = lock(&rx).recv();
                        let Ok((iq, open)) = job else {
                            break;
                        };
                        let Some(shared) = weak.upgrade() else {
                            break;
                        };
                        shared.negotiate(iq, open);
                    }
                });
            if let Err(err) = spawned {
                warn!("could not start open worker {n}: {err}");
            }
        }
        *lock(&self.opens) = Some(tx);
    }

    fn on_open(&self, stanza: Stanza) {
        let Stanza::Iq(iq) = stanza else {
            return;
        };
        let Some(open) = iq.payload.as_ref().and_then(Payload::as_open).cloned() else {
            return;
        };
        let queued = match lock(&self.opens).as_ref() {
            Some(opens) => opens.try_send((iq, open)),
            None => return,
        };
        match queued {
            Ok(()) => {}
            Err(TrySendError::Full((iq, open))) => {
                warn!("too many pending open requests, refusing {}", open.session_id);
                self.reply(&iq, Err(ErrorCondition::ResourceConstraint));
            }
            Err(TrySendError::Disconnected((_, open))) => {
                debug!("open request {} after shutdown", open.session_id);
            }
        }
    }

    fn negotiate(self: &Arc<Self>, iq: Iq, open: Open) {
        debug!(
            "open request {} from {:?} with block size {}",
            open.session_id,
            iq.from.as_ref().map(Jid::full),
            open.block_size
        );
        let maximum = read(&self.settings).maximum_block_size;
        if open.block_size == 0 {
            self.reply(&iq, Err(ErrorCondition::BadRequest));
            return;
        }
        if open.block_size > u32::from(maximum) {
            debug!(
                "refusing block size {} above {} for {}",
                open.block_size, maximum, open.session_id
            );
            self.reply(&iq, Err(ErrorCondition::ResourceConstraint));
            return;
        }
        if lock(&self.ignored).remove(&open.session_id) {
            debug!("open request {} left to its negotiator", open.session_id);
            return;
        }
        let Some(from) = iq.from.clone() else {
            self.reply(&iq, Err(ErrorCondition::BadRequest));
            return;
        };

        let peer_listener = read(&self.peer_listeners).get(&from).cloned();
        let request = IncomingRequest::new(self.clone(), iq, open, from);
        if let Some(listener) = peer_listener {
            listener.incoming(request);
            return;
        }
        let listeners: Vec<Arc<dyn RequestListener>> = read(&self.listeners)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        if listeners.is_empty() {
            if let Err(err) = request.reject() {
                debug!("could not reject {}: {}", request.session_id(), err);
            }
            return;
        }
        for listener in listeners {
            listener.incoming(request.clone());
        }
    }

    fn on_data(&self, stanza: Stanza) {
        let Some(data) = codec::find_data(&stanza) else {
            return;
        };
        match self.lookup(&data.session_id, stanza.sender(), stanza.kind()) {
            Some(core) => core.receive(&stanza, data),
            None => {
                warn!(
                    "data for unknown session {} from {:?}",
                    data.session_id,
                    stanza.sender().map(Jid::full)
                );
                if let Stanza::Iq(iq) = &stanza {
                    self.reply(iq, Err(ErrorCondition::ItemNotFound));
                }
            }
        }
    }

    fn on_close(&self, stanza: Stanza) {
        let Stanza::Iq(iq) = &stanza else {
            return;
        };
        let Some(close) = iq.payload.as_ref().and_then(Payload::as_close) else {
            return;
        };
        let core = read(&self.sessions).get(&close.session_id).cloned();
        match core {
            Some(core) if iq.from.as_ref() == Some(core.peer()) => core.close_by_peer(iq),
            _ => {
                warn!("close for unknown session {}", close.session_id);
                self.reply(iq, Err(ErrorCondition::ItemNotFound));
            }
        }
    }

    fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let sessions: Vec<Arc<SessionCore>> = write(&self.sessions)
            .drain()
            .map(|(_, core)| core)
            .collect();
        debug!("directory shutting down, aborting {} sessions", sessions.len());
        for core in sessions {
            core.abort();
        }
        write(&self.peer_listeners).clear();
        write(&self.listeners).clear();
        lock(&self.ignored).clear();
        lock(&self.opens).take();
        for id in lock(&self.handlers).drain(..) {
            self.router.unregister(id);
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        for id in lock(&self.handlers).drain(..) {
            self.router.unregister(id);
        }
    }
}

/// The bytestream sessions of one connection.
///
/// Serves open, data and close requests arriving through the router and
/// establishes outgoing sessions. Clones share the same directory. When
/// the router shuts down, every session is aborted and all listeners are
/// dropped.
#[derive(Clone)]
pub struct Directory {
    shared: Arc<Shared>,
}

impl Directory {
    pub fn build() -> DirectoryBuilder {
        DirectoryBuilder::new()
    }

    /// Attaches a directory with default settings.
    pub fn attach(router: &Arc<Router>) -> Result<Directory, IbbError> {
        DirectoryBuilder::new().attach(router)
    }

    fn with_settings(router: &Arc<Router>, settings: Settings) -> Directory {
        let shared = Arc::new(Shared {
            router: router.clone(),
            settings: RwLock::new(settings),
            sessions: RwLock::new(HashMap::new()),
            reserved: Mutex::new(HashSet::new()),
            opens: Mutex::new(None),
            peer_listeners: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            ignored: Mutex::new(HashSet::new()),
            handlers: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        });
        shared.start_workers();

        let handlers = [
            Directory::handle(
                &shared,
                StanzaFilter::iq(IqType::Set).matching(|s| has_payload(s, |p| p.as_open().is_some())),
                |shared, stanza| shared.on_open(stanza),
            ),
            Directory::handle(
                &shared,
                StanzaFilter::iq(IqType::Set).matching(|s| has_payload(s, |p| p.as_data().is_some())),
                |shared, stanza| shared.on_data(stanza),
            ),
            Directory::handle(
                &shared,
                StanzaFilter::message().matching(|s| has_payload(s, |p| p.as_data().is_some())),
                |shared, stanza| shared.on_data(stanza),
            ),
            Directory::handle(
                &shared,
                StanzaFilter::iq(IqType::Set).matching(|s| has_payload(s, |p| p.as_close().is_some())),
                |shared, stanza| shared.on_close(stanza),
            ),
        ];
        lock(&shared.handlers).extend(handlers);

        let weak = Arc::downgrade(&shared);
        router.on_close(move || {
            if let Some(shared) = weak.upgrade() {
                shared.shutdown();
            }
        });
        Directory { shared }
    }

    fn handle<F>(shared: &Arc<Shared>, filter: StanzaFilter, handler: F) -> HandlerId
    where
        F: Fn(&Arc<Shared>, Stanza) + Send + Sync + 'static,
    {
        let weak: Weak<Shared> = Arc::downgrade(shared);
        shared.router.register(filter, move |stanza| {
            if let Some(shared) = weak.upgrade() {
                handler(&shared, stanza);
            }
        })
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.shared.router
    }

    /// Opens a session with default settings and a generated session id.
    pub fn establish_session(&self, peer: &Jid) -> Result<Session, IbbError> {
        self.establish_session_with(peer, None, None)
    }

    /// Sends an open request and blocks until the peer answers it.
    pub fn establish_session_with(
        &self,
        peer: &Jid,
        session_id: Option<&str>,
        block_size: Option<u32>,
    ) -> Result<Session, IbbError> {
        if self.shared.shut_down.load(Ordering::Acquire) {
            return Err(IbbError::Transport(ConnectionError::NotConnected));
        }
        let settings = read(&self.shared.settings).clone();
        let block_size = match block_size {
            Some(size) => check_block_size(size)?,
            None => settings.default_block_size,
        };
        let session_id = session_id.map_or_else(new_session_id, str::to_string);
        let reservation = self.shared.reserve(&session_id)?;

        debug!("opening session {session_id} with {peer}, block size {block_size}");
        let request = Iq::set(
            peer,
            Payload::Open(Open {
                session_id: session_id.clone(),
                block_size: block_size.into(),
                stanza: settings.stanza_kind,
            }),
        );
        self.shared
            .router
            .send_iq_and_wait(request)
            .map_err(IbbError::NegotiationFailed)?;

        let core = self.shared.create_session(
            peer.clone(),
            session_id,
            block_size,
            settings.stanza_kind,
            &settings,
        );
        reservation.commit(core.clone());
        Ok(Session::from_core(core))
    }

    /// Listener for open requests from any peer without a peer listener.
    pub fn add_listener<L>(&self, listener: L) -> ListenerId
    where
        L: RequestListener + 'static,
    {
        let id = ListenerId(self.shared.next_listener.fetch_add(1, Ordering::Relaxed));
        write(&self.shared.listeners).push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) {
        write(&self.shared.listeners).retain(|(listener_id, _)| *listener_id != id);
    }

    /// Listener for open requests from one peer. It replaces any previous
    /// listener of that peer, and the general listeners are not consulted
    /// for its requests.
    pub fn add_peer_listener<L>(&self, peer: Jid, listener: L)
    where
        L: RequestListener + 'static,
    {
        write(&self.shared.peer_listeners).insert(peer, Arc::new(listener));
    }

    pub fn remove_peer_listener(&self, peer: &Jid) {
        write(&self.shared.peer_listeners).remove(peer);
    }

    /// The next open request with this session id is not answered here,
    /// some other negotiation takes care of it.
    pub fn ignore_next_open(&self, session_id: impl Into<String>) {
        lock(&self.shared.ignored).insert(session_id.into());
    }

    pub fn session(&self, session_id: &str) -> Option<Session> {
        read(&self.shared.sessions)
            .get(session_id)
            .cloned()
            .map(Session::from_core)
    }

    pub fn session_count(&self) -> usize {
        read(&self.shared.sessions).len()
    }

    pub fn default_block_size(&self) -> u16 {
        read(&self.shared.settings).default_block_size
    }

    pub fn set_default_block_size(&self, size: u32) -> Result<(), IbbError> {
        let size = check_block_size(size)?;
        let mut settings = write(&self.shared.settings);
        if size > settings.maximum_block_size {
            return Err(IbbError::InvalidBlockSize(size.into()));
        }
        settings.default_block_size = size;
        Ok(())
    }

    pub fn maximum_block_size(&self) -> u16 {
        read(&self.shared.settings).maximum_block_size
    }

    pub fn set_maximum_block_size(&self, size: u32) -> Result<(), IbbError> {
        let size = check_block_size(size)?;
        let mut settings = write(&self.shared.settings);
        if size < settings.default_block_size {
            return Err(IbbError::InvalidBlockSize(size.into()));
        }
        settings.maximum_block_size = size;
        Ok(())
    }

    pub fn stanza_kind(&self) -> StanzaKind {
        read(&self.shared.settings).stanza_kind
    }

    /// Carrier proposed by outgoing open requests.
    pub fn set_stanza_kind(&self, kind: StanzaKind) {
        write(&self.shared.settings).stanza_kind = kind;
    }

    /// Aborts every session without notifying peers, drops all listeners
    /// and stops serving requests.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }
}

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory")
            .field("local", self.shared.router.local_jid())
            .field("sessions", &self.session_count())
            .finish()
    }
}
