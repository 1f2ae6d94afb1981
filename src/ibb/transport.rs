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

use log::debug;

use super::codec;
use super::codec::Chunk;
use crate::ConnectionError;
use crate::ErrorCondition;
use crate::Iq;
use crate::Jid;
use crate::Router;
use crate::Stanza;
use crate::StanzaKind;

/// How a session moves its chunks to the peer, chosen once per session
/// from the negotiated stanza kind.
pub(crate) trait ChunkTransport: Send + Sync {
    fn kind(&self) -> StanzaKind;

    /// Sends one chunk. Acknowledged transports block for the reply.
    fn send_chunk(&self, chunk: &Chunk) -> Result<(), ConnectionError>;

    /// Answers a received data stanza where the carrier has a reply channel.
    fn answer(&self, stanza: &Stanza, outcome: Result<(), ErrorCondition>);
}

pub(crate) fn for_kind(kind: StanzaKind, router: Arc<Router>, peer: Jid) -> Box<dyn ChunkTransport> {
    match kind {
        StanzaKind::Iq => Box::new(AcknowledgedTransport { router, peer }),
        StanzaKind::Message => Box::new(UnacknowledgedTransport { router, peer }),
    }
}

struct AcknowledgedTransport {
    router: Arc<Router>,
    peer: Jid,
}

impl ChunkTransport for AcknowledgedTransport {
    fn kind(&self) -> StanzaKind {
        StanzaKind::Iq
    }

    fn send_chunk(&self, chunk: &Chunk) -> Result<(), ConnectionError> {
        match codec::encode(chunk, &self.peer, StanzaKind::Iq) {
            Stanza::Iq(iq) => self.router.send_iq_and_wait(iq).map(|_| ()),
            stanza => self.router.send(stanza),
        }
    }

    fn answer(&self, stanza: &Stanza, outcome: Result<(), ErrorCondition>) {
        let Some(request) = stanza.as_iq() else {
            return;
        };
        let reply = match outcome {
            Ok(()) => Iq::result_for(request),
            Err(condition) => Iq::error_for(request, condition),
        };
        if let Err(err) = self.router.send(reply) {
            debug!("could not answer data {} from {}: {}", request.id, self.peer, err);
        }
    }
}

/// Message carrier. XEP-0047 gives it no acknowledgment, so loss shows up
/// only as a sequence gap on the receiving side.
struct UnacknowledgedTransport {
    router: Arc<Router>,
    peer: Jid,
}

impl ChunkTransport for UnacknowledgedTransport {
    fn kind(&self) -> StanzaKind {
        StanzaKind::Message
    }

    fn send_chunk(&self, chunk: &Chunk) -> Result<(), ConnectionError> {
        self.router
            .send(codec::encode(chunk, &self.peer, StanzaKind::Message))
    }

    fn answer(&self, _stanza: &Stanza, _outcome: Result<(), ErrorCondition>) {}
}
