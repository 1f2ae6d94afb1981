/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

//! In-Band Bytestreams for XMPP clients.
//!
//! The crate turns the stanza exchange of an XMPP connection into byte
//! streams between two JabberIDs. The connection itself (XML stream,
//! TLS, authentication) is not part of it: the lower transport hands
//! incoming stanzas to a [`Router`] and writes what the router gives to
//! its [`StanzaSink`].

mod constants;
mod ibb;
mod jid;
mod router;
mod stanza;
mod sync;

#[cfg(test)]
mod testing;

pub use constants::DEFAULT_BLOCK_SIZE;
pub use constants::IBB_NS;
pub use constants::MAXIMUM_BLOCK_SIZE;

pub use jid::BadJid;
pub use jid::Jid;

pub use stanza::Close;
pub use stanza::Data;
pub use stanza::ErrorCondition;
pub use stanza::ErrorType;
pub use stanza::Iq;
pub use stanza::IqType;
pub use stanza::Message;
pub use stanza::Open;
pub use stanza::Payload;
pub use stanza::Stanza;
pub use stanza::StanzaError;
pub use stanza::StanzaKind;

pub use router::ConnectionError;
pub use router::HandlerId;
pub use router::Router;
pub use router::RouterBuilder;
pub use router::StanzaFilter;
pub use router::StanzaHandler;
pub use router::StanzaSink;

pub use ibb::ChunkSizing;
pub use ibb::Directory;
pub use ibb::DirectoryBuilder;
pub use ibb::IbbError;
pub use ibb::IncomingRequest;
pub use ibb::ListenerId;
pub use ibb::RequestListener;
pub use ibb::Session;
pub use ibb::SessionReader;
pub use ibb::SessionState;
pub use ibb::SessionWriter;
pub use ibb::codec;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
