/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use super::StanzaKind;

/// `<open/>` element requesting a new bytestream.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct Open {
    pub session_id: String,
    /// Kept wide so that out of range requests from peers can be answered.
    pub block_size: u32,
    pub stanza: StanzaKind,
}

/// `<data/>` element carrying one base64 encoded chunk.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct Data {
    pub session_id: String,
    pub seq: u16,
    pub content: String,
}

/// `<close/>` element ending a bytestream.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct Close {
    pub session_id: String,
}

/// Extension element carried by a stanza.
#[derive(Debug, Eq, PartialEq, Clone)]
pub enum Payload {
    Open(Open),
    Data(Data),
    Close(Close),
    Other { name: String, namespace: String },
}

impl Payload {
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Payload::Open(open) => Some(&open.session_id),
            Payload::Data(data) => Some(&data.session_id),
            Payload::Close(close) => Some(&close.session_id),
            Payload::Other { .. } => None,
        }
    }

    pub fn as_open(&self) -> Option<&Open> {
        match self {
            Payload::Open(open) => Some(open),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&Data> {
        match self {
            Payload::Data(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_close(&self) -> Option<&Close> {
        match self {
            Payload::Close(close) => Some(close),
            _ => None,
        }
    }
}
