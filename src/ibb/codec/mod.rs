/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::Data;
use crate::Iq;
use crate::Jid;
use crate::Message;
use crate::Payload;
use crate::Stanza;
use crate::StanzaKind;

/// One sequenced unit of stream payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub session_id: String,
    pub seq: u16,
    pub bytes: Vec<u8>,
}

/// A data element whose content is not valid base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidData {
    pub session_id: String,
    pub seq: u16,
}

/// Wraps the chunk into the stanza a session of the given kind sends.
pub fn encode(chunk: &Chunk, peer: &Jid, kind: StanzaKind) -> Stanza {
    let payload = Payload::Data(Data {
        session_id: chunk.session_id.clone(),
        seq: chunk.seq,
        content: STANDARD.encode(&chunk.bytes),
    });
    match kind {
        StanzaKind::Iq => Iq::set(peer, payload).into(),
        StanzaKind::Message => Message::new(peer).with_payload(payload).into(),
    }
}

/// Decodes the content of a data element. Whitespace is tolerated since
/// some clients wrap long base64 lines.
pub fn decode_data(data: &Data) -> Result<Chunk, InvalidData> {
    let content: String = data
        .content
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    match STANDARD.decode(content) {
        Ok(bytes) => Ok(Chunk {
            session_id: data.session_id.clone(),
            seq: data.seq,
            bytes,
        }),
        Err(_) => Err(InvalidData {
            session_id: data.session_id.clone(),
            seq: data.seq,
        }),
    }
}

pub fn find_data(stanza: &Stanza) -> Option<&Data> {
    stanza.payloads().iter().find_map(Payload::as_data)
}

/// Extracts and decodes the chunk of a data stanza. `None` if the stanza
/// carries no data element at all.
pub fn decode(stanza: &Stanza) -> Option<Result<Chunk, InvalidData>> {
    find_data(stanza).map(decode_data)
}
