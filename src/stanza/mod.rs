/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod error;
mod payload;
mod xml;

use crate::Jid;

pub use error::ErrorCondition;
pub use error::ErrorType;
pub use error::StanzaError;
pub use payload::Close;
pub use payload::Data;
pub use payload::Open;
pub use payload::Payload;

/// Which top level stanza carries a unit, also the `stanza` attribute
/// of an IBB open request.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash, Default)]
pub enum StanzaKind {
    #[default]
    Iq,
    Message,
}

impl StanzaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StanzaKind::Iq => "iq",
            StanzaKind::Message => "message",
        }
    }
}

#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash)]
pub enum IqType {
    Get,
    Set,
    Result,
    Error,
}

impl IqType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IqType::Get => "get",
            IqType::Set => "set",
            IqType::Result => "result",
            IqType::Error => "error",
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, IqType::Get | IqType::Set)
    }
}

#[derive(Debug, Eq, PartialEq, Clone)]
pub struct Iq {
    pub id: String,
    pub from: Option<Jid>,
    pub to: Option<Jid>,
    pub iq_type: IqType,
    pub payload: Option<Payload>,
    pub error: Option<StanzaError>,
}

impl Iq {
    /// A `set` request; the id is assigned by the router when sent.
    pub fn set(to: &Jid, payload: Payload) -> Iq {
        Iq {
            id: String::new(),
            from: None,
            to: Some(to.clone()),
            iq_type: IqType::Set,
            payload: Some(payload),
            error: None,
        }
    }

    /// An empty `result` answering the given request.
    pub fn result_for(request: &Iq) -> Iq {
        Iq {
            id: request.id.clone(),
            from: request.to.clone(),
            to: request.from.clone(),
            iq_type: IqType::Result,
            payload: None,
            error: None,
        }
    }

    /// An `error` answering the given request. The request payload is not
    /// echoed back.
    pub fn error_for(request: &Iq, condition: ErrorCondition) -> Iq {
        Iq {
            id: request.id.clone(),
            from: request.to.clone(),
            to: request.from.clone(),
            iq_type: IqType::Error,
            payload: None,
            error: Some(StanzaError::new(condition)),
        }
    }
}

#[derive(Debug, Eq, PartialEq, Clone)]
pub struct Message {
    pub id: String,
    pub from: Option<Jid>,
    pub to: Option<Jid>,
    pub payloads: Vec<Payload>,
}

impl Message {
    pub fn new(to: &Jid) -> Message {
        Message {
            id: String::new(),
            from: None,
            to: Some(to.clone()),
            payloads: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Message {
        self.payloads.push(payload);
        self
    }
}

/// One discrete protocol unit exchanged over the connection.
#[derive(Debug, Eq, PartialEq, Clone)]
pub enum Stanza {
    Iq(Iq),
    Message(Message),
}

impl Stanza {
    pub fn kind(&self) -> StanzaKind {
        match self {
            Stanza::Iq(_) => StanzaKind::Iq,
            Stanza::Message(_) => StanzaKind::Message,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Stanza::Iq(iq) => &iq.id,
            Stanza::Message(message) => &message.id,
        }
    }

    pub fn sender(&self) -> Option<&Jid> {
        match self {
            Stanza::Iq(iq) => iq.from.as_ref(),
            Stanza::Message(message) => message.from.as_ref(),
        }
    }

    pub fn to(&self) -> Option<&Jid> {
        match self {
            Stanza::Iq(iq) => iq.to.as_ref(),
            Stanza::Message(message) => message.to.as_ref(),
        }
    }

    pub fn set_from(&mut self, from: Jid) {
        match self {
            Stanza::Iq(iq) => iq.from = Some(from),
            Stanza::Message(message) => message.from = Some(from),
        }
    }

    pub fn iq_type(&self) -> Option<IqType> {
        match self {
            Stanza::Iq(iq) => Some(iq.iq_type),
            Stanza::Message(_) => None,
        }
    }

    /// All extension elements, the IQ child or the message extensions.
    pub fn payloads(&self) -> &[Payload] {
        match self {
            Stanza::Iq(iq) => iq.payload.as_slice(),
            Stanza::Message(message) => &message.payloads,
        }
    }

    pub fn as_iq(&self) -> Option<&Iq> {
        match self {
            Stanza::Iq(iq) => Some(iq),
            Stanza::Message(_) => None,
        }
    }
}

impl From<Iq> for Stanza {
    fn from(iq: Iq) -> Self {
        Stanza::Iq(iq)
    }
}

impl From<Message> for Stanza {
    fn from(message: Message) -> Self {
        Stanza::Message(message)
    }
}
