/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::io;
use std::time::Duration;

use crate::ConnectionError;
use crate::ErrorCondition;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IbbError {
    /// The peer rejected the open request or never answered it.
    #[error("bytestream negotiation failed: {0}")]
    NegotiationFailed(#[source] ConnectionError),
    #[error("block size {0} is outside 1..=65535")]
    InvalidBlockSize(u32),
    #[error("packets out of sequence: expected {expected}, received {received}")]
    Sequence { expected: u16, received: u16 },
    #[error("stream is closed")]
    StreamClosed,
    #[error("no data received within {0:?}")]
    ReadTimeout(Duration),
    #[error("error while sending to peer: {0}")]
    Transport(#[source] ConnectionError),
    #[error("bytestream request already answered")]
    AlreadyAnswered,
    #[error("session id {0} is already in use")]
    SessionExists(String),
}

impl IbbError {
    /// The error condition stated by the peer, if it gave one.
    pub fn condition(&self) -> Option<ErrorCondition> {
        match self {
            IbbError::NegotiationFailed(err) | IbbError::Transport(err) => {
                err.stanza_error().map(|err| err.condition)
            }
            _ => None,
        }
    }
}

impl From<IbbError> for io::Error {
    fn from(err: IbbError) -> Self {
        let kind = match err {
            IbbError::ReadTimeout(_) => io::ErrorKind::TimedOut,
            IbbError::Sequence { .. } => io::ErrorKind::InvalidData,
            IbbError::StreamClosed => io::ErrorKind::BrokenPipe,
            IbbError::InvalidBlockSize(_) => io::ErrorKind::InvalidInput,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
