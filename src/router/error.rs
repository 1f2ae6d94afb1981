/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use crate::StanzaError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("no response received within {0:?}")]
    NoResponse(std::time::Duration),
    #[error("peer replied with error: {0}")]
    ErrorReply(StanzaError),
    #[error("not connected")]
    NotConnected,
    #[error("transport refused the stanza: {0}")]
    Sink(String),
}

impl ConnectionError {
    /// The stanza error condition if the peer answered with one.
    pub fn stanza_error(&self) -> Option<&StanzaError> {
        match self {
            ConnectionError::ErrorReply(err) => Some(err),
            _ => None,
        }
    }
}
