/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

//! XML rendering of stanzas, used for wire traces in the logs.

use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result;

use super::Iq;
use super::Message;
use super::Payload;
use super::Stanza;
use super::StanzaError;
use crate::Jid;
use crate::constants::CLOSE_TAG;
use crate::constants::DATA_TAG;
use crate::constants::IBB_NS;
use crate::constants::OPEN_TAG;
use crate::constants::STANZAS_NS;

mod predefined {
    pub const LT: &str = "&lt;";
    pub const GT: &str = "&gt;";
    pub const AMP: &str = "&amp;";
    pub const APOS: &str = "&apos;";
    pub const QUOT: &str = "&quot;";
}

fn escape(s: &str, f: &mut Formatter<'_>) -> Result {
    let mut start = 0;
    for (pos, c) in s.char_indices() {
        let entity = match c {
            '<' => predefined::LT,
            '>' => predefined::GT,
            '&' => predefined::AMP,
            '\'' => predefined::APOS,
            '"' => predefined::QUOT,
            _ => continue,
        };
        f.write_str(&s[start..pos])?;
        f.write_str(entity)?;
        start = pos + 1;
    }
    f.write_str(&s[start..])
}

fn attribute(f: &mut Formatter<'_>, name: &str, value: &str) -> Result {
    write!(f, " {name}=\"")?;
    escape(value, f)?;
    f.write_str("\"")
}

fn addressing(f: &mut Formatter<'_>, id: &str, from: &Option<Jid>, to: &Option<Jid>) -> Result {
    if !id.is_empty() {
        attribute(f, "id", id)?;
    }
    if let Some(from) = from {
        attribute(f, "from", from.full())?;
    }
    if let Some(to) = to {
        attribute(f, "to", to.full())?;
    }
    Ok(())
}

impl Display for Payload {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Payload::Open(open) => {
                write!(f, "<{OPEN_TAG}")?;
                attribute(f, "xmlns", IBB_NS)?;
                attribute(f, "sid", &open.session_id)?;
                attribute(f, "block-size", &open.block_size.to_string())?;
                attribute(f, "stanza", open.stanza.as_str())?;
                f.write_str("/>")
            }
            Payload::Data(data) => {
                write!(f, "<{DATA_TAG}")?;
                attribute(f, "xmlns", IBB_NS)?;
                attribute(f, "seq", &data.seq.to_string())?;
                attribute(f, "sid", &data.session_id)?;
                f.write_str(">")?;
                escape(&data.content, f)?;
                write!(f, "</{DATA_TAG}>")
            }
            Payload::Close(close) => {
                write!(f, "<{CLOSE_TAG}")?;
                attribute(f, "xmlns", IBB_NS)?;
                attribute(f, "sid", &close.session_id)?;
                f.write_str("/>")
            }
            Payload::Other { name, namespace } => {
                write!(f, "<{name}")?;
                attribute(f, "xmlns", namespace)?;
                f.write_str("/>")
            }
        }
    }
}

fn error_element(f: &mut Formatter<'_>, error: &StanzaError) -> Result {
    f.write_str("<error")?;
    attribute(f, "type", error.error_type.as_str())?;
    write!(f, "><{}", error.condition.as_str())?;
    attribute(f, "xmlns", STANZAS_NS)?;
    f.write_str("/>")?;
    if let Some(text) = &error.text {
        f.write_str("<text")?;
        attribute(f, "xmlns", STANZAS_NS)?;
        f.write_str(">")?;
        escape(text, f)?;
        f.write_str("</text>")?;
    }
    f.write_str("</error>")
}

impl Display for Iq {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.write_str("<iq")?;
        attribute(f, "type", self.iq_type.as_str())?;
        addressing(f, &self.id, &self.from, &self.to)?;
        if self.payload.is_none() && self.error.is_none() {
            return f.write_str("/>");
        }
        f.write_str(">")?;
        if let Some(payload) = &self.payload {
            payload.fmt(f)?;
        }
        if let Some(error) = &self.error {
            error_element(f, error)?;
        }
        f.write_str("</iq>")
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.write_str("<message")?;
        addressing(f, &self.id, &self.from, &self.to)?;
        if self.payloads.is_empty() {
            return f.write_str("/>");
        }
        f.write_str(">")?;
        for payload in &self.payloads {
            payload.fmt(f)?;
        }
        f.write_str("</message>")
    }
}

impl Display for Stanza {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Stanza::Iq(iq) => iq.fmt(f),
            Stanza::Message(message) => message.fmt(f),
        }
    }
}
