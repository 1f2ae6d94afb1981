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

use std::fmt::Display;
use std::str::FromStr;

pub use error::BadJid;
use error::description;

const MAX_PART_SIZE: usize = 1023;

fn check_part(part: &str, empty: &'static str) -> Result<(), BadJid> {
    if part.is_empty() {
        return Err(BadJid(empty));
    }
    if part.len() > MAX_PART_SIZE {
        return Err(BadJid(description::PART_TOO_LONG));
    }
    Ok(())
}

/// The address of an XMPP entity, used to identify bytestream peers.
///
/// A JID is `[local@]domain[/resource]`, see
/// [RFC7622](https://datatracker.ietf.org/doc/rfc7622/) for details.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Jid {
    full: String,
    at_pos: Option<usize>,
    slash_pos: Option<usize>,
}

impl Jid {
    pub fn new(jid: &str) -> Result<Self, BadJid> {
        let slash_pos = jid.find('/');
        let bare = match slash_pos {
            Some(pos) => &jid[..pos],
            None => jid,
        };
        let at_pos = bare.find('@');
        let local = at_pos.map(|pos| &bare[..pos]);
        let mut domain = match at_pos {
            Some(pos) => &bare[pos + 1..],
            None => bare,
        };
        let resource = slash_pos.map(|pos| &jid[pos + 1..]);

        check_part(domain, description::DOMAIN_EMPTY)?;
        // RFC 7622 section 3.2 allows a final dot
        if let Some(stripped) = domain.strip_suffix('.') {
            domain = stripped;
            check_part(domain, description::DOMAIN_EMPTY)?;
        }
        if let Some(local) = local {
            check_part(local, description::LOCAL_EMPTY)?;
        }
        if let Some(resource) = resource {
            check_part(resource, description::RESOURCE_EMPTY)?;
        }

        let mut full = String::with_capacity(jid.len());
        let mut new_at = None;
        if let Some(local) = local {
            full.push_str(local);
            new_at = Some(full.len());
            full.push('@');
        }
        full.push_str(domain);
        let mut new_slash = None;
        if let Some(resource) = resource {
            new_slash = Some(full.len());
            full.push('/');
            full.push_str(resource);
        }
        Ok(Jid {
            full,
            at_pos: new_at,
            slash_pos: new_slash,
        })
    }

    /// Full form of the JID with all the components.
    pub fn full(&self) -> &str {
        &self.full
    }

    /// Bare form of the JID without the resource part.
    pub fn bare(&self) -> &str {
        match self.slash_pos {
            Some(pos) => &self.full[..pos],
            None => &self.full,
        }
    }

    pub fn localpart(&self) -> Option<&str> {
        self.at_pos.map(|pos| &self.full[..pos])
    }

    pub fn domainpart(&self) -> &str {
        let start = self.at_pos.map_or(0, |pos| pos + 1);
        let end = self.slash_pos.unwrap_or(self.full.len());
        &self.full[start..end]
    }

    pub fn resourcepart(&self) -> Option<&str> {
        self.slash_pos.map(|pos| &self.full[pos + 1..])
    }

    pub fn is_bare(&self) -> bool {
        self.slash_pos.is_none()
    }

    pub fn to_bare(&self) -> Jid {
        Jid {
            full: self.bare().to_string(),
            at_pos: self.at_pos,
            slash_pos: None,
        }
    }

    /// Creates another JID by overriding the resource part.
    pub fn with_resource(&self, resource: &str) -> Result<Jid, BadJid> {
        check_part(resource, description::RESOURCE_EMPTY)?;
        let bare = self.bare();
        let mut full = String::with_capacity(bare.len() + 1 + resource.len());
        full.push_str(bare);
        full.push('/');
        full.push_str(resource);
        Ok(Jid {
            full,
            at_pos: self.at_pos,
            slash_pos: Some(bare.len()),
        })
    }
}

impl Display for Jid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full)
    }
}

impl FromStr for Jid {
    type Err = BadJid;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Jid::new(s)
    }
}
