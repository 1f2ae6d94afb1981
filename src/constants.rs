/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

pub const IBB_NS: &str = "http://jabber.org/protocol/ibb";

pub const STANZAS_NS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";

pub const OPEN_TAG: &str = "open";

pub const DATA_TAG: &str = "data";

pub const CLOSE_TAG: &str = "close";

/// Largest block size XEP-0047 allows, also the default maximum.
pub const MAXIMUM_BLOCK_SIZE: u16 = 65535;

pub const DEFAULT_BLOCK_SIZE: u16 = 4096;

pub const SESSION_ID_PREFIX: &str = "jibb_";
