/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

//! In-Band Bytestreams (XEP-0047).
//!
//! A [`Directory`] attached to a [`Router`](crate::Router) negotiates
//! sessions with peers. Each [`Session`] is a reliable ordered byte stream
//! carried in base64 chunks over IQ or message stanzas.

pub mod codec;
mod directory;
mod error;
mod session;
mod transport;

pub use directory::ChunkSizing;
pub use directory::Directory;
pub use directory::DirectoryBuilder;
pub use directory::IncomingRequest;
pub use directory::ListenerId;
pub use directory::RequestListener;
pub use error::IbbError;
pub use session::Session;
pub use session::SessionReader;
pub use session::SessionState;
pub use session::SessionWriter;
