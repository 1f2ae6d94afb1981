/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::sync::Arc;
use std::time::Duration;

use super::Directory;
use crate::IbbError;
use crate::Router;
use crate::StanzaKind;
use crate::constants::DEFAULT_BLOCK_SIZE;
use crate::constants::MAXIMUM_BLOCK_SIZE;

/// How many raw bytes go into one chunk of a session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ChunkSizing {
    /// Three bytes for every four characters of the block size, so that
    /// the base64 text of a chunk stays within the block size. Block sizes
    /// below four still carry one byte.
    #[default]
    EncodedFits,
    /// The block size counts raw bytes, as XEP-0047 words it.
    Raw,
}

impl ChunkSizing {
    pub fn capacity(&self, block_size: u16) -> usize {
        let block_size = usize::from(block_size);
        match self {
            ChunkSizing::EncodedFits => (block_size / 4 * 3).max(1),
            ChunkSizing::Raw => block_size.max(1),
        }
    }
}

pub(super) fn check_block_size(size: u32) -> Result<u16, IbbError> {
    match u16::try_from(size) {
        Ok(size) if size > 0 => Ok(size),
        _ => Err(IbbError::InvalidBlockSize(size)),
    }
}

#[derive(Debug, Clone)]
pub(super) struct Settings {
    pub(super) default_block_size: u16,
    pub(super) maximum_block_size: u16,
    pub(super) stanza_kind: StanzaKind,
    pub(super) chunk_sizing: ChunkSizing,
    pub(super) close_coupling: bool,
    pub(super) read_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            default_block_size: DEFAULT_BLOCK_SIZE,
            maximum_block_size: MAXIMUM_BLOCK_SIZE,
            stanza_kind: StanzaKind::Iq,
            chunk_sizing: ChunkSizing::EncodedFits,
            close_coupling: false,
            read_timeout: Duration::ZERO,
        }
    }
}

pub struct DirectoryBuilder {
    default_block_size: u32,
    maximum_block_size: u32,
    stanza_kind: StanzaKind,
    chunk_sizing: ChunkSizing,
    close_coupling: bool,
    read_timeout: Duration,
}

impl Default for DirectoryBuilder {
    fn default() -> Self {
        DirectoryBuilder::new()
    }
}

impl DirectoryBuilder {
    pub fn new() -> Self {
        let defaults = Settings::default();
        DirectoryBuilder {
            default_block_size: defaults.default_block_size.into(),
            maximum_block_size: defaults.maximum_block_size.into(),
            stanza_kind: defaults.stanza_kind,
            chunk_sizing: defaults.chunk_sizing,
            close_coupling: defaults.close_coupling,
            read_timeout: defaults.read_timeout,
        }
    }

    /// Block size proposed by outgoing open requests.
    pub fn default_block_size(mut self, size: u32) -> Self {
        self.default_block_size = size;
        self
    }

    /// Incoming open requests above this block size are refused.
    pub fn maximum_block_size(mut self, size: u32) -> Self {
        self.maximum_block_size = size;
        self
    }

    pub fn stanza_kind(mut self, kind: StanzaKind) -> Self {
        self.stanza_kind = kind;
        self
    }

    pub fn chunk_sizing(mut self, sizing: ChunkSizing) -> Self {
        self.chunk_sizing = sizing;
        self
    }

    pub fn close_coupling(mut self, enabled: bool) -> Self {
        self.close_coupling = enabled;
        self
    }

    /// Initial read timeout of new sessions, zero blocks indefinitely.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Validates the settings and starts serving bytestream requests
    /// arriving through the router.
    pub fn attach(self, router: &Arc<Router>) -> Result<Directory, IbbError> {
        let default_block_size = check_block_size(self.default_block_size)?;
        let maximum_block_size = check_block_size(self.maximum_block_size)?;
        if default_block_size > maximum_block_size {
            return Err(IbbError::InvalidBlockSize(self.default_block_size));
        }
        let settings = Settings {
            default_block_size,
            maximum_block_size,
            stanza_kind: self.stanza_kind,
            chunk_sizing: self.chunk_sizing,
            close_coupling: self.close_coupling,
            read_timeout: self.read_timeout,
        };
        Ok(Directory::with_settings(router, settings))
    }
}
