/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::fmt::Debug;
use std::sync::Arc;

use crate::IqType;
use crate::Stanza;
use crate::StanzaKind;

type Predicate = Arc<dyn Fn(&Stanza) -> bool + Send + Sync>;

/// Selects incoming stanzas by kind, IQ type and an optional predicate.
#[derive(Clone)]
pub struct StanzaFilter {
    kind: StanzaKind,
    iq_type: Option<IqType>,
    predicate: Option<Predicate>,
}

impl StanzaFilter {
    pub fn iq(iq_type: IqType) -> Self {
        StanzaFilter {
            kind: StanzaKind::Iq,
            iq_type: Some(iq_type),
            predicate: None,
        }
    }

    pub fn message() -> Self {
        StanzaFilter {
            kind: StanzaKind::Message,
            iq_type: None,
            predicate: None,
        }
    }

    /// Adds a predicate; an existing one must match as well.
    pub fn matching<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Stanza) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(match self.predicate.take() {
            Some(previous) => Arc::new(move |stanza| previous(stanza) && predicate(stanza)),
            None => Arc::new(predicate),
        });
        self
    }

    pub fn accepts(&self, stanza: &Stanza) -> bool {
        if stanza.kind() != self.kind {
            return false;
        }
        if self.iq_type.is_some() && stanza.iq_type() != self.iq_type {
            return false;
        }
        match &self.predicate {
            Some(predicate) => predicate(stanza),
            None => true,
        }
    }
}

impl Debug for StanzaFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StanzaFilter")
            .field("kind", &self.kind)
            .field("iq_type", &self.iq_type)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}
