/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::fmt::Display;

/// Error type attribute of a stanza error, RFC 6120 section 8.3.2.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum ErrorType {
    Auth,
    Cancel,
    Continue,
    Modify,
    Wait,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Auth => "auth",
            ErrorType::Cancel => "cancel",
            ErrorType::Continue => "continue",
            ErrorType::Modify => "modify",
            ErrorType::Wait => "wait",
        }
    }
}

/// Defined conditions used by the bytestream layer, RFC 6120 section 8.3.3.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash)]
pub enum ErrorCondition {
    BadRequest,
    FeatureNotImplemented,
    InternalServerError,
    ItemNotFound,
    NotAcceptable,
    RemoteServerTimeout,
    ResourceConstraint,
    ServiceUnavailable,
    UnexpectedRequest,
}

impl ErrorCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCondition::BadRequest => "bad-request",
            ErrorCondition::FeatureNotImplemented => "feature-not-implemented",
            ErrorCondition::InternalServerError => "internal-server-error",
            ErrorCondition::ItemNotFound => "item-not-found",
            ErrorCondition::NotAcceptable => "not-acceptable",
            ErrorCondition::RemoteServerTimeout => "remote-server-timeout",
            ErrorCondition::ResourceConstraint => "resource-constraint",
            ErrorCondition::ServiceUnavailable => "service-unavailable",
            ErrorCondition::UnexpectedRequest => "unexpected-request",
        }
    }

    /// The error type RFC 6120 recommends for this condition.
    pub fn default_type(&self) -> ErrorType {
        match self {
            ErrorCondition::BadRequest | ErrorCondition::NotAcceptable => ErrorType::Modify,
            ErrorCondition::RemoteServerTimeout
            | ErrorCondition::ResourceConstraint
            | ErrorCondition::UnexpectedRequest => ErrorType::Wait,
            ErrorCondition::FeatureNotImplemented
            | ErrorCondition::InternalServerError
            | ErrorCondition::ItemNotFound
            | ErrorCondition::ServiceUnavailable => ErrorType::Cancel,
        }
    }
}

impl Display for ErrorCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `<error/>` child of an error stanza.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct StanzaError {
    pub error_type: ErrorType,
    pub condition: ErrorCondition,
    pub text: Option<String>,
}

impl StanzaError {
    pub fn new(condition: ErrorCondition) -> Self {
        StanzaError {
            error_type: condition.default_type(),
            condition,
            text: None,
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }
}

impl Display for StanzaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.text {
            Some(text) => write!(f, "{} ({})", self.condition, text),
            None => write!(f, "{}", self.condition),
        }
    }
}

impl std::error::Error for StanzaError {}
