//! Error types for the query engine client.
//!
//! # Design
//! Every failure lands in one of four families: the HTTP exchange failed
//! (`Transport`), the response did not have the expected envelope shape
//! (`Protocol`), some XML was malformed (`Parse`), or the stub has nothing
//! registered for a template (`Lookup`). Nothing is retried or swallowed;
//! the error is handed straight back to the caller.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::client::TemplateId;

/// Errors returned by [`QueryClient`](crate::QueryClient) implementations.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The stub client has no result registered for this template.
    #[error("no result registered for template {template}")]
    Lookup { template: TemplateId },

    /// The request envelope could not be written.
    #[error("request serialization failed: {0}")]
    Serialization(String),
}

impl QueryError {
    pub fn is_transport(&self) -> bool {
        matches!(self, QueryError::Transport(_))
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, QueryError::Protocol(_))
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, QueryError::Parse(_))
    }

    pub fn is_lookup(&self) -> bool {
        matches!(self, QueryError::Lookup { .. })
    }
}

/// Failures of the HTTP exchange itself.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The connection could not be established or broke mid-flight.
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out")]
    Timeout,
}

/// The response parsed as XML but does not match the envelope layout.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Step `step` (1-based) of the result path found no child element at
    /// `index` under `parent`.
    #[error("no element at position {index} under <{parent}> (step {step} of the result path)")]
    MissingElement {
        step: usize,
        index: usize,
        parent: String,
    },

    /// The element that should carry the escaped result document is empty.
    #[error("<{element}> carries no result text")]
    MissingText { element: String },
}

/// Malformed or unreadable XML.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("XML syntax error at byte {position}: {message}")]
    Syntax { message: String, position: u64 },

    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: String },

    #[error("mismatched end tag: expected </{expected}>, found </{found}>")]
    MismatchedEndTag { expected: String, found: String },

    #[error("empty XML document: no root element found")]
    EmptyDocument,

    #[error("multiple root elements")]
    MultipleRoots,

    /// The bytes handed to the parser are not UTF-8.
    #[error("invalid UTF-8: {0}")]
    Encoding(String),

    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
