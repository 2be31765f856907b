//! Synchronous client for the Agresso query engine service.
//!
//! # Overview
//! Fetches the result of a server-side query template and hands it back as
//! an owned XML element tree. Two implementations sit behind the
//! [`QueryClient`] trait: [`RemoteQueryClient`] talks SOAP over HTTP, and
//! [`StubQueryClient`] serves pre-captured results from local files.
//!
//! # Design
//! - `RemoteQueryClient` is immutable after construction. It holds the
//!   credentials, the endpoint and a [`Transport`].
//! - The remote round trip is split into `build_*` (produces an
//!   [`HttpRequest`]) and `parse_*` (consumes an [`HttpResponse`]) so the
//!   wire contract can be tested without a network.
//! - The nested response envelope is unwrapped by one named traversal,
//!   [`envelope::locate_payload`], so a schema change fails in one place.

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod http;
pub mod stub;
pub mod xml;

pub use client::{QueryClient, RemoteQueryClient, TemplateId};
pub use config::{Credentials, EndpointConfig};
pub use error::{ParseError, ProtocolError, QueryError, TransportError};
pub use http::{HttpRequest, HttpResponse, Transport, UreqTransport};
pub use stub::StubQueryClient;
pub use xml::{Element, Node};
