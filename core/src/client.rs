//! The query client contract and its remote implementation.
//!
//! # Design
//! `RemoteQueryClient` carries no mutable state. The round trip is split
//! into `build_get_template_result`, which produces an `HttpRequest`, and
//! `parse_get_template_result`, which consumes an `HttpResponse`. Both are
//! public so the wire contract can be exercised without a server;
//! `fetch_template_result` glues them together through the `Transport`.

use tracing::{debug, trace};

use crate::config::{Credentials, EndpointConfig};
use crate::envelope::{self, GET_TEMPLATE_RESULT_AS_XML};
use crate::error::{QueryError, TransportError};
use crate::http::{HttpRequest, HttpResponse, Transport, UreqTransport};
use crate::xml::{self, Element};

/// Identifier of a query template on the server. Not validated locally.
pub type TemplateId = i64;

/// Fetches the result document of a query template.
///
/// Implementations never return an empty or default document in place of
/// an error.
pub trait QueryClient {
    fn fetch_template_result(&self, template: TemplateId) -> Result<Element, QueryError>;
}

/// Client for a live query engine service.
#[derive(Debug, Clone)]
pub struct RemoteQueryClient<T = UreqTransport> {
    credentials: Credentials,
    endpoint: EndpointConfig,
    transport: T,
}

impl RemoteQueryClient<UreqTransport> {
    pub fn new(credentials: Credentials, endpoint: EndpointConfig) -> Self {
        Self::with_transport(credentials, endpoint, UreqTransport)
    }
}

impl<T: Transport> RemoteQueryClient<T> {
    pub fn with_transport(credentials: Credentials, endpoint: EndpointConfig, transport: T) -> Self {
        Self {
            credentials,
            endpoint,
            transport,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    pub fn build_get_template_result(&self, template: TemplateId) -> Result<HttpRequest, QueryError> {
        Ok(HttpRequest {
            url: self.endpoint.service_url.clone(),
            headers: envelope::request_headers(GET_TEMPLATE_RESULT_AS_XML),
            body: envelope::template_request_body(&self.credentials, template)?,
            timeout: Some(self.endpoint.timeout()),
        })
    }

    /// Unwrap the response envelope and parse the embedded result document.
    ///
    /// The status is checked before any XML is looked at.
    pub fn parse_get_template_result(&self, response: HttpResponse) -> Result<Element, QueryError> {
        check_status(&response)?;
        let envelope = xml::parse_bytes(&response.body)?;
        let payload = envelope::locate_payload(&envelope)?;
        let text = envelope::payload_text(payload)?;
        trace!(element = %payload.qualified_name(), bytes = text.len(), "located result payload");
        Ok(xml::parse(text)?)
    }
}

impl<T: Transport> QueryClient for RemoteQueryClient<T> {
    fn fetch_template_result(&self, template: TemplateId) -> Result<Element, QueryError> {
        let request = self.build_get_template_result(template)?;
        debug!(
            url = %request.url,
            template,
            timeout_secs = self.endpoint.timeout_secs,
            "requesting template result"
        );
        let response = self.transport.execute(&request)?;
        debug!(status = response.status, bytes = response.body.len(), "received response");
        self.parse_get_template_result(response)
    }
}

/// Any non-2xx status is a transport failure.
fn check_status(response: &HttpResponse) -> Result<(), TransportError> {
    if response.is_success() {
        return Ok(());
    }
    Err(TransportError::Status {
        status: response.status,
        body: String::from_utf8_lossy(&response.body).into_owned(),
    })
}
