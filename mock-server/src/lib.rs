//! In-process stand-in for the Agresso query engine SOAP service.
//!
//! Serves `GetTemplateResultAsXML` on `POST /service.svc`. Template results
//! and the accepted credentials are fixed when the state is built. Every
//! failure is answered with a SOAP fault and status 500, as the real service
//! does.

use std::{collections::HashMap, io::Write, sync::Arc};

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use flate2::{write::GzEncoder, Compression};
use quick_xml::{escape::escape, events::Event, Reader};
use tokio::net::TcpListener;
use tracing::{info, warn};

pub const SERVICE_PATH: &str = "/service.svc";
pub const ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SERVICE_NS: &str = "http://services.agresso.com/QueryEngineService/QueryEngineV201101";
pub const GET_TEMPLATE_RESULT_ACTION: &str =
    "https://services.agresso.com/QueryEngineService/QueryEngineV201101/GetTemplateResultAsXML";

/// Accepted login and the result document of each known template.
#[derive(Clone, Debug, Default)]
pub struct MockState {
    pub username: String,
    pub password: String,
    pub client: String,
    pub templates: HashMap<i64, String>,
    /// Gzip successful responses when the request accepts it.
    pub gzip: bool,
}

impl MockState {
    pub fn new(username: &str, password: &str, client: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            client: client.to_string(),
            templates: HashMap::new(),
            gzip: false,
        }
    }

    /// Serve `result_xml` for `template`.
    pub fn with_template(mut self, template: i64, result_xml: &str) -> Self {
        self.templates.insert(template, result_xml.to_string());
        self
    }

    pub fn with_gzip(mut self) -> Self {
        self.gzip = true;
        self
    }
}

/// Fields of a `GetTemplateResultAsXML` request.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TemplateRequest {
    pub username: String,
    pub client: String,
    pub password: String,
    pub template: i64,
}

pub fn app(state: MockState) -> Router {
    Router::new()
        .route(SERVICE_PATH, post(query_engine))
        .with_state(Arc::new(state))
}

pub async fn run(listener: TcpListener, state: MockState) -> Result<(), std::io::Error> {
    axum::serve(listener, app(state)).await
}

async fn query_engine(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let action = headers
        .get("SOAPAction")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .trim_matches('"');
    if action != GET_TEMPLATE_RESULT_ACTION {
        warn!(action, "unsupported SOAP action");
        return fault("a:ActionNotSupported", &format!("unsupported action '{action}'"));
    }

    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(message) => {
            warn!(%message, "malformed request");
            return fault("s:Client", &message);
        }
    };

    if request.username != state.username
        || request.password != state.password
        || request.client != state.client
    {
        warn!(username = %request.username, client = %request.client, "rejected credentials");
        return fault("s:Client", "invalid credentials");
    }

    match state.templates.get(&request.template) {
        Some(result) => {
            info!(template = request.template, "serving template result");
            let body = result_envelope(result);
            if state.gzip && accepts_gzip(&headers) {
                match gzip(&body) {
                    Ok(compressed) => {
                        return (
                            StatusCode::OK,
                            [
                                (header::CONTENT_TYPE, "text/xml; charset=utf-8"),
                                (header::CONTENT_ENCODING, "gzip"),
                            ],
                            compressed,
                        )
                            .into_response()
                    }
                    Err(err) => warn!(%err, "gzip failed, answering uncompressed"),
                }
            }
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
                body,
            )
                .into_response()
        }
        None => {
            warn!(template = request.template, "unknown template");
            fault("s:Client", &format!("template {} not found", request.template))
        }
    }
}

/// Pull credentials and the template id out of a request envelope.
///
/// Elements are matched by local name; namespaces are not checked.
pub fn parse_request(body: &str) -> Result<TemplateRequest, String> {
    let mut reader = Reader::from_str(body);
    let mut current: Option<String> = None;
    let mut request = TemplateRequest::default();
    let mut template = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                current = Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|err| err.to_string())?;
                match current.as_deref() {
                    Some("Username") => request.username = text.into_owned(),
                    Some("Client") => request.client = text.into_owned(),
                    Some("Password") => request.password = text.into_owned(),
                    Some("TemplateId") => {
                        let id = text
                            .trim()
                            .parse::<i64>()
                            .map_err(|err| format!("invalid TemplateId: {err}"))?;
                        template = Some(id);
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(err.to_string()),
        }
    }

    request.template = template.ok_or_else(|| "missing TemplateId".to_string())?;
    Ok(request)
}

/// Success envelope; the result document travels escaped in the second
/// child of `GetTemplateResultAsXMLResult`.
pub fn result_envelope(result_xml: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <s:Envelope xmlns:s=\"{ENVELOPE_NS}\"><s:Body>\
         <GetTemplateResultAsXMLResponse xmlns=\"{SERVICE_NS}\">\
         <GetTemplateResultAsXMLResult>\
         <ReturnCode>0</ReturnCode>\
         <TemplateResult>{}</TemplateResult>\
         <Status>Success</Status>\
         </GetTemplateResultAsXMLResult>\
         </GetTemplateResultAsXMLResponse>\
         </s:Body></s:Envelope>",
        escape(result_xml)
    )
}

fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            value
                .split(',')
                .any(|coding| coding.trim().eq_ignore_ascii_case("gzip"))
        })
}

fn gzip(body: &str) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body.as_bytes())?;
    encoder.finish()
}

fn fault(code: &str, message: &str) -> Response {
    let body = format!(
        "<s:Envelope xmlns:s=\"{ENVELOPE_NS}\"><s:Body><s:Fault>\
         <faultcode>{code}</faultcode><faultstring>{}</faultstring>\
         </s:Fault></s:Body></s:Envelope>",
        escape(message)
    );
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
        body,
    )
        .into_response()
}
