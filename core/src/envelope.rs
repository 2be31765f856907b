//! SOAP envelope codec for the query engine's `GetTemplateResultAsXML` action.
//!
//! The request side writes the envelope with quick-xml's `Writer`. The
//! response side locates the element that carries the escaped result
//! document: the service nests it as
//! `Envelope / Body / <Action>Response / <Action>Result / [1]`.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::client::TemplateId;
use crate::config::Credentials;
use crate::error::{ProtocolError, QueryError};
use crate::xml::Element;

pub const ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const ENVELOPE_PREFIX: &str = "soapenv";
pub const SERVICE_NS: &str = "http://services.agresso.com/QueryEngineService/QueryEngineV201101";
pub const SERVICE_PREFIX: &str = "quer";

/// Prefix of every `SOAPAction` header value; the action name is appended.
pub const ACTION_BASE_URI: &str =
    "https://services.agresso.com/QueryEngineService/QueryEngineV201101/";
pub const GET_TEMPLATE_RESULT_AS_XML: &str = "GetTemplateResultAsXML";

pub const CONTENT_TYPE: &str = "text/xml;charset=UTF-8";
/// Advertised as the service expects. `UreqTransport` decodes gzip bodies
/// only; a `deflate` answer reaches the XML parser still compressed.
pub const ACCEPT_ENCODING: &str = "gzip,deflate";

/// Child positions, counted in elements, from the response root to the
/// element holding the result text.
pub const RESULT_PATH: [usize; 4] = [0, 0, 0, 1];

pub fn soap_action(action: &str) -> String {
    format!("{ACTION_BASE_URI}{action}")
}

/// Headers sent with every request for `action`.
pub fn request_headers(action: &str) -> Vec<(String, String)> {
    vec![
        ("Content-Type".to_string(), CONTENT_TYPE.to_string()),
        ("Accept-Encoding".to_string(), ACCEPT_ENCODING.to_string()),
        ("SOAPAction".to_string(), soap_action(action)),
    ]
}

/// Envelope asking for the result of `template`.
///
/// Credential values are XML-escaped and otherwise sent as given.
pub fn template_request_body(
    credentials: &Credentials,
    template: TemplateId,
) -> Result<String, QueryError> {
    let envelope = format!("{ENVELOPE_PREFIX}:Envelope");
    let header = format!("{ENVELOPE_PREFIX}:Header");
    let body = format!("{ENVELOPE_PREFIX}:Body");
    let action = service_name(GET_TEMPLATE_RESULT_AS_XML);
    let env_xmlns = format!("xmlns:{ENVELOPE_PREFIX}");
    let service_xmlns = format!("xmlns:{SERVICE_PREFIX}");

    let mut out = EnvelopeWriter::new();
    out.start(
        &envelope,
        &[(env_xmlns.as_str(), ENVELOPE_NS), (service_xmlns.as_str(), SERVICE_NS)],
    )?;
    out.empty(&header)?;
    out.start(&body, &[])?;
    out.start(&action, &[])?;

    out.start(&service_name("credentials"), &[])?;
    out.text_element(&service_name("Username"), &credentials.username)?;
    out.text_element(&service_name("Client"), &credentials.client)?;
    out.text_element(&service_name("Password"), &credentials.password)?;
    out.end(&service_name("credentials"))?;

    out.start(&service_name("input"), &[])?;
    out.text_element(&service_name("TemplateId"), &template.to_string())?;
    out.end(&service_name("input"))?;

    out.end(&action)?;
    out.end(&body)?;
    out.end(&envelope)?;
    out.finish()
}

fn service_name(local: &str) -> String {
    format!("{SERVICE_PREFIX}:{local}")
}

struct EnvelopeWriter {
    writer: Writer<Vec<u8>>,
}

impl EnvelopeWriter {
    fn new() -> Self {
        Self {
            writer: Writer::new(Vec::new()),
        }
    }

    fn write(&mut self, event: Event<'_>) -> Result<(), QueryError> {
        self.writer
            .write_event(event)
            .map_err(|e| QueryError::Serialization(e.to_string()))
    }

    fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), QueryError> {
        let start = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.write(Event::Start(start))
    }

    fn empty(&mut self, name: &str) -> Result<(), QueryError> {
        self.write(Event::Empty(BytesStart::new(name)))
    }

    fn end(&mut self, name: &str) -> Result<(), QueryError> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<(), QueryError> {
        self.start(name, &[])?;
        self.write(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn finish(self) -> Result<String, QueryError> {
        String::from_utf8(self.writer.into_inner())
            .map_err(|e| QueryError::Serialization(e.to_string()))
    }
}

/// Walk [`RESULT_PATH`] from the response root to the payload element.
///
/// Each step fails with the step number, the missing index and the name of
/// the element that was searched.
pub fn locate_payload(response: &Element) -> Result<&Element, ProtocolError> {
    let mut current = response;
    for (step, &index) in RESULT_PATH.iter().enumerate() {
        current = current
            .child(index)
            .ok_or_else(|| ProtocolError::MissingElement {
                step: step + 1,
                index,
                parent: current.qualified_name(),
            })?;
    }
    Ok(current)
}

/// The escaped result document carried by the payload element.
pub fn payload_text(payload: &Element) -> Result<&str, ProtocolError> {
    payload.text().ok_or_else(|| ProtocolError::MissingText {
        element: payload.qualified_name(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml;

    fn credentials() -> Credentials {
        Credentials::new("alice", "s3cret", "EN")
    }

    #[test]
    fn soap_action_appends_action_name() {
        assert_eq!(
            soap_action(GET_TEMPLATE_RESULT_AS_XML),
            "https://services.agresso.com/QueryEngineService/QueryEngineV201101/GetTemplateResultAsXML"
        );
    }

    #[test]
    fn headers_are_fixed_and_ordered() {
        let headers = request_headers(GET_TEMPLATE_RESULT_AS_XML);
        let names: Vec<&str> = headers.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, ["Content-Type", "Accept-Encoding", "SOAPAction"]);
        assert_eq!(headers[0].1, "text/xml;charset=UTF-8");
        assert_eq!(headers[1].1, "gzip,deflate");
    }

    #[test]
    fn request_body_has_expected_layout() {
        let body = template_request_body(&credentials(), 1234).unwrap();
        assert!(body.starts_with(
            r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:quer="http://services.agresso.com/QueryEngineService/QueryEngineV201101">"#
        ));
        assert!(body.contains("<soapenv:Header/><soapenv:Body><quer:GetTemplateResultAsXML><quer:credentials>"));
        assert!(body.contains(
            "<quer:Username>alice</quer:Username><quer:Client>EN</quer:Client><quer:Password>s3cret</quer:Password>"
        ));
        assert!(body.contains("<quer:input><quer:TemplateId>1234</quer:TemplateId></quer:input>"));
        assert!(body.ends_with("</quer:GetTemplateResultAsXML></soapenv:Body></soapenv:Envelope>"));
    }

    #[test]
    fn request_body_parses_back() {
        let body = template_request_body(&credentials(), -7).unwrap();
        let root = xml::parse(&body).unwrap();
        assert_eq!(root.qualified_name(), "soapenv:Envelope");
        assert_eq!(root.attribute("xmlns:quer"), Some(SERVICE_NS));
        let header = root.child(0).unwrap();
        assert_eq!(header.name(), "Header");
        assert!(header.nodes().is_empty());
        let action = root.find("Body").unwrap().find(GET_TEMPLATE_RESULT_AS_XML).unwrap();
        let input = action.find("input").unwrap();
        assert_eq!(input.find("TemplateId").unwrap().text(), Some("-7"));
    }

    #[test]
    fn credentials_are_escaped() {
        let creds = Credentials::new("a<b", "p&w\"d", "EN");
        let body = template_request_body(&creds, 1).unwrap();
        assert!(body.contains("a&lt;b"));
        let root = xml::parse(&body).unwrap();
        let block = root.child(1).unwrap().child(0).unwrap().find("credentials").unwrap();
        assert_eq!(block.find("Username").unwrap().text(), Some("a<b"));
        assert_eq!(block.find("Password").unwrap().text(), Some("p&w\"d"));
    }

    #[test]
    fn locates_second_child_of_result() {
        let response = xml::parse(
            "<Envelope><Body><Resp><Result><ReturnCode>0</ReturnCode><Payload>data</Payload></Result></Resp></Body></Envelope>",
        )
        .unwrap();
        let payload = locate_payload(&response).unwrap();
        assert_eq!(payload.name(), "Payload");
        assert_eq!(payload_text(payload), Ok("data"));
    }

    #[test]
    fn shallow_response_reports_failing_step() {
        let response = xml::parse("<s:Envelope><s:Body><Resp/></s:Body></s:Envelope>").unwrap();
        assert_eq!(
            locate_payload(&response),
            Err(ProtocolError::MissingElement {
                step: 3,
                index: 0,
                parent: "Resp".to_string(),
            })
        );
    }

    #[test]
    fn result_with_single_child_is_missing_payload() {
        let response =
            xml::parse("<E><B><R><Result><ReturnCode>0</ReturnCode></Result></R></B></E>").unwrap();
        let err = locate_payload(&response).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingElement { step: 4, index: 1, .. }));
    }

    #[test]
    fn empty_payload_has_no_text() {
        let payload = xml::parse("<TemplateResult/>").unwrap();
        assert_eq!(
            payload_text(&payload),
            Err(ProtocolError::MissingText {
                element: "TemplateResult".to_string()
            })
        );
    }
}
