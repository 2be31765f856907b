//! Properties of the generated request, over arbitrary inputs.

use proptest::prelude::*;
use query_engine_core::{xml, Credentials, EndpointConfig, RemoteQueryClient};

const SOAP_ACTION: &str =
    "https://services.agresso.com/QueryEngineService/QueryEngineV201101/GetTemplateResultAsXML";

fn client(username: &str, password: &str, client: &str) -> RemoteQueryClient {
    RemoteQueryClient::new(
        Credentials::new(username, password, client),
        EndpointConfig::new("http://localhost/service.svc"),
    )
}

/// Printable text, including the characters the envelope has to escape.
fn field() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 <>&'\"._@-]{0,24}"
}

proptest! {
    #[test]
    fn body_carries_one_template_id_and_ordered_credentials(
        username in field(),
        password in field(),
        client_id in field(),
        template in any::<i64>(),
    ) {
        let request = client(&username, &password, &client_id)
            .build_get_template_result(template)
            .unwrap();
        let root = xml::parse(&request.body).unwrap();
        let action = root.find("Body").unwrap().find("GetTemplateResultAsXML").unwrap();

        prop_assert_eq!(action.find_all("input").count(), 1);
        let ids: Vec<_> = action.find("input").unwrap().find_all("TemplateId").collect();
        prop_assert_eq!(ids.len(), 1);
        let expected_id = template.to_string();
        prop_assert_eq!(ids[0].text(), Some(expected_id.as_str()));

        prop_assert_eq!(action.find_all("credentials").count(), 1);
        let credentials = action.find("credentials").unwrap();
        let names: Vec<&str> = credentials.children().map(|e| e.name()).collect();
        prop_assert_eq!(names, vec!["Username", "Client", "Password"]);
        let values: Vec<&str> = credentials.children().map(|e| e.text().unwrap_or("")).collect();
        prop_assert_eq!(values, vec![username.as_str(), client_id.as_str(), password.as_str()]);
    }

    #[test]
    fn soap_action_ignores_template(template in any::<i64>()) {
        let request = client("u", "p", "c").build_get_template_result(template).unwrap();
        prop_assert_eq!(request.header("SOAPAction"), Some(SOAP_ACTION));
    }
}
