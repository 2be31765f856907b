use mock_server::{MockState, SERVICE_PATH};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEMO_RESULT: &str = "<Agresso><AgressoQE><account>1910</account><amount>1250.00</amount></AgressoQE></Agresso>";

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");
    let state = MockState::new("demo", "demo", "EN").with_template(1, DEMO_RESULT);

    let listener = TcpListener::bind(&addr).await?;
    info!("listening on http://{addr}{SERVICE_PATH}");
    mock_server::run(listener, state).await
}
