use std::time::Duration;

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::info;

use super::config::RealtimeSettings;
use super::messages::ClientEvent;
use crate::config::SecretString;
use crate::core::bridge::BridgeError;
use crate::core::tools::ToolDefinition;

pub type RealtimeStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens AI-leg WebSockets. One connection per call.
#[derive(Debug, Clone)]
pub struct RealtimeConnector {
    settings: RealtimeSettings,
    api_key: SecretString,
}

impl RealtimeConnector {
    pub fn new(settings: RealtimeSettings, api_key: SecretString) -> Self {
        Self { settings, api_key }
    }

    pub fn settings(&self) -> &RealtimeSettings {
        &self.settings
    }

    /// Connect and complete the WebSocket handshake.
    pub async fn connect(&self) -> Result<RealtimeStream, BridgeError> {
        let url = self.settings.endpoint();
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| BridgeError::Connect(e.to_string()))?;

        let headers = request.headers_mut();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key.expose()))
            .map_err(|e| BridgeError::Connect(format!("invalid API key header: {e}")))?;
        headers.insert("Authorization", bearer);
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (stream, _response) =
            tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| BridgeError::Connect("connection timed out".to_string()))?
                .map_err(|e| BridgeError::Connect(e.to_string()))?;

        info!(model = %self.settings.model, "Connected to realtime AI");
        Ok(stream)
    }

    /// First event sent on a fresh AI leg.
    pub fn session_update(&self, tools: &[ToolDefinition]) -> ClientEvent {
        ClientEvent::SessionUpdate {
            session: self.settings.session_config(tools),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    #[tokio::test]
    async fn test_connect_sends_auth_headers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut seen = None;
            let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                seen = Some((
                    req.headers().get("authorization").cloned(),
                    req.headers().get("openai-beta").cloned(),
                    req.uri().query().map(str::to_string),
                ));
                Ok(resp)
            })
            .await
            .unwrap();
            drop(ws);
            seen.unwrap()
        });

        let connector = RealtimeConnector::new(
            RealtimeSettings {
                url: format!("ws://{addr}/v1/realtime"),
                ..Default::default()
            },
            SecretString::new("sk-test"),
        );
        let _stream = connector.connect().await.unwrap();

        let (auth, beta, query) = server.await.unwrap();
        assert_eq!(auth.unwrap(), "Bearer sk-test");
        assert_eq!(beta.unwrap(), "realtime=v1");
        assert_eq!(query.as_deref(), Some("model=gpt-4o-realtime-preview"));
    }

    #[tokio::test]
    async fn test_connect_refused_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = RealtimeConnector::new(
            RealtimeSettings {
                url: format!("ws://{addr}/v1/realtime"),
                ..Default::default()
            },
            SecretString::new("sk-test"),
        );
        assert!(matches!(
            connector.connect().await,
            Err(BridgeError::Connect(_))
        ));
    }
}
