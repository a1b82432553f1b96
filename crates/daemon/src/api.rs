use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::services::ServeDir;

use serial_link::{LinkError, LinkHandle};

use crate::broker::Broker;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub link: LinkHandle,
    pub broker: Arc<Broker>,
}

#[derive(Serialize, Deserialize)]
pub struct SendCommand {
    pub number: String,
}

/// Forwards one opaque command payload to the device.
///
/// The link must be open; a closed link is a 503 and nothing is queued.
/// Success is reported only once the serial write has been acknowledged.
pub async fn send_command_handler(
    State(state): State<AppState>,
    Json(payload): Json<SendCommand>,
) -> impl IntoResponse {
    match state.link.send_command(payload.number.clone()).await {
        Ok(()) => {
            tracing::info!("sent command to device: {}", payload.number);
            (
                StatusCode::OK,
                Json(json!({ "message": format!("Sent command: {}", payload.number) })),
            )
        }
        Err(LinkError::NotConnected) => {
            tracing::warn!("command rejected: serial port not connected");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "Serial port not connected" })),
            )
        }
        Err(e) => {
            tracing::error!("command write failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to send command" })),
            )
        }
    }
}

pub async fn status_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "link": state.link.state(),
        "clients": state.broker.client_count(),
    }))
}

pub fn create_router(state: AppState, static_dir: &str) -> Router {
    Router::new()
        .route("/send", post(send_command_handler))
        .route("/api/status", get(status_handler))
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ClientRegistry;
    use axum::body::Body;
    use axum::http::{header, Request};
    use serial_link::{LinkConnector, LinkIo, LinkState, PortOpener};
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tower::ServiceExt;

    /// Never yields a port; the connector stays in the retry loop.
    struct NoPortOpener;

    #[async_trait::async_trait]
    impl PortOpener for NoPortOpener {
        async fn open(&self) -> Result<Box<dyn LinkIo>, LinkError> {
            Err(LinkError::OpenFailed {
                path: "test".to_string(),
                message: "device unavailable".to_string(),
            })
        }
    }

    /// Hands out a single pre-built port, failing afterwards.
    struct OnePortOpener {
        port: Mutex<Option<Box<dyn LinkIo>>>,
    }

    impl OnePortOpener {
        fn new(port: Box<dyn LinkIo>) -> Self {
            Self {
                port: Mutex::new(Some(port)),
            }
        }
    }

    #[async_trait::async_trait]
    impl PortOpener for OnePortOpener {
        async fn open(&self) -> Result<Box<dyn LinkIo>, LinkError> {
            self.port
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| LinkError::OpenFailed {
                    path: "test".to_string(),
                    message: "device unavailable".to_string(),
                })
        }
    }

    /// Port whose reads pend forever and whose writes always fail.
    struct BrokenWritePort;

    impl tokio::io::AsyncRead for BrokenWritePort {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Pending
        }
    }

    impl tokio::io::AsyncWrite for BrokenWritePort {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<Result<usize, std::io::Error>> {
            Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "write refused",
            )))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn test_state(opener: Arc<dyn PortOpener>) -> AppState {
        let (event_tx, event_rx) = flume::bounded(16);
        let (connector, link) = LinkConnector::new(opener, event_tx, Duration::from_secs(5));
        tokio::spawn(connector.run());
        let broker = Arc::new(Broker::new(Arc::new(ClientRegistry::new())));
        tokio::spawn(broker.clone().run(event_rx));
        AppState { link, broker }
    }

    fn send_request(number: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/send")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(format!(r#"{{"number":"{number}"}}"#)))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn send_while_disconnected_is_rejected_with_503() {
        let state = test_state(Arc::new(NoPortOpener));
        let app = create_router(state, "static");

        let response = app.oneshot(send_request("1")).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            json_body(response).await["error"],
            "Serial port not connected"
        );
    }

    #[tokio::test]
    async fn send_while_open_writes_the_raw_payload() {
        use tokio::io::AsyncReadExt;

        let (mut device, port) = tokio::io::duplex(64);
        let state = test_state(Arc::new(OnePortOpener::new(Box::new(port))));
        let mut state_rx = state.link.state_rx();
        state_rx.wait_for(|s| *s == LinkState::Open).await.unwrap();

        let app = create_router(state, "static");
        let response = app.oneshot(send_request("42")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["message"], "Sent command: 42");

        // raw payload on the wire, no newline appended
        let mut buf = [0u8; 8];
        let n = device.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"42");
    }

    #[tokio::test]
    async fn failed_write_is_surfaced_as_500() {
        let state = test_state(Arc::new(OnePortOpener::new(Box::new(BrokenWritePort))));
        let mut state_rx = state.link.state_rx();
        state_rx.wait_for(|s| *s == LinkState::Open).await.unwrap();

        let app = create_router(state, "static");
        let response = app.oneshot(send_request("9")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["error"], "Failed to send command");
    }

    #[tokio::test]
    async fn status_reports_link_state_and_client_count() {
        let state = test_state(Arc::new(NoPortOpener));
        let app = create_router(state, "static");

        let request = Request::builder()
            .method("GET")
            .uri("/api/status")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["clients"], 0);
        assert!(body["link"].is_string());
    }
}
