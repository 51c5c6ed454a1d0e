//! Inbound HTTP adapters.
//!
//! `POST /sms` is the gateway webhook and answers through the outbound
//! channel; it must carry a valid Twilio request signature. `POST /messages`
//! takes the same form and returns the reply in the response body; it must
//! carry the shared inbound key in the `x-api-key` header.

use crate::channel::ChannelSender;
use crate::signature;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use recall_conversation::{CommandRouter, InboundError, InboundMessage};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, info_span, warn};

/// Reply sent when a turn fails.
pub const APOLOGY_REPLY: &str =
    "Sorry, I ran into a problem handling that message. Please try again in a moment.";

const API_KEY_HEADER: &str = "x-api-key";

/// Shared state for the inbound routes.
#[derive(Clone)]
pub struct AppState {
    router: Arc<CommandRouter>,
    channel: Arc<dyn ChannelSender>,
    inbound_key: Arc<str>,
    auth_token: Arc<str>,
}

impl AppState {
    /// Creates the state.
    ///
    /// `inbound_key` guards `/messages`; `auth_token` is the Twilio auth
    /// token used to check `/sms` signatures.
    #[must_use]
    pub fn new(
        router: Arc<CommandRouter>,
        channel: Arc<dyn ChannelSender>,
        inbound_key: impl Into<Arc<str>>,
        auth_token: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            router,
            channel,
            inbound_key: inbound_key.into(),
            auth_token: auth_token.into(),
        }
    }
}

/// Builds the HTTP application.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sms", post(sms))
        .route("/messages", post(messages))
        .layer(
            // Path only: query strings may carry credentials.
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path()
                )
            }),
        )
        .with_state(state)
}

/// Rejection for requests that never reach the core.
struct Rejection(InboundError);

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let status = match self.0 {
            InboundError::Validation { .. } => StatusCode::BAD_REQUEST,
            InboundError::Authentication => StatusCode::FORBIDDEN,
        };
        (status, self.0.to_string()).into_response()
    }
}

impl From<InboundError> for Rejection {
    fn from(err: InboundError) -> Self {
        Self(err)
    }
}

fn authenticate_key(state: &AppState, headers: &HeaderMap) -> Result<(), InboundError> {
    let presented = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !presented.is_empty()
        && constant_time_eq::constant_time_eq(presented.as_bytes(), state.inbound_key.as_bytes())
    {
        Ok(())
    } else {
        Err(InboundError::Authentication)
    }
}

fn authenticate_signature(
    state: &AppState,
    headers: &HeaderMap,
    uri: &Uri,
    form: &HashMap<String, String>,
) -> Result<(), InboundError> {
    let presented = headers
        .get(signature::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let url = signature::public_url(headers, uri);

    match (presented, url) {
        (Some(presented), Some(url))
            if signature::verify(&state.auth_token, &url, form, presented) =>
        {
            Ok(())
        }
        (presented, _) => {
            warn!(signed = presented.is_some(), "rejected unsigned or mis-signed webhook");
            Err(InboundError::Authentication)
        }
    }
}

/// Reads the gateway's form fields into an inbound message.
fn parse_form(form: &HashMap<String, String>) -> Result<InboundMessage, InboundError> {
    let message = InboundMessage::from_parts(
        form.get("Body").map(String::as_str),
        form.get("From").map(String::as_str),
        form.get("To").map(String::as_str),
    )?;

    let count: usize = match form.get("NumMedia").map(|n| n.trim()) {
        None | Some("") => 0,
        Some(n) => n.parse().map_err(|_| InboundError::Validation {
            reason: format!("NumMedia is not a number: '{n}'"),
        })?,
    };
    let media = (0..count).filter_map(|i| form.get(&format!("MediaUrl{i}")).cloned());
    Ok(message.with_media(media))
}

/// Runs one message through the router, turning failures into an apology.
async fn respond(state: &AppState, message: &InboundMessage) -> Option<String> {
    match state.router.handle(message).await {
        Ok(reply) => reply,
        Err(report) => {
            error!(
                agent = %message.to,
                user = %message.from,
                error = %report,
                "turn failed"
            );
            Some(APOLOGY_REPLY.to_string())
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn sms(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Result<StatusCode, Rejection> {
    authenticate_signature(&state, &headers, &uri, &form)?;
    let message = parse_form(&form)?;
    info!(agent = %message.to, user = %message.from, media = message.media_urls.len(), "inbound sms");
    debug!(body = %message.body, "inbound body");

    if let Some(reply) = respond(&state, &message).await {
        if let Err(e) = state.channel.send(&message.to, &message.from, &reply).await {
            error!(agent = %message.to, user = %message.from, error = %e, "failed to send reply");
        }
    }
    Ok(StatusCode::OK)
}

async fn messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Result<String, Rejection> {
    authenticate_key(&state, &headers)?;
    let message = parse_form(&form)?;
    info!(agent = %message.to, user = %message.from, "inbound message");

    Ok(respond(&state, &message).await.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelError;
    use async_trait::async_trait;
    use recall_conversation::{
        ChatError, ChatHandler, CommandConfig, InMemorySessionRegistry, Session,
    };
    use recall_core::{AgentAddress, UserAddress};
    use rootcause::prelude::Report;
    use std::io;
    use tokio::sync::Mutex;
    use tower::ServiceExt;
    use tracing_subscriber::layer::SubscriberExt;

    const KEY: &str = "inbound-secret";
    const AUTH_TOKEN: &str = "twilio-token";
    const HOST: &str = "recall.example.com";

    struct EchoChat;

    #[async_trait]
    impl ChatHandler for EchoChat {
        async fn chat(
            &self,
            message: &InboundMessage,
            _session: &Session,
        ) -> Result<String, Report<ChatError>> {
            if message.body == "fail" {
                return Err(ChatError::Upstream {
                    reason: "model unavailable".to_string(),
                }
                .into());
            }
            Ok(format!("echo: {} ({} media)", message.body, message.media_urls.len()))
        }
    }

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl ChannelSender for RecordingSender {
        async fn send(
            &self,
            from: &AgentAddress,
            to: &UserAddress,
            body: &str,
        ) -> Result<(), ChannelError> {
            self.sent
                .lock()
                .await
                .push((from.to_string(), to.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn state(sender: Arc<RecordingSender>) -> AppState {
        let router = CommandRouter::new(
            Arc::new(InMemorySessionRegistry::new()),
            Arc::new(EchoChat),
            CommandConfig::default(),
        );
        AppState::new(Arc::new(router), sender, KEY, AUTH_TOKEN)
    }

    fn form_request(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .header(API_KEY_HEADER, KEY)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn encode(value: &str) -> String {
        value
            .replace('%', "%25")
            .replace('&', "%26")
            .replace('=', "%3D")
            .replace('+', "%2B")
            .replace(' ', "+")
    }

    /// Builds a gateway webhook signed the way Twilio signs it.
    fn signed_sms(uri: &str, fields: &[(&str, &str)]) -> Request<Body> {
        let params: HashMap<String, String> = fields
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let signature = signature::sign(AUTH_TOKEN, &format!("https://{HOST}{uri}"), &params);
        let body = fields
            .iter()
            .map(|(k, v)| format!("{k}={}", encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        Request::builder()
            .method("POST")
            .uri(uri)
            .header("host", HOST)
            .header("content-type", "application/x-www-form-urlencoded")
            .header(signature::SIGNATURE_HEADER, signature)
            .body(Body::from(body))
            .unwrap()
    }

    fn sms_fields(body: &str) -> [(&str, &str); 3] {
        [("Body", body), ("From", "+15551111111"), ("To", "+15550000000")]
    }

    /// Shared sink for formatted log output.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    const FROM_TO: &str = "From=%2B15551111111&To=%2B15550000000";

    #[tokio::test]
    async fn health_is_ok() {
        let app = app(state(Arc::new(RecordingSender::default())));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ok");
    }

    #[tokio::test]
    async fn missing_key_is_forbidden() {
        let app = app(state(Arc::new(RecordingSender::default())));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/messages")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from(format!("Body=hi&{FROM_TO}")))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn key_in_query_string_is_not_accepted() {
        let app = app(state(Arc::new(RecordingSender::default())));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/messages?key={KEY}"))
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from(format!("Body=hello+recall&{FROM_TO}")))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn wrong_key_is_forbidden() {
        let app = app(state(Arc::new(RecordingSender::default())));
        let mut request = form_request("/messages", &format!("Body=hi&{FROM_TO}"));
        request
            .headers_mut()
            .insert(API_KEY_HEADER, "inbound-secreX".parse().unwrap());

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn missing_sender_is_bad_request() {
        let app = app(state(Arc::new(RecordingSender::default())));
        let response = app
            .oneshot(form_request("/messages", "Body=hi&To=%2B15550000000"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn message_without_session_gets_empty_body() {
        let app = app(state(Arc::new(RecordingSender::default())));
        let response = app
            .oneshot(form_request("/messages", &format!("Body=remember+milk&{FROM_TO}")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "");
    }

    #[tokio::test]
    async fn session_turn_includes_media() {
        let app = app(state(Arc::new(RecordingSender::default())));

        app.clone()
            .oneshot(form_request("/messages", &format!("Body=hello+recall&{FROM_TO}")))
            .await
            .unwrap();
        let response = app
            .oneshot(form_request(
                "/messages",
                &format!(
                    "Body=look&{FROM_TO}&NumMedia=2&MediaUrl0=https%3A%2F%2Fm%2F0&MediaUrl1=https%3A%2F%2Fm%2F1"
                ),
            ))
            .await
            .unwrap();

        assert_eq!(body_text(response).await, "echo: look (2 media)");
    }

    #[tokio::test]
    async fn failed_turn_gets_apology() {
        let app = app(state(Arc::new(RecordingSender::default())));

        app.clone()
            .oneshot(form_request("/messages", &format!("Body=hello+recall&{FROM_TO}")))
            .await
            .unwrap();
        let response = app
            .oneshot(form_request("/messages", &format!("Body=fail&{FROM_TO}")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, APOLOGY_REPLY);
    }

    #[tokio::test]
    async fn sms_reply_goes_through_channel() {
        let sender = Arc::new(RecordingSender::default());
        let app = app(state(Arc::clone(&sender)));

        let response = app
            .oneshot(signed_sms("/sms", &sms_fields("hello recall")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "");

        let sent = sender.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "+15550000000");
        assert_eq!(sent[0].1, "+15551111111");
        assert!(sent[0].2.starts_with("Welcome!"));
    }

    #[tokio::test]
    async fn gated_sms_sends_nothing() {
        let sender = Arc::new(RecordingSender::default());
        let app = app(state(Arc::clone(&sender)));

        let response = app
            .oneshot(signed_sms("/sms", &sms_fields("hi")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(sender.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn sms_without_signature_is_forbidden() {
        let sender = Arc::new(RecordingSender::default());
        let app = app(state(Arc::clone(&sender)));

        // The inbound key does not stand in for a signature.
        let response = app
            .oneshot(form_request("/sms", &format!("Body=hello+recall&{FROM_TO}")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(sender.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn sms_with_altered_body_is_forbidden() {
        let sender = Arc::new(RecordingSender::default());
        let app = app(state(Arc::clone(&sender)));

        let mut request = signed_sms("/sms", &sms_fields("hello recall"));
        *request.body_mut() = Body::from(format!("Body=goodbye+recall&{FROM_TO}"));

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(sender.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn sms_signed_for_another_host_is_forbidden() {
        let app = app(state(Arc::new(RecordingSender::default())));

        let mut request = signed_sms("/sms", &sms_fields("hello recall"));
        request
            .headers_mut()
            .insert("x-forwarded-host", "attacker.example.com".parse().unwrap());

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn credentials_in_query_string_stay_out_of_logs() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new("debug"))
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(move || writer.clone()),
            );
        let _guard = tracing::subscriber::set_default(subscriber);

        let app = app(state(Arc::new(RecordingSender::default())));
        let sms_uri = format!("/sms?key={KEY}");
        let response = app
            .clone()
            .oneshot(signed_sms(&sms_uri, &sms_fields("hello recall")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(form_request(
                &format!("/messages?key={KEY}"),
                &format!("Body=hi&{FROM_TO}"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let output = logs.contents();
        assert!(output.contains("inbound sms"));
        assert!(output.contains("path=/sms"));
        assert!(output.contains("path=/messages"));
        assert!(!output.contains(KEY));
        assert!(!output.contains(AUTH_TOKEN));
    }

    #[test]
    fn non_numeric_media_count_is_invalid() {
        let form: HashMap<String, String> = [
            ("From", "+15551111111"),
            ("To", "+15550000000"),
            ("NumMedia", "two"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        assert!(matches!(
            parse_form(&form),
            Err(InboundError::Validation { .. })
        ));
    }
}
