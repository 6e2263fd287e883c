use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, COOKIE, SET_COOKIE};
use serde::Deserialize;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::COOKIE as WS_COOKIE;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector};
use tracing::{debug, info};
use url::Url;

use crate::domain::errors::GatewayError;
use crate::domain::ports::{FeedConnector, FeedStream};
use crate::domain::value_objects::FeedSource;

const LOGIN_PATH: &str = "/api/auth/login";
const LOGIN_STATUS_PATH: &str = "/api/miot/login_status";
const VIDEO_STREAM_PATH: &str = "/api/miot/ws/video_stream";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    id: Option<serde_json::Value>,
}

/// Miloco gateway client: cookie login over HTTP, video over WebSocket
pub struct MilocoGateway {
    http: reqwest::Client,
    tls: Option<native_tls::TlsConnector>,
}

impl MilocoGateway {
    /// Gateways usually serve self-signed certificates, so verification is opt-in.
    pub fn new(verify_tls: bool) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let tls = if verify_tls {
            None
        } else {
            let connector = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
                .map_err(|e| GatewayError::Tls(e.to_string()))?;
            Some(connector)
        };

        Ok(Self { http, tls })
    }

    /// WebSocket URL of the camera's video stream (`wss` for https gateways).
    pub fn stream_url(source: &FeedSource) -> Result<Url, GatewayError> {
        let gateway = source.gateway();
        let authority = gateway
            .base_url()
            .split_once("://")
            .map(|(_, rest)| rest)
            .ok_or_else(|| GatewayError::StreamUrl(gateway.base_url().to_string()))?;
        let scheme = if gateway.is_tls() { "wss" } else { "ws" };

        let stream = source.stream();
        let channel = stream.channel.to_string();
        let quality = stream.video_quality.to_string();

        Url::parse_with_params(
            &format!("{}://{}{}", scheme, authority, VIDEO_STREAM_PATH),
            &[
                ("camera_id", source.camera_id()),
                ("channel", channel.as_str()),
                ("video_quality", quality.as_str()),
            ],
        )
        .map_err(|e| GatewayError::StreamUrl(e.to_string()))
    }

    /// Log in and confirm the session. Returns the `Cookie` header value.
    async fn login(&self, source: &FeedSource) -> Result<String, GatewayError> {
        let gateway = source.gateway();
        let payload = serde_json::json!({
            "username": gateway.username(),
            "password": source.credential().expose(),
        });

        let response = self
            .http
            .post(format!("{}{}", gateway.base_url(), LOGIN_PATH))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::LoginRejected {
                status: status.as_u16(),
                body,
            });
        }

        let cookies = session_cookies(response.headers());
        let login: LoginResponse = response.json().await?;
        info!(
            camera = %source.camera_id(),
            user_id = ?login.id,
            "Gateway login successful"
        );

        let mut status_request = self
            .http
            .get(format!("{}{}", gateway.base_url(), LOGIN_STATUS_PATH));
        if !cookies.is_empty() {
            status_request = status_request.header(COOKIE, cookies.as_str());
        }
        let status = status_request.send().await?.status();
        if !status.is_success() {
            return Err(GatewayError::LoginStatus(status.as_u16()));
        }

        Ok(cookies)
    }
}

#[async_trait]
impl FeedConnector for MilocoGateway {
    async fn connect(&self, source: &FeedSource) -> Result<FeedStream, GatewayError> {
        let cookies = self.login(source).await?;
        let url = Self::stream_url(source)?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| GatewayError::StreamUrl(e.to_string()))?;
        if !cookies.is_empty() {
            let value = HeaderValue::from_str(&cookies)
                .map_err(|e| GatewayError::Stream(format!("invalid session cookie: {}", e)))?;
            request.headers_mut().insert(WS_COOKIE, value);
        }

        info!(camera = %source.camera_id(), url = %url, "Connecting to gateway video stream");
        let connector = self.tls.clone().map(Connector::NativeTls);
        let (ws, _) = connect_async_tls_with_config(request, None, false, connector)
            .await
            .map_err(|e| GatewayError::Stream(e.to_string()))?;

        let frames = ws
            .take_while(|message| {
                futures::future::ready(!matches!(message, Ok(Message::Close(_))))
            })
            .filter_map(|message| async move {
                match message {
                    Ok(Message::Binary(data)) => Some(Ok(data.to_vec())),
                    Ok(other) => {
                        debug!("Ignoring non-binary gateway message: {:?}", other);
                        None
                    }
                    Err(e) => Some(Err(GatewayError::Stream(e.to_string()))),
                }
            });

        Ok(frames.boxed())
    }
}

/// `name=value` pairs from every `Set-Cookie` header, joined for a `Cookie` header.
fn session_cookies(headers: &HeaderMap) -> String {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}
