//! Full-duplex realtime relay: a transparent passthrough between a browser
//! websocket and the upstream realtime speech API. The only frame the relay
//! ever originates is a single `session.update` sent upstream after the
//! upstream signals `session.created`; everything else is forwarded
//! unmodified and immediately in both directions. Either side closing or
//! erroring tears down both (linked lifetimes, no reconnect).

use crate::error::{CoachError, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{accept_async, connect_async};
use tokio_util::sync::CancellationToken;

const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview-2024-10-01";

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub upstream_url: String,
    pub voice: String,
    pub instructions: String,
    /// Server-side voice activity detection tuning
    pub vad_threshold: f32,
    pub vad_prefix_padding_ms: u32,
    pub vad_silence_duration_ms: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            upstream_url: format!(
                "wss://api.openai.com/v1/realtime?model={}",
                DEFAULT_REALTIME_MODEL
            ),
            voice: "alloy".to_string(),
            instructions: "You are an empathetic goal-setting coach conducting a voice \
                 conversation. Listen actively, ask thoughtful follow-up questions, and help \
                 the user explore what they want to achieve. Be warm, supportive, and \
                 professional, and keep your responses conversational and natural, as if \
                 speaking to someone in person."
                .to_string(),
            vad_threshold: 0.5,
            vad_prefix_padding_ms: 300,
            vad_silence_duration_ms: 1000,
        }
    }
}

impl RelayConfig {
    /// The one control frame the relay injects per connection
    pub fn session_update_frame(&self) -> String {
        json!({
            "type": "session.update",
            "session": {
                "modalities": ["text", "audio"],
                "instructions": self.instructions,
                "voice": self.voice,
                "input_audio_format": "pcm16",
                "output_audio_format": "pcm16",
                "input_audio_transcription": {
                    "model": "whisper-1"
                },
                "turn_detection": {
                    "type": "server_vad",
                    "threshold": self.vad_threshold,
                    "prefix_padding_ms": self.vad_prefix_padding_ms,
                    "silence_duration_ms": self.vad_silence_duration_ms
                },
                "temperature": 0.8,
                "max_response_output_tokens": "inf"
            }
        })
        .to_string()
    }
}

/// Per-connection relay state. `session_configured` makes the injection
/// idempotent even if the creation event recurs.
#[derive(Debug, Default)]
pub struct RelayState {
    session_configured: bool,
}

impl RelayState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect an upstream text frame; returns the `session.update` frame
    /// to send upstream exactly once, after `session.created`.
    pub fn inspect_upstream(&mut self, frame: &str, config: &RelayConfig) -> Option<String> {
        if self.session_configured {
            return None;
        }
        if frame_type(frame).as_deref() == Some("session.created") {
            self.session_configured = true;
            log::info!("Relay: upstream session created, configuring");
            return Some(config.session_update_frame());
        }
        None
    }
}

/// The `type` tag of a JSON frame, logged but never interpreted further
pub fn frame_type(frame: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(frame)
        .ok()?
        .get("type")?
        .as_str()
        .map(str::to_string)
}

pub struct RealtimeRelay {
    api_key: String,
    config: RelayConfig,
}

impl RealtimeRelay {
    pub fn new(api_key: String) -> Self {
        Self::with_config(api_key, RelayConfig::default())
    }

    pub fn with_config(api_key: String, config: RelayConfig) -> Self {
        Self { api_key, config }
    }

    /// Accept client connections until cancelled; each connection is
    /// relayed independently on its own task.
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        log::info!(
            "Relay: listening on {}",
            listener.local_addr().map_err(CoachError::Io)?
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    log::info!("Relay: shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer) = accepted.map_err(CoachError::Io)?;
                    log::info!("Relay: client connected from {}", peer);
                    let api_key = self.api_key.clone();
                    let config = self.config.clone();
                    tokio::spawn(async move {
                        if let Err(e) = relay_connection(stream, api_key, config).await {
                            log::error!("Relay: connection from {} ended with error: {}", peer, e);
                        } else {
                            log::info!("Relay: connection from {} closed", peer);
                        }
                    });
                }
            }
        }
    }
}

/// Relay one client connection against a fresh upstream connection.
/// Returning (for any reason) drops both sockets, which closes the peer.
async fn relay_connection(stream: TcpStream, api_key: String, config: RelayConfig) -> Result<()> {
    let client_ws = accept_async(stream).await?;

    let mut request = config.upstream_url.clone().into_client_request()?;
    let protocols = format!("openai-insecure-api-key.{}, realtime=v1", api_key);
    request.headers_mut().insert(
        "Sec-WebSocket-Protocol",
        HeaderValue::from_str(&protocols)
            .map_err(|e| CoachError::Connection(format!("Invalid protocol header: {}", e)))?,
    );

    let (upstream_ws, _) = connect_async(request).await?;
    log::debug!("Relay: upstream connected");

    let (mut client_tx, mut client_rx) = client_ws.split();
    let (mut upstream_tx, mut upstream_rx) = upstream_ws.split();
    let mut state = RelayState::new();

    loop {
        tokio::select! {
            upstream_msg = upstream_rx.next() => {
                match upstream_msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(kind) = frame_type(text.as_str()) {
                            log::debug!("Relay: upstream -> client: {}", kind);
                        }
                        if let Some(injection) = state.inspect_upstream(text.as_str(), &config) {
                            upstream_tx.send(Message::Text(injection.into())).await?;
                        }
                        client_tx.send(Message::Text(text)).await?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        log::info!("Relay: upstream closed: {:?}", frame);
                        let _ = client_tx.send(Message::Close(None)).await;
                        return Ok(());
                    }
                    Some(Ok(other)) => {
                        client_tx.send(other).await?;
                    }
                    Some(Err(e)) => {
                        let _ = client_tx.send(Message::Close(None)).await;
                        return Err(e.into());
                    }
                    None => {
                        let _ = client_tx.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }
            }
            client_msg = client_rx.next() => {
                match client_msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(kind) = frame_type(text.as_str()) {
                            log::debug!("Relay: client -> upstream: {}", kind);
                        }
                        upstream_tx.send(Message::Text(text)).await?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        log::info!("Relay: client closed: {:?}", frame);
                        let _ = upstream_tx.send(Message::Close(None)).await;
                        return Ok(());
                    }
                    Some(Ok(other)) => {
                        upstream_tx.send(other).await?;
                    }
                    Some(Err(e)) => {
                        let _ = upstream_tx.send(Message::Close(None)).await;
                        return Err(e.into());
                    }
                    None => {
                        let _ = upstream_tx.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injection_fires_once_on_session_created() {
        let config = RelayConfig::default();
        let mut state = RelayState::new();

        let created = r#"{"type":"session.created"}"#;
        let injection = state.inspect_upstream(created, &config);
        assert!(injection.is_some());

        // Idempotent even if the creation event recurs
        assert!(state.inspect_upstream(created, &config).is_none());
        assert!(state.inspect_upstream(created, &config).is_none());
    }

    #[test]
    fn test_other_frames_do_not_trigger_injection() {
        let config = RelayConfig::default();
        let mut state = RelayState::new();

        assert!(state
            .inspect_upstream(r#"{"type":"response.audio.delta"}"#, &config)
            .is_none());
        assert!(state.inspect_upstream("not json", &config).is_none());

        // Still armed for the real event
        assert!(state
            .inspect_upstream(r#"{"type":"session.created"}"#, &config)
            .is_some());
    }

    #[test]
    fn test_session_update_frame_shape() {
        let config = RelayConfig::default();
        let frame: serde_json::Value =
            serde_json::from_str(&config.session_update_frame()).unwrap();
        assert_eq!(frame["type"], "session.update");
        assert_eq!(frame["session"]["voice"], "alloy");
        assert_eq!(frame["session"]["input_audio_format"], "pcm16");
        assert_eq!(frame["session"]["turn_detection"]["type"], "server_vad");
        assert_eq!(frame["session"]["turn_detection"]["silence_duration_ms"], 1000);
        assert_eq!(frame["session"]["input_audio_transcription"]["model"], "whisper-1");
    }

    #[test]
    fn test_frame_type_extraction() {
        assert_eq!(
            frame_type(r#"{"type":"session.created","id":"x"}"#),
            Some("session.created".to_string())
        );
        assert_eq!(frame_type(r#"{"id":"x"}"#), None);
        assert_eq!(frame_type("garbage"), None);
    }
}
