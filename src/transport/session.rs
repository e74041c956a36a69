//! Duplex agent session over WebSocket.
//!
//! `LiveConnector` opens the connection, sends the setup message, and spawns
//! one driver task that owns both directions of the socket: outbound client
//! messages drain from a bounded command channel, inbound frames are parsed
//! and surfaced as [`SessionEvent`]s. Within one channel (audio, each
//! transcript stream, tool calls) delivery order matches production order;
//! nothing is guaranteed across channels.
//!
//! There is no automatic reconnection: an abnormal close is surfaced to the
//! caller, who must explicitly start a new session.

use crate::audio::encode::EncodedFrame;
use crate::error::{IntervoxError, Result};
use crate::transcript::Speaker;
use crate::transport::messages::{ClientMessage, ServerMessage};
use crate::transport::SessionContext;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::Message;

/// Capacity of the outbound command channel.
///
/// At 256ms per frame this is over a minute of buffered audio; a full channel
/// means the link is unusable and frames are dropped (fire-and-forget).
const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the inbound event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The caller asked for the close.
    Requested,
    /// The remote agent closed the stream.
    Remote(String),
    /// The underlying transport failed.
    Transport(String),
}

impl CloseReason {
    /// Abnormal closes surface as a session-disconnected error; a requested
    /// close does not.
    pub fn is_abnormal(&self) -> bool {
        !matches!(self, CloseReason::Requested)
    }

    pub fn describe(&self) -> String {
        match self {
            CloseReason::Requested => "closed by caller".to_string(),
            CloseReason::Remote(detail) => format!("remote closed: {}", detail),
            CloseReason::Transport(detail) => format!("transport failure: {}", detail),
        }
    }
}

/// Events delivered by an open session, in-order per channel.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The agent accepted the setup; the conversation is live.
    Opened,
    /// One inbound synthesized-speech chunk (still base64; the receiver
    /// decodes and owns the playable buffer).
    Audio { mime_type: String, data: String },
    /// Incremental transcript update for one speaker's open turn.
    TranscriptDelta { speaker: Speaker, text: String },
    /// Structured tool invocation; must be acknowledged via
    /// [`AgentHandle::send_tool_response`] before the agent continues.
    ToolCall {
        id: String,
        name: String,
        args: serde_json::Value,
    },
    /// The session ended. No further events follow.
    Closed(CloseReason),
}

/// Handle to an open session.
///
/// Cloneable; `close` is idempotent and callers must not send after it.
#[derive(Clone)]
pub struct AgentHandle {
    commands: mpsc::Sender<ClientMessage>,
    closed: Arc<AtomicBool>,
    close_notify: Arc<Notify>,
}

impl AgentHandle {
    /// Build a handle around a command channel.
    ///
    /// Used by connector implementations (including test fakes).
    pub fn new(commands: mpsc::Sender<ClientMessage>) -> Self {
        Self {
            commands,
            closed: Arc::new(AtomicBool::new(false)),
            close_notify: Arc::new(Notify::new()),
        }
    }

    /// Send one encoded microphone frame, fire-and-forget.
    ///
    /// Backpressure is the transport's problem: a full channel drops the
    /// frame with a warning rather than blocking the capture path.
    pub fn send_audio(&self, frame: EncodedFrame) {
        if self.closed.load(Ordering::SeqCst) {
            tracing::debug!("dropping audio frame sent after close");
            return;
        }
        let message = ClientMessage::audio_frame(&frame.mime_type, frame.data);
        match self.commands.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("outbound channel full, dropping audio frame");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("outbound channel closed, dropping audio frame");
            }
        }
    }

    /// Acknowledge a tool invocation so the agent resumes its turn.
    pub async fn send_tool_response(&self, id: &str, name: &str) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(IntervoxError::SessionNotActive);
        }
        self.commands
            .send(ClientMessage::tool_ack(id, name))
            .await
            .map_err(|e| IntervoxError::TransportSend {
                message: e.to_string(),
            })
    }

    /// Request the close. Idempotent; returns immediately and lets the
    /// driver task finish closing in the background.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.close_notify.notify_one();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Seam between the lifecycle controller and the concrete transport.
///
/// Production uses [`LiveConnector`]; tests substitute a channel-backed fake.
#[async_trait]
pub trait AgentConnector: Send + Sync {
    /// Open a session: establish the stream, send the setup message, and
    /// return the send handle plus the ordered event stream.
    async fn connect(
        &self,
        context: &SessionContext,
    ) -> Result<(AgentHandle, mpsc::Receiver<SessionEvent>)>;
}

/// Production connector speaking the agent's WebSocket protocol.
pub struct LiveConnector {
    endpoint: String,
    api_key: String,
}

impl LiveConnector {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    fn build_url(&self) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.endpoint).map_err(|e| {
            IntervoxError::TransportConnect {
                message: format!("invalid endpoint: {}", e),
            }
        })?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }
}

#[async_trait]
impl AgentConnector for LiveConnector {
    async fn connect(
        &self,
        context: &SessionContext,
    ) -> Result<(AgentHandle, mpsc::Receiver<SessionEvent>)> {
        let url = self.build_url()?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| IntervoxError::TransportConnect {
                message: e.to_string(),
            })?;

        tracing::info!("connected to interview agent");

        let (mut ws_sink, ws_stream) = ws_stream.split();

        // Setup must be the first message on the stream.
        let setup = serde_json::to_string(&ClientMessage::setup(context)).map_err(|e| {
            IntervoxError::TransportConnect {
                message: format!("failed to serialize setup: {}", e),
            }
        })?;
        ws_sink
            .send(Message::Text(setup.into()))
            .await
            .map_err(|e| IntervoxError::TransportConnect {
                message: format!("failed to send setup: {}", e),
            })?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let handle = AgentHandle::new(command_tx);
        let closed = Arc::clone(&handle.closed);
        let close_notify = Arc::clone(&handle.close_notify);

        tokio::spawn(drive_session(
            ws_sink,
            ws_stream,
            command_rx,
            event_tx,
            closed,
            close_notify,
        ));

        Ok((handle, event_rx))
    }
}

/// Driver task: owns the socket until close.
async fn drive_session<Sink, Stream>(
    mut ws_sink: Sink,
    mut ws_stream: Stream,
    mut command_rx: mpsc::Receiver<ClientMessage>,
    event_tx: mpsc::Sender<SessionEvent>,
    closed: Arc<AtomicBool>,
    close_notify: Arc<Notify>,
) where
    Sink: SinkExt<Message> + Unpin + Send,
    Sink::Error: std::fmt::Display,
    Stream: StreamExt<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin
        + Send,
{
    let reason = loop {
        tokio::select! {
            // Caller requested the close.
            _ = close_notify.notified() => {
                if let Err(e) = ws_sink.send(Message::Close(None)).await {
                    tracing::debug!("failed to send close frame: {}", e);
                }
                break CloseReason::Requested;
            }

            // Outbound client messages.
            Some(message) = command_rx.recv() => {
                let json = match serde_json::to_string(&message) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::error!("failed to serialize client message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                    break CloseReason::Transport(format!("send failed: {}", e));
                }
            }

            // Inbound agent messages.
            incoming = ws_stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        dispatch_server_message(&text, &event_tx).await;
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        // Some deployments send JSON frames as binary.
                        match String::from_utf8(bytes.to_vec()) {
                            Ok(text) => dispatch_server_message(&text, &event_tx).await,
                            Err(_) => tracing::warn!("discarding non-UTF8 binary frame"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                            tracing::debug!("failed to send pong: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if closed.load(Ordering::SeqCst) {
                            break CloseReason::Requested;
                        }
                        let detail = frame
                            .map(|f| f.reason.to_string())
                            .unwrap_or_else(|| "no reason given".to_string());
                        break CloseReason::Remote(detail);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        if closed.load(Ordering::SeqCst) {
                            break CloseReason::Requested;
                        }
                        break CloseReason::Transport(e.to_string());
                    }
                    None => {
                        if closed.load(Ordering::SeqCst) {
                            break CloseReason::Requested;
                        }
                        break CloseReason::Remote("stream ended".to_string());
                    }
                }
            }
        }
    };

    closed.store(true, Ordering::SeqCst);
    tracing::info!("agent session ended: {}", reason.describe());
    let _ = event_tx.send(SessionEvent::Closed(reason)).await;
}

/// Parse one server frame and forward its events.
///
/// A malformed frame is a protocol error: logged and discarded so audio and
/// transcript flow continue uninterrupted.
async fn dispatch_server_message(text: &str, event_tx: &mpsc::Sender<SessionEvent>) {
    let message: ServerMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("discarding unparseable server message: {}", e);
            return;
        }
    };

    match message {
        ServerMessage::SetupComplete(_) => {
            let _ = event_tx.send(SessionEvent::Opened).await;
        }
        ServerMessage::ServerContent(content) => {
            if let Some(turn) = content.model_turn {
                for part in turn.parts {
                    if let Some(chunk) = part.inline_data {
                        let _ = event_tx
                            .send(SessionEvent::Audio {
                                mime_type: chunk.mime_type,
                                data: chunk.data,
                            })
                            .await;
                    }
                }
            }
            if let Some(delta) = content.input_transcription {
                let _ = event_tx
                    .send(SessionEvent::TranscriptDelta {
                        speaker: Speaker::Candidate,
                        text: delta.text,
                    })
                    .await;
            }
            if let Some(delta) = content.output_transcription {
                let _ = event_tx
                    .send(SessionEvent::TranscriptDelta {
                        speaker: Speaker::Interviewer,
                        text: delta.text,
                    })
                    .await;
            }
            if content.interrupted {
                tracing::trace!("agent turn interrupted");
            }
        }
        ServerMessage::ToolCall(call) => {
            for function_call in call.function_calls {
                let _ = event_tx
                    .send(SessionEvent::ToolCall {
                        id: function_call.id,
                        name: function_call.name,
                        args: function_call.args,
                    })
                    .await;
            }
        }
        ServerMessage::GoAway(notice) => {
            tracing::warn!(
                "agent requested disconnect (time left: {})",
                notice.time_left.as_deref().unwrap_or("unknown")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_reason_abnormality() {
        assert!(!CloseReason::Requested.is_abnormal());
        assert!(CloseReason::Remote("quota".to_string()).is_abnormal());
        assert!(CloseReason::Transport("reset".to_string()).is_abnormal());
    }

    #[test]
    fn close_reason_describe() {
        assert_eq!(
            CloseReason::Remote("bye".to_string()).describe(),
            "remote closed: bye"
        );
        assert_eq!(CloseReason::Requested.describe(), "closed by caller");
    }

    #[test]
    fn build_url_appends_api_key() {
        let connector = LiveConnector::new("wss://agent.example/v1/stream", "secret-key");
        let url = connector.build_url().unwrap();
        assert_eq!(url.query(), Some("key=secret-key"));
    }

    #[test]
    fn build_url_rejects_invalid_endpoint() {
        let connector = LiveConnector::new("not a url", "k");
        assert!(connector.build_url().is_err());
    }

    #[tokio::test]
    async fn handle_close_is_idempotent() {
        let (tx, _rx) = mpsc::channel(4);
        let handle = AgentHandle::new(tx);

        assert!(!handle.is_closed());
        handle.close();
        handle.close();
        handle.close();
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn send_audio_after_close_is_dropped_silently() {
        let (tx, mut rx) = mpsc::channel(4);
        let handle = AgentHandle::new(tx);
        handle.close();

        handle.send_audio(EncodedFrame {
            data: "AAAA".to_string(),
            mime_type: "audio/pcm;rate=16000".to_string(),
        });
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_tool_response_after_close_errors() {
        let (tx, _rx) = mpsc::channel(4);
        let handle = AgentHandle::new(tx);
        handle.close();

        let result = handle.send_tool_response("id", "record_feedback").await;
        assert!(matches!(result, Err(IntervoxError::SessionNotActive)));
    }

    #[tokio::test]
    async fn send_audio_enqueues_realtime_input() {
        let (tx, mut rx) = mpsc::channel(4);
        let handle = AgentHandle::new(tx);

        handle.send_audio(EncodedFrame {
            data: "UExDTQ==".to_string(),
            mime_type: "audio/pcm;rate=16000".to_string(),
        });

        match rx.try_recv().unwrap() {
            ClientMessage::RealtimeInput(input) => {
                assert_eq!(input.media_chunks[0].data, "UExDTQ==");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn dispatch_forwards_in_channel_order() {
        let (tx, mut rx) = mpsc::channel(16);

        dispatch_server_message(
            r#"{"serverContent":{"outputTranscription":{"text":"one"}}}"#,
            &tx,
        )
        .await;
        dispatch_server_message(
            r#"{"serverContent":{"outputTranscription":{"text":"two"}}}"#,
            &tx,
        )
        .await;

        match rx.try_recv().unwrap() {
            SessionEvent::TranscriptDelta { text, .. } => assert_eq!(text, "one"),
            _ => panic!("expected transcript delta"),
        }
        match rx.try_recv().unwrap() {
            SessionEvent::TranscriptDelta { text, .. } => assert_eq!(text, "two"),
            _ => panic!("expected transcript delta"),
        }
    }

    #[tokio::test]
    async fn dispatch_discards_malformed_frames() {
        let (tx, mut rx) = mpsc::channel(4);
        dispatch_server_message("{ not json", &tx).await;
        dispatch_server_message(r#"{"unknownKind":{}}"#, &tx).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dispatch_splits_multi_function_tool_call() {
        let (tx, mut rx) = mpsc::channel(4);
        dispatch_server_message(
            r#"{"toolCall":{"functionCalls":[
                {"id":"a","name":"record_feedback","args":{"score":1}},
                {"id":"b","name":"record_feedback","args":{"score":2}}
            ]}}"#,
            &tx,
        )
        .await;

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert!(matches!(first, SessionEvent::ToolCall { ref id, .. } if id == "a"));
        assert!(matches!(second, SessionEvent::ToolCall { ref id, .. } if id == "b"));
    }
}
