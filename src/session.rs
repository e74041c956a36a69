//! Interview session lifecycle controller.
//!
//! Owns the full wiring of one live session: microphone frames flow out
//! through the encoder to the agent, inbound events fan out to the playback
//! scheduler, the transcript assembler, and the feedback aggregator. The
//! controller moves through four phases (idle, starting, active, stopping)
//! and every path back to idle goes through one teardown routine, so a remote
//! disconnect and a local stop release resources identically.

use crate::audio::encode;
use crate::audio::playback::{OutputClock, PlaybackScheduler, PlaybackSink};
use crate::audio::{AudioFrame, FrameSource};
use crate::defaults;
use crate::error::{IntervoxError, Result};
use crate::feedback::{FeedbackAggregator, FeedbackEvent, SessionReport};
use crate::transcript::{TranscriptAssembler, TranscriptTurn};
use crate::transport::{AgentConnector, AgentHandle, CloseReason, SessionContext, SessionEvent};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Lifecycle phase of the session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No session resources held.
    Idle,
    /// Microphone acquired, connection being established.
    Starting,
    /// Duplex conversation in progress.
    Active,
    /// Teardown requested, resources being released.
    Stopping,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Starting => "starting",
            Phase::Active => "active",
            Phase::Stopping => "stopping",
        };
        write!(f, "{}", name)
    }
}

/// Point-in-time snapshot of the session, safe to render from any task.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub phase: Phase,
    /// Assembled transcript turns so far.
    pub turns: Vec<TranscriptTurn>,
    /// Most recent feedback event, for live display.
    pub live_feedback: Option<FeedbackEvent>,
    /// Final report; populated at teardown, retained until the next start.
    pub report: Option<SessionReport>,
    /// Description of the last abnormal disconnect, if any.
    pub last_error: Option<String>,
}

struct Shared {
    phase: Phase,
    assembler: TranscriptAssembler,
    aggregator: FeedbackAggregator,
    report: Option<SessionReport>,
    last_error: Option<String>,
}

impl Shared {
    fn reset_for_start(&mut self) {
        self.assembler = TranscriptAssembler::default();
        self.aggregator = FeedbackAggregator::new();
        self.report = None;
        self.last_error = None;
    }

    fn snapshot(&self) -> SessionState {
        SessionState {
            phase: self.phase,
            turns: self.assembler.turns().to_vec(),
            live_feedback: self.aggregator.latest().cloned(),
            report: self.report.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Controller for one mock-interview audio session.
///
/// Holds the transport connector, the microphone source, and the playback
/// scheduler; `start` wires them together and `stop` (or a remote close)
/// tears them down. A controller outlives its sessions and can be started
/// again after returning to idle.
pub struct InterviewSession<C: OutputClock + 'static, S: PlaybackSink + 'static> {
    connector: Arc<dyn AgentConnector>,
    microphone: Arc<Mutex<Box<dyn FrameSource>>>,
    scheduler: Arc<Mutex<PlaybackScheduler<C, S>>>,
    shared: Arc<Mutex<Shared>>,
    handle: Arc<Mutex<Option<AgentHandle>>>,
}

impl<C: OutputClock + 'static, S: PlaybackSink + 'static> InterviewSession<C, S> {
    pub fn new(
        connector: Arc<dyn AgentConnector>,
        microphone: Box<dyn FrameSource>,
        scheduler: PlaybackScheduler<C, S>,
    ) -> Self {
        Self {
            connector,
            microphone: Arc::new(Mutex::new(microphone)),
            scheduler: Arc::new(Mutex::new(scheduler)),
            shared: Arc::new(Mutex::new(Shared {
                phase: Phase::Idle,
                assembler: TranscriptAssembler::default(),
                aggregator: FeedbackAggregator::new(),
                report: None,
                last_error: None,
            })),
            handle: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn phase(&self) -> Phase {
        self.shared.lock().await.phase
    }

    /// Snapshot the current session state.
    pub async fn state(&self) -> SessionState {
        self.shared.lock().await.snapshot()
    }

    /// Start a session: acquire the microphone, connect to the agent, and
    /// return once the agent has confirmed the setup.
    ///
    /// The microphone is acquired before the connection is attempted so a
    /// missing device fails fast without a wasted handshake. Rejects with
    /// `SessionBusy` unless idle.
    pub async fn start(&self, context: &SessionContext) -> Result<()> {
        {
            let mut shared = self.shared.lock().await;
            if shared.phase != Phase::Idle {
                return Err(IntervoxError::SessionBusy);
            }
            shared.phase = Phase::Starting;
            shared.reset_for_start();
        }

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        if let Err(e) = self.microphone.lock().await.start(frame_tx) {
            self.shared.lock().await.phase = Phase::Idle;
            return Err(e);
        }

        let (handle, mut events) = match self.connector.connect(context).await {
            Ok(pair) => pair,
            Err(e) => {
                self.release_microphone().await;
                self.shared.lock().await.phase = Phase::Idle;
                return Err(e);
            }
        };

        // Hold in starting until the agent confirms the setup.
        loop {
            match events.recv().await {
                Some(SessionEvent::Opened) => break,
                Some(SessionEvent::Closed(reason)) => {
                    handle.close();
                    self.release_microphone().await;
                    self.shared.lock().await.phase = Phase::Idle;
                    return Err(IntervoxError::SessionDisconnected {
                        reason: reason.describe(),
                    });
                }
                Some(other) => {
                    tracing::debug!("discarding pre-setup event: {:?}", other);
                }
                None => {
                    handle.close();
                    self.release_microphone().await;
                    self.shared.lock().await.phase = Phase::Idle;
                    return Err(IntervoxError::TransportConnect {
                        message: "event stream ended before setup completed".to_string(),
                    });
                }
            }
        }

        *self.handle.lock().await = Some(handle.clone());

        {
            let mut shared = self.shared.lock().await;
            // A concurrent stop may have fired during the handshake.
            if shared.phase != Phase::Starting {
                drop(shared);
                *self.handle.lock().await = None;
                handle.close();
                self.release_microphone().await;
                self.shared.lock().await.phase = Phase::Idle;
                return Err(IntervoxError::SessionNotActive);
            }
            shared.phase = Phase::Active;
        }

        tracing::info!("interview session active");

        tokio::spawn(pump(
            Arc::clone(&self.shared),
            Arc::clone(&self.microphone),
            Arc::clone(&self.scheduler),
            handle,
            frame_rx,
            events,
        ));

        Ok(())
    }

    /// Request teardown. Idempotent; returns without waiting for the
    /// background close to finish.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut shared = self.shared.lock().await;
            match shared.phase {
                Phase::Idle | Phase::Stopping => return Ok(()),
                Phase::Starting | Phase::Active => shared.phase = Phase::Stopping,
            }
        }

        match self.handle.lock().await.take() {
            // The pump observes the requested close and finishes teardown.
            Some(handle) => handle.close(),
            // Never reached active; release directly.
            None => {
                self.release_microphone().await;
                self.scheduler.lock().await.reset();
                let mut shared = self.shared.lock().await;
                shared.report = shared.aggregator.finalize();
                shared.phase = Phase::Idle;
            }
        }

        Ok(())
    }

    async fn release_microphone(&self) {
        if let Err(e) = self.microphone.lock().await.stop() {
            tracing::warn!("failed to stop microphone: {}", e);
        }
    }
}

/// Event pump for one active session.
///
/// Runs until the transport reports the close, then performs the single
/// teardown routine shared by local stop and remote disconnect.
async fn pump<C: OutputClock + 'static, S: PlaybackSink + 'static>(
    shared: Arc<Mutex<Shared>>,
    microphone: Arc<Mutex<Box<dyn FrameSource>>>,
    scheduler: Arc<Mutex<PlaybackScheduler<C, S>>>,
    handle: AgentHandle,
    mut frame_rx: mpsc::UnboundedReceiver<AudioFrame>,
    mut events: mpsc::Receiver<SessionEvent>,
) {
    let reason = loop {
        tokio::select! {
            Some(frame) = frame_rx.recv() => {
                handle.send_audio(encode::encode_frame(&frame.samples));
            }

            event = events.recv() => {
                match event {
                    Some(SessionEvent::Audio { mime_type, data }) => {
                        if mime_type != defaults::OUTPUT_MIME_TYPE {
                            tracing::trace!("unexpected inbound mime type: {}", mime_type);
                        }
                        match encode::decode_chunk(&data) {
                            Ok(samples) => {
                                if let Err(e) = scheduler.lock().await.schedule(samples) {
                                    tracing::warn!("failed to schedule playback: {}", e);
                                }
                            }
                            Err(e) => tracing::warn!("discarding undecodable audio chunk: {}", e),
                        }
                    }
                    Some(SessionEvent::TranscriptDelta { speaker, text }) => {
                        shared.lock().await.assembler.apply(speaker, &text);
                    }
                    Some(SessionEvent::ToolCall { id, name, args }) => {
                        if name == defaults::FEEDBACK_TOOL_NAME {
                            match FeedbackEvent::from_tool_args(&args) {
                                Ok(event) => shared.lock().await.aggregator.record(event),
                                Err(e) => tracing::warn!("discarding feedback event: {}", e),
                            }
                        } else {
                            tracing::warn!("agent invoked unknown tool: {}", name);
                        }
                        // Acknowledge regardless so the agent resumes its turn.
                        if let Err(e) = handle.send_tool_response(&id, &name).await {
                            tracing::warn!("failed to acknowledge tool call: {}", e);
                        }
                    }
                    Some(SessionEvent::Opened) => {}
                    Some(SessionEvent::Closed(reason)) => break reason,
                    None => break CloseReason::Transport("event stream ended".to_string()),
                }
            }
        }
    };

    handle.close();
    if let Err(e) = microphone.lock().await.stop() {
        tracing::warn!("failed to stop microphone: {}", e);
    }
    scheduler.lock().await.reset();

    let mut shared = shared.lock().await;
    shared.report = shared.aggregator.finalize();
    shared.last_error = if reason.is_abnormal() {
        Some(reason.describe())
    } else {
        None
    };
    shared.phase = Phase::Idle;

    tracing::info!(
        "session torn down ({}), {} feedback event(s) recorded",
        reason.describe(),
        shared.aggregator.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_display_names() {
        assert_eq!(Phase::Idle.to_string(), "idle");
        assert_eq!(Phase::Starting.to_string(), "starting");
        assert_eq!(Phase::Active.to_string(), "active");
        assert_eq!(Phase::Stopping.to_string(), "stopping");
    }

    #[test]
    fn shared_snapshot_reflects_contents() {
        let mut shared = Shared {
            phase: Phase::Active,
            assembler: TranscriptAssembler::default(),
            aggregator: FeedbackAggregator::new(),
            report: None,
            last_error: None,
        };
        shared
            .assembler
            .apply(crate::transcript::Speaker::Interviewer, "Welcome");
        shared.aggregator.record(FeedbackEvent {
            score: 75,
            strengths: vec![],
            areas_for_improvement: vec![],
        });

        let snapshot = shared.snapshot();
        assert_eq!(snapshot.phase, Phase::Active);
        assert_eq!(snapshot.turns.len(), 1);
        assert_eq!(snapshot.live_feedback.unwrap().score, 75);
        assert!(snapshot.report.is_none());
    }

    #[test]
    fn reset_for_start_clears_prior_session() {
        let mut shared = Shared {
            phase: Phase::Idle,
            assembler: TranscriptAssembler::default(),
            aggregator: FeedbackAggregator::new(),
            report: Some(SessionReport {
                score: 50,
                strengths: vec![],
                areas_for_improvement: vec![],
            }),
            last_error: Some("old".to_string()),
        };
        shared
            .assembler
            .apply(crate::transcript::Speaker::Candidate, "stale");

        shared.reset_for_start();
        assert!(shared.assembler.turns().is_empty());
        assert!(shared.aggregator.is_empty());
        assert!(shared.report.is_none());
        assert!(shared.last_error.is_none());
    }
}
