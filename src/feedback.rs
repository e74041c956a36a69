//! Structured feedback aggregation.
//!
//! During the session the agent emits per-exchange scoring events through the
//! feedback tool. Events are appended as they arrive and reduced into one
//! session-level report at teardown. A session with no feedback yields no
//! report rather than a fabricated zero score.

use crate::error::{IntervoxError, Result};
use serde::{Deserialize, Serialize};

/// One structured scoring event, attributed to one completed exchange.
///
/// Never mutated after being recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEvent {
    /// Score for the exchange, 0–100.
    pub score: u8,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub areas_for_improvement: Vec<String>,
}

impl FeedbackEvent {
    /// Parse an event from the feedback tool's JSON arguments.
    ///
    /// Malformed arguments are a protocol error: the caller logs and discards
    /// them, the session continues.
    pub fn from_tool_args(args: &serde_json::Value) -> Result<Self> {
        let event: FeedbackEvent =
            serde_json::from_value(args.clone()).map_err(|e| IntervoxError::Protocol {
                message: format!("malformed feedback event: {}", e),
            })?;
        if event.score > 100 {
            return Err(IntervoxError::Protocol {
                message: format!("feedback score {} out of range", event.score),
            });
        }
        Ok(event)
    }
}

/// Session-level reduction of all recorded feedback events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    /// Rounded mean of all event scores.
    pub score: u8,
    /// Deduplicated union of strengths, first-seen order.
    pub strengths: Vec<String>,
    /// Deduplicated union of improvement areas, first-seen order.
    pub areas_for_improvement: Vec<String>,
}

/// Accumulates feedback events and reduces them on session end.
#[derive(Debug, Clone, Default)]
pub struct FeedbackAggregator {
    events: Vec<FeedbackEvent>,
}

impl FeedbackAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event. Never rejects, never mutates prior entries.
    pub fn record(&mut self, event: FeedbackEvent) {
        self.events.push(event);
    }

    /// The most recently recorded event, for live display.
    pub fn latest(&self) -> Option<&FeedbackEvent> {
        self.events.last()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Reduce all recorded events into a session report.
    ///
    /// Returns `None` when no events were recorded.
    pub fn finalize(&self) -> Option<SessionReport> {
        if self.events.is_empty() {
            return None;
        }

        let sum: u32 = self.events.iter().map(|e| e.score as u32).sum();
        let score = (sum as f64 / self.events.len() as f64).round() as u8;

        Some(SessionReport {
            score,
            strengths: dedup_union(self.events.iter().map(|e| &e.strengths)),
            areas_for_improvement: dedup_union(
                self.events.iter().map(|e| &e.areas_for_improvement),
            ),
        })
    }
}

/// Union of string lists, deduplicated, preserving first-seen order.
fn dedup_union<'a>(lists: impl Iterator<Item = &'a Vec<String>>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for list in lists {
        for item in list {
            if seen.insert(item.clone()) {
                out.push(item.clone());
            }
        }
    }
    out
}
