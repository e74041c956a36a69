//! Incremental transcript assembly.
//!
//! The agent transport delivers two independent delta streams: the
//! interviewer's own speech transcript and its recognition of the candidate's
//! speech. Interviewer deltas are cumulative fragments of one ongoing
//! utterance; candidate deltas are full-turn hypotheses that the recognizer
//! re-emits with corrections. The merge rule is therefore per-speaker
//! configurable: append for the interviewer, replace for the candidate.

use serde::{Deserialize, Serialize};

/// Who a transcript fragment or turn belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The local human being interviewed.
    Candidate,
    /// The remote synthesized interviewer.
    Interviewer,
}

/// How a new delta merges into the speaker's open turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Deltas are cumulative fragments; concatenate.
    Append,
    /// Each delta is a corrected full-turn hypothesis; replace the open turn.
    Replace,
}

/// One contiguous span of speech attributed to a single speaker.
///
/// Immutable once closed (i.e. once the opposing speaker's turn begins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub speaker: Speaker,
    pub text: String,
}

/// Merges per-speaker text deltas into an append-only list of turns.
///
/// The "open" turn is implicitly the last entry when its speaker matches the
/// incoming delta; otherwise a new turn opens and the previous one is closed
/// permanently. Replaying the same delta sequence from a fresh assembler
/// yields an identical turn list.
#[derive(Debug, Clone)]
pub struct TranscriptAssembler {
    turns: Vec<TranscriptTurn>,
    candidate_policy: MergePolicy,
    interviewer_policy: MergePolicy,
}

impl Default for TranscriptAssembler {
    fn default() -> Self {
        Self::new(MergePolicy::Replace, MergePolicy::Append)
    }
}

impl TranscriptAssembler {
    /// Create an assembler with explicit per-speaker merge policies.
    pub fn new(candidate_policy: MergePolicy, interviewer_policy: MergePolicy) -> Self {
        Self {
            turns: Vec::new(),
            candidate_policy,
            interviewer_policy,
        }
    }

    fn policy(&self, speaker: Speaker) -> MergePolicy {
        match speaker {
            Speaker::Candidate => self.candidate_policy,
            Speaker::Interviewer => self.interviewer_policy,
        }
    }

    /// Apply one incremental delta.
    pub fn apply(&mut self, speaker: Speaker, text: &str) {
        let policy = self.policy(speaker);
        match self.turns.last_mut() {
            Some(open) if open.speaker == speaker => match policy {
                MergePolicy::Append => open.text.push_str(text),
                MergePolicy::Replace => open.text = text.to_string(),
            },
            _ => self.turns.push(TranscriptTurn {
                speaker,
                text: text.to_string(),
            }),
        }
    }

    /// The assembled turns so far.
    pub fn turns(&self) -> &[TranscriptTurn] {
        &self.turns
    }

    /// Consume the assembler, yielding the final turn list.
    pub fn into_turns(self) -> Vec<TranscriptTurn> {
        self.turns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interviewer_deltas_accumulate_into_one_turn() {
        let mut assembler = TranscriptAssembler::default();
        assembler.apply(Speaker::Interviewer, "Hel");
        assembler.apply(Speaker::Interviewer, "lo the");
        assembler.apply(Speaker::Interviewer, "re");

        assert_eq!(
            assembler.turns(),
            &[TranscriptTurn {
                speaker: Speaker::Interviewer,
                text: "Hello there".to_string(),
            }]
        );
    }

    #[test]
    fn candidate_delta_opens_new_turn_and_closes_previous() {
        let mut assembler = TranscriptAssembler::default();
        assembler.apply(Speaker::Interviewer, "Tell me about yourself.");
        assembler.apply(Speaker::Candidate, "I am");

        assert_eq!(assembler.turns().len(), 2);
        assert_eq!(assembler.turns()[0].speaker, Speaker::Interviewer);
        assert_eq!(assembler.turns()[1].speaker, Speaker::Candidate);

        // A later interviewer delta must not touch the closed first turn.
        assembler.apply(Speaker::Interviewer, "Go on.");
        assert_eq!(assembler.turns()[0].text, "Tell me about yourself.");
        assert_eq!(assembler.turns().len(), 3);
    }

    #[test]
    fn candidate_deltas_replace_open_turn() {
        let mut assembler = TranscriptAssembler::default();
        assembler.apply(Speaker::Candidate, "I worked at");
        assembler.apply(Speaker::Candidate, "I worked at Acme for five years");

        assert_eq!(
            assembler.turns(),
            &[TranscriptTurn {
                speaker: Speaker::Candidate,
                text: "I worked at Acme for five years".to_string(),
            }]
        );
    }

    #[test]
    fn policies_are_configurable_per_speaker() {
        let mut assembler = TranscriptAssembler::new(MergePolicy::Append, MergePolicy::Replace);
        assembler.apply(Speaker::Candidate, "a");
        assembler.apply(Speaker::Candidate, "b");
        assembler.apply(Speaker::Interviewer, "x");
        assembler.apply(Speaker::Interviewer, "y");

        assert_eq!(assembler.turns()[0].text, "ab");
        assert_eq!(assembler.turns()[1].text, "y");
    }

    #[test]
    fn replay_of_identical_deltas_is_idempotent() {
        let deltas = [
            (Speaker::Interviewer, "Wel"),
            (Speaker::Interviewer, "come"),
            (Speaker::Candidate, "Thanks"),
            (Speaker::Candidate, "Thanks for having me"),
            (Speaker::Interviewer, "First question"),
        ];

        let mut first = TranscriptAssembler::default();
        let mut second = TranscriptAssembler::default();
        for (speaker, text) in deltas {
            first.apply(speaker, text);
        }
        for (speaker, text) in deltas {
            second.apply(speaker, text);
        }

        assert_eq!(first.turns(), second.turns());
    }

    #[test]
    fn alternating_speakers_produce_linear_turn_sequence() {
        let mut assembler = TranscriptAssembler::default();
        assembler.apply(Speaker::Interviewer, "Q1");
        assembler.apply(Speaker::Candidate, "A1");
        assembler.apply(Speaker::Interviewer, "Q2");
        assembler.apply(Speaker::Candidate, "A2");

        let speakers: Vec<Speaker> = assembler.turns().iter().map(|t| t.speaker).collect();
        assert_eq!(
            speakers,
            vec![
                Speaker::Interviewer,
                Speaker::Candidate,
                Speaker::Interviewer,
                Speaker::Candidate
            ]
        );
    }

    #[test]
    fn into_turns_yields_assembled_list() {
        let mut assembler = TranscriptAssembler::default();
        assembler.apply(Speaker::Interviewer, "done");
        let turns = assembler.into_turns();
        assert_eq!(turns.len(), 1);
    }
}
