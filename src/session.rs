//! Turn-based voice session state machine.
//!
//! One session owns its transcript, its capture buffers and the microphone,
//! and drives the per-turn pipeline: transcribe, chat, synthesize, play.
//! States loop `Idle -> Recording -> Processing -> Idle` until the user
//! ends the session, which snapshots the transcript for plan extraction.

use crate::audio::{AudioInput, AudioOutput};
use crate::dialogue::{ChatMessage, DialogueTurn, Stage};
use crate::error::{CoachError, Result};
use crate::stt::Transcriber;
use crate::tts::SpeechSynthesizer;
use std::sync::Arc;
use strum::Display;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Speaker {
    User,
    Assistant,
}

/// One transcript line. Append-only during a session, immutable once appended.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub sequence: u32,
}

impl TranscriptEntry {
    /// The `"AI: ..."` / `"User: ..."` line handed downstream on end
    fn snapshot_line(&self) -> String {
        match self.speaker {
            Speaker::User => format!("User: {}", self.text),
            Speaker::Assistant => format!("AI: {}", self.text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionStatus {
    Idle,
    Recording,
    Processing,
    Ended,
}

/// Result of one completed user turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub user_text: String,
    pub assistant_text: String,
    pub stage: Stage,
}

pub struct VoiceSession<T, D, S>
where
    T: Transcriber,
    D: DialogueTurn,
    S: SpeechSynthesizer,
{
    transcriber: Arc<T>,
    dialogue: Arc<D>,
    synthesizer: Arc<S>,
    input: Box<dyn AudioInput>,
    output: Arc<dyn AudioOutput>,
    status: SessionStatus,
    turn_count: u32,
    transcript: Vec<TranscriptEntry>,
}

impl<T, D, S> VoiceSession<T, D, S>
where
    T: Transcriber,
    D: DialogueTurn,
    S: SpeechSynthesizer,
{
    pub fn new(
        transcriber: Arc<T>,
        dialogue: Arc<D>,
        synthesizer: Arc<S>,
        input: Box<dyn AudioInput>,
        output: Arc<dyn AudioOutput>,
    ) -> Self {
        Self {
            transcriber,
            dialogue,
            synthesizer,
            input,
            output,
            status: SessionStatus::Idle,
            turn_count: 0,
            transcript: Vec::new(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    fn append(&mut self, speaker: Speaker, text: String) {
        let sequence = self.transcript.len() as u32;
        self.transcript.push(TranscriptEntry {
            speaker,
            text,
            sequence,
        });
    }

    fn history(&self) -> Vec<ChatMessage> {
        self.transcript
            .iter()
            .map(|entry| match entry.speaker {
                Speaker::User => ChatMessage::user(entry.text.clone()),
                Speaker::Assistant => ChatMessage::assistant(entry.text.clone()),
            })
            .collect()
    }

    /// Synthesize and play an assistant utterance, appending it to the
    /// transcript once synthesis has succeeded. Playback failures are
    /// logged but do not remove the entry.
    async fn speak_assistant(&mut self, text: String) -> Result<()> {
        let audio = self.synthesizer.synthesize(&text).await?;
        self.append(Speaker::Assistant, text);

        if let Err(e) = self.output.play(&audio.data).await {
            log::warn!("Session: playback failed, keeping transcript entry: {}", e);
        }
        Ok(())
    }

    /// Generate, speak and record the opening greeting at turn 0.
    /// The session enters Idle (ready to record) once playback completes.
    pub async fn greet(&mut self) -> Result<String> {
        if self.status != SessionStatus::Idle || !self.transcript.is_empty() {
            return Err(CoachError::Session(
                "Greeting is only valid on a fresh session".to_string(),
            ));
        }

        let greeting = self.dialogue.next_utterance(&[], self.turn_count).await?;
        self.speak_assistant(greeting.clone()).await?;
        log::info!("Session: greeted, waiting for first recording");
        Ok(greeting)
    }

    /// `Idle -> Recording`: acquire the microphone and start buffering.
    /// Rejected (not queued) from any other state.
    pub fn start_recording(&mut self) -> Result<()> {
        match self.status {
            SessionStatus::Idle => {
                self.input.start()?; // session stays Idle on MicrophoneAccess
                self.status = SessionStatus::Recording;
                log::info!("Session: recording");
                Ok(())
            }
            other => Err(CoachError::Session(format!(
                "Cannot start recording while {}",
                other
            ))),
        }
    }

    /// `Recording -> Processing -> Idle`: seal the capture, release the
    /// microphone and run the turn pipeline. Failure policy:
    /// transcription failure drops the whole turn; chat or synthesis
    /// failure keeps the transcribed user text but appends no assistant
    /// entry. The session always returns to Idle.
    pub async fn finish_turn(&mut self) -> Result<TurnOutcome> {
        if self.status != SessionStatus::Recording {
            return Err(CoachError::Session(format!(
                "Cannot finish a turn while {}",
                self.status
            )));
        }

        let clip = match self.input.stop() {
            Ok(clip) => clip,
            Err(e) => {
                self.status = SessionStatus::Idle;
                return Err(e);
            }
        };
        self.status = SessionStatus::Processing;

        let outcome = self.process_turn(clip).await;
        self.status = SessionStatus::Idle;
        outcome
    }

    async fn process_turn(&mut self, clip: crate::audio::AudioClip) -> Result<TurnOutcome> {
        let user_text = self.transcriber.transcribe(&clip).await?;
        log::info!("Session: user said '{}'", user_text);

        self.append(Speaker::User, user_text.clone());
        self.turn_count += 1;
        let stage = Stage::for_turn(self.turn_count);

        let history = self.history();
        let assistant_text = self
            .dialogue
            .next_utterance(&history, self.turn_count)
            .await?;

        self.speak_assistant(assistant_text.clone()).await?;

        Ok(TurnOutcome {
            user_text,
            assistant_text,
            stage,
        })
    }

    /// Terminal exit. Allowed from Idle and Recording; a turn that is
    /// mid-Processing must complete or fail first. Stops playback, releases
    /// the microphone and returns the transcript snapshot for downstream
    /// plan extraction.
    pub async fn end_session(&mut self) -> Result<Vec<String>> {
        match self.status {
            SessionStatus::Processing => {
                return Err(CoachError::Session(
                    "Cannot end session while a turn is processing".to_string(),
                ))
            }
            SessionStatus::Ended => {
                return Err(CoachError::Session("Session already ended".to_string()))
            }
            SessionStatus::Recording => self.input.abort(),
            SessionStatus::Idle => {}
        }

        if let Err(e) = self.output.stop().await {
            log::warn!("Session: failed to stop playback on end: {}", e);
        }

        self.status = SessionStatus::Ended;
        let snapshot: Vec<String> = self
            .transcript
            .iter()
            .map(TranscriptEntry::snapshot_line)
            .collect();
        log::info!(
            "Session: ended after {} turns, {} transcript lines",
            self.turn_count,
            snapshot.len()
        );
        Ok(snapshot)
    }
}

/// Commands accepted by the dispatch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    StartRecording,
    FinishTurn,
    EndSession,
}

/// Events emitted back to the caller (UI, logs)
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Greeted(String),
    RecordingStarted,
    TurnCompleted(TurnOutcome),
    TurnFailed(String),
    Rejected(String),
    Ended(Vec<String>),
}

/// Message-dispatch loop over an owned session: commands in, events out.
/// At most one pipeline step runs at a time by construction; commands
/// arriving mid-turn wait in the channel rather than interleaving.
pub async fn run<T, D, S>(
    mut session: VoiceSession<T, D, S>,
    mut commands: mpsc::Receiver<SessionCommand>,
    events: mpsc::Sender<SessionEvent>,
) -> Result<Vec<String>>
where
    T: Transcriber,
    D: DialogueTurn,
    S: SpeechSynthesizer,
{
    let greeting = session.greet().await?;
    let _ = events.send(SessionEvent::Greeted(greeting)).await;

    while let Some(command) = commands.recv().await {
        match command {
            SessionCommand::StartRecording => match session.start_recording() {
                Ok(()) => {
                    let _ = events.send(SessionEvent::RecordingStarted).await;
                }
                Err(e) => {
                    let _ = events.send(SessionEvent::Rejected(e.to_string())).await;
                }
            },
            SessionCommand::FinishTurn => match session.finish_turn().await {
                Ok(outcome) => {
                    let _ = events.send(SessionEvent::TurnCompleted(outcome)).await;
                }
                Err(e) => {
                    let _ = events.send(SessionEvent::TurnFailed(e.to_string())).await;
                }
            },
            SessionCommand::EndSession => match session.end_session().await {
                Ok(snapshot) => {
                    let _ = events.send(SessionEvent::Ended(snapshot.clone())).await;
                    return Ok(snapshot);
                }
                Err(e) => {
                    let _ = events.send(SessionEvent::Rejected(e.to_string())).await;
                }
            },
        }
    }

    // Caller dropped the command channel; treat it as navigating away
    session.end_session().await
}
