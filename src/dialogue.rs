use crate::error::{CoachError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use strum::{Display, EnumString};

/// Which question the coach is working through. A pure function of the
/// number of user turns so far; clamps at Finalize so the session can
/// always be closed gracefully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum Stage {
    Goal,
    ClarifySpecific,
    MeasureTimeline,
    Finalize,
}

impl Stage {
    pub fn for_turn(turn_count: u32) -> Self {
        match turn_count {
            0 => Stage::Goal,
            1 => Stage::ClarifySpecific,
            2 => Stage::MeasureTimeline,
            _ => Stage::Finalize,
        }
    }

    pub fn is_final(self) -> bool {
        self == Stage::Finalize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

pub struct CoachPrompts;

impl CoachPrompts {
    /// Opening assistant greeting, spoken before any user recording
    pub fn greeting() -> &'static str {
        "Hello! I'm here to listen. What goal would you like to work on today?"
    }

    /// Stage-specific system instruction for the next assistant utterance
    pub fn system_for(stage: Stage) -> String {
        let stage_instruction = match stage {
            Stage::Goal => "Current step - GOAL: Ask what goal they would like to work on today.",
            Stage::ClarifySpecific => {
                "Current step - CLARIFY (Specific): Ask what exactly they want to achieve with this."
            }
            Stage::MeasureTimeline => {
                "Current step - MEASUREMENT & TIMELINE (Achievable/Measurable): Ask how they will \
                 know when they've achieved it, and when they would like to reach it."
            }
            Stage::Finalize => {
                "THIS IS THE FINAL INTERACTION: Provide a brief summary (2-3 sentences) of their \
                 goal and timeline, encourage them to start, and end the session warmly with \
                 \"Your personalized action plan will be ready for you.\" Do not ask any further \
                 questions."
            }
        };

        format!(
            "You are an expert goal-setting coach helping someone set meaningful goals.\n\
             \n\
             CRITICAL RULES:\n\
             - Ask ONLY ONE question per response\n\
             - Keep responses to 2-3 sentences maximum for natural voice conversation\n\
             - Never ask multiple questions in one response\n\
             \n\
             {}\n\
             \n\
             Stay supportive, concise, and focused.",
            stage_instruction
        )
    }
}

/// Produces the next assistant utterance for the current turn
#[async_trait::async_trait]
pub trait DialogueTurn: Send + Sync {
    async fn next_utterance(&self, history: &[ChatMessage], turn_count: u32) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.8,
            max_tokens: 150,
        }
    }
}

pub struct OpenAiChat {
    client: Client,
    api_key: String,
    base_url: String,
    config: ChatConfig,
}

impl OpenAiChat {
    pub fn new(api_key: String) -> Self {
        Self::with_config(api_key, ChatConfig::default())
    }

    pub fn with_config(api_key: String, config: ChatConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            config,
        }
    }
}

#[async_trait::async_trait]
impl DialogueTurn for OpenAiChat {
    async fn next_utterance(&self, history: &[ChatMessage], turn_count: u32) -> Result<String> {
        let stage = Stage::for_turn(turn_count);
        log::debug!(
            "Dialogue: turn {} -> stage {} ({} history messages)",
            turn_count,
            stage,
            history.len()
        );

        let mut messages = vec![json!({
            "role": "system",
            "content": CoachPrompts::system_for(stage),
        })];
        for message in history {
            messages.push(json!({ "role": message.role, "content": message.content }));
        }

        let payload = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| CoachError::DialogueGeneration(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CoachError::DialogueGeneration(format!(
                "{} - {}",
                status.as_u16(),
                body
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CoachError::DialogueGeneration(format!("Malformed response: {}", e)))?;

        let reply = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                CoachError::DialogueGeneration("Response missing message content".to_string())
            })?;

        log::info!("Dialogue: assistant reply '{}'", reply);
        Ok(reply.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_mapping() {
        assert_eq!(Stage::for_turn(0), Stage::Goal);
        assert_eq!(Stage::for_turn(1), Stage::ClarifySpecific);
        assert_eq!(Stage::for_turn(2), Stage::MeasureTimeline);
        assert_eq!(Stage::for_turn(3), Stage::Finalize);
    }

    #[test]
    fn test_stage_clamps_beyond_limit() {
        // Exceeding the turn budget never errors, it stays at Finalize
        for turn in 3..50 {
            assert_eq!(Stage::for_turn(turn), Stage::Finalize);
            assert!(Stage::for_turn(turn).is_final());
        }
    }

    #[test]
    fn test_stage_mapping_is_pure() {
        for turn in 0..10 {
            assert_eq!(Stage::for_turn(turn), Stage::for_turn(turn));
        }
    }

    #[test]
    fn test_system_prompt_per_stage() {
        let goal = CoachPrompts::system_for(Stage::Goal);
        let finalize = CoachPrompts::system_for(Stage::Finalize);
        assert!(goal.contains("GOAL"));
        assert!(finalize.contains("FINAL INTERACTION"));
        assert!(finalize.contains("action plan"));
        // The one-question rule applies at every stage
        for stage in [
            Stage::Goal,
            Stage::ClarifySpecific,
            Stage::MeasureTimeline,
            Stage::Finalize,
        ] {
            assert!(CoachPrompts::system_for(stage).contains("ONLY ONE question"));
        }
    }

    #[test]
    fn test_message_constructors() {
        let user = ChatMessage::user("hi");
        assert_eq!(user.role, "user");
        let assistant = ChatMessage::assistant("hello");
        assert_eq!(assistant.role, "assistant");
    }
}
