use crate::error::{CoachError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// Structured goal + daily-task record extracted from a session transcript
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructuredPlan {
    pub main_goal: String,
    pub description: String,
    pub daily_tasks: Vec<String>,
}

/// Output of plan extraction, depending on deployment mode
#[derive(Debug, Clone, PartialEq)]
pub enum ActionPlan {
    Structured(StructuredPlan),
    Script(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    /// Strict JSON `{mainGoal, description, dailyTasks[]}`
    Structured,
    /// Bounded-length prose script for the avatar video
    Script,
}

#[derive(Debug, Clone)]
pub struct PlanConfig {
    pub model: String,
    pub temperature: f32,
    pub mode: PlanMode,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            mode: PlanMode::Structured,
        }
    }
}

const STRUCTURED_SYSTEM: &str = "You are a supportive life coach. You extract clear goals and \
     actionable tasks from conversations. Always respond with valid JSON only.";

const SCRIPT_SYSTEM: &str = "You are a supportive life coach. You turn coaching conversations \
     into short motivational scripts suitable for a spoken video message.";

fn structured_request(conversation: &str) -> String {
    format!(
        "Based on this coaching conversation transcript, extract the user's main goal and \
         create 3-5 specific, actionable daily tasks.\n\
         \n\
         Transcript:\n{}\n\
         \n\
         You must respond with valid JSON in this exact format:\n\
         {{\n\
           \"mainGoal\": \"Clear statement of their main goal\",\n\
           \"description\": \"Brief context about what they want to achieve (1-2 sentences)\",\n\
           \"dailyTasks\": [\n\
             \"First specific actionable task\",\n\
             \"Second specific actionable task\",\n\
             \"Third specific actionable task\"\n\
           ]\n\
         }}\n\
         \n\
         Rules:\n\
         - mainGoal should be clear and specific (e.g., \"Improve my fitness\" or \"Learn Spanish\")\n\
         - Each dailyTask must be a single, concrete action they can do today\n\
         - Keep tasks simple and achievable\n\
         - Return ONLY valid JSON, no other text",
        conversation
    )
}

fn script_request(conversation: &str) -> String {
    format!(
        "Based on this coaching conversation transcript, write a short, encouraging spoken \
         script (at most 500 characters) that summarizes the user's goal and their first \
         steps. Address the user directly. Return only the script text.\n\
         \n\
         Transcript:\n{}",
        conversation
    )
}

/// One-shot transcript-to-plan extraction
pub struct PlanExtractor {
    client: Client,
    api_key: String,
    base_url: String,
    config: PlanConfig,
}

impl PlanExtractor {
    pub fn new(api_key: String) -> Self {
        Self::with_config(api_key, PlanConfig::default())
    }

    pub fn with_config(api_key: String, config: PlanConfig) -> Self {
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

    pub async fn extract(&self, transcript: &[String]) -> Result<ActionPlan> {
        if transcript.is_empty() || transcript.iter().all(|line| line.trim().is_empty()) {
            return Err(CoachError::InvalidTranscript);
        }

        let conversation = transcript.join("\n");
        log::info!(
            "Plan: extracting from {} transcript lines ({:?} mode)",
            transcript.len(),
            self.config.mode
        );

        let (system, request) = match self.config.mode {
            PlanMode::Structured => (STRUCTURED_SYSTEM, structured_request(&conversation)),
            PlanMode::Script => (SCRIPT_SYSTEM, script_request(&conversation)),
        };

        let mut payload = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": request },
            ],
            "temperature": self.config.temperature,
        });
        if self.config.mode == PlanMode::Structured {
            payload["response_format"] = json!({ "type": "json_object" });
        }

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

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                CoachError::DialogueGeneration("Response missing message content".to_string())
            })?;

        match self.config.mode {
            PlanMode::Structured => parse_structured(content).map(ActionPlan::Structured),
            PlanMode::Script => Ok(ActionPlan::Script(content.trim().to_string())),
        }
    }
}

/// Strict schema validation; malformed JSON is an error, never repaired
pub fn parse_structured(content: &str) -> Result<StructuredPlan> {
    serde_json::from_str::<StructuredPlan>(content)
        .map_err(|e| CoachError::PlanParse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_plan() {
        let content = r#"{
            "mainGoal": "Improve my fitness",
            "description": "Run a 5k three times a week within 3 months.",
            "dailyTasks": ["Run 2k", "Stretch for 10 minutes", "Log weekly mileage"]
        }"#;
        let plan = parse_structured(content).unwrap();
        assert_eq!(plan.main_goal, "Improve my fitness");
        assert_eq!(plan.daily_tasks.len(), 3);
    }

    #[test]
    fn test_parse_malformed_json_is_error() {
        let err = parse_structured("Sure! Here is your plan: {mainGoal: fitness}").unwrap_err();
        assert!(matches!(err, CoachError::PlanParse(_)));
    }

    #[test]
    fn test_parse_missing_field_is_error() {
        let err = parse_structured(r#"{"mainGoal": "x", "description": "y"}"#).unwrap_err();
        assert!(matches!(err, CoachError::PlanParse(_)));
    }

    #[tokio::test]
    async fn test_empty_transcript_rejected() {
        let extractor = PlanExtractor::new("sk-test".to_string());
        let err = extractor.extract(&[]).await.unwrap_err();
        assert!(matches!(err, CoachError::InvalidTranscript));

        let blank = vec!["   ".to_string(), "".to_string()];
        let err = extractor.extract(&blank).await.unwrap_err();
        assert!(matches!(err, CoachError::InvalidTranscript));
    }

    #[test]
    fn test_wire_field_names_are_camel_case() {
        let plan = StructuredPlan {
            main_goal: "g".to_string(),
            description: "d".to_string(),
            daily_tasks: vec!["t".to_string()],
        };
        let wire = serde_json::to_value(&plan).unwrap();
        assert!(wire.get("mainGoal").is_some());
        assert!(wire.get("dailyTasks").is_some());
    }
}
