use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoachError>;

#[derive(Error, Debug)]
pub enum CoachError {
    #[error("Microphone access error: {0}")]
    MicrophoneAccess(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Dialogue generation failed: {0}")]
    DialogueGeneration(String),

    #[error("Speech synthesis failed: {0}")]
    Tts(String),

    #[error("Audio upload failed: {0}")]
    AudioUpload(String),

    #[error("Failed to enqueue video job: {0}")]
    Enqueue(String),

    #[error("Video generation did not finish within {0} polls")]
    GenerationTimeout(u32),

    #[error("No video URL found in provider response")]
    NoVideoUrl(String),

    #[error("Action plan was not valid JSON: {0}")]
    PlanParse(String),

    #[error("Transcript is empty or invalid")]
    InvalidTranscript,

    #[error("Connection failure: {0}")]
    Connection(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Token error: {0}")]
    Token(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for CoachError {
    fn from(err: reqwest::Error) -> Self {
        CoachError::Connection(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for CoachError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        CoachError::Connection(err.to_string())
    }
}
