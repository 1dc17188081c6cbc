use crate::config::LiveKitCredentials;
use crate::error::{CoachError, Result};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

const TOKEN_TTL_SECS: i64 = 3600; // 1 hour

static PARTICIPANT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Room grants embedded in the access token
#[derive(Debug, Serialize, Deserialize)]
pub struct VideoGrant {
    pub room: String,
    #[serde(rename = "roomJoin")]
    pub room_join: bool,
    #[serde(rename = "canPublish")]
    pub can_publish: bool,
    #[serde(rename = "canSubscribe")]
    pub can_subscribe: bool,
    #[serde(rename = "canPublishData")]
    pub can_publish_data: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    sub: String,
    nbf: i64,
    exp: i64,
    video: VideoGrant,
}

/// What the client needs to join the realtime room
#[derive(Debug, Clone, Serialize)]
pub struct TokenGrant {
    pub token: String,
    pub url: String,
    #[serde(rename = "participantName")]
    pub participant_name: String,
}

/// Issue a signed access token for `room` with a generated participant
/// identity. HS256 over the LiveKit API secret, 1 hour TTL.
pub fn issue_token(credentials: &LiveKitCredentials, room: &str) -> Result<TokenGrant> {
    if room.trim().is_empty() {
        return Err(CoachError::Token("Room name is required".to_string()));
    }

    let participant_name = format!(
        "participant_{}_{}",
        chrono::Utc::now().timestamp_millis(),
        PARTICIPANT_SEQ.fetch_add(1, Ordering::Relaxed)
    );

    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        iss: credentials.api_key().to_string(),
        sub: participant_name.clone(),
        nbf: now,
        exp: now + TOKEN_TTL_SECS,
        video: VideoGrant {
            room: room.to_string(),
            room_join: true,
            can_publish: true,
            can_subscribe: true,
            can_publish_data: true,
        },
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(credentials.api_secret().as_bytes()),
    )
    .map_err(|e| CoachError::Token(format!("Failed to sign token: {}", e)))?;

    log::info!("LiveKit: issued token for {} in room '{}'", participant_name, room);

    Ok(TokenGrant {
        token,
        url: credentials.url.clone(),
        participant_name,
    })
}
