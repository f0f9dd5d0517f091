//! Profile-sharing invitation codes.
//!
//! The profile identifier is XOR-obfuscated with the invitation code before
//! it is published, so the shared record does not carry the raw id. This is
//! obfuscation, not encryption.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Characters used in codes; omits 0/O and 1/I.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 8;
const DEFAULT_LIFETIME_HOURS: i64 = 48;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvitationError {
    #[error("Invitation code does not match")]
    CodeMismatch,

    #[error("Invitation expired at {0}")]
    Expired(DateTime<Utc>),

    #[error("Invitation token is malformed")]
    Malformed,
}

/// A pending invitation to share one profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    pub code: String,
    /// Hex of the profile id XOR-ed with the code
    pub profile_token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Invitation {
    /// Invite someone to `profile_id` with the default 48 hour lifetime.
    pub fn create(profile_id: Uuid, now: DateTime<Utc>) -> Self {
        Self::with_lifetime(profile_id, now, Duration::hours(DEFAULT_LIFETIME_HOURS))
    }

    pub fn with_lifetime(profile_id: Uuid, now: DateTime<Utc>, lifetime: Duration) -> Self {
        let code = generate_code(&mut rand::thread_rng());
        let profile_token = hex::encode(xor_with_code(profile_id.as_bytes(), &code));
        info!(expires_in_hours = lifetime.num_hours(), "Created profile invitation");

        Self {
            code,
            profile_token,
            created_at: now,
            expires_at: now + lifetime,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Check the code the invitee typed and recover the profile id.
    pub fn redeem(&self, entered_code: &str, now: DateTime<Utc>) -> Result<Uuid, InvitationError> {
        let entered = normalize_code(entered_code);
        if entered != self.code {
            debug!("Invitation code mismatch");
            return Err(InvitationError::CodeMismatch);
        }
        if self.is_expired(now) {
            return Err(InvitationError::Expired(self.expires_at));
        }

        let obfuscated = hex::decode(&self.profile_token).map_err(|_| InvitationError::Malformed)?;
        let bytes: [u8; 16] = xor_with_code(&obfuscated, &self.code)
            .try_into()
            .map_err(|_| InvitationError::Malformed)?;
        Ok(Uuid::from_bytes(bytes))
    }
}

/// Uppercase and drop separators users tend to type.
pub fn normalize_code(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn generate_code<R: Rng>(rng: &mut R) -> String {
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

fn xor_with_code(data: &[u8], code: &str) -> Vec<u8> {
    let key = code.as_bytes();
    if key.is_empty() {
        return data.to_vec();
    }
    data.iter()
        .zip(key.iter().cycle())
        .map(|(byte, k)| byte ^ k)
        .collect()
}
