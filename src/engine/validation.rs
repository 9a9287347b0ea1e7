use rand::Rng;

use super::error::DraftError;

/// Maximum display name length.
pub const MAX_PLAYER_NAME_LENGTH: usize = 32;

/// Maximum champion identifier length.
pub const MAX_CHAMPION_LENGTH: usize = 64;

/// Room code length bounds (generated codes are always [`ROOM_CODE_LENGTH`]).
pub const MIN_ROOM_CODE_LENGTH: usize = 4;
pub const MAX_ROOM_CODE_LENGTH: usize = 12;
pub const ROOM_CODE_LENGTH: usize = 6;

/// Alphabet for generated room codes. Skips 0/O/1/I to keep codes
/// readable over voice chat.
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Validate a display name. 1-32 chars, letters/digits/underscore/hyphen/space.
pub fn validate_player_name(name: &str) -> Result<(), DraftError> {
    if name.trim().is_empty() {
        return Err(DraftError::InvalidInput("player name cannot be empty".into()));
    }
    if name.len() > MAX_PLAYER_NAME_LENGTH {
        return Err(DraftError::InvalidInput(format!(
            "player name too long (max {} characters)",
            MAX_PLAYER_NAME_LENGTH
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ' ')
    {
        return Err(DraftError::InvalidInput(
            "player name can only contain letters, numbers, spaces, underscores, and hyphens"
                .into(),
        ));
    }
    Ok(())
}

/// Validate a champion identifier. Opaque to the server beyond length bounds.
pub fn validate_champion(champion: &str) -> Result<(), DraftError> {
    if champion.trim().is_empty() {
        return Err(DraftError::InvalidInput("champion cannot be empty".into()));
    }
    if champion.len() > MAX_CHAMPION_LENGTH {
        return Err(DraftError::InvalidInput(format!(
            "champion identifier too long (max {} characters)",
            MAX_CHAMPION_LENGTH
        )));
    }
    Ok(())
}

/// Validate a client-supplied room code. 4-12 alphanumeric characters.
pub fn validate_room_code(code: &str) -> Result<(), DraftError> {
    if code.len() < MIN_ROOM_CODE_LENGTH || code.len() > MAX_ROOM_CODE_LENGTH {
        return Err(DraftError::InvalidInput(format!(
            "room code must be {}-{} characters",
            MIN_ROOM_CODE_LENGTH, MAX_ROOM_CODE_LENGTH
        )));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(DraftError::InvalidInput(
            "room code can only contain letters and digits".into(),
        ));
    }
    Ok(())
}

/// Canonical form used as the registry key.
pub fn normalize_room_code(code: &str) -> String {
    code.to_ascii_uppercase()
}

/// Generate a random 6-character room code. Collision handling is the
/// caller's job (retry until unused).
pub fn generate_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_CODE_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..ROOM_CODE_ALPHABET.len());
            ROOM_CODE_ALPHABET[idx] as char
        })
        .collect()
}
