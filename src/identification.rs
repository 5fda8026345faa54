//! Identification numbers for REGO groups and their units.
use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::error::ValidationError;

/// Length of the random part of a batch identifier (base62).
pub const SUFFIX_LEN: usize = 10;
/// Attempts before giving up on finding a free identifier.
pub const MAX_ATTEMPTS: usize = 16;

/// `<plantCode><random base62 suffix>`.
pub fn candidate<R: Rng>(plant_code: &str, rng: &mut R) -> String {
    let suffix: String = rng
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{plant_code}{suffix}")
}

/// Draw candidates until `is_taken` says one is free, at most [`MAX_ATTEMPTS`] times.
///
/// `is_taken` may fail (it usually reads the store), in which case the error is
/// passed straight through.
pub fn allocate<R, E, F>(plant_code: &str, rng: &mut R, mut is_taken: F) -> Result<String, E>
where
    R: Rng,
    E: From<ValidationError>,
    F: FnMut(&str) -> Result<bool, E>,
{
    for _ in 0..MAX_ATTEMPTS {
        let id = candidate(plant_code, rng);
        if !is_taken(&id)? {
            return Ok(id);
        }
    }
    Err(ValidationError::IdentifierExhausted(plant_code.to_string()).into())
}

/// Identifier of the `sequence`-th unit (1-based) of a batch.
pub fn unit_identifier(batch_id: &str, sequence: u64) -> String {
    format!("{batch_id}-{sequence}")
}

pub fn is_valid_plant_code(code: &str) -> bool {
    !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric())
}
