//! Human-speakable reference codes.
//!
//! A code looks like `A-7K3MQX`: a fixed prefix letter, a dash, and six symbols from a
//! 32-character alphabet with the look-alike glyphs `0`, `O`, `1` and `I` removed.

use std::future::Future;

use rand::rngs::OsRng;
use rand::RngCore;

use crate::domain::approval::ApprovalCode;
use crate::errors::ApprovalError;

pub const CODE_PREFIX: char = 'A';
pub const CODE_SEPARATOR: char = '-';
pub const CODE_BODY_LEN: usize = 6;
pub const CODE_LEN: usize = 2 + CODE_BODY_LEN;
pub const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const MAX_CODE_ATTEMPTS: u32 = 5;

pub fn generate_code() -> ApprovalCode {
    let mut bytes = [0_u8; CODE_BODY_LEN];
    OsRng.fill_bytes(&mut bytes);

    let mut code = String::with_capacity(CODE_LEN);
    code.push(CODE_PREFIX);
    code.push(CODE_SEPARATOR);
    for byte in bytes {
        code.push(CODE_ALPHABET[byte as usize % CODE_ALPHABET.len()] as char);
    }
    ApprovalCode(code)
}

/// Draws codes until `exists` reports one as unused.
///
/// Lookup errors are returned immediately; only collisions consume attempts.
pub async fn generate_unique_code<F, Fut>(mut exists: F) -> Result<ApprovalCode, ApprovalError>
where
    F: FnMut(ApprovalCode) -> Fut,
    Fut: Future<Output = Result<bool, ApprovalError>>,
{
    for _ in 0..MAX_CODE_ATTEMPTS {
        let candidate = generate_code();
        if !exists(candidate.clone()).await? {
            return Ok(candidate);
        }
    }

    Err(ApprovalError::CodeGenerationExhausted { attempts: MAX_CODE_ATTEMPTS })
}

/// Cheap shape check run before any store lookup.
///
/// Accepts any uppercase ASCII letter as the prefix so codes minted under an older prefix
/// still resolve.
pub fn is_well_formed(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.len() == CODE_LEN
        && bytes[0].is_ascii_uppercase()
        && bytes[1] == CODE_SEPARATOR as u8
        && bytes[2..].iter().all(|byte| CODE_ALPHABET.contains(byte))
}

pub fn parse_code(raw: &str) -> Result<ApprovalCode, ApprovalError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApprovalError::missing("code"));
    }
    if !is_well_formed(trimmed) {
        return Err(ApprovalError::InvalidInput {
            field: "code",
            reason: format!("`{trimmed}` does not look like an approval code (e.g. A-7K3MQX)"),
        });
    }
    Ok(ApprovalCode(trimmed.to_string()))
}
