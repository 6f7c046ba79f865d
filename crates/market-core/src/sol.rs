//! Solana helpers for the SOL payment path. Signing and submission belong
//! to the wallet adapter; this module only checks what it hands back.

use crate::error::ApiError;

/// Lamports per SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

const PUBKEY_LEN: usize = 32;
const SIGNATURE_LEN: usize = 64;

/// Destination amount for the wallet adapter. Negative and NaN become 0.
pub fn sol_to_lamports(sol: f64) -> u64 {
    if sol.is_nan() || sol <= 0.0 {
        return 0;
    }
    (sol * LAMPORTS_PER_SOL as f64).round() as u64
}

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

fn decoded_len(value: &str) -> Option<usize> {
    bs58::decode(value.trim()).into_vec().ok().map(|bytes| bytes.len())
}

/// Base58 wallet address of exactly 32 bytes
pub fn validate_address(address: &str) -> Result<(), ApiError> {
    match decoded_len(address) {
        Some(PUBKEY_LEN) => Ok(()),
        _ => Err(ApiError::Validation(format!("Invalid wallet address: {}", address))),
    }
}

/// Base58 transaction signature of exactly 64 bytes
pub fn validate_signature(signature: &str) -> Result<(), ApiError> {
    match decoded_len(signature) {
        Some(SIGNATURE_LEN) => Ok(()),
        _ => Err(ApiError::Validation("Invalid transaction signature".to_string())),
    }
}

#[cfg(test)]
pub(crate) fn test_address(seed: u8) -> String {
    bs58::encode([seed; PUBKEY_LEN]).into_string()
}

#[cfg(test)]
pub(crate) fn test_signature(seed: u8) -> String {
    bs58::encode([seed; SIGNATURE_LEN]).into_string()
}
