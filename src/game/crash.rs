//! Crash-point generation with a commit-reveal fairness record.
//!
//! One draw per round, taken before the round is revealed to players. The
//! engine publishes sha256(round_id:crash_point:nonce) at round start and
//! reveals the nonce at round end so clients can check the crash point was
//! fixed before betting closed.

use crate::game::curve::round4;
use rand::Rng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A crash point plus the material needed to prove it was pre-committed.
#[derive(Clone, Debug)]
pub struct CrashDraw {
    /// Multiplier at which the round ends, 4-decimal precision.
    pub crash_point: f64,
    /// Hex-encoded random nonce revealed at round end.
    pub nonce: String,
    /// Hex-encoded sha256 commitment published at round start.
    pub commitment: String,
}

impl CrashDraw {
    /// Draw the crash point for `round_id`, uniform in `[min, max)`.
    pub fn generate(round_id: Uuid, min: f64, max: f64) -> Self {
        let mut rng = rand::thread_rng();
        let crash_point = round4(rng.gen_range(min..max));
        let nonce_bytes: [u8; 16] = rng.gen();
        let nonce = hex::encode(nonce_bytes);
        let commitment = commitment_digest(round_id, crash_point, &nonce);

        Self {
            crash_point,
            nonce,
            commitment,
        }
    }
}

/// Compute the commitment digest for a round's crash point.
pub fn commitment_digest(round_id: Uuid, crash_point: f64, nonce: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{:.4}:{}", round_id, crash_point, nonce));
    hex::encode(hasher.finalize())
}

/// Verify a revealed crash point and nonce against a published commitment.
pub fn verify_commitment(round_id: Uuid, crash_point: f64, nonce: &str, commitment: &str) -> bool {
    commitment_digest(round_id, crash_point, nonce) == commitment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crash_point_in_range() {
        for _ in 0..1000 {
            let draw = CrashDraw::generate(Uuid::new_v4(), 1.0, 11.0);
            assert!(draw.crash_point >= 1.0);
            assert!(draw.crash_point < 11.0);
        }
    }

    #[test]
    fn test_crash_point_four_decimal_precision() {
        for _ in 0..100 {
            let draw = CrashDraw::generate(Uuid::new_v4(), 1.0, 11.0);
            assert_eq!(draw.crash_point, round4(draw.crash_point));
        }
    }

    #[test]
    fn test_commitment_round_trip() {
        let round_id = Uuid::new_v4();
        let draw = CrashDraw::generate(round_id, 1.0, 11.0);
        assert!(verify_commitment(
            round_id,
            draw.crash_point,
            &draw.nonce,
            &draw.commitment
        ));
    }

    #[test]
    fn test_commitment_rejects_tampered_crash_point() {
        let round_id = Uuid::new_v4();
        let draw = CrashDraw::generate(round_id, 1.0, 11.0);
        assert!(!verify_commitment(
            round_id,
            draw.crash_point + 0.0001,
            &draw.nonce,
            &draw.commitment
        ));
    }

    #[test]
    fn test_draws_are_not_constant() {
        let points: std::collections::HashSet<String> = (0..50)
            .map(|_| format!("{:.4}", CrashDraw::generate(Uuid::new_v4(), 1.0, 11.0).crash_point))
            .collect();
        assert!(points.len() > 1);
    }
}
