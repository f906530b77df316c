//! Idempotency Fingerprints
//!
//! Deterministic digest over the identity-relevant inputs of a transition
//! request: aggregate token, back-counter and the canonicalized hurdle
//! responses. The fingerprint is a collision-tolerant dedup key scoped to
//! one aggregate, not a security boundary, so a fast non-cryptographic
//! CRC64 rendered as 16 lowercase hex characters is sufficient.

use std::fmt;

use crc::{CRC_64_ECMA_182, Crc};
use serde::{Deserialize, Serialize};

use super::error::EngineError;
use super::types::{AggregateToken, HurdleResponses};

const FINGERPRINT_CRC: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

/// 16-character lowercase hexadecimal request fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

#[derive(Serialize)]
struct CanonicalRequest<'a> {
    token: &'a AggregateToken,
    back_counter: u32,
    responses: &'a HurdleResponses,
}

impl Fingerprint {
    /// Compute the fingerprint over the canonicalized inputs.
    ///
    /// Canonical form: JSON with BTreeMap key ordering, so two requests with
    /// the same responses always serialize identically. The back-counter
    /// distinguishes a replay of an earlier step from a fresh attempt after
    /// the aggregate moved forward; it is always zero for transaction types
    /// without backward replay.
    pub fn compute(
        token: &AggregateToken,
        back_counter: u32,
        responses: &HurdleResponses,
    ) -> Result<Self, EngineError> {
        let canonical = serde_json::to_vec(&CanonicalRequest { token, back_counter, responses })?;
        let sum = FINGERPRINT_CRC.checksum(&canonical);
        Ok(Self(format!("{:016x}", sum)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn responses(pairs: &[(&str, serde_json::Value)]) -> HurdleResponses {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_fingerprint_format() {
        let token = AggregateToken::new();
        let fp = Fingerprint::compute(&token, 0, &HurdleResponses::new()).unwrap();
        assert_eq!(fp.as_str().len(), 16);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fp.as_str(), fp.as_str().to_lowercase());
    }

    #[test]
    fn test_deterministic_across_insertion_order() {
        let token = AggregateToken::new();
        let a = responses(&[
            ("confirm", json!({"address": "0xabc"})),
            ("approve", json!({"approved": true})),
        ]);
        let b = responses(&[
            ("approve", json!({"approved": true})),
            ("confirm", json!({"address": "0xabc"})),
        ]);
        let fa = Fingerprint::compute(&token, 0, &a).unwrap();
        let fb = Fingerprint::compute(&token, 0, &b).unwrap();
        assert_eq!(fa, fb);
    }

    #[test]
    fn test_different_inputs_different_fingerprint() {
        let token = AggregateToken::new();
        let a = responses(&[("confirm", json!({"address": "0xabc"}))]);
        let b = responses(&[("confirm", json!({"address": "0xdef"}))]);
        assert_ne!(
            Fingerprint::compute(&token, 0, &a).unwrap(),
            Fingerprint::compute(&token, 0, &b).unwrap()
        );
    }

    #[test]
    fn test_back_counter_changes_fingerprint() {
        let token = AggregateToken::new();
        let r = responses(&[("confirm", json!({"address": "0xabc"}))]);
        assert_ne!(
            Fingerprint::compute(&token, 0, &r).unwrap(),
            Fingerprint::compute(&token, 1, &r).unwrap()
        );
    }

    #[test]
    fn test_token_scopes_fingerprint() {
        let r = responses(&[("confirm", json!({"address": "0xabc"}))]);
        let fa = Fingerprint::compute(&AggregateToken::new(), 0, &r).unwrap();
        let fb = Fingerprint::compute(&AggregateToken::new(), 0, &r).unwrap();
        assert_ne!(fa, fb);
    }
}
