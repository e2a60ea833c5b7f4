use std::ops::{Deref, DerefMut};

use mongodb::bson::DateTime;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Characters a generated voting code is drawn from.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of a generated voting code.
pub const CODE_LENGTH: usize = 8;

/// Core voting code data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingCodeCore {
    /// The token the voter types in. Always stored uppercase.
    pub code: String,
    /// Display name attached when the code is redeemed.
    pub voter_name: Option<String>,
    /// Set exactly when a vote referencing this code has been committed.
    pub is_used: bool,
    pub used_at: Option<DateTime>,
}

impl VotingCodeCore {
    /// Create a fresh, unused voting code from the given token.
    pub fn new(code: &str) -> Self {
        Self {
            code: normalize_code(code),
            voter_name: None,
            is_used: false,
            used_at: None,
        }
    }

    /// Create a fresh, unused voting code with a random token.
    pub fn generate(rng: &mut impl Rng) -> Self {
        let code = (0..CODE_LENGTH)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect::<String>();
        Self::new(&code)
    }
}

/// Normalize a voting code as entered by a voter.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// A voting code without an ID.
pub type NewVotingCode = VotingCodeCore;

/// A voting code from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingCode {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub voting_code: VotingCodeCore,
}

impl Deref for VotingCode {
    type Target = VotingCodeCore;

    fn deref(&self) -> &Self::Target {
        &self.voting_code
    }
}

impl DerefMut for VotingCode {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.voting_code
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_normalized() {
        assert_eq!(VotingCodeCore::new("  abc12345\n").code, "ABC12345");
        assert_eq!(normalize_code("zz9z"), "ZZ9Z");
    }

    #[test]
    fn generated_codes_use_alphabet() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let code = VotingCodeCore::generate(&mut rng);
            assert_eq!(code.code.len(), CODE_LENGTH);
            assert!(code.code.bytes().all(|c| CODE_ALPHABET.contains(&c)));
            assert!(!code.is_used);
            assert!(code.voter_name.is_none());
        }
    }
}
