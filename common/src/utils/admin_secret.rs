use sha2::{Digest, Sha256};

use crate::error::AppError;

/// The configured admin credential. Only its digest is kept in memory, and
/// candidates are compared digest against digest so the comparison time does
/// not depend on the candidate's length or on where it differs.
#[derive(Clone)]
pub struct AdminSecret {
    digest: [u8; 32],
}

impl AdminSecret {
    pub fn new(secret: &str) -> Self {
        Self {
            digest: Sha256::digest(secret.as_bytes()).into(),
        }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        let candidate: [u8; 32] = Sha256::digest(candidate.as_bytes()).into();
        self.digest
            .iter()
            .zip(candidate.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    pub fn verify(&self, candidate: Option<&str>) -> Result<(), AppError> {
        match candidate {
            Some(candidate) if self.matches(candidate) => Ok(()),
            Some(_) => Err(AppError::Auth("Invalid password".into())),
            None => Err(AppError::Auth("You have to be authenticated".into())),
        }
    }
}

impl std::fmt::Debug for AdminSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AdminSecret(..)")
    }
}
