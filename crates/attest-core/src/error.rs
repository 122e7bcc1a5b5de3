//! Error aggregation for the profile pipeline
//!
//! Every stage failure is folded into one [`ProfileError`]. Callers only
//! need to know the token could not be turned into a profile; the ordered
//! causes stay available for diagnostics.

use std::fmt;

use attest_crypto::CryptoError;
use thiserror::Error;

/// Pipeline stage a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    EnvelopeDecode,
    SymmetricUnwrap,
    SignatureVerify,
    AttributeDecode,
    ProfileAssembly,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EnvelopeDecode => "envelope decode",
            Self::SymmetricUnwrap => "symmetric unwrap",
            Self::SignatureVerify => "signature verify",
            Self::AttributeDecode => "attribute decode",
            Self::ProfileAssembly => "profile assembly",
        })
    }
}

/// Stage-specific failure kinds
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("key mismatch: {0}")]
    KeyMismatch(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("signature verification failed")]
    SignatureVerification,

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("duplicate attribute '{0}'")]
    DuplicateAttribute(String),
}

impl From<CryptoError> for StageError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::MalformedToken(m) => Self::MalformedToken(m),
            CryptoError::KeyMismatch(m) => Self::KeyMismatch(m),
            CryptoError::Decryption(m) => Self::Decryption(m),
            CryptoError::SignatureInvalid => Self::SignatureVerification,
            CryptoError::InvalidKey(m) | CryptoError::Encryption(m) => Self::Decryption(m),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cause {
    pub stage: Stage,
    pub error: StageError,
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.error)
    }
}

/// The single error a caller of retrieve-profile sees. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileError {
    causes: Vec<Cause>,
}

impl ProfileError {
    pub fn new(stage: Stage, error: impl Into<StageError>) -> Self {
        Self {
            causes: vec![Cause {
                stage,
                error: error.into(),
            }],
        }
    }

    /// Build from several causes; `None` when there are none to report
    pub fn from_causes(causes: Vec<Cause>) -> Option<Self> {
        (!causes.is_empty()).then_some(Self { causes })
    }

    pub fn push(&mut self, stage: Stage, error: impl Into<StageError>) {
        self.causes.push(Cause {
            stage,
            error: error.into(),
        });
    }

    pub fn causes(&self) -> &[Cause] {
        &self.causes
    }

    /// The first failure, which is what stopped the pipeline
    pub fn primary(&self) -> &Cause {
        &self.causes[0]
    }

    pub fn has(&self, pred: impl Fn(&StageError) -> bool) -> bool {
        self.causes.iter().any(|c| pred(&c.error))
    }
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token could not be turned into a profile: {}", self.primary())?;
        if self.causes.len() > 1 {
            write!(f, " (+{} more)", self.causes.len() - 1)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProfileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.primary().error)
    }
}
