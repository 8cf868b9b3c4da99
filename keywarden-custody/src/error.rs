//! Key custody error types.

use thiserror::Error;
use uuid::Uuid;

/// Result type for custody operations.
pub type CustodyResult<T> = Result<T, CustodyError>;

/// The link in the key hierarchy that failed to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnwrapStage {
    UserKey,
    PrivateKey,
    OrgKey,
}

impl std::fmt::Display for UnwrapStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            UnwrapStage::UserKey => "user key",
            UnwrapStage::PrivateKey => "private key",
            UnwrapStage::OrgKey => "org key",
        })
    }
}

/// Opaque failure from a [`Directory`](crate::Directory) backend.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

/// Errors that can occur in custody operations.
#[derive(Debug, Error)]
pub enum CustodyError {
    #[error("crypto error: {source}")]
    Crypto {
        #[from]
        source: keywarden_crypto::CryptoError,
    },

    #[error("could not unwrap {stage}: {source}")]
    Unwrap {
        stage: UnwrapStage,
        source: keywarden_crypto::CryptoError,
    },

    #[error("no key registered for org {0}")]
    MissingOrgKey(Uuid),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CustodyError {
    /// Message safe to show a caller on the other side of an API.
    ///
    /// Key unwrap failures collapse to one string so a client cannot
    /// probe which link of the hierarchy rejected its guess.
    pub fn public_message(&self) -> &'static str {
        match self {
            CustodyError::Crypto { .. } | CustodyError::Unwrap { .. } => "invalid credentials",
            CustodyError::NotFound(_) => "not found",
            CustodyError::MissingOrgKey(_)
            | CustodyError::Store(_)
            | CustodyError::Internal(_) => "internal error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keywarden_crypto::CryptoError;

    #[test]
    fn unwrap_failures_share_one_public_message() {
        let user = CustodyError::Unwrap {
            stage: UnwrapStage::UserKey,
            source: CryptoError::Integrity,
        };
        let org = CustodyError::Unwrap {
            stage: UnwrapStage::OrgKey,
            source: CryptoError::Padding,
        };
        let crypto = CustodyError::from(CryptoError::Integrity);

        assert_eq!(user.public_message(), "invalid credentials");
        assert_eq!(org.public_message(), "invalid credentials");
        assert_eq!(crypto.public_message(), "invalid credentials");
    }

    #[test]
    fn internal_details_stay_internal() {
        let store = CustodyError::Store(StoreError("connection reset".into()));
        let missing = CustodyError::MissingOrgKey(Uuid::new_v4());

        assert_eq!(store.public_message(), "internal error");
        assert_eq!(missing.public_message(), "internal error");
        assert!(!store.public_message().contains("connection"));
    }

    #[test]
    fn display_names_the_failed_stage() {
        let err = CustodyError::Unwrap {
            stage: UnwrapStage::PrivateKey,
            source: CryptoError::Integrity,
        };
        assert_eq!(
            err.to_string(),
            "could not unwrap private key: MAC verification failed"
        );
    }
}
