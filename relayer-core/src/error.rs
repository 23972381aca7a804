use std::error::Error as StdError;
use std::fmt::Debug;

use crate::config::ConfigParsingError;
use crate::vaa::VaaId;
use crate::{ChainId, VerificationResult};

/// The result of interacting with a chain.
pub type ChainResult<T> = Result<T, ChainCommunicationError>;

/// Errors produced while decoding untrusted VAA bytes.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Buffer ended early or could not be read
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    /// Only version 1 envelopes exist
    #[error("Unsupported VAA version {0}")]
    UnsupportedVersion(u8),
    /// Guardian signatures must be sorted by index without duplicates
    #[error("Guardian signature index {index} does not follow {previous}")]
    UnsortedSignatures {
        /// Index of the preceding signature
        previous: u8,
        /// Offending index
        index: u8,
    },
    /// A string field was not valid utf-8
    #[error("Field `{0}` is not valid utf-8")]
    InvalidUtf8(&'static str),
    /// A textual VAA id could not be parsed
    #[error("Invalid VAA id `{0}`")]
    InvalidVaaId(String),
}

/// ChainCommunicationError contains errors returned when attempting to call a
/// chain or dispatch a transaction.
#[derive(Debug, thiserror::Error)]
pub enum ChainCommunicationError {
    /// The transaction was mined but reverted
    #[error("Transaction reverted: {0}")]
    TransactionReverted(String),
    /// A transaction was dropped before it was mined
    #[error("Transaction dropped {0}")]
    TransactionDropped(String),
    /// A request timed out
    #[error("Request timed out")]
    Timeout,
    /// A custom error message
    #[error("{0}")]
    CustomError(String),
    /// Any other error; does not implement `From` to prevent
    /// conflicting/absorbing other errors.
    #[error(transparent)]
    Other(Box<dyn StdError + Send + Sync>),
}

impl ChainCommunicationError {
    /// Create a chain communication error from any other existing error
    pub fn from_other<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Other(Box::new(err))
    }

    /// Creates a chain communication error of the other error variant from a static string
    pub fn from_other_str(err: &'static str) -> Self {
        Self::CustomError(err.to_owned())
    }

    /// Whether another attempt could succeed. A revert is deterministic for a
    /// given chain state but the state moves on, so reverts are retried too;
    /// only the job queue's attempt budget bounds them.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::CustomError(_))
    }
}

impl From<eyre::Report> for ChainCommunicationError {
    fn from(report: eyre::Report) -> Self {
        Self::CustomError(format!("{report:?}"))
    }
}

/// The error taxonomy shared by the relayer pipeline, the job queue and the
/// missed VAA job.
#[derive(Debug, thiserror::Error)]
pub enum RelayerError {
    /// Malformed VAA bytes, never retried
    #[error("Failed to decode VAA: {0}")]
    Decode(#[from] DecodeError),
    /// Signature or quorum failure, fatal for that VAA
    #[error("VAA failed verification: {0:?}")]
    Verification(VerificationResult),
    /// RPC timeout or connection failure, retried with backoff
    #[error("Transient network error: {0}")]
    TransientNetwork(#[from] ChainCommunicationError),
    /// The transfer was already redeemed; callers treat this as success
    #[error("VAA {0} was already relayed")]
    AlreadyCompleted(VaaId),
    /// The guardian RPC has no VAA at this id (yet)
    #[error("VAA {0} not found")]
    FetchNotFound(VaaId),
    /// The guardian RPC answered with a different VAA than the one requested
    #[error("Requested VAA {requested} but received {received}")]
    MismatchedVaa {
        /// id that was asked for
        requested: VaaId,
        /// id of the VAA that came back
        received: VaaId,
    },
    /// Invalid or missing configuration, fatal at startup
    #[error(transparent)]
    Configuration(#[from] ConfigParsingError),
    /// Chain id with no entry in the chain table
    #[error("Unknown chain id {0}")]
    UnknownChain(ChainId),
}

impl RelayerError {
    /// Whether the job queue should schedule another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransientNetwork(err) => err.is_transient(),
            Self::FetchNotFound(_) => true,
            Self::Decode(_)
            | Self::Verification(_)
            | Self::AlreadyCompleted(_)
            | Self::MismatchedVaa { .. }
            | Self::Configuration(_)
            | Self::UnknownChain(_) => false,
        }
    }

    /// Find the taxonomy error inside an `eyre` report chain, if any.
    pub fn find_in(report: &eyre::Report) -> Option<&RelayerError> {
        report
            .chain()
            .find_map(|cause| cause.downcast_ref::<RelayerError>())
    }

    /// Whether a failed attempt described by `report` may be retried. Reports
    /// without a taxonomy error are treated as transient.
    pub fn is_report_retryable(report: &eyre::Report) -> bool {
        if report
            .chain()
            .any(|cause| cause.downcast_ref::<DecodeError>().is_some())
        {
            return false;
        }
        Self::find_in(report).map_or(true, Self::is_retryable)
    }
}

#[cfg(test)]
mod tests {
    use eyre::WrapErr;

    use super::*;

    #[test]
    fn decode_errors_are_not_retried() {
        let report = eyre::Report::new(DecodeError::UnsupportedVersion(9));
        assert!(!RelayerError::is_report_retryable(&report));

        let wrapped: eyre::Result<()> = Err(RelayerError::Decode(DecodeError::UnsupportedVersion(2)))
            .wrap_err("while relaying");
        assert!(!RelayerError::is_report_retryable(&wrapped.unwrap_err()));
    }

    #[test]
    fn network_errors_are_retried() {
        let report = eyre::Report::new(RelayerError::TransientNetwork(
            ChainCommunicationError::Timeout,
        ));
        assert!(RelayerError::is_report_retryable(&report));
        assert!(RelayerError::is_report_retryable(&eyre::eyre!("anything")));
    }
}
