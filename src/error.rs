//! The possible error types when dispatching operations to `DataSet`s.
use crate::network::PeerAddress;
use std::time::Duration;
use thiserror::Error;

/// An enumeration of `liquid_sketch` errors.
///
/// Failures that can only be known after talking to a coordinator
/// (`DispatchTimeout`, `RemoteExecution`) are always delivered as the single
/// element of a [`PartialResultStream`], never returned directly. Failures
/// decidable from local state (the zip checks, `InvalidReference`) are
/// returned at the call site.
///
/// [`PartialResultStream`]: ../partial_result/struct.PartialResultStream.html
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SketchError {
    /// The coordinator did not acknowledge the request in time
    #[error("No acknowledgment from the coordinator within {0:?}")]
    DispatchTimeout(Duration),
    /// A peer failed while preparing or computing an operation
    #[error("Remote execution failed on {peer}: {message}")]
    RemoteExecution { peer: PeerAddress, message: String },
    /// The operands of a zip live on different peers
    #[error(
        "Zip is invalid for remote data sets on different peers | left: {left}, right: {right}"
    )]
    IncompatibleZipTarget {
        left: PeerAddress,
        right: PeerAddress,
    },
    /// The second operand of a zip is not the same kind of data set
    #[error("Unexpected operand in zip: expected a {expected} data set, found a {found} one")]
    UnsupportedZipOperand {
        expected: &'static str,
        found: &'static str,
    },
    /// Two parallel data sets with different numbers of children were zipped
    #[error("Cannot zip parallel data sets with {left} and {right} children")]
    PartitionCountMismatch { left: usize, right: usize },
    /// A proxy was built from a dead coordinator or an empty target
    #[error("Invalid reference: {0}")]
    InvalidReference(String),
    /// A map or sketch payload failed on a resident data set
    #[error("Execution failed: {0}")]
    Execution(String),
    /// A stream closed without ever producing a value
    #[error("The result stream closed without producing a value")]
    NoResult,
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for SketchError {
    fn from(e: bincode::Error) -> Self {
        SketchError::Serialization(e.to_string())
    }
}
