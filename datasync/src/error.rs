use std::error;
use std::fmt;

use crate::record::TypeConversionError;

/// Result type of fallible datasync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Error type shared by every layer of the sync engine.
///
/// A [`SyncError`] is either a single error, with a static description and an optional dynamic
/// detail, or an aggregate of several errors, as produced when multiple slices of a job fail.
#[derive(Debug, Clone)]
pub struct SyncError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    WithDescription(ErrorKind, &'static str),
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
    Many(Vec<SyncError>),
}

/// Categories of errors raised while running a sync job.
///
/// Configuration kinds are fatal before any slice starts, execution kinds are fatal to a single
/// slice and data kinds describe individual records.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    // Configuration Errors
    ConfigError,
    InvalidSplitConfig,
    NoSplitUnits,
    UnknownPlugin,

    // Slice Execution Errors
    ReaderFailed,
    WriterFailed,
    SliceTaskPanic,
    SliceCancelled,

    // Channel Errors
    ChannelClosed,
    ChannelProtocolViolation,

    // Data Errors
    ConversionError,
    InvalidData,
    DirtyRecordLimitExceeded,

    // IO & Serialization Errors
    IoError,
    SerializationError,
    DeserializationError,

    // Unknown / Uncategorized
    Unknown,
}

impl ErrorKind {
    /// Returns `true` for the kinds that must stop a job before, or instead of, starting slices.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ErrorKind::ConfigError
                | ErrorKind::InvalidSplitConfig
                | ErrorKind::NoSplitUnits
                | ErrorKind::UnknownPlugin
        )
    }
}

impl SyncError {
    /// Creates an aggregate of multiple errors.
    pub fn many(errors: Vec<SyncError>) -> SyncError {
        SyncError {
            repr: ErrorRepr::Many(errors),
        }
    }

    /// Returns the [`ErrorKind`] of this error.
    ///
    /// An aggregate reports the kind of its first error, or [`ErrorKind::Unknown`] when empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => kind,
            ErrorRepr::Many(ref errors) => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every [`ErrorKind`] contained in this error, flattening aggregates.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => vec![kind],
            ErrorRepr::Many(ref errors) => errors.iter().flat_map(|err| err.kinds()).collect(),
        }
    }

    /// Returns the dynamic detail of this error, or of the first error in an aggregate that has one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, ref detail) => Some(detail.as_str()),
            ErrorRepr::Many(ref errors) => errors.iter().find_map(|e| e.detail()),
            _ => None,
        }
    }

    /// Returns the errors aggregated in this error, or a slice with only itself.
    pub fn errors(&self) -> Vec<&SyncError> {
        match self.repr {
            ErrorRepr::Many(ref errors) => errors.iter().collect(),
            _ => vec![self],
        }
    }
}

impl PartialEq for SyncError {
    fn eq(&self, other: &SyncError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::WithDescription(kind_a, _), ErrorRepr::WithDescription(kind_b, _)) => {
                kind_a == kind_b
            }
            (
                ErrorRepr::WithDescriptionAndDetail(kind_a, _, _),
                ErrorRepr::WithDescriptionAndDetail(kind_b, _, _),
            ) => kind_a == kind_b,
            (ErrorRepr::Many(errors_a), ErrorRepr::Many(errors_b)) => errors_a == errors_b,
            _ => false,
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.repr {
            ErrorRepr::WithDescription(kind, desc) => write!(f, "{kind:?}: {desc}"),
            ErrorRepr::WithDescriptionAndDetail(kind, desc, ref detail) => {
                write!(f, "{kind:?}: {desc} -> {detail}")
            }
            ErrorRepr::Many(ref errors) => match errors.as_slice() {
                [] => write!(f, "Multiple errors occurred (empty)"),
                [error] => error.fmt(f),
                errors => {
                    write!(f, "Multiple errors occurred ({} total):", errors.len())?;
                    for (i, error) in errors.iter().enumerate() {
                        write!(f, "\n  {}: {}", i + 1, error)?;
                    }

                    Ok(())
                }
            },
        }
    }
}

impl error::Error for SyncError {}

impl From<(ErrorKind, &'static str)> for SyncError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> SyncError {
        SyncError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

impl From<(ErrorKind, &'static str, String)> for SyncError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> SyncError {
        SyncError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail),
        }
    }
}

impl<E> From<Vec<E>> for SyncError
where
    E: Into<SyncError>,
{
    fn from(errors: Vec<E>) -> SyncError {
        SyncError::many(errors.into_iter().map(Into::into).collect())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> SyncError {
        (ErrorKind::IoError, "I/O error occurred", err.to_string()).into()
    }
}

/// Maps [`serde_json::Error`] to serialization or deserialization kinds based on its category.
impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> SyncError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        (kind, description, err.to_string()).into()
    }
}

impl From<std::num::ParseIntError> for SyncError {
    fn from(err: std::num::ParseIntError) -> SyncError {
        (
            ErrorKind::ConversionError,
            "Integer parsing failed",
            err.to_string(),
        )
            .into()
    }
}

impl From<std::num::ParseFloatError> for SyncError {
    fn from(err: std::num::ParseFloatError) -> SyncError {
        (
            ErrorKind::ConversionError,
            "Float parsing failed",
            err.to_string(),
        )
            .into()
    }
}

impl From<TypeConversionError> for SyncError {
    fn from(err: TypeConversionError) -> SyncError {
        (
            ErrorKind::ConversionError,
            "Column conversion failed",
            err.to_string(),
        )
            .into()
    }
}

/// File name patterns are compiled into regular expressions, a bad pattern is a configuration
/// problem.
impl From<regex::Error> for SyncError {
    fn from(err: regex::Error) -> SyncError {
        (
            ErrorKind::InvalidSplitConfig,
            "Invalid file name pattern",
            err.to_string(),
        )
            .into()
    }
}

impl From<tokio::sync::AcquireError> for SyncError {
    fn from(err: tokio::sync::AcquireError) -> SyncError {
        (
            ErrorKind::SliceCancelled,
            "Failed to acquire a run permit",
            err.to_string(),
        )
            .into()
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> SyncError {
        if err.is_panic() {
            (
                ErrorKind::SliceTaskPanic,
                "A slice task panicked",
                err.to_string(),
            )
                .into()
        } else {
            (
                ErrorKind::SliceCancelled,
                "A slice task was cancelled",
                err.to_string(),
            )
                .into()
        }
    }
}

impl From<datasync_config::shared::ValidationError> for SyncError {
    fn from(err: datasync_config::shared::ValidationError) -> SyncError {
        (
            ErrorKind::ConfigError,
            "Invalid job configuration",
            err.to_string(),
        )
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bail, sync_error};

    #[test]
    fn test_simple_error_creation() {
        let err = SyncError::from((ErrorKind::ReaderFailed, "Reader could not connect"));
        assert_eq!(err.kind(), ErrorKind::ReaderFailed);
        assert_eq!(err.detail(), None);
        assert_eq!(err.kinds(), vec![ErrorKind::ReaderFailed]);
    }

    #[test]
    fn test_error_with_detail() {
        let err = SyncError::from((
            ErrorKind::WriterFailed,
            "Writer rejected the batch",
            "column count mismatch: expected 3, got 2".to_string(),
        ));
        assert_eq!(err.kind(), ErrorKind::WriterFailed);
        assert_eq!(err.detail(), Some("column count mismatch: expected 3, got 2"));
    }

    #[test]
    fn test_multiple_errors() {
        let err = SyncError::many(vec![
            SyncError::from((ErrorKind::ReaderFailed, "Slice 1 failed")),
            SyncError::from((ErrorKind::WriterFailed, "Slice 4 failed")),
        ]);

        assert_eq!(err.kind(), ErrorKind::ReaderFailed);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::ReaderFailed, ErrorKind::WriterFailed]
        );
        assert_eq!(err.errors().len(), 2);
    }

    #[test]
    fn test_empty_multiple_errors() {
        let err = SyncError::many(vec![]);
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert!(err.kinds().is_empty());
        assert_eq!(format!("{err}"), "Multiple errors occurred (empty)");
    }

    #[test]
    fn test_nested_multiple_errors() {
        let inner = SyncError::many(vec![
            SyncError::from((ErrorKind::ConversionError, "Inner error 1")),
            SyncError::from((ErrorKind::InvalidData, "Inner error 2")),
        ]);
        let outer = SyncError::many(vec![
            inner,
            SyncError::from((ErrorKind::IoError, "Outer error")),
        ]);

        assert_eq!(
            outer.kinds(),
            vec![
                ErrorKind::ConversionError,
                ErrorKind::InvalidData,
                ErrorKind::IoError
            ]
        );
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::from((
            ErrorKind::NoSplitUnits,
            "No files matched",
            "/data/*.csv".to_string(),
        ));
        assert_eq!(format!("{err}"), "NoSplitUnits: No files matched -> /data/*.csv");

        let err = SyncError::many(vec![
            SyncError::from((ErrorKind::ReaderFailed, "Slice 1 failed")),
            SyncError::from((ErrorKind::ReaderFailed, "Slice 2 failed")),
        ]);
        let display = format!("{err}");
        assert!(display.starts_with("Multiple errors occurred (2 total):"));
        assert!(display.contains("2: ReaderFailed: Slice 2 failed"));
    }

    #[test]
    fn test_configuration_kinds() {
        assert!(ErrorKind::ConfigError.is_configuration());
        assert!(ErrorKind::NoSplitUnits.is_configuration());
        assert!(!ErrorKind::ReaderFailed.is_configuration());
        assert!(!ErrorKind::ConversionError.is_configuration());
    }

    #[test]
    fn test_macros() {
        let err = sync_error!(ErrorKind::InvalidData, "Bad record");
        assert_eq!(err.kind(), ErrorKind::InvalidData);

        fn fails() -> SyncResult<()> {
            bail!(ErrorKind::ConfigError, "Missing key", "reader.table");
        }

        let err = fails().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert_eq!(err.detail(), Some("reader.table"));
    }

    #[test]
    fn test_json_error_classification() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert_eq!(
            SyncError::from(json_err).kind(),
            ErrorKind::DeserializationError
        );
    }
}
