//! Error types and result definitions for outbox processing.
//!
//! Provides an error system with classification, aggregation, and captured diagnostic
//! metadata for outbox operations. The [`OutboxError`] type supports single errors,
//! errors with additional detail, and multiple aggregated errors for complex failure
//! scenarios.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for outbox operations using [`OutboxError`] as the error type.
pub type OutboxResult<T> = Result<T, OutboxError>;

/// Detailed payload stored for single [`OutboxError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for outbox operations.
///
/// [`OutboxError`] can represent a single classified error, optionally carrying
/// dynamic detail and a source error, or multiple aggregated errors. Each error
/// captures its callsite location and a backtrace for diagnostics.
#[derive(Debug, Clone)]
pub struct OutboxError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Single error payload holding rich metadata.
    Single(ErrorPayload),
    /// Multiple aggregated errors, mainly useful to capture multiple worker failures.
    Many {
        errors: Vec<OutboxError>,
        location: &'static Location<'static>,
    },
}

/// Specific categories of errors that can occur during outbox processing.
///
/// Error kinds drive handling decisions: configuration errors are fatal at
/// startup, store and destination errors are handled locally by the processing
/// loop and surfaced through the failure handler.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Configuration errors, fatal at startup.
    ConfigError,

    // Change log store errors.
    StoreConnectionFailed,
    StoreQueryFailed,

    // Search backend errors.
    DestinationError,

    // Data errors.
    InvalidData,
    SerializationError,
    DeserializationError,

    // State and workflow errors.
    InvalidState,
    ProcessorWorkerPanic,
    ProcessorWorkerCancelled,

    // IO errors.
    IoError,

    // Unknown / uncategorized.
    Unknown,
}

impl OutboxError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    ///
    /// For single errors, returns a vector with one element. For multiple errors,
    /// returns a flattened vector of all error kinds.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the detailed error information if available.
    ///
    /// For multiple errors, returns the detail of the first error that has one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    ///
    /// The stored source is preserved across clones and exposed via [`error::Error::source`].
    /// Has no effect when called on aggregated errors because aggregates forward the first
    /// contained error as their source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    /// Creates an [`OutboxError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        let location = Location::caller();
        let backtrace = Arc::new(Backtrace::capture());

        OutboxError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location,
                backtrace,
            }),
        }
    }
}

impl PartialEq for OutboxError {
    fn eq(&self, other: &OutboxError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (
                ErrorRepr::Many {
                    errors: errors_a, ..
                },
                ErrorRepr::Many {
                    errors: errors_b, ..
                },
            ) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl Hash for OutboxError {
    /// Hashes the error using only its stable identifying components.
    ///
    /// Only the error kind and static description participate, intentionally
    /// excluding location, detail, source, and backtrace, so that errors of the
    /// same category produce the same hash across occurrences.
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                std::mem::discriminant(&self.repr).hash(state);
                payload.kind.hash(state);
                payload.description.hash(state);
            }
            ErrorRepr::Many { errors, .. } => {
                std::mem::discriminant(&self.repr).hash(state);
                errors.len().hash(state);
                for error in errors {
                    error.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for OutboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write!(f, "\n  Detail: {detail}")?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = format!("{error}");
                    for (line_index, line) in rendered.lines().enumerate() {
                        if line_index == 0 {
                            write!(f, "\n  {}. {}", index + 1, line)?;
                        } else {
                            write!(f, "\n     {line}")?;
                        }
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for OutboxError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source as &(dyn error::Error + 'static)),
            // For aggregated errors, we forward the first contained error as the source.
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Creates an [`OutboxError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for OutboxError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> OutboxError {
        OutboxError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates an [`OutboxError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for OutboxError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> OutboxError {
        OutboxError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Creates an [`OutboxError`] from a vector of errors for aggregation.
///
/// If the vector contains exactly one error, returns that error directly without
/// wrapping it in the aggregated variant.
impl<E> From<Vec<E>> for OutboxError
where
    E: Into<OutboxError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> OutboxError {
        let location = Location::caller();

        let mut errors: Vec<OutboxError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            return errors.pop().expect("just checked length is 1");
        }

        OutboxError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

/// Converts [`std::io::Error`] to [`OutboxError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for OutboxError {
    #[track_caller]
    fn from(err: std::io::Error) -> OutboxError {
        let detail = err.to_string();
        let source = Arc::new(err);
        OutboxError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`serde_json::Error`] to [`OutboxError`] with the appropriate error kind.
///
/// Maps to [`ErrorKind::SerializationError`] for IO-classified failures and
/// [`ErrorKind::DeserializationError`] for syntax, data, and EOF failures.
impl From<serde_json::Error> for OutboxError {
    #[track_caller]
    fn from(err: serde_json::Error) -> OutboxError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => {
                (ErrorKind::SerializationError, "JSON I/O operation failed")
            }
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        let source = Arc::new(err);
        OutboxError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`sqlx::Error`] to [`OutboxError`] with the appropriate error kind.
///
/// Connection and TLS failures map to [`ErrorKind::StoreConnectionFailed`], row
/// decoding issues to [`ErrorKind::InvalidData`], and everything else to
/// [`ErrorKind::StoreQueryFailed`].
impl From<sqlx::Error> for OutboxError {
    #[track_caller]
    fn from(err: sqlx::Error) -> OutboxError {
        let (kind, description) = match &err {
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut => (
                ErrorKind::StoreConnectionFailed,
                "Change log store connection failed",
            ),
            sqlx::Error::RowNotFound => {
                (ErrorKind::StoreQueryFailed, "Change log store row missing")
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => (
                ErrorKind::InvalidData,
                "Change log store returned invalid data",
            ),
            _ => (ErrorKind::StoreQueryFailed, "Change log store query failed"),
        };

        let detail = err.to_string();
        let source = Arc::new(err);
        OutboxError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}
