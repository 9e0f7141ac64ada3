use std::fmt::{self, Debug, Display, Formatter};
use std::io;
use std::path::PathBuf;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A set of errors that can occur while decoding a multipart stream or while
/// buffering a field body.
#[non_exhaustive]
pub enum Error {
    /// The `Content-Type` is not `multipart/*`.
    NoMultipart { content_type: String },

    /// Failed to convert the `Content-Type` to [`mime::Mime`] type.
    DecodeContentType { content_type: String, cause: mime::FromStrError },

    /// No boundary found in `Content-Type` header.
    NoBoundary,

    /// The boundary does not fit into the working buffer.
    BoundaryTooLong { len: usize, buffer_size: usize },

    /// The charset label used to decode part headers is not known.
    UnsupportedCharset(String),

    /// An unknown field is detected when multipart
    /// [`constraints`](crate::Constraints::allowed_fields) are added.
    UnknownField { field_name: Option<String> },

    /// Multipart stream is incomplete: the transport ended before a required
    /// boundary, terminator or header terminator was found.
    IncompleteStream,

    /// The two bytes following a boundary are neither `--` nor CRLF.
    InvalidBoundaryTrailer([u8; 2]),

    /// Couldn't read the field headers completely.
    IncompleteHeaders,

    /// Failed to read headers.
    ReadHeaderFailed(httparse::Error),

    /// Failed to decode the field's raw header name to
    /// [`HeaderName`](http::header::HeaderName) type.
    DecodeHeaderName { name: String, cause: BoxError },

    /// Failed to decode the field's raw header value to
    /// [`HeaderValue`](http::header::HeaderValue) type.
    DecodeHeaderValue { value: Vec<u8>, cause: BoxError },

    /// A nested `multipart/mixed` section announced a boundary whose length
    /// differs from the enclosing one.
    NestedBoundaryMismatch { expected: usize, actual: usize },

    /// The incoming field size exceeded the maximum limit.
    FieldSizeExceeded {
        limit: u64,
        actual: u64,
        field_name: Option<String>,
        file_name: Option<String>,
    },

    /// The incoming stream size exceeded the maximum limit.
    StreamSizeExceeded { limit: u64, actual: u64 },

    /// A header section exceeded the maximum limit.
    HeadersSizeExceeded { limit: usize, actual: usize },

    /// The stream carried more fields than allowed.
    FieldCountExceeded { limit: usize, actual: usize },

    /// Stream read failed.
    StreamReadFailed { context: &'static str, source: io::Error },

    /// The decoding session was aborted by an earlier error and the
    /// underlying stream is closed.
    StreamClosed,

    /// Failed to create or write the backing file of a
    /// [`SpillBuffer`](crate::SpillBuffer).
    Storage { path: PathBuf, source: io::Error },

    /// The content of a [`SpillBuffer`](crate::SpillBuffer) was requested
    /// before it was closed.
    SpillNotClosed,

    /// A [`SpillBuffer`](crate::SpillBuffer) was written after it was closed
    /// or after its backing file could not be written.
    SpillClosed,

    /// Failed to decode the field data as `JSON` in
    /// [`field.json()`](crate::Field::json) method.
    #[cfg(feature = "json")]
    #[cfg_attr(nightly, doc(cfg(feature = "json")))]
    DecodeJson(serde_json::Error),
}

impl Error {
    /// Wraps a transport failure with the phase it happened in, unwrapping
    /// errors of this crate that travelled through an [`io::Error`].
    pub(crate) fn from_io(err: io::Error, context: &'static str) -> Error {
        if !err.get_ref().map_or(false, |inner| inner.is::<Error>()) {
            return Error::StreamReadFailed { context, source: err };
        }

        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(inner)) => *inner,
            Some(Err(inner)) => Error::StreamReadFailed {
                context,
                source: io::Error::new(kind, inner),
            },
            None => Error::StreamReadFailed {
                context,
                source: io::Error::from(kind),
            },
        }
    }

    /// Returns `true` for the size violations: request, field, header
    /// section and field count.
    pub fn is_size_limit(&self) -> bool {
        matches!(
            self,
            Error::FieldSizeExceeded { .. }
                | Error::StreamSizeExceeded { .. }
                | Error::HeadersSizeExceeded { .. }
                | Error::FieldCountExceeded { .. }
        )
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        match err {
            Error::StreamReadFailed { source, .. } => source,
            err => io::Error::new(io::ErrorKind::Other, err),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoMultipart { content_type } => {
                write!(f, "Content-Type is not multipart: {:?}", content_type)
            }
            Error::DecodeContentType { content_type, cause } => write!(
                f,
                "failed to convert Content-Type {:?} to `mime::Mime` type: {}",
                content_type, cause
            ),
            Error::NoBoundary => write!(f, "multipart boundary not found in Content-Type"),
            Error::BoundaryTooLong { len, buffer_size } => write!(
                f,
                "multipart boundary of {} bytes is too long for a buffer of {} bytes",
                len, buffer_size
            ),
            Error::UnsupportedCharset(label) => write!(f, "unsupported charset: {:?}", label),
            Error::UnknownField { field_name } => write!(
                f,
                "unknown field received: {}",
                field_name.as_deref().unwrap_or("<unknown>")
            ),
            Error::IncompleteStream => write!(f, "incomplete multipart stream"),
            Error::InvalidBoundaryTrailer(trailer) => {
                write!(f, "unexpected characters follow a boundary: {:?}", trailer)
            }
            Error::IncompleteHeaders => write!(f, "failed to read field complete headers"),
            Error::ReadHeaderFailed(err) => write!(f, "failed to read headers: {}", err),
            Error::DecodeHeaderName { name, cause } => {
                write!(f, "failed to decode field's raw header name: {:?} {}", name, cause)
            }
            Error::DecodeHeaderValue { cause, .. } => {
                write!(f, "failed to decode field's raw header value: {}", cause)
            }
            Error::NestedBoundaryMismatch { expected, actual } => write!(
                f,
                "nested multipart boundary has {} bytes, expected {}",
                actual, expected
            ),
            Error::FieldSizeExceeded {
                limit,
                actual,
                field_name,
                file_name,
            } => write!(
                f,
                "field '{}'{} exceeded the maximum size limit: {} bytes (got {})",
                field_name.as_deref().unwrap_or("<unknown>"),
                file_name
                    .as_deref()
                    .map(|name| format!(" (file '{}')", name))
                    .unwrap_or_default(),
                limit,
                actual
            ),
            Error::StreamSizeExceeded { limit, actual } => write!(
                f,
                "stream size exceeded the maximum limit: {} bytes (got {})",
                limit, actual
            ),
            Error::HeadersSizeExceeded { limit, actual } => write!(
                f,
                "header section exceeded the maximum size limit: {} bytes (got {})",
                limit, actual
            ),
            Error::FieldCountExceeded { limit, actual } => {
                write!(f, "stream exceeded the maximum number of fields: {} (got {})", limit, actual)
            }
            Error::StreamReadFailed { context, source } => {
                write!(f, "stream read failed while {}: {}", context, source)
            }
            Error::StreamClosed => write!(f, "multipart stream is closed"),
            Error::Storage { path, source } => {
                write!(f, "failed to store field data in {}: {}", path.display(), source)
            }
            Error::SpillNotClosed => write!(f, "spill buffer content requested before it was closed"),
            Error::SpillClosed => write!(f, "spill buffer is closed"),
            #[cfg(feature = "json")]
            Error::DecodeJson(err) => write!(f, "failed to decode field data as JSON: {}", err),
        }
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::DecodeContentType { cause, .. } => Some(cause),
            Error::ReadHeaderFailed(err) => Some(err),
            Error::DecodeHeaderName { cause, .. } | Error::DecodeHeaderValue { cause, .. } => {
                Some(cause.as_ref() as &(dyn std::error::Error + 'static))
            }
            Error::StreamReadFailed { source, .. } | Error::Storage { source, .. } => Some(source),
            #[cfg(feature = "json")]
            Error::DecodeJson(err) => Some(err),
            _ => None,
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string().eq(&other.to_string())
    }
}

impl Eq for Error {}
