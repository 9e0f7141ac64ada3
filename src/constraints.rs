use crate::constants;
use crate::progress::ProgressListener;
use crate::size_limit::SizeLimit;
use encoding_rs::Encoding;
use std::fmt::{self, Debug, Formatter};

/// Represents some rules to be applied on the stream and field's content
/// size to prevent DoS attacks.
///
/// It's recommended to add some rules on field (specially text field) size
/// to avoid potential DoS attacks from attackers running the server out of
/// memory.
///
/// # Examples
///
/// ```
/// use multipart_spill::{Constraints, SizeLimit};
///
/// let constraints = Constraints::new()
///     .allowed_fields(vec!["name", "avatar"])
///     .max_fields(8)
///     .size_limit(
///         SizeLimit::new()
///             .whole_stream(15 * 1024 * 1024)
///             .per_field(10 * 1024 * 1024)
///             .for_field("name", 128),
///     );
/// # drop(constraints);
/// ```
pub struct Constraints {
    pub(crate) size_limit: SizeLimit,
    pub(crate) allowed_fields: Option<Vec<String>>,
    pub(crate) max_fields: Option<usize>,
    pub(crate) max_header_size: usize,
    pub(crate) buffer_size: usize,
    pub(crate) header_encoding: Option<&'static Encoding>,
    pub(crate) progress: Option<Box<dyn ProgressListener>>,
}

impl Constraints {
    /// Creates a set of rules with default behaviour.
    pub fn new() -> Constraints {
        Constraints::default()
    }

    /// Applies rules on field's content length.
    pub fn size_limit(mut self, size_limit: SizeLimit) -> Constraints {
        self.size_limit = size_limit;
        self
    }

    /// Specify which fields are allowed, for any unknown field
    /// [`next_field`](crate::Multipart::next_field) will throw an error.
    pub fn allowed_fields<N: Into<String>>(mut self, allowed_fields: Vec<N>) -> Constraints {
        let allowed_fields = allowed_fields.into_iter().map(|item| item.into()).collect();
        self.allowed_fields = Some(allowed_fields);
        self
    }

    /// Maximum number of fields the stream may carry.
    pub fn max_fields(mut self, max: usize) -> Constraints {
        self.max_fields = Some(max);
        self
    }

    /// Maximum size in bytes of the header section of a single field.
    pub fn max_header_size(mut self, max: usize) -> Constraints {
        self.max_header_size = max;
        self
    }

    /// Capacity of the working buffer. It is raised to twice the delimiter
    /// length when smaller.
    pub fn buffer_size(mut self, size: usize) -> Constraints {
        self.buffer_size = size;
        self
    }

    /// Charset used to decode field headers. Defaults to the `charset`
    /// parameter of the request's content type, then to UTF-8.
    pub fn header_encoding(mut self, encoding: &'static Encoding) -> Constraints {
        self.header_encoding = Some(encoding);
        self
    }

    /// Observes bytes read and fields found while decoding.
    pub fn progress<L: ProgressListener + 'static>(mut self, listener: L) -> Constraints {
        self.progress = Some(Box::new(listener));
        self
    }

    pub(crate) fn is_it_allowed(&self, field: Option<&str>) -> bool {
        if let Some(ref allowed_fields) = self.allowed_fields {
            field
                .map(|field| allowed_fields.iter().any(|item| item == field))
                .unwrap_or(false)
        } else {
            true
        }
    }
}

impl Default for Constraints {
    fn default() -> Self {
        Constraints {
            size_limit: SizeLimit::default(),
            allowed_fields: None,
            max_fields: None,
            max_header_size: constants::DEFAULT_MAX_HEADER_SIZE,
            buffer_size: constants::DEFAULT_BUFFER_SIZE,
            header_encoding: None,
            progress: None,
        }
    }
}

impl Debug for Constraints {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraints")
            .field("size_limit", &self.size_limit)
            .field("allowed_fields", &self.allowed_fields)
            .field("max_fields", &self.max_fields)
            .field("max_header_size", &self.max_header_size)
            .field("buffer_size", &self.buffer_size)
            .field("header_encoding", &self.header_encoding.map(|encoding| encoding.name()))
            .field("progress", &self.progress.is_some())
            .finish()
    }
}
