pub(crate) const DEFAULT_WHOLE_STREAM_SIZE_LIMIT: u64 = u64::MAX;
pub(crate) const DEFAULT_PER_FIELD_SIZE_LIMIT: u64 = u64::MAX;

pub(crate) const DEFAULT_BUFFER_SIZE: usize = 4096;
pub(crate) const DEFAULT_MAX_HEADER_SIZE: usize = 10240;
pub(crate) const DEFAULT_SPILL_THRESHOLD: i64 = 10240;

pub(crate) const CR: u8 = b'\r';
pub(crate) const LF: u8 = b'\n';
pub(crate) const DASH: u8 = b'-';
pub(crate) const CRLF: &[u8] = b"\r\n";
pub(crate) const CRLF_CRLF: &[u8] = b"\r\n\r\n";

/// `CRLF` followed by `--`, the prefix of every delimiter but the first.
pub(crate) const BOUNDARY_PREFIX: &[u8] = b"\r\n--";

pub(crate) const FORM_DATA: &str = "form-data";
pub(crate) const ATTACHMENT: &str = "attachment";
pub(crate) const MULTIPART_MIXED: &str = "multipart/mixed";
pub(crate) const RELATED: &str = "related";
