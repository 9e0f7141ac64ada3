//! A streaming `multipart/form-data` decoder with disk spilling for large
//! fields.
//!
//! It accepts any [`Read`](std::io::Read) source as the request body and
//! yields the fields one at a time, without ever holding more than a fixed
//! window of the stream in memory. Nested `multipart/mixed` sections and
//! `multipart/related` bodies are supported, and a field can be saved into a
//! [`SpillBuffer`] which keeps small content in memory and moves large
//! content to a file.
//!
//! # Examples
//!
//! ```
//! use multipart_spill::Multipart;
//!
//! # fn run() -> multipart_spill::Result<()> {
//! let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
//! let mut multipart = Multipart::new(data.as_bytes(), "multipart/form-data; boundary=X-BOUNDARY")?;
//!
//! // Iterate over the fields, use `next_field()` to get the next field.
//! while let Some(field) = multipart.next_field()? {
//!     // Get field name.
//!     let name = field.name().map(str::to_owned);
//!     // Get the field's filename if provided in "Content-Disposition" header.
//!     let file_name = field.file_name().map(str::to_owned);
//!
//!     println!("Name: {:?}, File Name: {:?}", name, file_name);
//!
//!     // Read field content as text.
//!     let content = field.text()?;
//!     println!("Content: {:?}", content);
//! }
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```
//!
//! ## Prevent Denial of Service (DoS) Attacks
//!
//! This crate lets you put limits on the whole stream, on each field, on the
//! header section of a part and on the number of fields, to protect your
//! server from memory and disk exhaustion.
//!
//! ```
//! use multipart_spill::{Constraints, Multipart, SizeLimit};
//!
//! # fn run() -> multipart_spill::Result<()> {
//! # let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
//! let constraints = Constraints::new()
//!     .allowed_fields(vec!["my_text_field", "my_file_field"])
//!     .max_fields(10)
//!     .size_limit(
//!         SizeLimit::new()
//!             // Set 15mb as size limit for the whole stream body.
//!             .whole_stream(15 * 1024 * 1024)
//!             // Set 10mb as size limit for all fields.
//!             .per_field(10 * 1024 * 1024)
//!             // Set 30kb as size limit for a specific field.
//!             .for_field("my_text_field", 30 * 1024),
//!     );
//!
//! let mut multipart = Multipart::with_constraints(
//!     data.as_bytes(),
//!     "multipart/form-data; boundary=X-BOUNDARY",
//!     Some(data.len() as u64),
//!     constraints,
//! )?;
//!
//! while let Some(field) = multipart.next_field()? {
//!     let content = field.text()?;
//!     assert_eq!(content, "abcd");
//! }
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```
//!
//! ## Spilling large fields to disk
//!
//! ```
//! use multipart_spill::{Multipart, SpillOptions};
//! use std::io::Read;
//!
//! # fn run() -> multipart_spill::Result<()> {
//! # let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
//! let options = SpillOptions::new(std::env::temp_dir()).threshold(1024 * 1024);
//! let mut multipart = Multipart::new(data.as_bytes(), "multipart/form-data; boundary=X-BOUNDARY")?;
//!
//! while let Some(field) = multipart.next_field()? {
//!     let spill = field.save(&options)?;
//!     assert!(spill.is_in_memory());
//!
//!     let mut content = String::new();
//!     spill.reader()?.read_to_string(&mut content).unwrap();
//!     assert_eq!(content, "abcd");
//! }
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```
//!
//! ## Optional features
//!
//! - `json`: [`Field::json`] deserializes a field with `serde_json`.
//! - `tokio-io`: [`Multipart::with_async_reader`] decodes a tokio
//!   [`AsyncRead`](tokio::io::AsyncRead) from a blocking task.
//! - `log`: emits decoding events through the `log` facade.

#![cfg_attr(nightly, feature(doc_cfg))]

pub use bytes;
pub use mime;

pub use constraints::Constraints;
pub use error::Error;
pub use field::Field;
pub use multipart::Multipart;
pub use progress::ProgressListener;
pub use size_limit::SizeLimit;
pub use spill::{SpillBuffer, SpillNamer, SpillOptions, SpillReader, SpillState};

mod log;

mod boundary;
mod buffer;
mod constants;
mod constraints;
mod content_disposition;
mod error;
mod field;
mod helpers;
mod limited;
mod multipart;
mod progress;
mod scanner;
mod size_limit;
mod spill;
mod state;

/// A Result type often returned from methods that can have `multipart-spill`
/// errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Parses the `Content-Type` header to extract the boundary value.
///
/// Any `multipart/*` type is accepted.
///
/// # Examples
///
/// ```
/// # fn run() {
/// let content_type = "multipart/form-data; boundary=ABCDEFG";
///
/// assert_eq!(multipart_spill::parse_boundary(content_type), Ok("ABCDEFG".to_owned()));
/// # }
/// # run();
/// ```
pub fn parse_boundary<T: AsRef<str>>(content_type: T) -> Result<String> {
    let m = parse_multipart_type(content_type.as_ref())?;
    boundary_param(&m)
}

pub(crate) fn parse_multipart_type(content_type: &str) -> Result<mime::Mime> {
    let m = content_type
        .parse::<mime::Mime>()
        .map_err(|cause| Error::DecodeContentType {
            content_type: content_type.to_owned(),
            cause,
        })?;

    if m.type_() != mime::MULTIPART {
        return Err(Error::NoMultipart {
            content_type: content_type.to_owned(),
        });
    }

    Ok(m)
}

pub(crate) fn boundary_param(m: &mime::Mime) -> Result<String> {
    m.get_param(mime::BOUNDARY)
        .map(|name| name.as_str().to_owned())
        .filter(|name| !name.is_empty())
        .ok_or(Error::NoBoundary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_boundary() {
        let content_type = "multipart/form-data; boundary=ABCDEFG";
        assert_eq!(parse_boundary(content_type), Ok("ABCDEFG".to_owned()));

        let content_type = "multipart/form-data; boundary=------ABCDEFG";
        assert_eq!(parse_boundary(content_type), Ok("------ABCDEFG".to_owned()));

        let content_type = "multipart/mixed; boundary=\"quoted-boundary\"";
        assert_eq!(parse_boundary(content_type), Ok("quoted-boundary".to_owned()));

        let content_type = "Multipart/Related; type=\"text/xml\"; boundary=rel";
        assert_eq!(parse_boundary(content_type), Ok("rel".to_owned()));

        let content_type = "boundary=------ABCDEFG";
        assert!(matches!(
            parse_boundary(content_type),
            Err(Error::DecodeContentType { .. })
        ));

        let content_type = "text/plain";
        assert!(matches!(parse_boundary(content_type), Err(Error::NoMultipart { .. })));

        let content_type = "text/plain; boundary=------ABCDEFG";
        assert!(matches!(parse_boundary(content_type), Err(Error::NoMultipart { .. })));

        let content_type = "multipart/form-data";
        assert_eq!(parse_boundary(content_type), Err(Error::NoBoundary));
    }
}
