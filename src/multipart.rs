use crate::constants;
use crate::constraints::Constraints;
use crate::content_disposition::ContentDisposition;
use crate::field::{Field, FieldMeta};
use crate::helpers;
use crate::limited::LimitedReader;
use crate::log::{debug, trace};
use crate::progress::Progress;
use crate::scanner::BoundaryScanner;
use crate::state::{MultipartState, StreamingStage};
use crate::Error;
use encoding_rs::{Encoding, UTF_8};
use http::header::{self, HeaderMap};
use std::io::Read;
#[cfg(feature = "tokio-io")]
use tokio::io::AsyncRead;
#[cfg(feature = "tokio-io")]
use tokio_util::io::SyncIoBridge;

/// Represents the implementation of `multipart/form-data` formatted data.
///
/// This will parse the source reader into [`Field`] instances via
/// [`next_field`](Multipart::next_field).
///
/// To maintain consistency in the underlying stream, this will not yield
/// more than one [`Field`] at a time: a field borrows the `Multipart`, and
/// asking for the next one drops whatever the previous field left unread.
///
/// Nested `multipart/mixed` sections are flattened: each of their files is
/// yielded as a field carrying the name of the enclosing field. A
/// `multipart/related` body yields unnamed, non-form fields.
///
/// # Examples
///
/// ```
/// use multipart_spill::Multipart;
///
/// # fn run() -> multipart_spill::Result<()> {
/// let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
/// let mut multipart = Multipart::new(data.as_bytes(), "multipart/form-data; boundary=X-BOUNDARY")?;
///
/// while let Some(field) = multipart.next_field()? {
///     println!("Field: {:?}", field.text()?);
/// }
/// # Ok(())
/// # }
/// # run().unwrap();
/// ```
pub struct Multipart<R> {
    state: MultipartState<R>,
    constraints: Constraints,
}

impl<R: Read> Multipart<R> {
    /// Construct a new `Multipart` instance with the given reader and the
    /// request's `Content-Type`.
    pub fn new<T: AsRef<str>>(reader: R, content_type: T) -> crate::Result<Multipart<R>> {
        Multipart::with_constraints(reader, content_type, None, Constraints::default())
    }

    /// Construct a new `Multipart` instance with the given reader, the
    /// request's `Content-Type` and announced length, and some
    /// [`Constraints`].
    ///
    /// A content length beyond the whole stream limit is rejected before
    /// anything is read.
    pub fn with_constraints<T: AsRef<str>>(
        reader: R,
        content_type: T,
        content_length: Option<u64>,
        mut constraints: Constraints,
    ) -> crate::Result<Multipart<R>> {
        let content_type = content_type.as_ref();
        let mime = crate::parse_multipart_type(content_type)?;

        let boundary = crate::boundary_param(&mime)?;
        let related = mime.subtype().as_str().eq_ignore_ascii_case(constants::RELATED);

        let header_encoding = match constraints.header_encoding {
            Some(encoding) => encoding,
            None => match mime.get_param(mime::CHARSET) {
                Some(label) => Encoding::for_label(label.as_str().as_bytes())
                    .ok_or_else(|| Error::UnsupportedCharset(label.as_str().to_owned()))?,
                None => UTF_8,
            },
        };

        let whole_stream = constraints.size_limit.whole_stream;
        if let Some(length) = content_length {
            if length > whole_stream {
                return Err(Error::StreamSizeExceeded {
                    limit: whole_stream,
                    actual: length,
                });
            }
        }

        let scanner = BoundaryScanner::new(
            LimitedReader::new(reader, whole_stream),
            boundary.as_bytes(),
            constraints.buffer_size,
            constraints.max_header_size,
            header_encoding,
            Progress::new(constraints.progress.take(), content_length),
        )?;

        debug!("decoding {} with boundary {:?}", mime.essence_str(), boundary);

        let state = MultipartState {
            scanner,
            boundary,
            stage: StreamingStage::FindingFirstBoundary,
            related,
            next_field_idx: 0,
            curr_field_name: None,
        };

        Ok(Multipart { state, constraints })
    }

    /// Construct a new `Multipart` instance from an [`http::Request`] whose
    /// body is a reader. The `Content-Type` and `Content-Length` are taken
    /// from its headers.
    pub fn from_request(request: http::Request<R>, constraints: Constraints) -> crate::Result<Multipart<R>> {
        let (parts, body) = request.into_parts();

        let content_type = helpers::header_str(&parts.headers, &header::CONTENT_TYPE).ok_or_else(|| {
            Error::NoMultipart {
                content_type: String::new(),
            }
        })?;
        let content_length = helpers::content_length(&parts.headers);

        Multipart::with_constraints(body, content_type, content_length, constraints)
    }

    /// Yields the next [`Field`] if available.
    ///
    /// Returns `Ok(None)` once the stream is over, every time it is asked
    /// again. Any error ends the stream: the underlying reader is dropped and
    /// later calls fail with [`Error::StreamClosed`].
    pub fn next_field(&mut self) -> crate::Result<Option<Field<'_, R>>> {
        match self.state.stage {
            StreamingStage::Eof => return Ok(None),
            StreamingStage::Aborted => return Err(Error::StreamClosed),
            _ => {}
        }

        match self.find_next_field() {
            Ok(Some((headers, meta, size_limit))) => Ok(Some(Field::new(&mut self.state, headers, meta, size_limit))),
            Ok(None) => {
                trace!("end of multipart stream");
                self.state.stage = StreamingStage::Eof;
                Ok(None)
            }
            Err(err) => {
                self.state.abort();
                Err(err)
            }
        }
    }

    /// Yields the next [`Field`] with their positioning index as a tuple
    /// `(usize, Field)`.
    ///
    /// # Examples
    ///
    /// ```
    /// use multipart_spill::Multipart;
    ///
    /// # fn run() -> multipart_spill::Result<()> {
    /// let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
    /// let mut multipart = Multipart::new(data.as_bytes(), "multipart/form-data; boundary=X-BOUNDARY")?;
    ///
    /// while let Some((idx, field)) = multipart.next_field_with_idx()? {
    ///     println!("Index: {:?}, Content: {:?}", idx, field.text()?);
    /// }
    /// # Ok(())
    /// # }
    /// # run().unwrap();
    /// ```
    pub fn next_field_with_idx(&mut self) -> crate::Result<Option<(usize, Field<'_, R>)>> {
        self.next_field().map(|f| f.map(|field| (field.index(), field)))
    }

    /// Whether the underlying reader was dropped, after an error or by
    /// [`close`](Multipart::close).
    pub fn is_closed(&self) -> bool {
        self.state.scanner.is_closed()
    }

    /// Drops the underlying reader without looking at what is left in it.
    /// Later calls to [`next_field`](Multipart::next_field) return `Ok(None)`,
    /// or [`Error::StreamClosed`] if the stream was already aborted.
    pub fn close(&mut self) {
        if self.state.stage != StreamingStage::Aborted {
            self.state.stage = StreamingStage::Eof;
        }
        self.state.scanner.hard_close();
    }

    fn find_next_field(&mut self) -> crate::Result<Option<(HeaderMap, FieldMeta, u64)>> {
        let state = &mut self.state;

        if state.stage == StreamingStage::ReadingFieldData {
            state.scanner.close_body()?;
            state.stage = StreamingStage::ReadingBoundary;
        }

        loop {
            let has_next = if state.stage == StreamingStage::FindingFirstBoundary {
                state.scanner.skip_preamble()?
            } else {
                state.scanner.read_boundary()?
            };
            state.stage = StreamingStage::ReadingBoundary;

            if !has_next {
                match state.curr_field_name.take() {
                    None => return Ok(None),
                    Some(field_name) => {
                        debug!("nested section of field '{}' ended", field_name);
                        state.scanner.set_boundary(state.boundary.as_bytes())?;
                        state.scanner.discard_body()?;
                        continue;
                    }
                }
            }

            let headers = helpers::parse_headers(&state.scanner.read_headers()?)?;

            let (field_name, file_name) = if state.related {
                (None, None)
            } else {
                let content_disposition = ContentDisposition::parse(&headers);

                match (state.curr_field_name.clone(), content_disposition.field_name) {
                    (Some(outer_name), _) => match content_disposition.file_name {
                        Some(file_name) => (Some(outer_name), Some(file_name)),
                        None => {
                            trace!("skipping nested part without a file name");
                            state.scanner.discard_body()?;
                            continue;
                        }
                    },
                    (None, Some(field_name)) => {
                        if let Some(sub_boundary) = nested_mixed_boundary(&headers)? {
                            debug!("field '{}' holds a nested multipart/mixed section", field_name);
                            state.scanner.set_boundary(sub_boundary.as_bytes())?;
                            state.curr_field_name = Some(field_name);
                            state.stage = StreamingStage::FindingFirstBoundary;
                            continue;
                        }
                        (Some(field_name), content_disposition.file_name)
                    }
                    (None, None) => {
                        trace!("skipping part without a field name");
                        state.scanner.discard_body()?;
                        continue;
                    }
                }
            };

            if !state.related && !self.constraints.is_it_allowed(field_name.as_deref()) {
                return Err(Error::UnknownField { field_name });
            }

            if let Some(max_fields) = self.constraints.max_fields {
                if state.next_field_idx >= max_fields {
                    return Err(Error::FieldCountExceeded {
                        limit: max_fields,
                        actual: state.next_field_idx + 1,
                    });
                }
            }

            let size_limit = self
                .constraints
                .size_limit
                .extract_size_limit_for(field_name.as_deref());
            let content_length = helpers::content_length(&headers);

            if let Some(length) = content_length {
                if length > size_limit {
                    return Err(Error::FieldSizeExceeded {
                        limit: size_limit,
                        actual: length,
                        field_name,
                        file_name,
                    });
                }
            }

            let meta = FieldMeta {
                form_field: !state.related && state.curr_field_name.is_none() && file_name.is_none(),
                name: field_name,
                file_name,
                content_type: helpers::content_type(&headers),
                content_length,
                idx: state.next_field_idx,
            };

            state.next_field_idx += 1;
            state.scanner.note_item();
            state.scanner.open_body();
            state.stage = StreamingStage::ReadingFieldData;

            return Ok(Some((headers, meta, size_limit)));
        }
    }
}

#[cfg(feature = "tokio-io")]
#[cfg_attr(nightly, doc(cfg(feature = "tokio-io")))]
impl<A: AsyncRead + Unpin> Multipart<SyncIoBridge<A>> {
    /// Construct a new `Multipart` instance over a tokio
    /// [`AsyncRead`](tokio::io::AsyncRead).
    ///
    /// Decoding blocks the calling thread, so this must be called inside a
    /// runtime and the `Multipart` driven from a blocking task such as
    /// [`spawn_blocking`](tokio::task::spawn_blocking).
    ///
    /// # Optional
    ///
    /// This requires the optional `tokio-io` feature to be enabled.
    pub fn with_async_reader<T: AsRef<str>>(
        reader: A,
        content_type: T,
        content_length: Option<u64>,
        constraints: Constraints,
    ) -> crate::Result<Self> {
        Multipart::with_constraints(SyncIoBridge::new(reader), content_type, content_length, constraints)
    }
}

/// Returns the boundary of a `multipart/mixed` field, if it is one.
fn nested_mixed_boundary(headers: &HeaderMap) -> crate::Result<Option<String>> {
    let content_type = match helpers::header_str(headers, &header::CONTENT_TYPE) {
        Some(content_type) => content_type,
        None => return Ok(None),
    };

    if !content_type
        .trim_start()
        .to_ascii_lowercase()
        .starts_with(constants::MULTIPART_MIXED)
    {
        return Ok(None);
    }

    crate::parse_boundary(content_type).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_errors() {
        assert!(matches!(
            Multipart::new(&b""[..], "text/plain"),
            Err(Error::NoMultipart { content_type }) if content_type == "text/plain"
        ));
        assert!(matches!(
            Multipart::new(&b""[..], "multipart/form-data"),
            Err(Error::NoBoundary)
        ));
        assert!(matches!(
            Multipart::new(&b""[..], "not a content type"),
            Err(Error::DecodeContentType { .. })
        ));

        let long = "x".repeat(100);
        let result = Multipart::with_constraints(
            &b""[..],
            format!("multipart/form-data; boundary={}", long),
            None,
            Constraints::new().buffer_size(64),
        );
        assert!(matches!(result, Err(Error::BoundaryTooLong { len: 100, buffer_size: 64 })));
    }

    #[test]
    fn test_unsupported_request_charset() {
        assert!(matches!(
            Multipart::new(&b""[..], "multipart/form-data; boundary=abc; charset=klingon"),
            Err(Error::UnsupportedCharset(label)) if label == "klingon"
        ));
    }

    #[test]
    fn test_nested_mixed_boundary() {
        let mut headers = HeaderMap::new();
        assert_eq!(nested_mixed_boundary(&headers), Ok(None));

        headers.insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());
        assert_eq!(nested_mixed_boundary(&headers), Ok(None));

        headers.insert(header::CONTENT_TYPE, "Multipart/Mixed; boundary=BbC04y".parse().unwrap());
        assert_eq!(nested_mixed_boundary(&headers), Ok(Some("BbC04y".to_owned())));

        headers.insert(header::CONTENT_TYPE, "multipart/mixed".parse().unwrap());
        assert_eq!(nested_mixed_boundary(&headers), Err(Error::NoBoundary));
    }
}
