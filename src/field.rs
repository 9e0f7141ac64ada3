use crate::limited::Ceiling;
use crate::log::trace;
use crate::spill::{SpillBuffer, SpillOptions};
use crate::state::{MultipartState, StreamingStage};
use crate::Error;
use bytes::{Bytes, BytesMut};
use encoding_rs::{Encoding, UTF_8};
use http::header::HeaderMap;
#[cfg(feature = "json")]
use serde::de::DeserializeOwned;
use std::fmt::{self, Debug};
use std::io::{self, Read};

/// A single field in a multipart stream.
///
/// Its content can be accessed via the [`Read`] implementation or with the
/// methods defined on this type.
///
/// A field borrows its [`Multipart`](crate::Multipart), so only one can be
/// alive at a time. Bytes it leaves unread are skipped when the next field
/// is requested.
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
///     let content = field.text()?;
///     assert_eq!(content, "abcd");
/// }
/// # Ok(())
/// # }
/// # run().unwrap();
/// ```
pub struct Field<'a, R> {
    state: &'a mut MultipartState<R>,
    headers: HeaderMap,
    done: bool,
    meta: FieldMeta,
    ceiling: Ceiling,
}

#[derive(Debug)]
pub(crate) struct FieldMeta {
    pub(crate) name: Option<String>,
    pub(crate) file_name: Option<String>,
    pub(crate) content_type: Option<mime::Mime>,
    pub(crate) content_length: Option<u64>,
    pub(crate) form_field: bool,
    pub(crate) idx: usize,
}

impl<'a, R: Read> Field<'a, R> {
    pub(crate) fn new(state: &'a mut MultipartState<R>, headers: HeaderMap, meta: FieldMeta, size_limit: u64) -> Self {
        Field {
            state,
            headers,
            done: false,
            meta,
            ceiling: Ceiling::new(size_limit),
        }
    }

    /// The field name found in the
    /// [`Content-Disposition`](http::header::CONTENT_DISPOSITION) header.
    ///
    /// Files of a nested `multipart/mixed` section carry the name of the
    /// enclosing field; parts of a `multipart/related` body have none.
    pub fn name(&self) -> Option<&str> {
        self.meta.name.as_deref()
    }

    /// The file name found in the
    /// [`Content-Disposition`](http::header::CONTENT_DISPOSITION) header.
    ///
    /// The value is sent by the client and must not be trusted as a path.
    pub fn file_name(&self) -> Option<&str> {
        self.meta.file_name.as_deref()
    }

    /// Get the content type of the field.
    pub fn content_type(&self) -> Option<&mime::Mime> {
        self.meta.content_type.as_ref()
    }

    /// Get a map of headers as [`HeaderMap`].
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The `Content-Length` the part declared for itself, if any.
    pub fn content_length(&self) -> Option<u64> {
        self.meta.content_length
    }

    /// Whether this is a plain form field rather than a file.
    pub fn is_form_field(&self) -> bool {
        self.meta.form_field
    }

    /// Get the index of this field in order they appeared in the stream.
    pub fn index(&self) -> usize {
        self.meta.idx
    }

    /// Get the next chunk of the field data, `None` once the field is over.
    pub fn chunk(&mut self) -> crate::Result<Option<Bytes>> {
        if self.done {
            return Ok(None);
        }
        self.check_open()?;

        let result = self.state.scanner.body_chunk();
        match self.guard(result)? {
            Some(chunk) => {
                self.count(chunk.len())?;
                Ok(Some(chunk))
            }
            None => {
                self.finish()?;
                Ok(None)
            }
        }
    }

    /// Get the full data of the field as [`Bytes`].
    pub fn bytes(mut self) -> crate::Result<Bytes> {
        let mut buf = BytesMut::new();

        while let Some(bytes) = self.chunk()? {
            buf.extend_from_slice(&bytes);
        }

        Ok(buf.freeze())
    }

    /// Try to deserialize the field data as JSON.
    ///
    /// # Optional
    ///
    /// This requires the optional `json` feature to be enabled.
    #[cfg(feature = "json")]
    #[cfg_attr(nightly, doc(cfg(feature = "json")))]
    pub fn json<T: DeserializeOwned>(self) -> crate::Result<T> {
        serde_json::from_slice(&self.bytes()?).map_err(Error::DecodeJson)
    }

    /// Get the full field data as text, decoded with the charset of the
    /// field's `Content-Type`, or UTF-8.
    pub fn text(self) -> crate::Result<String> {
        self.text_with_charset("utf-8")
    }

    /// Get the full field data as text given a specific encoding.
    ///
    /// The charset of the field's `Content-Type` wins over
    /// `default_encoding`; an unknown label falls back to UTF-8.
    pub fn text_with_charset(self, default_encoding: &str) -> crate::Result<String> {
        let encoding_name = self
            .content_type()
            .and_then(|mime| mime.get_param(mime::CHARSET))
            .map(|charset| charset.as_str().to_owned())
            .unwrap_or_else(|| default_encoding.to_owned());

        let encoding = Encoding::for_label(encoding_name.as_bytes()).unwrap_or(UTF_8);

        let bytes = self.bytes()?;

        let (text, _, _) = encoding.decode(&bytes);

        Ok(text.into_owned())
    }

    /// Streams the field data into a [`SpillBuffer`] created from
    /// `options`, which is closed and ready to be read back when returned.
    pub fn save(mut self, options: &SpillOptions) -> crate::Result<SpillBuffer> {
        let mut spill = options.create()?;

        while let Some(chunk) = self.chunk()? {
            spill.write_bytes(&chunk)?;
        }
        spill.close()?;

        trace!("saved field {} ({} bytes)", self.meta.idx, spill.len());
        Ok(spill)
    }

    /// Skips the rest of the field data without counting it against the
    /// field size limit. Calling it again does nothing.
    pub fn close(&mut self) -> crate::Result<()> {
        if self.done {
            return Ok(());
        }
        self.check_open()?;
        self.finish()
    }

    fn read_inner(&mut self, buf: &mut [u8]) -> crate::Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }
        self.check_open()?;

        let result = self.state.scanner.read_body(buf);
        let count = self.guard(result)?;

        if count == 0 {
            self.finish()?;
        } else {
            self.count(count)?;
        }

        Ok(count)
    }

    fn check_open(&self) -> crate::Result<()> {
        if self.state.stage == StreamingStage::ReadingFieldData {
            Ok(())
        } else {
            Err(Error::StreamClosed)
        }
    }

    /// Ends the session on any decoding error.
    fn guard<T>(&mut self, result: crate::Result<T>) -> crate::Result<T> {
        if result.is_err() {
            self.done = true;
            self.state.abort();
        }
        result
    }

    fn count(&mut self, amount: usize) -> crate::Result<()> {
        match self.ceiling.add(amount) {
            Ok(()) => Ok(()),
            Err(actual) => {
                let err = Error::FieldSizeExceeded {
                    limit: self.ceiling.limit(),
                    actual,
                    field_name: self.meta.name.clone(),
                    file_name: self.meta.file_name.clone(),
                };
                self.guard(Err(err))
            }
        }
    }

    fn finish(&mut self) -> crate::Result<()> {
        let result = self.state.scanner.close_body();
        self.guard(result)?;

        trace!("field {} done after {} bytes", self.meta.idx, self.ceiling.count());
        self.done = true;
        self.state.stage = StreamingStage::ReadingBoundary;
        Ok(())
    }
}

impl<'a, R: Read> Read for Field<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_inner(buf).map_err(io::Error::from)
    }
}

impl<'a, R> Debug for Field<'a, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("meta", &self.meta)
            .field("headers", &self.headers)
            .field("done", &self.done)
            .finish()
    }
}
