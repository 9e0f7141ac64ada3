use crate::boundary::Boundary;
use crate::buffer::{Fill, StreamBuffer};
use crate::constants;
use crate::log::{trace, warning};
use crate::progress::Progress;
use crate::Error;
use bytes::Bytes;
use encoding_rs::Encoding;
use std::io::Read;

/// Position of the current field body relative to the next delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Body {
    /// No delimiter in the window yet. The last `pad` bytes may be the start
    /// of one and are held back.
    Searching { pad: usize },
    /// The delimiter starts `remaining` bytes into the window.
    Found { remaining: usize },
}

/// Splits the transport at delimiters of the active [`Boundary`].
///
/// At most one body is open at a time; it ends right before the next
/// delimiter, which is then consumed by [`read_boundary`](Self::read_boundary).
pub(crate) struct BoundaryScanner<R> {
    buffer: StreamBuffer<R>,
    boundary: Boundary,
    body: Option<Body>,
    max_header_size: usize,
    header_encoding: &'static Encoding,
}

impl<R: Read> BoundaryScanner<R> {
    pub(crate) fn new(
        reader: R,
        token: &[u8],
        buffer_size: usize,
        max_header_size: usize,
        header_encoding: &'static Encoding,
        progress: Progress,
    ) -> crate::Result<Self> {
        let boundary = Boundary::new(token);
        let boundary_len = boundary.full_len();

        if buffer_size < boundary_len + 1 {
            return Err(Error::BoundaryTooLong {
                len: token.len(),
                buffer_size,
            });
        }

        let capacity = buffer_size.max(2 * boundary_len);

        Ok(BoundaryScanner {
            buffer: StreamBuffer::new(reader, capacity, progress),
            boundary,
            body: None,
            max_header_size,
            header_encoding,
        })
    }

    pub(crate) fn note_item(&mut self) {
        self.buffer.progress_mut().note_item();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.buffer.is_closed()
    }

    /// Offset of the first complete delimiter in the unread bytes.
    pub(crate) fn find_separator(&self) -> Option<usize> {
        self.boundary.find_in(self.buffer.window())
    }

    /// Switches to the delimiter of a nested section, or back.
    pub(crate) fn set_boundary(&mut self, token: &[u8]) -> crate::Result<()> {
        self.boundary
            .set_token(token)
            .map_err(|expected| Error::NestedBoundaryMismatch {
                expected,
                actual: token.len(),
            })
    }

    /// Discards everything up to the first delimiter, which may come without
    /// a leading CRLF, and consumes it.
    ///
    /// Returns `false` when the stream holds no encapsulation at all.
    pub(crate) fn skip_preamble(&mut self) -> crate::Result<bool> {
        self.boundary.strip_leading_crlf();
        let result = self.discard_body().and_then(|()| self.read_boundary());
        self.boundary.restore_leading_crlf();

        match result {
            Err(Error::IncompleteStream) | Err(Error::InvalidBoundaryTrailer(_)) => {
                trace!("no encapsulation found while skipping the preamble");
                Ok(false)
            }
            result => result,
        }
    }

    /// Consumes the delimiter at the start of the window and the two bytes
    /// following it. Returns `true` when another encapsulation follows and
    /// `false` on the terminating `--`.
    pub(crate) fn read_boundary(&mut self) -> crate::Result<bool> {
        let delimiter_len = self.boundary.active().len();
        if !self.buffer.window().starts_with(self.boundary.active()) {
            return Err(Error::IncompleteStream);
        }
        self.buffer.consume(delimiter_len);

        let first = self.read_trailer_byte()?;
        if first == constants::LF {
            warning!("boundary followed by a bare LF, accepting it as CRLF");
            return Ok(true);
        }

        let second = self.read_trailer_byte()?;
        match [first, second] {
            [constants::DASH, constants::DASH] => Ok(false),
            [constants::CR, constants::LF] => Ok(true),
            trailer => Err(Error::InvalidBoundaryTrailer(trailer)),
        }
    }

    fn read_trailer_byte(&mut self) -> crate::Result<u8> {
        self.buffer
            .read_byte("reading boundary")?
            .ok_or(Error::IncompleteStream)
    }

    /// Reads the header section of an encapsulation up to and including the
    /// blank line, decoded with the configured charset.
    pub(crate) fn read_headers(&mut self) -> crate::Result<String> {
        let terminator = constants::CRLF_CRLF;
        let mut raw = Vec::new();
        let mut matched = 0;

        while matched < terminator.len() {
            let byte = self
                .buffer
                .read_byte("reading field headers")?
                .ok_or(Error::IncompleteStream)?;

            if raw.len() == self.max_header_size {
                return Err(Error::HeadersSizeExceeded {
                    limit: self.max_header_size,
                    actual: raw.len() + 1,
                });
            }
            raw.push(byte);

            matched = if byte == terminator[matched] {
                matched + 1
            } else if byte == constants::CR {
                1
            } else {
                0
            };

            // An encapsulation without any header line.
            if matched == constants::CRLF.len() && raw.len() == constants::CRLF.len() {
                break;
            }
        }

        let (text, _) = self.header_encoding.decode_without_bom_handling(&raw);
        Ok(text.into_owned())
    }

    /// Starts a body at the current position.
    pub(crate) fn open_body(&mut self) {
        self.body = Some(self.locate());
    }

    /// Reads body bytes into `out`. Returns 0 once the delimiter is reached.
    pub(crate) fn read_body(&mut self, out: &mut [u8]) -> crate::Result<usize> {
        if out.is_empty() || self.body.is_none() {
            return Ok(0);
        }

        let count = self.take_available()?.min(out.len());
        out[..count].copy_from_slice(&self.buffer.window()[..count]);
        self.advance(count);
        Ok(count)
    }

    /// Returns every body byte that is currently known not to belong to the
    /// delimiter, refilling when there are none.
    pub(crate) fn body_chunk(&mut self) -> crate::Result<Option<Bytes>> {
        if self.body.is_none() {
            return Ok(None);
        }

        let count = self.take_available()?;
        if count == 0 {
            return Ok(None);
        }

        let chunk = Bytes::copy_from_slice(&self.buffer.window()[..count]);
        self.advance(count);
        Ok(Some(chunk))
    }

    /// Soft close: reads the open body up to the delimiter and drops it.
    pub(crate) fn close_body(&mut self) -> crate::Result<u64> {
        let mut skipped = 0;

        if self.body.is_some() {
            loop {
                let count = self.take_available()?;
                if count == 0 {
                    break;
                }
                self.advance(count);
                skipped += count as u64;
            }
            self.body = None;
        }

        Ok(skipped)
    }

    /// Skips everything up to the next delimiter.
    pub(crate) fn discard_body(&mut self) -> crate::Result<()> {
        self.open_body();
        let skipped = self.close_body()?;
        trace!("discarded {} bytes", skipped);
        Ok(())
    }

    /// Hard close: drops the transport instead of searching the rest of it
    /// for a delimiter.
    pub(crate) fn hard_close(&mut self) {
        self.body = None;
        self.buffer.hard_close();
    }

    fn locate(&self) -> Body {
        match self.find_separator() {
            Some(remaining) => Body::Found { remaining },
            None => Body::Searching {
                pad: self.buffer.len().min(self.boundary.full_len()),
            },
        }
    }

    fn available(&self) -> usize {
        match self.body {
            Some(Body::Found { remaining }) => remaining,
            Some(Body::Searching { pad }) => self.buffer.len() - pad,
            None => 0,
        }
    }

    fn take_available(&mut self) -> crate::Result<usize> {
        match self.available() {
            0 => self.make_available(),
            available => Ok(available),
        }
    }

    /// Refills until body bytes are available or the delimiter shows up.
    /// The held back bytes are kept, so a delimiter straddling two reads is
    /// still found.
    fn make_available(&mut self) -> crate::Result<usize> {
        while let Some(Body::Searching { .. }) = self.body {
            if let Fill::Eof = self.buffer.refill("reading field data")? {
                return Err(Error::IncompleteStream);
            }

            self.body = Some(self.locate());

            let available = self.available();
            if available > 0 || matches!(self.body, Some(Body::Found { .. })) {
                return Ok(available);
            }
        }

        Ok(0)
    }

    fn advance(&mut self, count: usize) {
        self.buffer.consume(count);
        if let Some(Body::Found { remaining }) = self.body.as_mut() {
            *remaining -= count;
        }
    }
}
