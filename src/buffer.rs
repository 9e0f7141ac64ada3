use crate::progress::Progress;
use std::io::{self, Read};

/// Outcome of a refill of the [`StreamBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fill {
    /// This many fresh bytes were appended.
    Data(usize),
    /// The transport has no more data.
    Eof,
}

/// A fixed-capacity window over the transport.
///
/// Unread bytes live in `buf[head..tail]` with `head <= tail <= buf.len()`.
/// The window only moves through [`consume`](StreamBuffer::consume) and
/// [`refill`](StreamBuffer::refill).
pub(crate) struct StreamBuffer<R> {
    reader: Option<R>,
    buf: Box<[u8]>,
    head: usize,
    tail: usize,
    progress: Progress,
}

impl<R: Read> StreamBuffer<R> {
    pub(crate) fn new(reader: R, capacity: usize, progress: Progress) -> Self {
        StreamBuffer {
            reader: Some(reader),
            buf: vec![0; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            progress,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.tail - self.head
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    /// The unread bytes.
    pub(crate) fn window(&self) -> &[u8] {
        &self.buf[self.head..self.tail]
    }

    pub(crate) fn consume(&mut self, count: usize) {
        debug_assert!(count <= self.len());
        self.head += count;
    }

    pub(crate) fn progress_mut(&mut self) -> &mut Progress {
        &mut self.progress
    }

    /// Returns the next byte, refilling when the window is empty. `None`
    /// means the transport is exhausted.
    pub(crate) fn read_byte(&mut self, context: &'static str) -> crate::Result<Option<u8>> {
        if self.head == self.tail {
            if let Fill::Eof = self.refill(context)? {
                return Ok(None);
            }
        }

        let byte = self.buf[self.head];
        self.head += 1;
        Ok(Some(byte))
    }

    /// Moves the unread bytes to the front of the buffer and appends the
    /// result of one transport read behind them.
    pub(crate) fn refill(&mut self, context: &'static str) -> crate::Result<Fill> {
        let reader = self.reader.as_mut().ok_or(crate::Error::StreamClosed)?;

        if self.head > 0 {
            self.buf.copy_within(self.head..self.tail, 0);
            self.tail -= self.head;
            self.head = 0;
        }

        if self.tail == self.buf.len() {
            return Ok(Fill::Data(0));
        }

        let count = loop {
            match reader.read(&mut self.buf[self.tail..]) {
                Ok(count) => break count,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(crate::Error::from_io(err, context)),
            }
        };

        if count == 0 {
            return Ok(Fill::Eof);
        }

        self.tail += count;
        self.progress.note_bytes_read(count);
        Ok(Fill::Data(count))
    }

    /// Drops the transport without reading what is left of it.
    pub(crate) fn hard_close(&mut self) {
        self.reader = None;
        self.head = 0;
        self.tail = 0;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Hands out its data in reads of at most `step` bytes.
    pub(crate) struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl<'a> Trickle<'a> {
        pub(crate) fn new(data: &'a [u8], step: usize) -> Self {
            Trickle { data, step }
        }
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let count = self.step.min(buf.len()).min(self.data.len());
            buf[..count].copy_from_slice(&self.data[..count]);
            self.data = &self.data[count..];
            Ok(count)
        }
    }

    fn buffer(data: &[u8], step: usize, capacity: usize) -> StreamBuffer<Trickle<'_>> {
        StreamBuffer::new(Trickle::new(data, step), capacity, Progress::new(None, None))
    }

    #[test]
    fn test_read_byte_refills() {
        let mut buf = buffer(b"abc", 2, 8);
        assert_eq!(buf.read_byte("test").unwrap(), Some(b'a'));
        assert_eq!(buf.read_byte("test").unwrap(), Some(b'b'));
        assert_eq!(buf.read_byte("test").unwrap(), Some(b'c'));
        assert_eq!(buf.read_byte("test").unwrap(), None);
        assert_eq!(buf.progress_mut().bytes_read(), 3);
    }

    #[test]
    fn test_refill_keeps_unread_bytes() {
        let mut buf = buffer(b"0123456789", 4, 6);
        assert_eq!(buf.refill("test").unwrap(), Fill::Data(4));
        buf.consume(2);
        assert_eq!(buf.window(), b"23");

        assert_eq!(buf.refill("test").unwrap(), Fill::Data(4));
        assert_eq!(buf.window(), b"234567");

        assert_eq!(buf.refill("test").unwrap(), Fill::Data(0));
        buf.consume(6);
        assert_eq!(buf.refill("test").unwrap(), Fill::Data(2));
        assert_eq!(buf.window(), b"89");
        buf.consume(2);
        assert_eq!(buf.refill("test").unwrap(), Fill::Eof);
    }

    #[test]
    fn test_hard_close() {
        let mut buf = buffer(b"abc", 3, 4);
        buf.refill("test").unwrap();
        buf.hard_close();

        assert!(buf.is_closed());
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.read_byte("test"), Err(crate::Error::StreamClosed));
    }
}
