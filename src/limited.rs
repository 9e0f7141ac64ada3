use crate::Error;
use std::io::{self, Read};

/// Counts bytes against a ceiling. Exactly `limit` bytes pass; the first
/// byte beyond it trips the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ceiling {
    limit: u64,
    count: u64,
}

impl Ceiling {
    pub(crate) fn new(limit: u64) -> Ceiling {
        Ceiling { limit, count: 0 }
    }

    pub(crate) fn limit(&self) -> u64 {
        self.limit
    }

    pub(crate) fn count(&self) -> u64 {
        self.count
    }

    /// Records `amount` more bytes. Returns the total seen so far as the
    /// error once it exceeds the limit.
    pub(crate) fn add(&mut self, amount: usize) -> Result<(), u64> {
        self.count = self.count.saturating_add(amount as u64);
        if self.count > self.limit {
            Err(self.count)
        } else {
            Ok(())
        }
    }
}

/// Guards the transport with the ceiling of the whole stream, so that an
/// under-reported or missing content length cannot bypass it.
pub(crate) struct LimitedReader<R> {
    inner: R,
    ceiling: Ceiling,
}

impl<R> LimitedReader<R> {
    pub(crate) fn new(inner: R, limit: u64) -> LimitedReader<R> {
        LimitedReader {
            inner,
            ceiling: Ceiling::new(limit),
        }
    }
}

impl<R: Read> Read for LimitedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.inner.read(buf)?;

        if let Err(actual) = self.ceiling.add(count) {
            return Err(Error::StreamSizeExceeded {
                limit: self.ceiling.limit(),
                actual,
            }
            .into());
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceiling_accepts_exactly_the_limit() {
        let mut ceiling = Ceiling::new(5);
        assert_eq!(ceiling.add(3), Ok(()));
        assert_eq!(ceiling.add(2), Ok(()));
        assert_eq!(ceiling.count(), 5);
        assert_eq!(ceiling.add(1), Err(6));
    }

    #[test]
    fn test_limited_reader() {
        let mut reader = LimitedReader::new(&b"0123456789"[..], 8);
        let mut buf = [0; 4];

        assert_eq!(reader.read(&mut buf).unwrap(), 4);
        assert_eq!(reader.read(&mut buf).unwrap(), 4);

        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(
            Error::from_io(err, "test"),
            Error::StreamSizeExceeded { limit: 8, actual: 10 }
        );
    }

    #[test]
    fn test_unlimited_reader() {
        let mut reader = LimitedReader::new(&b"0123456789"[..], u64::MAX);
        let mut out = Vec::new();
        assert_eq!(reader.read_to_end(&mut out).unwrap(), 10);
    }
}
