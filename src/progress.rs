/// Observes the progress of a decoding session.
///
/// Called with the number of bytes read from the transport so far, the
/// announced content length (if any) and the number of fields recognized so
/// far. It is invoked after every buffer refill and every new field; it
/// cannot influence decoding.
pub trait ProgressListener: Send {
    fn update(&mut self, bytes_read: u64, content_length: Option<u64>, items: usize);
}

impl<F> ProgressListener for F
where
    F: FnMut(u64, Option<u64>, usize) + Send,
{
    fn update(&mut self, bytes_read: u64, content_length: Option<u64>, items: usize) {
        self(bytes_read, content_length, items)
    }
}

/// Cumulative counters of one session.
pub(crate) struct Progress {
    listener: Option<Box<dyn ProgressListener>>,
    content_length: Option<u64>,
    bytes_read: u64,
    items: usize,
}

impl Progress {
    pub(crate) fn new(listener: Option<Box<dyn ProgressListener>>, content_length: Option<u64>) -> Progress {
        Progress {
            listener,
            content_length,
            bytes_read: 0,
            items: 0,
        }
    }

    pub(crate) fn note_bytes_read(&mut self, count: usize) {
        self.bytes_read += count as u64;
        self.notify();
    }

    pub(crate) fn note_item(&mut self) {
        self.items += 1;
        self.notify();
    }

    #[cfg(test)]
    pub(crate) fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    fn notify(&mut self) {
        if let Some(listener) = self.listener.as_mut() {
            listener.update(self.bytes_read, self.content_length, self.items);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_progress_reports_cumulative_counters() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut progress = Progress::new(
            Some(Box::new(move |read, total, items| {
                sink.lock().unwrap().push((read, total, items));
            })),
            Some(100),
        );

        progress.note_bytes_read(10);
        progress.note_item();
        progress.note_bytes_read(5);

        assert_eq!(progress.bytes_read(), 15);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(10, Some(100), 0), (10, Some(100), 1), (15, Some(100), 1)]
        );
    }
}
