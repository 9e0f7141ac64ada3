use crate::limited::LimitedReader;
use crate::log::warning;
use crate::scanner::BoundaryScanner;
use std::io::Read;

pub(crate) struct MultipartState<R> {
    pub(crate) scanner: BoundaryScanner<LimitedReader<R>>,
    /// Token of the outermost body, restored after a nested section.
    pub(crate) boundary: String,
    pub(crate) stage: StreamingStage,
    /// Every encapsulation of a `multipart/related` body is an unnamed part.
    pub(crate) related: bool,
    pub(crate) next_field_idx: usize,
    /// Name of the `multipart/mixed` field whose nested section is being read.
    pub(crate) curr_field_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamingStage {
    FindingFirstBoundary,
    ReadingBoundary,
    ReadingFieldData,
    Eof,
    Aborted,
}

impl<R: Read> MultipartState<R> {
    /// Ends the session after an error: the transport is dropped and no
    /// further field is produced.
    pub(crate) fn abort(&mut self) {
        warning!("aborting multipart stream at field {}", self.next_field_idx);
        self.scanner.hard_close();
        self.stage = StreamingStage::Aborted;
    }
}
