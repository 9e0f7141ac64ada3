use crate::constants;
use crate::log::debug;
use crate::Error;
use bytes::{Bytes, BytesMut};
use std::fmt::{self, Debug, Formatter};
use std::fs::{self, File};
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

type PersistListener = Arc<dyn Fn(&Path) + Send + Sync>;

/// Source of unique backing file names: `<prefix><seed>_<counter><suffix>`
/// inside one directory.
///
/// Clones share the counter. Create one per process and hand out clones, so
/// that names never repeat.
#[derive(Debug, Clone)]
pub struct SpillNamer {
    dir: PathBuf,
    prefix: String,
    suffix: String,
    seed: String,
    counter: Arc<AtomicU64>,
}

impl SpillNamer {
    /// Creates a namer seeded with the process id and the current time.
    pub fn new<P: Into<PathBuf>>(dir: P) -> SpillNamer {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();

        SpillNamer::with_seed(dir, format!("{:x}_{:x}", std::process::id(), nanos))
    }

    /// Creates a namer with an explicit seed.
    pub fn with_seed<P: Into<PathBuf>, S: Into<String>>(dir: P, seed: S) -> SpillNamer {
        SpillNamer {
            dir: dir.into(),
            prefix: "upload_".to_owned(),
            suffix: ".tmp".to_owned(),
            seed: seed.into(),
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn prefix<S: Into<String>>(mut self, prefix: S) -> SpillNamer {
        self.prefix = prefix.into();
        self
    }

    pub fn suffix<S: Into<String>>(mut self, suffix: S) -> SpillNamer {
        self.suffix = suffix.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the next unused path.
    pub fn next_path(&self) -> PathBuf {
        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        self.dir
            .join(format!("{}{}_{:08}{}", self.prefix, self.seed, id, self.suffix))
    }
}

/// How field bodies are buffered: the spill threshold, where backing files
/// go and who hears about them.
#[derive(Clone)]
pub struct SpillOptions {
    threshold: i64,
    namer: SpillNamer,
    on_persist: Option<PersistListener>,
}

impl SpillOptions {
    /// Spills into `dir` with the default threshold of 10 KiB.
    pub fn new<P: Into<PathBuf>>(dir: P) -> SpillOptions {
        SpillOptions::with_namer(SpillNamer::new(dir))
    }

    pub fn with_namer(namer: SpillNamer) -> SpillOptions {
        SpillOptions {
            threshold: constants::DEFAULT_SPILL_THRESHOLD,
            namer,
            on_persist: None,
        }
    }

    /// Sets the spill threshold.
    ///
    /// * negative: every buffer goes to a file right away, even an empty one;
    /// * `0`: the first written byte moves the buffer to a file;
    /// * positive: the write that brings the size to the threshold or beyond
    ///   moves the buffer to a file.
    pub fn threshold(mut self, threshold: i64) -> SpillOptions {
        self.threshold = threshold;
        self
    }

    /// Registers a callback receiving the path of every backing file when it
    /// is created, e.g. to delete orphans later.
    pub fn on_persist<F>(mut self, listener: F) -> SpillOptions
    where
        F: Fn(&Path) + Send + Sync + 'static,
    {
        self.on_persist = Some(Arc::new(listener));
        self
    }

    /// Creates an empty buffer.
    pub fn create(&self) -> crate::Result<SpillBuffer> {
        SpillBuffer::new(self.clone())
    }
}

impl Debug for SpillOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpillOptions")
            .field("threshold", &self.threshold)
            .field("namer", &self.namer)
            .field("on_persist", &self.on_persist.is_some())
            .finish()
    }
}

/// Lifecycle of a [`SpillBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpillState {
    /// Nothing written yet.
    Initialized,
    /// Bytes are kept in memory.
    Opened,
    /// Bytes go to the backing file.
    Persisted,
    /// No more writes, the content can be read back.
    Closed,
    /// The backing file could not be written. Nothing can be written or
    /// read back.
    Failed,
}

enum Storage {
    Initialized,
    Opened(BytesMut),
    Persisted { file: BufWriter<File>, path: PathBuf },
    ClosedInMemory(Bytes),
    ClosedOnDisk(PathBuf),
    Failed,
}

/// Collects one field body, in memory while it is small and in a backing
/// file once it reaches the threshold. Moving to the file cannot be undone.
pub struct SpillBuffer {
    options: SpillOptions,
    written: u64,
    storage: Storage,
}

impl SpillBuffer {
    /// Creates a buffer. With a negative threshold the backing file is
    /// created right away.
    pub fn new(options: SpillOptions) -> crate::Result<SpillBuffer> {
        let mut buffer = SpillBuffer {
            options,
            written: 0,
            storage: Storage::Initialized,
        };

        if buffer.options.threshold < 0 {
            buffer.spill(&[])?;
        }

        Ok(buffer)
    }

    pub fn state(&self) -> SpillState {
        match self.storage {
            Storage::Initialized => SpillState::Initialized,
            Storage::Opened(_) => SpillState::Opened,
            Storage::Persisted { .. } => SpillState::Persisted,
            Storage::ClosedInMemory(_) | Storage::ClosedOnDisk(_) => SpillState::Closed,
            Storage::Failed => SpillState::Failed,
        }
    }

    /// Whether the content is held in memory rather than in a file.
    pub fn is_in_memory(&self) -> bool {
        matches!(
            self.storage,
            Storage::Initialized | Storage::Opened(_) | Storage::ClosedInMemory(_)
        )
    }

    pub fn threshold(&self) -> i64 {
        self.options.threshold
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> u64 {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// The backing file, once there is one.
    pub fn path(&self) -> Option<&Path> {
        match &self.storage {
            Storage::Persisted { path, .. } | Storage::ClosedOnDisk(path) => Some(path),
            _ => None,
        }
    }

    /// The content of a closed, in-memory buffer.
    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.storage {
            Storage::ClosedInMemory(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Appends `data`, moving to the backing file when the threshold is
    /// reached.
    pub fn write_bytes(&mut self, data: &[u8]) -> crate::Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        match &mut self.storage {
            Storage::Initialized | Storage::Opened(_) => {
                let total = self.written + data.len() as u64;
                if total >= self.options.threshold as u64 {
                    self.spill(data)?;
                } else if let Storage::Opened(memory) = &mut self.storage {
                    memory.extend_from_slice(data);
                } else {
                    self.storage = Storage::Opened(BytesMut::from(data));
                }
            }
            Storage::Persisted { file, path } => {
                if let Err(source) = file.write_all(data) {
                    let path = path.clone();
                    self.storage = Storage::Failed;
                    return Err(Error::Storage { path, source });
                }
            }
            Storage::ClosedInMemory(_) | Storage::ClosedOnDisk(_) | Storage::Failed => {
                return Err(Error::SpillClosed);
            }
        }

        self.written += data.len() as u64;
        Ok(())
    }

    /// Creates the backing file and moves the buffered bytes plus `data`
    /// into it. The listener hears about the file as soon as it exists; a
    /// file whose first write fails is removed again.
    fn spill(&mut self, data: &[u8]) -> crate::Result<()> {
        let memory = match std::mem::replace(&mut self.storage, Storage::Failed) {
            Storage::Opened(memory) => memory,
            _ => BytesMut::new(),
        };

        let path = self.options.namer.next_path();
        let storage_err = |source| Error::Storage {
            path: path.clone(),
            source,
        };

        let mut file = BufWriter::new(create_backing_file(&path).map_err(storage_err)?);

        if let Some(listener) = self.options.on_persist.as_ref() {
            listener(&path);
        }

        let written = file.write_all(&memory).and_then(|_| file.write_all(data));
        if let Err(source) = written {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(storage_err(source));
        }

        debug!("spilled {} bytes to {}", memory.len() + data.len(), path.display());

        self.storage = Storage::Persisted { file, path };
        Ok(())
    }

    /// Finishes writing. Calling it again does nothing. A failed buffer
    /// stays failed.
    pub fn close(&mut self) -> crate::Result<()> {
        self.storage = match std::mem::replace(&mut self.storage, Storage::Failed) {
            Storage::Initialized => Storage::ClosedInMemory(Bytes::new()),
            Storage::Opened(memory) => Storage::ClosedInMemory(memory.freeze()),
            Storage::Persisted { file, path } => match file.into_inner() {
                Ok(file) => {
                    drop(file);
                    Storage::ClosedOnDisk(path)
                }
                Err(err) => {
                    return Err(Error::Storage {
                        path,
                        source: err.into_error(),
                    })
                }
            },
            Storage::Failed => return Err(Error::SpillClosed),
            closed => closed,
        };

        Ok(())
    }

    /// Reads the content back. Only a closed buffer can be read.
    pub fn reader(&self) -> crate::Result<SpillReader> {
        match &self.storage {
            Storage::ClosedInMemory(bytes) => Ok(SpillReader::Memory(Cursor::new(bytes.clone()))),
            Storage::ClosedOnDisk(path) => File::open(path)
                .map(SpillReader::File)
                .map_err(|source| Error::Storage {
                    path: path.clone(),
                    source,
                }),
            Storage::Failed => Err(Error::SpillClosed),
            _ => Err(Error::SpillNotClosed),
        }
    }

    /// Hands the content over to `dest`: moves the backing file, or writes
    /// the in-memory bytes. Only a closed buffer can be persisted. A moved
    /// backing file keeps serving [`path`](SpillBuffer::path) and
    /// [`reader`](SpillBuffer::reader) from `dest`.
    pub fn persist_to<P: AsRef<Path>>(&mut self, dest: P) -> crate::Result<()> {
        let dest = dest.as_ref();
        let storage_err = |source| Error::Storage {
            path: dest.to_owned(),
            source,
        };

        match &mut self.storage {
            Storage::ClosedInMemory(bytes) => fs::write(dest, bytes).map_err(storage_err),
            Storage::ClosedOnDisk(path) => {
                if fs::rename(&*path, dest).is_err() {
                    fs::copy(&*path, dest).map_err(storage_err)?;
                    fs::remove_file(&*path).map_err(storage_err)?;
                }
                *path = dest.to_owned();
                Ok(())
            }
            Storage::Failed => Err(Error::SpillClosed),
            _ => Err(Error::SpillNotClosed),
        }
    }
}

fn create_backing_file(path: &Path) -> io::Result<File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    File::create(path)
}

impl Write for SpillBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.storage {
            Storage::Persisted { file, .. } => file.flush(),
            _ => Ok(()),
        }
    }
}

impl Debug for SpillBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpillBuffer")
            .field("state", &self.state())
            .field("len", &self.written)
            .field("path", &self.path())
            .finish()
    }
}

/// Reads back the content of a closed [`SpillBuffer`].
#[derive(Debug)]
pub enum SpillReader {
    Memory(Cursor<Bytes>),
    File(File),
}

impl Read for SpillReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            SpillReader::Memory(cursor) => cursor.read(buf),
            SpillReader::File(file) => file.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("multipart-spill-{}", std::process::id()))
            .join(name)
    }

    fn read_back(buffer: &SpillBuffer) -> Vec<u8> {
        let mut out = Vec::new();
        buffer.reader().unwrap().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let options = SpillOptions::new(scratch_dir("inclusive")).threshold(4);

        let mut below = options.create().unwrap();
        below.write_bytes(b"abc").unwrap();
        assert!(below.is_in_memory());
        assert_eq!(below.state(), SpillState::Opened);

        let mut exact = options.create().unwrap();
        exact.write_bytes(b"ab").unwrap();
        exact.write_bytes(b"cd").unwrap();
        assert!(!exact.is_in_memory());
        assert_eq!(exact.state(), SpillState::Persisted);

        exact.close().unwrap();
        assert_eq!(read_back(&exact), b"abcd");
        assert_eq!(exact.len(), 4);
    }

    #[test]
    fn test_zero_threshold_spills_on_first_byte() {
        let mut buffer = SpillOptions::new(scratch_dir("zero")).threshold(0).create().unwrap();
        buffer.write_bytes(b"").unwrap();
        assert_eq!(buffer.state(), SpillState::Initialized);
        assert!(buffer.path().is_none());

        buffer.write_bytes(b"x").unwrap();
        assert_eq!(buffer.state(), SpillState::Persisted);
        assert!(buffer.path().unwrap().exists());
    }

    #[test]
    fn test_zero_threshold_without_writes_stays_in_memory() {
        let mut buffer = SpillOptions::new(scratch_dir("zero-empty")).threshold(0).create().unwrap();
        buffer.close().unwrap();
        assert!(buffer.is_in_memory());
        assert_eq!(buffer.bytes(), Some(&Bytes::new()));
    }

    #[test]
    fn test_negative_threshold_creates_file_right_away() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut buffer = SpillOptions::new(scratch_dir("negative"))
            .threshold(-1)
            .on_persist(move |path| sink.lock().unwrap().push(path.to_owned()))
            .create()
            .unwrap();

        assert_eq!(buffer.state(), SpillState::Persisted);
        assert!(!buffer.is_in_memory());

        buffer.close().unwrap();
        let path = buffer.path().unwrap().to_owned();
        assert_eq!(*seen.lock().unwrap(), vec![path.clone()]);
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut buffer = SpillOptions::new(scratch_dir("idempotent")).create().unwrap();
        buffer.write_bytes(b"hello").unwrap();
        buffer.close().unwrap();
        buffer.close().unwrap();

        assert_eq!(buffer.state(), SpillState::Closed);
        assert!(buffer.is_in_memory());
        assert_eq!(buffer.bytes().map(|bytes| &bytes[..]), Some(&b"hello"[..]));
        assert_eq!(read_back(&buffer), b"hello");
        assert_eq!(buffer.write_bytes(b"more"), Err(Error::SpillClosed));
    }

    #[test]
    fn test_reader_requires_close() {
        let mut buffer = SpillOptions::new(scratch_dir("usage")).create().unwrap();
        buffer.write_bytes(b"data").unwrap();
        assert!(matches!(buffer.reader(), Err(Error::SpillNotClosed)));
    }

    #[test]
    fn test_missing_directories_are_created() {
        let dir = scratch_dir("nested").join("a").join("b");
        let mut buffer = SpillOptions::new(&dir).threshold(1).create().unwrap();
        buffer.write_all(b"spilled").unwrap();
        buffer.close().unwrap();

        assert!(buffer.path().unwrap().starts_with(&dir));
        assert_eq!(read_back(&buffer), b"spilled");

        let dest = scratch_dir("nested").join("kept.bin");
        buffer.persist_to(&dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"spilled");
    }

    #[test]
    fn test_persist_to_follows_the_moved_file() {
        let mut buffer = SpillOptions::new(scratch_dir("moved")).threshold(1).create().unwrap();
        buffer.write_bytes(b"moved").unwrap();
        buffer.close().unwrap();
        let old = buffer.path().unwrap().to_owned();

        let dest = scratch_dir("moved").join("final.bin");
        buffer.persist_to(&dest).unwrap();

        assert!(!old.exists());
        assert_eq!(buffer.path(), Some(dest.as_path()));
        assert_eq!(buffer.state(), SpillState::Closed);
        assert_eq!(read_back(&buffer), b"moved");
    }

    #[test]
    fn test_listener_hears_about_file_before_content() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut buffer = SpillOptions::new(scratch_dir("listener"))
            .threshold(1)
            .on_persist(move |path| sink.lock().unwrap().push(fs::metadata(path).map(|meta| meta.len()).ok()))
            .create()
            .unwrap();
        buffer.write_bytes(b"content").unwrap();
        buffer.close().unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![Some(0)]);
        assert_eq!(read_back(&buffer), b"content");
    }

    #[test]
    fn test_storage_failure_leaves_buffer_unusable() {
        let blocker = scratch_dir("blocked");
        fs::create_dir_all(blocker.parent().unwrap()).unwrap();
        fs::write(&blocker, b"not a directory").unwrap();

        let mut buffer = SpillOptions::new(blocker.join("sub")).threshold(2).create().unwrap();
        buffer.write_bytes(b"a").unwrap();

        assert!(matches!(buffer.write_bytes(b"bc"), Err(Error::Storage { .. })));
        assert_eq!(buffer.write_bytes(b"d"), Err(Error::SpillClosed));
        assert_eq!(buffer.len(), 1);

        assert_eq!(buffer.state(), SpillState::Failed);
        assert_eq!(buffer.close(), Err(Error::SpillClosed));
        assert_eq!(buffer.state(), SpillState::Failed);
        assert!(matches!(buffer.reader(), Err(Error::SpillClosed)));
        assert_eq!(buffer.persist_to(scratch_dir("blocked-dest")), Err(Error::SpillClosed));
        assert!(buffer.path().is_none());
    }

    #[test]
    fn test_namer_is_unique_and_shared() {
        let namer = SpillNamer::with_seed("/tmp/uploads", "seed");
        let clone = namer.clone().prefix("part_").suffix(".bin");

        assert_eq!(namer.next_path(), PathBuf::from("/tmp/uploads/upload_seed_00000000.tmp"));
        assert_eq!(clone.next_path(), PathBuf::from("/tmp/uploads/part_seed_00000001.bin"));
        assert_eq!(namer.dir(), Path::new("/tmp/uploads"));
    }
}
