//! Thread-safe facade over a single engine session.
//!
//! The engine handle is not reentrant, so every call that touches it goes
//! through one `parking_lot::Mutex` per [`Detector`]. Blocking calls also
//! have `*_async` variants that run on tokio's blocking pool; the facade
//! lock is still held for the whole native call, so callers on either side
//! serialize against each other while the async runtime keeps running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::application::ports::{MagicEngine, MagicLibrary, NativeFailure};
use crate::config::magic_path_overridden;
use crate::domain::errno::{EFAULT, EINVAL, ENOSYS};
use crate::domain::errors::MagicError;
use crate::domain::value_objects::{Flags, SearchPath};

/// State guarded by the detector lock.
struct EngineState {
    handle: Option<Box<dyn MagicEngine>>,
    flags: Flags,
    path: SearchPath,
}

impl EngineState {
    fn engine(&mut self) -> Result<&mut (dyn MagicEngine + 'static), MagicError> {
        self.handle.as_deref_mut().ok_or(MagicError::Closed)
    }
}

struct Shared {
    library: Arc<dyn MagicLibrary>,
    state: Mutex<EngineState>,
    closed: AtomicBool,
}

/// Content-type detector owning one engine session.
///
/// Share it between threads or tasks behind an `Arc`; concurrent calls are
/// serialized. Two detectors never coordinate and can run fully in
/// parallel.
///
/// # Examples
///
/// ```rust,ignore
/// let detector = Detector::new(library)?;
/// detector.set_flags(Flags::MIME_TYPE)?;
/// detector.load(&["/usr/share/misc/magic"])?;
/// assert_eq!(detector.identify_buffer(b"\x89PNG\r\n\x1a\n")?, "image/png");
/// ```
pub struct Detector {
    inner: Arc<Shared>,
}

impl Detector {
    /// Open a new engine session with [`Flags::NONE`].
    ///
    /// No database is loaded; call [`Detector::load`] before identifying
    /// anything unless the engine's built-in default is good enough.
    pub fn new(library: Arc<dyn MagicLibrary>) -> Result<Self, MagicError> {
        let handle = library.open(Flags::NONE).ok_or_else(|| {
            warn!("Failed to allocate {} engine handle", library.name());
            MagicError::unknown()
        })?;

        info!("Opened {} engine handle", library.name());

        Ok(Self {
            inner: Arc::new(Shared {
                library,
                state: Mutex::new(EngineState {
                    handle: Some(handle),
                    flags: Flags::NONE,
                    path: SearchPath::default(),
                }),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Open a session and apply `flags` to it.
    pub fn with_flags(library: Arc<dyn MagicLibrary>, flags: Flags) -> Result<Self, MagicError> {
        let detector = Self::new(library)?;
        detector.set_flags(flags)?;
        Ok(detector)
    }

    /// Session reporting full MIME strings (`type; charset=encoding`).
    pub fn mime(library: Arc<dyn MagicLibrary>) -> Result<Self, MagicError> {
        Self::with_flags(library, Flags::MIME)
    }

    /// Session reporting MIME types only.
    pub fn mime_type(library: Arc<dyn MagicLibrary>) -> Result<Self, MagicError> {
        Self::with_flags(library, Flags::MIME_TYPE)
    }

    /// Session reporting MIME encodings only.
    pub fn mime_encoding(library: Arc<dyn MagicLibrary>) -> Result<Self, MagicError> {
        Self::with_flags(library, Flags::MIME_ENCODING)
    }

    /// Engine version; does not need a session.
    pub fn version(library: &dyn MagicLibrary) -> Result<i32, MagicError> {
        library.version().map_err(|failure| match failure.errno {
            ENOSYS => MagicError::not_implemented(ENOSYS),
            _ => MagicError::unknown(),
        })
    }

    /// Release the engine handle. Closing twice is a no-op.
    pub fn close(&self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Current database search path.
    ///
    /// Returns the path recorded by the last [`Detector::load`] unless none
    /// was recorded or `MAGIC` is set, in which case the engine default is
    /// queried, cached and returned.
    pub fn path(&self) -> Result<SearchPath, MagicError> {
        self.inner.path()
    }

    /// Last successfully applied flags.
    pub fn flags(&self) -> Result<Flags, MagicError> {
        let state = self.inner.lock_open()?;
        Ok(state.flags)
    }

    pub fn set_flags(&self, flags: Flags) -> Result<Flags, MagicError> {
        self.inner.set_flags(flags)
    }

    /// Load a database. An empty list loads the engine default path.
    /// Returns the resolved path, which also becomes [`Detector::path`].
    pub fn load<S: AsRef<str>>(&self, paths: &[S]) -> Result<SearchPath, MagicError> {
        self.inner.load(&to_search_path(paths))
    }

    /// Validate a database without installing it.
    ///
    /// A database that fails validation yields `Ok(false)`; only a closed
    /// detector is an error.
    pub fn check<S: AsRef<str>>(&self, paths: &[S]) -> Result<bool, MagicError> {
        self.inner.check(&to_search_path(paths))
    }

    pub fn is_valid<S: AsRef<str>>(&self, paths: &[S]) -> Result<bool, MagicError> {
        self.check(paths)
    }

    /// Compile database sources. Returns `true` rather than the path list.
    pub fn compile<S: AsRef<str>>(&self, paths: &[S]) -> Result<bool, MagicError> {
        self.inner.compile(&to_search_path(paths))
    }

    pub fn identify_file(&self, path: &str) -> Result<String, MagicError> {
        self.inner.identify_file(path)
    }

    /// Classify an already open descriptor. The descriptor stays open.
    pub fn identify_descriptor(&self, fd: i32) -> Result<String, MagicError> {
        self.inner.identify_descriptor(fd)
    }

    #[cfg(unix)]
    pub fn identify_fd<T: std::os::fd::AsRawFd>(&self, source: &T) -> Result<String, MagicError> {
        self.identify_descriptor(source.as_raw_fd())
    }

    pub fn identify_buffer(&self, bytes: &[u8]) -> Result<String, MagicError> {
        self.inner.identify_buffer(bytes)
    }

    pub async fn load_async(&self, paths: Vec<String>) -> Result<SearchPath, MagicError> {
        let shared = Arc::clone(&self.inner);
        run_blocking(move || shared.load(&SearchPath::new(paths))).await
    }

    pub async fn check_async(&self, paths: Vec<String>) -> Result<bool, MagicError> {
        let shared = Arc::clone(&self.inner);
        run_blocking(move || shared.check(&SearchPath::new(paths))).await
    }

    pub async fn compile_async(&self, paths: Vec<String>) -> Result<bool, MagicError> {
        let shared = Arc::clone(&self.inner);
        run_blocking(move || shared.compile(&SearchPath::new(paths))).await
    }

    pub async fn identify_file_async(&self, path: String) -> Result<String, MagicError> {
        let shared = Arc::clone(&self.inner);
        run_blocking(move || shared.identify_file(&path)).await
    }

    pub async fn identify_descriptor_async(&self, fd: i32) -> Result<String, MagicError> {
        let shared = Arc::clone(&self.inner);
        run_blocking(move || shared.identify_descriptor(fd)).await
    }
}

impl Drop for Detector {
    fn drop(&mut self) {
        // Blocking tasks may still hold the shared state; the handle goes
        // with the last reference in that case.
        if Arc::strong_count(&self.inner) == 1 {
            self.inner.close();
        }
    }
}

impl std::fmt::Debug for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("Detector");
        debug
            .field("engine", &self.inner.library.name())
            .field("closed", &self.is_closed());
        if let Some(state) = self.inner.state.try_lock() {
            debug.field("flags", &state.flags).field("path", &state.path);
        }
        debug.finish()
    }
}

impl Shared {
    fn lock_open(&self) -> Result<MutexGuard<'_, EngineState>, MagicError> {
        let state = self.state.lock();
        if state.handle.is_none() {
            return Err(MagicError::Closed);
        }
        Ok(state)
    }

    fn close(&self) {
        let mut state = self.state.lock();
        if let Some(handle) = state.handle.take() {
            drop(handle);
            info!("Closed {} engine handle", self.library.name());
        }
        self.closed.store(true, Ordering::Release);
    }

    fn path(&self) -> Result<SearchPath, MagicError> {
        let mut state = self.lock_open()?;

        if !state.path.is_empty() && !magic_path_overridden() {
            return Ok(state.path.clone());
        }

        let default_path = self.library.default_path();
        debug!("Using engine default magic path: {:?}", default_path);
        state.path = SearchPath::parse(&default_path);
        Ok(state.path.clone())
    }

    fn set_flags(&self, flags: Flags) -> Result<Flags, MagicError> {
        let mut state = self.lock_open()?;
        let engine = state.engine()?;

        debug!("Setting engine flags: {}", flags);
        engine.set_flags(flags).map_err(|failure| {
            let err = match failure.errno {
                ENOSYS => MagicError::not_implemented(ENOSYS),
                EINVAL => MagicError::invalid_flags(EINVAL),
                _ => library_error(engine),
            };
            warn!("Engine rejected flags {}: {}", flags, err);
            err
        })?;

        state.flags = flags;
        Ok(flags)
    }

    fn load(&self, paths: &SearchPath) -> Result<SearchPath, MagicError> {
        let mut state = self.lock_open()?;

        let joined = if paths.is_empty() {
            self.library.default_path()
        } else {
            paths.join()
        };

        let engine = state.engine()?;
        debug!("Loading magic database: {:?}", joined);
        engine
            .load(Some(joined.as_str()))
            .map_err(|failure| engine_failure(engine, "load", failure))?;

        state.path = SearchPath::parse(&joined);
        Ok(state.path.clone())
    }

    fn check(&self, paths: &SearchPath) -> Result<bool, MagicError> {
        let mut state = self.lock_open()?;
        let joined = explicit_path(paths);

        let engine = state.engine()?;
        debug!("Checking magic database: {:?}", joined);
        match engine.check(joined.as_deref()) {
            Ok(()) => Ok(true),
            Err(failure) => {
                debug!(
                    "Magic database check failed (errno {}): {}",
                    failure.errno,
                    engine.last_error().unwrap_or_default()
                );
                Ok(false)
            }
        }
    }

    fn compile(&self, paths: &SearchPath) -> Result<bool, MagicError> {
        let mut state = self.lock_open()?;
        let joined = explicit_path(paths);

        let engine = state.engine()?;
        debug!("Compiling magic database: {:?}", joined);
        engine
            .compile(joined.as_deref())
            .map_err(|failure| engine_failure(engine, "compile", failure))?;

        Ok(true)
    }

    fn identify_file(&self, path: &str) -> Result<String, MagicError> {
        let mut state = self.lock_open()?;
        let engine = state.engine()?;

        debug!("Identifying file: {}", path);
        engine
            .file(path)
            .map_err(|failure| engine_failure(engine, "file", failure))
    }

    fn identify_descriptor(&self, fd: i32) -> Result<String, MagicError> {
        let mut state = self.lock_open()?;
        let engine = state.engine()?;

        debug!("Identifying descriptor: {}", fd);
        engine
            .descriptor(fd)
            .map_err(|failure| engine_failure(engine, "descriptor", failure))
    }

    fn identify_buffer(&self, bytes: &[u8]) -> Result<String, MagicError> {
        let mut state = self.lock_open()?;
        let engine = state.engine()?;

        debug!("Identifying buffer of {} bytes", bytes.len());
        engine
            .buffer(bytes)
            .map_err(|failure| engine_failure(engine, "buffer", failure))
    }
}

fn to_search_path<S: AsRef<str>>(paths: &[S]) -> SearchPath {
    paths.iter().map(|p| p.as_ref().to_string()).collect()
}

/// `None` asks the engine for its default database.
fn explicit_path(paths: &SearchPath) -> Option<String> {
    if paths.is_empty() {
        None
    } else {
        Some(paths.join())
    }
}

/// Translate the engine's last error into a facade error.
fn library_error(engine: &dyn MagicEngine) -> MagicError {
    match engine.last_error() {
        Some(message) => {
            let code = engine.last_errno();
            if code == EFAULT {
                MagicError::BadAddress {
                    code: Some(code),
                    message,
                }
            } else {
                MagicError::Library {
                    code: Some(code),
                    message,
                }
            }
        }
        None => MagicError::unknown(),
    }
}

fn engine_failure(engine: &dyn MagicEngine, operation: &str, failure: NativeFailure) -> MagicError {
    let err = library_error(engine);
    warn!(
        "Engine {} failed (errno {}): {}",
        operation, failure.errno, err
    );
    err
}

async fn run_blocking<T, F>(task: F) -> Result<T, MagicError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, MagicError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| MagicError::Worker(e.to_string()))?
}
