use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

use tracing::debug;

use super::classify::{classify, Classification, SAMPLE_SIZE};
use crate::application::ports::{MagicEngine, MagicLibrary, NativeFailure};
use crate::config::MAGIC_ENV;
use crate::domain::errno::{EBADF, EINVAL, ENOENT, ENOSYS};
use crate::domain::value_objects::{Flags, SearchPath};

const NO_MAGIC_FILES: &str = "could not find any valid magic files!";
const NO_COMPILE: &str = "compiling magic databases is not supported by the signature engine";

/// Engine factory backed by the `infer` signature table.
///
/// There is no database file: `load` and `check` only verify that the
/// paths they are given exist, and `compile` is unsupported.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureLibrary;

impl SignatureLibrary {
    pub fn new() -> Self {
        Self
    }
}

impl MagicLibrary for SignatureLibrary {
    fn open(&self, flags: Flags) -> Option<Box<dyn MagicEngine>> {
        Some(Box::new(SignatureEngine::new(flags)))
    }

    fn default_path(&self) -> String {
        std::env::var(MAGIC_ENV).unwrap_or_default()
    }

    fn version(&self) -> Result<i32, NativeFailure> {
        Err(NativeFailure::new(ENOSYS))
    }

    fn name(&self) -> &'static str {
        "signatures"
    }
}

/// One signature-engine session.
#[derive(Debug)]
pub struct SignatureEngine {
    flags: Flags,
    last_error: Option<(String, i32)>,
}

impl SignatureEngine {
    pub fn new(flags: Flags) -> Self {
        Self {
            flags,
            last_error: None,
        }
    }

    fn fail(&mut self, errno: i32, message: String) -> NativeFailure {
        debug!("Signature engine failure (errno {}): {}", errno, message);
        self.last_error = Some((message, errno));
        NativeFailure::new(errno)
    }

    fn fail_io(&mut self, err: &io::Error, context: String) -> NativeFailure {
        let errno = err.raw_os_error().unwrap_or(EINVAL);
        self.fail(errno, format!("{} ({})", context, os_reason(err)))
    }

    /// Every listed database location must exist.
    fn verify_paths(&mut self, path: Option<&str>) -> Result<(), NativeFailure> {
        self.last_error = None;

        let Some(path) = path else {
            return Ok(());
        };

        let missing = SearchPath::parse(path)
            .as_slice()
            .iter()
            .filter(|p| !p.is_empty())
            .any(|p| !Path::new(p).exists());

        if missing {
            return Err(self.fail(ENOENT, NO_MAGIC_FILES.to_string()));
        }
        Ok(())
    }

    fn render(&self, classification: Classification) -> String {
        classification.render(self.flags)
    }

    fn classify_path(&mut self, path: &str) -> Result<Classification, NativeFailure> {
        let metadata = if self.flags.contains(Flags::SYMLINK) {
            fs::metadata(path)
        } else {
            fs::symlink_metadata(path)
        };
        let metadata = metadata.map_err(|e| self.fail_io(&e, format!("cannot open `{}'", path)))?;

        let file_type = metadata.file_type();
        if file_type.is_symlink() {
            let target = fs::read_link(path)
                .map_err(|e| self.fail_io(&e, format!("unreadable symlink `{}'", path)))?;
            return Ok(Classification::new(
                format!("symbolic link to {}", target.display()),
                "inode/symlink",
                "binary",
            ));
        }
        if file_type.is_dir() {
            return Ok(Classification::new("directory", "inode/directory", "binary"));
        }
        if let Some(special) = special_file(&metadata, self.flags) {
            return Ok(special);
        }

        let file = File::open(path).map_err(|e| self.fail_io(&e, format!("cannot open `{}'", path)))?;
        let sample = read_sample(file)
            .map_err(|e| self.fail_io(&e, format!("cannot read `{}'", path)))?;

        Ok(classify(&sample, self.flags))
    }

    #[cfg(unix)]
    fn classify_descriptor(&mut self, fd: i32) -> Result<Classification, NativeFailure> {
        use std::os::fd::BorrowedFd;
        use std::os::unix::fs::FileExt;

        if fd < 0 {
            return Err(self.fail(EBADF, format!("cannot read fd {}", fd)));
        }

        // SAFETY: the caller owns `fd` and keeps it open for the duration of
        // this call; we only duplicate it and never close the original.
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        let duplicate = borrowed
            .try_clone_to_owned()
            .map_err(|e| self.fail_io(&e, format!("cannot read fd {}", fd)))?;
        let file = File::from(duplicate);

        // Positional reads leave the caller's offset alone; pipes and
        // sockets cannot seek and are read sequentially instead.
        let mut sample = vec![0u8; SAMPLE_SIZE];
        let mut filled = 0;
        loop {
            match file.read_at(&mut sample[filled..], filled as u64) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    if filled == sample.len() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) if filled == 0 => {
                    let sample = read_sample(&file)
                        .map_err(|e| self.fail_io(&e, format!("cannot read fd {}", fd)))?;
                    return Ok(classify(&sample, self.flags));
                }
                Err(e) => return Err(self.fail_io(&e, format!("cannot read fd {}", fd))),
            }
        }
        sample.truncate(filled);

        Ok(classify(&sample, self.flags))
    }

    #[cfg(not(unix))]
    fn classify_descriptor(&mut self, fd: i32) -> Result<Classification, NativeFailure> {
        Err(self.fail(
            ENOSYS,
            format!("cannot read fd {}: descriptors are not supported", fd),
        ))
    }
}

impl MagicEngine for SignatureEngine {
    fn set_flags(&mut self, flags: Flags) -> Result<(), NativeFailure> {
        if flags.unknown_bits() != 0 {
            return Err(NativeFailure::new(EINVAL));
        }
        if flags.contains(Flags::PRESERVE_ATIME) {
            return Err(NativeFailure::new(ENOSYS));
        }
        self.flags = flags;
        Ok(())
    }

    fn load(&mut self, path: Option<&str>) -> Result<(), NativeFailure> {
        self.verify_paths(path)
    }

    fn check(&mut self, path: Option<&str>) -> Result<(), NativeFailure> {
        self.verify_paths(path)
    }

    fn compile(&mut self, _path: Option<&str>) -> Result<(), NativeFailure> {
        Err(self.fail(ENOSYS, NO_COMPILE.to_string()))
    }

    fn file(&mut self, path: &str) -> Result<String, NativeFailure> {
        self.last_error = None;
        let classification = self.classify_path(path)?;
        Ok(self.render(classification))
    }

    fn descriptor(&mut self, fd: i32) -> Result<String, NativeFailure> {
        self.last_error = None;
        let classification = self.classify_descriptor(fd)?;
        Ok(self.render(classification))
    }

    fn buffer(&mut self, bytes: &[u8]) -> Result<String, NativeFailure> {
        self.last_error = None;
        let sample = &bytes[..bytes.len().min(SAMPLE_SIZE)];
        Ok(self.render(classify(sample, self.flags)))
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.as_ref().map(|(message, _)| message.clone())
    }

    fn last_errno(&self) -> i32 {
        self.last_error.as_ref().map(|(_, errno)| *errno).unwrap_or(0)
    }
}

fn read_sample(reader: impl Read) -> io::Result<Vec<u8>> {
    let mut sample = Vec::with_capacity(SAMPLE_SIZE);
    reader.take(SAMPLE_SIZE as u64).read_to_end(&mut sample)?;
    Ok(sample)
}

/// OS error text without the trailing "(os error N)".
fn os_reason(err: &io::Error) -> String {
    let text = err.to_string();
    match text.rfind(" (os error") {
        Some(idx) => text[..idx].to_string(),
        None => text,
    }
}

#[cfg(unix)]
fn special_file(metadata: &fs::Metadata, flags: Flags) -> Option<Classification> {
    use std::os::unix::fs::FileTypeExt;

    let file_type = metadata.file_type();
    if file_type.is_socket() {
        return Some(Classification::new("socket", "inode/socket", "binary"));
    }
    // Devices are only read when asked to
    if flags.contains(Flags::DEVICES) {
        return None;
    }
    if file_type.is_fifo() {
        Some(Classification::new("fifo (named pipe)", "inode/fifo", "binary"))
    } else if file_type.is_char_device() {
        Some(Classification::new("character special", "inode/chardevice", "binary"))
    } else if file_type.is_block_device() {
        Some(Classification::new("block special", "inode/blockdevice", "binary"))
    } else {
        None
    }
}

#[cfg(not(unix))]
fn special_file(_metadata: &fs::Metadata, _flags: Flags) -> Option<Classification> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_set_flags_rejects_unknown_bits() {
        let mut engine = SignatureEngine::new(Flags::NONE);
        let err = engine.set_flags(Flags::from_bits(0x4000_0000)).unwrap_err();
        assert_eq!(err.errno, EINVAL);
    }

    #[test]
    fn test_set_flags_preserve_atime_unsupported() {
        let mut engine = SignatureEngine::new(Flags::NONE);
        let err = engine.set_flags(Flags::PRESERVE_ATIME).unwrap_err();
        assert_eq!(err.errno, ENOSYS);
    }

    #[test]
    fn test_load_requires_existing_paths() {
        let dir = tempdir().unwrap();
        let existing = dir.path().to_str().unwrap().to_string();
        let mut engine = SignatureEngine::new(Flags::NONE);

        assert!(engine.load(None).is_ok());
        assert!(engine.load(Some(&existing)).is_ok());

        let err = engine
            .load(Some(&format!("{}:/nonexistent/magic", existing)))
            .unwrap_err();
        assert_eq!(err.errno, ENOENT);
        assert_eq!(engine.last_error().as_deref(), Some(NO_MAGIC_FILES));
        assert_eq!(engine.last_errno(), ENOENT);
    }

    #[test]
    fn test_compile_is_unsupported() {
        let mut engine = SignatureEngine::new(Flags::NONE);
        let err = engine.compile(None).unwrap_err();
        assert_eq!(err.errno, ENOSYS);
        assert_eq!(engine.last_error().as_deref(), Some(NO_COMPILE));
    }

    #[test]
    fn test_file_missing_reports_path() {
        let mut engine = SignatureEngine::new(Flags::NONE);
        let err = engine.file("/nonexistent/file.bin").unwrap_err();

        assert_eq!(err.errno, ENOENT);
        let message = engine.last_error().unwrap();
        assert!(message.starts_with("cannot open `/nonexistent/file.bin'"));
        assert!(!message.contains("os error"));
    }

    #[test]
    fn test_file_and_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("note.txt");
        fs::write(&path, "just some notes\n").unwrap();
        let mut engine = SignatureEngine::new(Flags::NONE);

        assert_eq!(engine.file(path.to_str().unwrap()).unwrap(), "ASCII text");
        assert_eq!(engine.file(dir.path().to_str().unwrap()).unwrap(), "directory");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_follows_only_with_flag() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("image.png");
        fs::write(&target, b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR").unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        let link = link.to_str().unwrap();

        let mut engine = SignatureEngine::new(Flags::NONE);
        assert!(engine.file(link).unwrap().starts_with("symbolic link to "));

        engine.set_flags(Flags::SYMLINK | Flags::MIME_TYPE).unwrap();
        assert_eq!(engine.file(link).unwrap(), "image/png");
    }

    #[cfg(unix)]
    #[test]
    fn test_descriptor_keeps_offset_and_stays_open() {
        use std::io::{Seek, SeekFrom};
        use std::os::fd::AsRawFd;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello from a descriptor\n").unwrap();
        file.as_file_mut().seek(SeekFrom::Start(5)).unwrap();

        let mut engine = SignatureEngine::new(Flags::MIME_TYPE);
        let fd = file.as_file().as_raw_fd();
        assert_eq!(engine.descriptor(fd).unwrap(), "text/plain");

        let position = file.as_file_mut().stream_position().unwrap();
        assert_eq!(position, 5);
        assert_eq!(engine.descriptor(fd).unwrap(), "text/plain");
    }

    #[test]
    fn test_negative_descriptor_is_ebadf() {
        let mut engine = SignatureEngine::new(Flags::NONE);
        let err = engine.descriptor(-1).unwrap_err();
        assert!(err.errno == EBADF || err.errno == ENOSYS);
    }

    #[test]
    fn test_library_reports_no_version() {
        let library = SignatureLibrary::new();
        assert_eq!(library.version(), Err(NativeFailure::new(ENOSYS)));
        assert_eq!(library.name(), "signatures");
        assert!(library.open(Flags::NONE).is_some());
    }
}
