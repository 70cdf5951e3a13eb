use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::application::ports::{MagicEngine, NativeFailure};
use crate::domain::value_objects::Flags;

/// What a [`FakeEngine`] saw, shared with the test after the engine is
/// boxed and handed to the detector.
#[derive(Debug, Default)]
pub struct FakeLog {
    pub calls: Vec<String>,
    pub overlapping_calls: usize,
    pub releases: usize,
}

/// Recording engine for facade tests
pub struct FakeEngine {
    pub log: Arc<Mutex<FakeLog>>,
    active: Arc<AtomicUsize>,
    pub set_flags_errno: Option<i32>,
    pub fail_load: bool,
    pub fail_check: bool,
    pub fail_compile: bool,
    pub fail_classify: bool,
    pub error: Option<(String, i32)>,
    pub classification: String,
    pub delay: Duration,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(FakeLog::default())),
            active: Arc::new(AtomicUsize::new(0)),
            set_flags_errno: None,
            fail_load: false,
            fail_check: false,
            fail_compile: false,
            fail_classify: false,
            error: None,
            classification: "data".to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn failing_with(message: &str, errno: i32) -> Self {
        let mut engine = Self::new();
        engine.fail_load = true;
        engine.fail_check = true;
        engine.fail_compile = true;
        engine.fail_classify = true;
        engine.error = Some((message.to_string(), errno));
        engine
    }

    pub fn log(&self) -> Arc<Mutex<FakeLog>> {
        Arc::clone(&self.log)
    }

    fn enter(&self, call: String) {
        if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
            self.log.lock().unwrap().overlapping_calls += 1;
        }
        self.log.lock().unwrap().calls.push(call);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn status(&self, fail: bool) -> Result<(), NativeFailure> {
        self.leave();
        if fail {
            Err(NativeFailure::new(0))
        } else {
            Ok(())
        }
    }

    fn classify(&self, fail: bool) -> Result<String, NativeFailure> {
        self.leave();
        if fail {
            Err(NativeFailure::new(0))
        } else {
            Ok(self.classification.clone())
        }
    }
}

impl MagicEngine for FakeEngine {
    fn set_flags(&mut self, flags: Flags) -> Result<(), NativeFailure> {
        self.enter(format!("set_flags({})", flags.bits()));
        self.leave();
        match self.set_flags_errno {
            Some(errno) => Err(NativeFailure::new(errno)),
            None => Ok(()),
        }
    }

    fn load(&mut self, path: Option<&str>) -> Result<(), NativeFailure> {
        self.enter(format!("load({:?})", path));
        self.status(self.fail_load)
    }

    fn check(&mut self, path: Option<&str>) -> Result<(), NativeFailure> {
        self.enter(format!("check({:?})", path));
        self.status(self.fail_check)
    }

    fn compile(&mut self, path: Option<&str>) -> Result<(), NativeFailure> {
        self.enter(format!("compile({:?})", path));
        self.status(self.fail_compile)
    }

    fn file(&mut self, path: &str) -> Result<String, NativeFailure> {
        self.enter(format!("file({})", path));
        self.classify(self.fail_classify)
    }

    fn descriptor(&mut self, fd: i32) -> Result<String, NativeFailure> {
        self.enter(format!("descriptor({})", fd));
        self.classify(self.fail_classify)
    }

    fn buffer(&mut self, bytes: &[u8]) -> Result<String, NativeFailure> {
        self.enter(format!("buffer({})", bytes.len()));
        self.classify(self.fail_classify)
    }

    fn last_error(&self) -> Option<String> {
        self.error.as_ref().map(|(message, _)| message.clone())
    }

    fn last_errno(&self) -> i32 {
        self.error.as_ref().map(|(_, errno)| *errno).unwrap_or(0)
    }
}

impl Drop for FakeEngine {
    fn drop(&mut self) {
        if let Ok(mut log) = self.log.lock() {
            log.releases += 1;
        }
    }
}
