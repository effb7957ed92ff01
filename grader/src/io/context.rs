//! Ambient workspace context.
//!
//! The active workspace is a per-thread stack of absolute paths. Installing a
//! path with [`with_workspace`] pushes it for the duration of a closure and
//! pops it when the closure returns or unwinds, so nested installations shadow
//! outer ones and concurrent callers on other threads never observe each
//! other's path.
//!
//! When nothing is installed, [`workspace`] falls back to a process-wide
//! default read once from `GRADER_WORKSPACE`. Later changes to the
//! environment are not observed.

use std::cell::RefCell;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::debug;

/// Environment variable supplying the lazy default workspace.
pub const WORKSPACE_ENV: &str = "GRADER_WORKSPACE";

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("no active workspace (install one or set {WORKSPACE_ENV})")]
    NoActiveWorkspace,
    #[error("invalid workspace path '{path}': {source}")]
    InvalidPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

thread_local! {
    static STACK: RefCell<Vec<PathBuf>> = const { RefCell::new(Vec::new()) };
}

static DEFAULT: LazyDefault<fn() -> Option<OsString>> =
    LazyDefault::new(read_env_default as fn() -> Option<OsString>);

fn read_env_default() -> Option<OsString> {
    std::env::var_os(WORKSPACE_ENV)
}

/// A default computed at most once, on first use, from `source`.
///
/// Concurrent first reads race safely: exactly one initialiser runs and every
/// caller observes its result.
pub struct LazyDefault<F> {
    source: F,
    cell: OnceLock<Option<PathBuf>>,
}

impl<F> LazyDefault<F>
where
    F: Fn() -> Option<OsString>,
{
    pub const fn new(source: F) -> Self {
        Self {
            source,
            cell: OnceLock::new(),
        }
    }

    pub fn get(&self) -> Option<&Path> {
        self.cell
            .get_or_init(|| {
                let raw = (self.source)().filter(|value| !value.is_empty())?;
                let path = PathBuf::from(raw);
                let resolved = std::path::absolute(&path).unwrap_or(path);
                debug!(workspace = %resolved.display(), "lazy default workspace resolved");
                Some(resolved)
            })
            .as_deref()
    }
}

/// The active workspace path for the calling thread.
pub fn workspace() -> Result<PathBuf, ContextError> {
    active_or(&DEFAULT)
}

fn active_or<F>(default: &LazyDefault<F>) -> Result<PathBuf, ContextError>
where
    F: Fn() -> Option<OsString>,
{
    if let Some(active) = installed() {
        return Ok(active);
    }
    default
        .get()
        .map(Path::to_path_buf)
        .ok_or(ContextError::NoActiveWorkspace)
}

/// The innermost explicitly installed path, ignoring the lazy default.
pub fn installed() -> Option<PathBuf> {
    STACK.with(|stack| stack.borrow().last().cloned())
}

/// Run `body` with `path` (made absolute) as the active workspace.
///
/// The previous value is restored when `body` returns or panics.
pub fn with_workspace<R>(
    path: impl AsRef<Path>,
    body: impl FnOnce() -> R,
) -> Result<R, ContextError> {
    let path = path.as_ref();
    let resolved = std::path::absolute(path).map_err(|source| ContextError::InvalidPath {
        path: path.to_path_buf(),
        source,
    })?;
    let _guard = Installed::push(resolved);
    Ok(body())
}

/// Pops the installed path on drop, including during unwinding.
struct Installed;

impl Installed {
    fn push(path: PathBuf) -> Self {
        STACK.with(|stack| stack.borrow_mut().push(path));
        Installed
    }
}

impl Drop for Installed {
    fn drop(&mut self) {
        STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// A captured installation that another thread can explicitly inherit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSnapshot {
    workspace: Option<PathBuf>,
}

/// Capture the calling thread's installed workspace (if any).
pub fn snapshot() -> ContextSnapshot {
    ContextSnapshot {
        workspace: installed(),
    }
}

impl ContextSnapshot {
    pub fn workspace(&self) -> Option<&Path> {
        self.workspace.as_deref()
    }

    /// Run `body` on the current thread with the captured workspace installed.
    pub fn enter<R>(&self, body: impl FnOnce() -> R) -> R {
        match &self.workspace {
            Some(path) => {
                let _guard = Installed::push(path.clone());
                body()
            }
            None => body(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn none() -> Option<OsString> {
        None
    }

    #[test]
    fn nested_installations_shadow_and_restore() {
        let before = installed();
        let inner = with_workspace("/tmp/outer", || {
            let outer = installed();
            let inner = with_workspace("/tmp/inner", installed).expect("inner");
            assert_eq!(installed(), outer);
            inner
        })
        .expect("outer");
        assert_eq!(inner, Some(PathBuf::from("/tmp/inner")));
        assert_eq!(installed(), before);
    }

    #[test]
    fn relative_paths_are_made_absolute() {
        let active = with_workspace("relative/dir", installed)
            .expect("install")
            .expect("active");
        assert!(active.is_absolute());
        assert!(active.ends_with("relative/dir"));
    }

    #[test]
    fn restores_previous_value_after_panic() {
        let result = std::panic::catch_unwind(|| {
            with_workspace("/tmp/panics", || panic!("boom")).expect("install");
        });
        assert!(result.is_err());
        assert_eq!(installed(), None);
    }

    #[test]
    fn missing_workspace_is_an_error() {
        let default = LazyDefault::new(none);
        let err = active_or(&default).expect_err("no workspace");
        assert!(matches!(err, ContextError::NoActiveWorkspace));
    }

    #[test]
    fn installation_beats_lazy_default() {
        let default = LazyDefault::new(|| Some(OsString::from("/tmp/default")));
        assert_eq!(active_or(&default).expect("default"), PathBuf::from("/tmp/default"));
        let active = with_workspace("/tmp/explicit", || active_or(&default))
            .expect("install")
            .expect("active");
        assert_eq!(active, PathBuf::from("/tmp/explicit"));
    }

    #[test]
    fn lazy_default_reads_source_once() {
        static ENV: Mutex<Option<&str>> = Mutex::new(Some("/tmp/first"));
        static READS: AtomicUsize = AtomicUsize::new(0);
        fn source() -> Option<OsString> {
            READS.fetch_add(1, Ordering::SeqCst);
            let value = *ENV.lock().expect("env lock");
            value.map(OsString::from)
        }

        let default = LazyDefault::new(source);
        assert_eq!(default.get(), Some(Path::new("/tmp/first")));
        *ENV.lock().expect("env lock") = Some("/tmp/second");
        assert_eq!(default.get(), Some(Path::new("/tmp/first")));
        assert_eq!(READS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_first_reads_observe_one_value() {
        static READS: AtomicUsize = AtomicUsize::new(0);
        fn source() -> Option<OsString> {
            let n = READS.fetch_add(1, Ordering::SeqCst);
            Some(OsString::from(format!("/tmp/default-{n}")))
        }
        let default = LazyDefault::new(source);
        let seen: Vec<PathBuf> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| default.get().map(Path::to_path_buf)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("join").expect("value"))
                .collect()
        });
        assert!(seen.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(READS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn other_threads_only_see_inherited_snapshots() {
        with_workspace("/tmp/parent", || {
            let plain = std::thread::spawn(installed).join().expect("join");
            assert_eq!(plain, None);

            let snap = snapshot();
            let inherited = std::thread::spawn(move || snap.enter(installed))
                .join()
                .expect("join");
            assert_eq!(inherited, Some(PathBuf::from("/tmp/parent")));
        })
        .expect("install");
    }
}
