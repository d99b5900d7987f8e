//! Lazy `version.dll` bootstrap
//!
//! Nothing is loaded while the host process is attaching us. The real
//! library is opened on the first forwarded call, from whichever thread
//! makes it, and the resolved table is shared by every later call.

use crate::error::ResolveError;
use crate::lazy::{LazyPhase, LazyResolved};
use crate::loader::LibraryLoader;
use crate::version_api::VersionApi;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

/// File name of the system library we stand in for
pub const VERSION_DLL: &str = "version.dll";

/// Owns the real library handle and its resolved entry points
pub struct Bootstrap<L: LibraryLoader> {
    loader: L,
    state: LazyResolved<VersionApi>,
    /// Kept open until teardown so resolved targets stay valid
    library: Mutex<Option<L::Library>>,
    attempts: AtomicUsize,
}

impl<L: LibraryLoader> Bootstrap<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            state: LazyResolved::new(),
            library: Mutex::new(None),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Resolved entry points, loading the real library on first use
    ///
    /// Never fails: if the library cannot be loaded (or after teardown) the
    /// empty table is returned and every call through it yields its fallback.
    pub fn api(&self) -> &VersionApi {
        self.state
            .get_or_resolve(|| self.resolve())
            .unwrap_or(&VersionApi::EMPTY)
    }

    fn resolve(&self) -> Result<VersionApi, ResolveError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);

        let path = self.loader.system_path()?;
        let library = self.loader.open(&path)?;
        let api = VersionApi::resolve(&library);

        let missing = api.missing();
        if missing.is_empty() {
            info!("Loaded {} ({} exports)", path.display(), VersionApi::SYMBOLS.len());
        } else {
            warn!(
                "Loaded {} with {} missing exports: {}",
                path.display(),
                missing.len(),
                missing.join(", ")
            );
        }

        *self.library.lock().unwrap_or_else(PoisonError::into_inner) = Some(library);
        Ok(api)
    }

    pub fn phase(&self) -> LazyPhase {
        self.state.phase()
    }

    /// How many times the library was actually looked for
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Whether a resolved table is in place; does not trigger loading
    pub fn is_available(&self) -> bool {
        self.state.get().is_some()
    }

    /// Release the real library. Nothing is resolved afterwards.
    pub fn teardown(&self) {
        self.state.mark_torn_down();

        let library = self.library.lock().unwrap_or_else(PoisonError::into_inner).take();
        match library {
            Some(library) => {
                drop(library);
                info!("Released {}", VERSION_DLL);
            }
            None => debug!("Teardown with no library loaded"),
        }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::SymbolSource;
    use crate::version_api::ffi::{DWORD, FALSE, LPCWSTR, LPDWORD};
    use std::collections::HashMap;
    use std::ffi::c_void;
    use std::path::{Path, PathBuf};
    use std::ptr::{self, NonNull};
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    unsafe extern "system" fn fake_size_w(_filename: LPCWSTR, _handle: LPDWORD) -> DWORD {
        4096
    }

    struct FakeLibrary {
        exports: HashMap<&'static str, usize>,
        dropped: Arc<AtomicBool>,
    }

    impl SymbolSource for FakeLibrary {
        fn symbol(&self, name: &str) -> Option<NonNull<c_void>> {
            self.exports
                .get(name)
                .and_then(|&addr| NonNull::new(addr as *mut c_void))
        }
    }

    impl Drop for FakeLibrary {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeLoader {
        opens: AtomicUsize,
        fail: bool,
        delay: Duration,
        dropped: Arc<AtomicBool>,
    }

    impl FakeLoader {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }
    }

    impl LibraryLoader for FakeLoader {
        type Library = FakeLibrary;

        fn system_path(&self) -> Result<PathBuf, ResolveError> {
            Ok(PathBuf::from("/fake/system32").join(VERSION_DLL))
        }

        fn open(&self, path: &Path) -> Result<FakeLibrary, ResolveError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            if self.fail {
                return Err(ResolveError::LibraryLoad {
                    path: path.display().to_string(),
                    reason: "not found".into(),
                });
            }

            let mut exports = HashMap::new();
            exports.insert("GetFileVersionInfoSizeW", fake_size_w as usize);
            Ok(FakeLibrary {
                exports,
                dropped: Arc::clone(&self.dropped),
            })
        }
    }

    #[test]
    fn test_nothing_loaded_until_first_use() {
        let bootstrap = Bootstrap::new(FakeLoader::default());
        assert_eq!(bootstrap.phase(), LazyPhase::Uninitialized);
        assert!(!bootstrap.is_available());
        assert_eq!(bootstrap.loader().opens.load(Ordering::SeqCst), 0);

        let api = bootstrap.api();
        assert!(!api.is_empty());
        assert_eq!(bootstrap.phase(), LazyPhase::Resolved);
        assert!(bootstrap.is_available());
        assert_eq!(bootstrap.attempts(), 1);
    }

    #[test]
    fn test_calls_forward_to_real_library() {
        let bootstrap = Bootstrap::new(FakeLoader::default());
        let api = bootstrap.api();

        unsafe {
            assert_eq!(api.get_file_version_info_size_w(ptr::null(), ptr::null_mut()), 4096);
            assert_eq!(api.get_file_version_info_w(ptr::null(), 0, 0, ptr::null_mut()), FALSE);
        }
        assert_eq!(api.available(), vec!["GetFileVersionInfoSizeW"]);
    }

    #[test]
    fn test_concurrent_first_use_loads_once() {
        const THREADS: usize = 16;
        let bootstrap = Bootstrap::new(FakeLoader::slow(Duration::from_millis(20)));
        let barrier = Barrier::new(THREADS);

        let tables: Vec<usize> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        let api = bootstrap.api();
                        let size = unsafe {
                            api.get_file_version_info_size_w(ptr::null(), ptr::null_mut())
                        };
                        assert_eq!(size, 4096);
                        api as *const VersionApi as usize
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(bootstrap.loader().opens.load(Ordering::SeqCst), 1);
        assert_eq!(bootstrap.attempts(), 1);
        assert!(tables.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_concurrent_first_use_fails_together() {
        const THREADS: usize = 16;
        let bootstrap = Bootstrap::new(FakeLoader {
            delay: Duration::from_millis(20),
            ..FakeLoader::failing()
        });
        let barrier = Barrier::new(THREADS);

        let results: Vec<(bool, u32)> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        let api = bootstrap.api();
                        let size = unsafe {
                            api.get_file_version_info_size_w(ptr::null(), ptr::null_mut())
                        };
                        (api.is_empty(), size)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(bootstrap.loader().opens.load(Ordering::SeqCst), 1);
        assert_eq!(bootstrap.attempts(), 1);
        assert!(results.iter().all(|&(empty, size)| empty && size == 0));
        assert_eq!(bootstrap.phase(), LazyPhase::Failed);
        assert!(!bootstrap.is_available());
    }

    #[test]
    fn test_load_failure_is_permanent() {
        let bootstrap = Bootstrap::new(FakeLoader::failing());

        for _ in 0..3 {
            let api = bootstrap.api();
            assert!(api.is_empty());
            unsafe {
                assert_eq!(api.get_file_version_info_size_w(ptr::null(), ptr::null_mut()), 0);
            }
        }

        assert_eq!(bootstrap.phase(), LazyPhase::Failed);
        assert_eq!(bootstrap.loader().opens.load(Ordering::SeqCst), 1);
        assert!(!bootstrap.is_available());
    }

    #[test]
    fn test_teardown_releases_library() {
        let bootstrap = Bootstrap::new(FakeLoader::default());
        bootstrap.api();
        assert!(!bootstrap.loader().dropped.load(Ordering::SeqCst));

        bootstrap.teardown();
        assert!(bootstrap.loader().dropped.load(Ordering::SeqCst));
        assert_eq!(bootstrap.phase(), LazyPhase::TornDown);

        // no re-resolution after teardown
        assert!(bootstrap.api().is_empty());
        assert_eq!(bootstrap.loader().opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_teardown_without_use() {
        let bootstrap = Bootstrap::new(FakeLoader::default());
        bootstrap.teardown();

        assert!(bootstrap.api().is_empty());
        assert_eq!(bootstrap.loader().opens.load(Ordering::SeqCst), 0);
        assert_eq!(bootstrap.attempts(), 0);
    }
}
