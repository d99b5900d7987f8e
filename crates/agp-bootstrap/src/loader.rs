//! Library loading seam
//!
//! `LibraryLoader` locates and opens the real system library;
//! `SymbolSource` hands out raw entry-point addresses from it.
//! `SystemLoader` is the production implementation on top of
//! `libloading`.

use crate::error::ResolveError;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use tracing::debug;

/// Something that exports named entry points
pub trait SymbolSource {
    /// Raw address of an exported symbol, `None` if it is not exported
    fn symbol(&self, name: &str) -> Option<NonNull<c_void>>;
}

/// Locates and opens the real library
pub trait LibraryLoader: Send + Sync {
    /// Open library handle; dropping it releases the library
    type Library: SymbolSource + Send;

    /// Canonical path: system directory + fixed file name
    fn system_path(&self) -> Result<PathBuf, ResolveError>;

    /// Open the library at `path`
    fn open(&self, path: &Path) -> Result<Self::Library, ResolveError>;
}

/// Loads a library from the operating system's system directory
#[derive(Debug, Clone)]
pub struct SystemLoader {
    file_name: &'static str,
    /// Overrides the platform system directory
    system_dir: Option<PathBuf>,
}

impl SystemLoader {
    pub fn new(file_name: &'static str) -> Self {
        Self {
            file_name,
            system_dir: None,
        }
    }

    /// Use a fixed directory instead of asking the OS
    pub fn with_system_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.system_dir = Some(dir.into());
        self
    }

    pub fn file_name(&self) -> &'static str {
        self.file_name
    }

    fn system_directory(&self) -> Result<PathBuf, ResolveError> {
        match &self.system_dir {
            Some(dir) => Ok(dir.clone()),
            None => platform_system_directory(),
        }
    }
}

impl LibraryLoader for SystemLoader {
    type Library = SystemLibrary;

    fn system_path(&self) -> Result<PathBuf, ResolveError> {
        Ok(self.system_directory()?.join(self.file_name))
    }

    fn open(&self, path: &Path) -> Result<SystemLibrary, ResolveError> {
        debug!("Loading {}", path.display());

        // SAFETY: this is the OS copy of the library we stand in for; its
        // initialisers are the ones the host process expected to run anyway.
        let inner = unsafe { libloading::Library::new(path) }.map_err(|e| {
            ResolveError::LibraryLoad {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(SystemLibrary {
            inner,
            path: path.to_path_buf(),
        })
    }
}

/// An open handle to the real library
pub struct SystemLibrary {
    inner: libloading::Library,
    path: PathBuf,
}

impl SystemLibrary {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SymbolSource for SystemLibrary {
    fn symbol(&self, name: &str) -> Option<NonNull<c_void>> {
        // SAFETY: the symbol is only read as an address; `VersionApi` gives it
        // the documented signature before anything calls it.
        let symbol = unsafe { self.inner.get::<*mut c_void>(name.as_bytes()) }.ok()?;
        NonNull::new(*symbol)
    }
}

impl std::fmt::Debug for SystemLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemLibrary").field("path", &self.path).finish()
    }
}

#[cfg(windows)]
fn platform_system_directory() -> Result<PathBuf, ResolveError> {
    use std::ffi::OsString;
    use std::os::windows::ffi::OsStringExt;
    use windows_sys::Win32::System::SystemInformation::GetSystemDirectoryW;

    let mut buf = vec![0u16; 260];
    loop {
        // SAFETY: the buffer is valid for `buf.len()` UTF-16 units
        let len = unsafe { GetSystemDirectoryW(buf.as_mut_ptr(), buf.len() as u32) } as usize;
        if len == 0 {
            return Err(ResolveError::SystemDirectory(
                std::io::Error::last_os_error().to_string(),
            ));
        }
        if len < buf.len() {
            buf.truncate(len);
            return Ok(PathBuf::from(OsString::from_wide(&buf)));
        }
        // too small: `len` is the required size including the terminator
        buf.resize(len, 0);
    }
}

#[cfg(not(windows))]
fn platform_system_directory() -> Result<PathBuf, ResolveError> {
    Ok(PathBuf::from("/usr/lib"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_path_joins_file_name() {
        let loader = SystemLoader::new("version.dll").with_system_dir("/opt/sys");
        assert_eq!(loader.system_path().unwrap(), PathBuf::from("/opt/sys/version.dll"));
        assert_eq!(loader.file_name(), "version.dll");
    }

    #[test]
    fn test_platform_directory_is_absolute() {
        let loader = SystemLoader::new("version.dll");
        let path = loader.system_path().unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("version.dll"));
    }

    #[test]
    fn test_open_missing_library_fails() {
        let dir = std::env::temp_dir().join("agp-bootstrap-missing-dir");
        let loader = SystemLoader::new("does-not-exist.dll").with_system_dir(&dir);
        let path = loader.system_path().unwrap();

        let err = loader.open(&path).unwrap_err();
        assert!(matches!(err, ResolveError::LibraryLoad { .. }));
    }
}
