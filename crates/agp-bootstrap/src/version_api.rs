//! Typed `version.dll` entry-point table
//!
//! One optional call target per export of the real library. A missing
//! target is not an error: the forwarding method returns the export's
//! native failure value (`FALSE` or `0`) instead of calling anything.

use crate::loader::SymbolSource;
use std::ffi::c_void;

/// Win32 scalar and pointer types used by the `version.dll` exports
#[allow(non_camel_case_types, clippy::upper_case_acronyms)]
pub mod ffi {
    use std::ffi::{c_char, c_void};

    pub type BOOL = i32;
    pub type DWORD = u32;
    pub type UINT = u32;
    pub type HANDLE = *mut c_void;
    pub type LPVOID = *mut c_void;
    pub type LPCVOID = *const c_void;
    pub type LPDWORD = *mut DWORD;
    pub type PUINT = *mut UINT;
    pub type LPSTR = *mut c_char;
    pub type LPCSTR = *const c_char;
    pub type LPWSTR = *mut u16;
    pub type LPCWSTR = *const u16;

    pub const FALSE: BOOL = 0;
    pub const TRUE: BOOL = 1;
}

use ffi::*;

macro_rules! version_api {
    ($(
        $(#[$doc:meta])*
        $field:ident = $symbol:literal: fn($($arg:ident: $ty:ty),* $(,)?) -> $ret:ty, or $fallback:expr;
    )*) => {
        /// Resolved call targets, one per export
        #[derive(Clone, Copy)]
        pub struct VersionApi {
            $( $field: Option<unsafe extern "system" fn($($ty),*) -> $ret>, )*
        }

        impl VersionApi {
            /// Table with no call targets; every call returns its fallback
            pub const EMPTY: Self = Self { $( $field: None, )* };

            /// Export names, in table order
            pub const SYMBOLS: &'static [&'static str] = &[$( $symbol, )*];

            /// Look up every export by name
            pub fn resolve(source: &dyn SymbolSource) -> Self {
                Self {
                    $(
                        $field: source.symbol($symbol).map(|ptr| {
                            // SAFETY: every export has exactly the signature
                            // declared for it in this table.
                            unsafe {
                                std::mem::transmute::<*mut c_void, unsafe extern "system" fn($($ty),*) -> $ret>(
                                    ptr.as_ptr(),
                                )
                            }
                        }),
                    )*
                }
            }

            /// Exports that resolved
            pub fn available(&self) -> Vec<&'static str> {
                let mut names = Vec::new();
                $( if self.$field.is_some() { names.push($symbol); } )*
                names
            }

            /// Exports that did not resolve
            pub fn missing(&self) -> Vec<&'static str> {
                let mut names = Vec::new();
                $( if self.$field.is_none() { names.push($symbol); } )*
                names
            }

            pub fn is_empty(&self) -> bool {
                $( self.$field.is_none() && )* true
            }

            $(
                $(#[$doc])*
                ///
                /// # Safety
                ///
                /// Same contract as the native export: every pointer must be
                /// valid for the access the export performs.
                pub unsafe fn $field(&self, $($arg: $ty),*) -> $ret {
                    match self.$field {
                        Some(target) => unsafe { target($($arg),*) },
                        None => $fallback,
                    }
                }
            )*
        }
    };
}

version_api! {
    /// `GetFileVersionInfoA`; `FALSE` when unavailable
    get_file_version_info_a = "GetFileVersionInfoA":
        fn(filename: LPCSTR, handle: DWORD, len: DWORD, data: LPVOID) -> BOOL, or FALSE;

    /// `GetFileVersionInfoByHandle`; `0` when unavailable
    get_file_version_info_by_handle = "GetFileVersionInfoByHandle":
        fn(flags: DWORD, file: HANDLE, len: DWORD, data: LPVOID) -> DWORD, or 0;

    /// `GetFileVersionInfoExA`; `FALSE` when unavailable
    get_file_version_info_ex_a = "GetFileVersionInfoExA":
        fn(flags: DWORD, filename: LPCSTR, handle: DWORD, len: DWORD, data: LPVOID) -> BOOL, or FALSE;

    /// `GetFileVersionInfoExW`; `FALSE` when unavailable
    get_file_version_info_ex_w = "GetFileVersionInfoExW":
        fn(flags: DWORD, filename: LPCWSTR, handle: DWORD, len: DWORD, data: LPVOID) -> BOOL, or FALSE;

    /// `GetFileVersionInfoSizeA`; `0` when unavailable
    get_file_version_info_size_a = "GetFileVersionInfoSizeA":
        fn(filename: LPCSTR, handle: LPDWORD) -> DWORD, or 0;

    /// `GetFileVersionInfoSizeExA`; `0` when unavailable
    get_file_version_info_size_ex_a = "GetFileVersionInfoSizeExA":
        fn(flags: DWORD, filename: LPCSTR, handle: LPDWORD) -> DWORD, or 0;

    /// `GetFileVersionInfoSizeExW`; `0` when unavailable
    get_file_version_info_size_ex_w = "GetFileVersionInfoSizeExW":
        fn(flags: DWORD, filename: LPCWSTR, handle: LPDWORD) -> DWORD, or 0;

    /// `GetFileVersionInfoSizeW`; `0` when unavailable
    get_file_version_info_size_w = "GetFileVersionInfoSizeW":
        fn(filename: LPCWSTR, handle: LPDWORD) -> DWORD, or 0;

    /// `GetFileVersionInfoW`; `FALSE` when unavailable
    get_file_version_info_w = "GetFileVersionInfoW":
        fn(filename: LPCWSTR, handle: DWORD, len: DWORD, data: LPVOID) -> BOOL, or FALSE;

    /// `VerFindFileA`; `0` when unavailable
    ver_find_file_a = "VerFindFileA":
        fn(
            flags: DWORD,
            file_name: LPCSTR,
            win_dir: LPCSTR,
            app_dir: LPCSTR,
            cur_dir: LPSTR,
            cur_dir_len: PUINT,
            dest_dir: LPSTR,
            dest_dir_len: PUINT,
        ) -> DWORD, or 0;

    /// `VerFindFileW`; `0` when unavailable
    ver_find_file_w = "VerFindFileW":
        fn(
            flags: DWORD,
            file_name: LPCWSTR,
            win_dir: LPCWSTR,
            app_dir: LPCWSTR,
            cur_dir: LPWSTR,
            cur_dir_len: PUINT,
            dest_dir: LPWSTR,
            dest_dir_len: PUINT,
        ) -> DWORD, or 0;

    /// `VerInstallFileA`; `0` when unavailable
    ver_install_file_a = "VerInstallFileA":
        fn(
            flags: DWORD,
            src_file_name: LPCSTR,
            dest_file_name: LPCSTR,
            src_dir: LPCSTR,
            dest_dir: LPCSTR,
            cur_dir: LPCSTR,
            tmp_file: LPSTR,
            tmp_file_len: PUINT,
        ) -> DWORD, or 0;

    /// `VerInstallFileW`; `0` when unavailable
    ver_install_file_w = "VerInstallFileW":
        fn(
            flags: DWORD,
            src_file_name: LPCWSTR,
            dest_file_name: LPCWSTR,
            src_dir: LPCWSTR,
            dest_dir: LPCWSTR,
            cur_dir: LPCWSTR,
            tmp_file: LPWSTR,
            tmp_file_len: PUINT,
        ) -> DWORD, or 0;

    /// `VerLanguageNameA`; `0` when unavailable
    ver_language_name_a = "VerLanguageNameA":
        fn(lang: DWORD, buf: LPSTR, len: DWORD) -> DWORD, or 0;

    /// `VerLanguageNameW`; `0` when unavailable
    ver_language_name_w = "VerLanguageNameW":
        fn(lang: DWORD, buf: LPWSTR, len: DWORD) -> DWORD, or 0;

    /// `VerQueryValueA`; `FALSE` when unavailable
    ver_query_value_a = "VerQueryValueA":
        fn(block: LPCVOID, sub_block: LPCSTR, buffer: *mut LPVOID, len: PUINT) -> BOOL, or FALSE;

    /// `VerQueryValueW`; `FALSE` when unavailable
    ver_query_value_w = "VerQueryValueW":
        fn(block: LPCVOID, sub_block: LPCWSTR, buffer: *mut LPVOID, len: PUINT) -> BOOL, or FALSE;
}

impl Default for VersionApi {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl std::fmt::Debug for VersionApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionApi")
            .field("available", &self.available().len())
            .field("missing", &self.missing())
            .finish()
    }
}
