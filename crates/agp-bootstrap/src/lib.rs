//! AGP Bootstrap
//!
//! Stand-in for the system `version.dll`. The host process loads us under
//! that name; every export forwards to the real library, which is located
//! and opened only when the first call arrives.
//!
//! ```text
//! host call ──► Bootstrap::api() ──► LazyResolved (once) ──► LibraryLoader
//!                      │                                       └─ open + resolve
//!                      └──► VersionApi::<export>() ──► real target, or FALSE / 0
//! ```

mod bootstrap;
mod error;
mod lazy;
mod loader;
mod version_api;

pub use bootstrap::{Bootstrap, VERSION_DLL};
pub use error::ResolveError;
pub use lazy::{LazyPhase, LazyResolved};
pub use loader::{LibraryLoader, SymbolSource, SystemLibrary, SystemLoader};
pub use version_api::{ffi, VersionApi};
