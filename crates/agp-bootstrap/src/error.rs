//! Resolution errors

/// Why the real system library could not be resolved
///
/// Recorded once; every forwarding call then degrades to its fallback value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("Could not determine system directory: {0}")]
    SystemDirectory(String),

    #[error("Failed to load '{path}': {reason}")]
    LibraryLoad { path: String, reason: String },
}
