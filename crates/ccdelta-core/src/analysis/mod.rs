//! Conservative header-inclusion analysis for C/C++ translation units
//!
//! This module parses preprocessor directives from source text, resolves
//! include directives against the configured search paths and the macro
//! environment in effect at the point of inclusion, and walks the resulting
//! graph to produce content-hash based per-file records. It is deliberately
//! not a full preprocessor: `#if` blocks are not evaluated and function-like
//! macros are never expanded; ambiguous resolutions degrade to a
//! conservative "unresolved" outcome that forces recompilation.

mod directives;
mod macros;
mod resolver;
mod walker;

pub use directives::{parse_directives, Directive, Include, MacroBody, MacroDef};
pub use macros::MacroEnvironment;
pub use resolver::{IncludeResolver, ResolveOutcome, ResolvedPath};
pub use walker::{Analysis, DependencyGraphWalker, IncludeOutcome};

use std::sync::atomic::{AtomicBool, Ordering};

static IGNORE_UNRESOLVED_HEADERS: AtomicBool = AtomicBool::new(false);

/// Process-wide escape hatch: treat includes that cannot be resolved as
/// absent instead of poisoning the owning translation unit. Read once per
/// walker construction.
pub fn set_ignore_unresolved_headers(enabled: bool) {
    IGNORE_UNRESOLVED_HEADERS.store(enabled, Ordering::Relaxed);
}

pub(crate) fn ignore_unresolved_headers() -> bool {
    IGNORE_UNRESOLVED_HEADERS.load(Ordering::Relaxed)
}
