use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};

use super::directives::{classify_macro_value, is_identifier, Include, MacroBody, MacroDef};

/// Object-like macro chains longer than this resolve to nothing. Real code
/// never aliases an include path this deep; anything longer is pathological.
const MAX_EXPANSION_DEPTH: usize = 16;

/// Layered macro lookup used during a dependency walk: seeded with the
/// compile job's defined macros, then extended and shadowed by definitions
/// discovered in visited files, in textual order.
#[derive(Debug, Clone, Default)]
pub struct MacroEnvironment {
    defs: FxHashMap<String, MacroBody>,
}

impl MacroEnvironment {
    /// Seed an environment from job-level macros (`None` = defined without
    /// a value), preserving their registration order
    pub fn from_job_macros(macros: &IndexMap<String, Option<String>>) -> Self {
        let mut env = MacroEnvironment::default();
        for (name, value) in macros {
            let body = match value {
                Some(value) => classify_macro_value(value),
                None => MacroBody::Empty,
            };
            env.defs.insert(name.clone(), body);
        }
        env
    }

    pub fn define(&mut self, def: &MacroDef) {
        self.defs.insert(def.name.clone(), def.body.clone());
    }

    pub fn undefine(&mut self, name: &str) {
        self.defs.remove(name);
    }

    /// Expand a macro-valued include expression into a concrete quoted or
    /// system include. Returns `None` when the expression is not a plain
    /// identifier, the macro is undefined or opaque, or the chain of
    /// object-like aliases is cyclic or too deep.
    pub fn expand_include(&self, expr: &str) -> Option<Include> {
        let mut name = expr.trim();
        if !is_identifier(name) {
            return None;
        }

        let mut seen: FxHashSet<&str> = FxHashSet::default();
        for _ in 0..MAX_EXPANSION_DEPTH {
            if !seen.insert(name) {
                return None;
            }
            match self.defs.get(name)? {
                MacroBody::Quoted(path) => return Some(Include::Quoted(path.clone())),
                MacroBody::System(path) => return Some(Include::System(path.clone())),
                MacroBody::Token(next) => name = next,
                MacroBody::Empty | MacroBody::Opaque => return None,
            }
        }
        None
    }
}
