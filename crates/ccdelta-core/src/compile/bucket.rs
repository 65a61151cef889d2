use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::errors::CompileError;

use super::{BuildSpec, Compiler, WorkResult};

/// One per-source option entry: a file predicate plus an action that
/// contributes extra compiler arguments. Several rules may apply to the
/// same file; their contributions compose in registration order.
pub struct SourceOptionsRule {
    matcher: Box<dyn Fn(&Path) -> bool>,
    action: Box<dyn Fn(&mut Vec<String>)>,
}

impl SourceOptionsRule {
    pub fn new(
        matcher: impl Fn(&Path) -> bool + 'static,
        action: impl Fn(&mut Vec<String>) + 'static,
    ) -> Self {
        Self {
            matcher: Box::new(matcher),
            action: Box::new(action),
        }
    }

    /// Rule that appends a fixed argument list
    pub fn appending(matcher: impl Fn(&Path) -> bool + 'static, args: Vec<String>) -> Self {
        Self::new(matcher, move |target| target.extend(args.iter().cloned()))
    }

    fn matches(&self, file: &Path) -> bool {
        (self.matcher)(file)
    }

    fn contribute(&self, args: &mut Vec<String>) {
        (self.action)(args)
    }
}

/// Splits one logical compilation into the default bucket plus one bucket
/// per distinct set of applicable option rules, delegating each non-empty
/// bucket to the underlying compiler.
///
/// The default bucket runs first and carries the removed-sources list, so
/// stale object deletion happens exactly once. Operation start/done logs
/// fire once per logical job regardless of how many invocations run.
pub struct BucketingCompiler<'a, C> {
    underlying: C,
    rules: &'a [SourceOptionsRule],
}

impl<'a, C: Compiler> BucketingCompiler<'a, C> {
    pub fn new(underlying: C, rules: &'a [SourceOptionsRule]) -> Self {
        Self { underlying, rules }
    }

    fn bucket_key(indices: &[usize]) -> String {
        indices
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join("-")
    }

    fn bucket_args(&self, indices: &[usize]) -> Vec<String> {
        let mut args = Vec::new();
        for index in indices {
            self.rules[*index].contribute(&mut args);
        }
        args
    }
}

impl<C: Compiler> Compiler for BucketingCompiler<'_, C> {
    fn execute(&mut self, spec: &BuildSpec) -> Result<WorkResult, CompileError> {
        let mut default_sources: Vec<PathBuf> = Vec::new();
        let mut buckets: IndexMap<String, (Vec<usize>, Vec<PathBuf>)> = IndexMap::new();

        for source in &spec.source_files {
            let matched: Vec<usize> = self
                .rules
                .iter()
                .enumerate()
                .filter(|(_, rule)| rule.matches(source))
                .map(|(index, _)| index)
                .collect();
            if matched.is_empty() {
                default_sources.push(source.clone());
            } else {
                let key = Self::bucket_key(&matched);
                buckets
                    .entry(key)
                    .or_insert_with(|| (matched, Vec::new()))
                    .1
                    .push(source.clone());
            }
        }

        let run_default = !default_sources.is_empty() || !spec.removed_sources.is_empty();
        let expected = buckets.len() + usize::from(run_default);
        if expected == 0 {
            return Ok(WorkResult::default());
        }

        info!(
            "{}: compiling {} source file(s) in {} invocation(s)",
            spec.name,
            spec.source_files.len(),
            expected
        );

        let mut completed = 0;
        let mut work = WorkResult::default();

        if run_default {
            let default_spec = spec.with_sources(default_sources);
            work.did_work |= self.underlying.execute(&default_spec)?.did_work;
            completed += 1;
        }
        for (key, (indices, sources)) in &buckets {
            debug!(
                "{}: bucket {key} compiles {} source file(s)",
                spec.name,
                sources.len()
            );
            let bucket_spec = spec.for_bucket(key, sources.clone(), self.bucket_args(indices));
            work.did_work |= self.underlying.execute(&bucket_spec)?.did_work;
            completed += 1;
        }

        debug_assert_eq!(completed, expected);
        info!("{}: done after {completed} invocation(s)", spec.name);
        Ok(work)
    }
}
