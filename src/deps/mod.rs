//! Go module prefetching for sandbox jobs.
//!
//! Private modules matching the configured patterns are downloaded on the host
//! into the job's exchange directory, so the sandbox can resolve them through
//! a `file://` module proxy without credentials.

pub mod gomod;

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::runner::{CommandRunner, CommandSpec};

/// Manifest file name scanned for requirements.
pub const MANIFEST_NAME: &str = "go.mod";

/// Subdirectory of the exchange directory used as `GOMODCACHE`.
pub const CACHE_DIR_NAME: &str = "gomodcache";

/// A module path at a specific version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepCoordinate {
    pub path: String,
    pub version: String,
}

impl DepCoordinate {
    pub fn new(path: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for DepCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path, self.version)
    }
}

/// Turns a pattern like `github.com/myorg/*` into the prefix `github.com/myorg/`.
/// Patterns without a trailing wildcard are used as-is.
pub fn prefix_from_pattern(pattern: &str) -> &str {
    pattern.strip_suffix('*').unwrap_or(pattern)
}

/// Scans every `go.mod` under `source_root` and returns the requirements whose
/// module path starts with one of the pattern prefixes.
///
/// Indirect requirements are included. Directories and files that cannot be
/// read, and manifests that cannot be parsed, are skipped and the walk
/// continues: the result is best-effort. With no patterns the tree is not
/// walked at all.
pub fn find_matching_deps(source_root: &Path, patterns: &[String]) -> Vec<DepCoordinate> {
    if patterns.is_empty() {
        return Vec::new();
    }

    let prefixes: Vec<&str> = patterns.iter().map(|p| prefix_from_pattern(p)).collect();
    let mut found = BTreeSet::new();

    for entry in WalkDir::new(source_root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() || entry.file_name() != MANIFEST_NAME {
            continue;
        }

        let contents = match std::fs::read_to_string(entry.path()) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::debug!(path = ?entry.path(), error = %e, "skipping unreadable manifest");
                continue;
            }
        };

        let requires = match gomod::parse_requires(&contents) {
            Ok(requires) => requires,
            Err(e) => {
                tracing::debug!(path = ?entry.path(), error = %e, "skipping unparsable manifest");
                continue;
            }
        };

        for req in requires {
            if prefixes.iter().any(|prefix| req.path.starts_with(prefix)) {
                found.insert(DepCoordinate::new(req.path, req.version));
            }
        }
    }

    found.into_iter().collect()
}

/// Downloads modules into an exchange directory with the Go toolchain.
pub struct DependencyCache {
    runner: Arc<dyn CommandRunner>,
    go: String,
}

impl DependencyCache {
    /// Creates a cache builder using `go` from `PATH`.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            go: "go".to_string(),
        }
    }

    /// Overrides the `go` binary.
    pub fn with_go(mut self, go: impl Into<String>) -> Self {
        self.go = go.into();
        self
    }

    /// Fetches `deps` in a single `go mod download` into
    /// `<exchange_dir>/gomodcache`, bypassing any module proxy, and returns
    /// that path.
    pub async fn download(&self, deps: &[DepCoordinate], exchange_dir: &Path) -> Result<PathBuf> {
        let cache = exchange_dir.join(CACHE_DIR_NAME);
        if deps.is_empty() {
            return Ok(cache);
        }

        let spec = CommandSpec::new(&self.go)
            .args(["mod", "download"])
            .args(deps.iter().map(ToString::to_string))
            .env("GOMODCACHE", cache.to_string_lossy())
            .env("GOPROXY", "direct")
            // Module caches are read-only by default, which breaks cleanup.
            .env("GOFLAGS", "-modcacherw");

        tracing::info!(count = deps.len(), cache = ?cache, "downloading Go dependencies");
        let output = self.runner.output(&spec).await?;
        if !output.success {
            return Err(Error::DependencyFetch(format!(
                "go mod download: {}",
                output.describe_failure()
            )));
        }
        Ok(cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::ScriptedRunner;
    use crate::runner::CommandOutput;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn strings(deps: &[DepCoordinate]) -> Vec<String> {
        deps.iter().map(ToString::to_string).collect()
    }

    fn myorg() -> Vec<String> {
        vec!["github.com/myorg/*".to_string()]
    }

    #[test]
    fn prefix_from_pattern_strips_trailing_wildcard() {
        assert_eq!(prefix_from_pattern("github.com/myorg/*"), "github.com/myorg/");
        assert_eq!(prefix_from_pattern("example.com/*"), "example.com/");
        assert_eq!(prefix_from_pattern("no-glob"), "no-glob");
    }

    #[test]
    fn no_manifest_finds_nothing() {
        let dir = TempDir::new().unwrap();
        assert!(find_matching_deps(dir.path(), &myorg()).is_empty());
    }

    #[test]
    fn empty_patterns_skip_the_walk() {
        // A root that does not exist would make a walk yield only errors;
        // with no patterns nothing is touched.
        let deps = find_matching_deps(Path::new("/definitely/not/here"), &[]);
        assert!(deps.is_empty());

        let dir = TempDir::new().unwrap();
        write(dir.path(), "go.mod", "module x\n\nrequire github.com/myorg/foo v1.0.0\n");
        assert!(find_matching_deps(dir.path(), &[]).is_empty());
    }

    #[test]
    fn root_manifest_filters_by_prefix() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "go.mod",
            "module example.com/myapp\n\ngo 1.23\n\nrequire (\n\tgithub.com/myorg/foo v1.2.3\n\tgithub.com/myorg/bar v0.4.0\n\tgithub.com/public/lib v1.0.0\n)\n",
        );

        let deps = find_matching_deps(dir.path(), &myorg());

        assert_eq!(
            strings(&deps),
            ["github.com/myorg/bar@v0.4.0", "github.com/myorg/foo@v1.2.3"]
        );
    }

    #[test]
    fn nested_manifests_are_found() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "go.mod", "module a\n\nrequire github.com/myorg/foo v1.0.0\n");
        write(
            dir.path(),
            "tools/deep/go.mod",
            "module a/tools\n\nrequire github.com/myorg/bar v0.5.0\n",
        );

        let deps = find_matching_deps(dir.path(), &myorg());

        assert_eq!(
            strings(&deps),
            ["github.com/myorg/bar@v0.5.0", "github.com/myorg/foo@v1.0.0"]
        );
    }

    #[test]
    fn identical_requirements_are_deduplicated() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "go.mod", "module a\n\nrequire github.com/myorg/foo v1.0.0\n");
        write(dir.path(), "sub/go.mod", "module b\n\nrequire github.com/myorg/foo v1.0.0\n");
        write(dir.path(), "other/go.mod", "module c\n\nrequire github.com/myorg/foo v1.1.0\n");

        let deps = find_matching_deps(dir.path(), &myorg());

        assert_eq!(
            strings(&deps),
            ["github.com/myorg/foo@v1.0.0", "github.com/myorg/foo@v1.1.0"]
        );
    }

    #[test]
    fn multiple_patterns_match() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "go.mod",
            "module x\n\nrequire (\n\tgithub.com/orgA/foo v1.0.0\n\tgithub.com/orgB/bar v0.8.0\n\tgithub.com/public/lib v1.3.0\n)\n",
        );
        let patterns = vec!["github.com/orgA/*".to_string(), "github.com/orgB/*".to_string()];

        let deps = find_matching_deps(dir.path(), &patterns);

        assert_eq!(
            strings(&deps),
            ["github.com/orgA/foo@v1.0.0", "github.com/orgB/bar@v0.8.0"]
        );
    }

    #[test]
    fn indirect_requirements_are_included() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "go.mod",
            "module x\n\nrequire (\n\tgithub.com/myorg/direct v1.0.0\n\tgithub.com/myorg/indirect v0.3.0 // indirect\n)\n",
        );

        let deps = find_matching_deps(dir.path(), &myorg());

        assert_eq!(
            strings(&deps),
            ["github.com/myorg/direct@v1.0.0", "github.com/myorg/indirect@v0.3.0"]
        );
    }

    #[test]
    fn unparsable_manifest_is_skipped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "broken/go.mod", "require (\n\tgithub.com/myorg/nope\n");
        write(dir.path(), "go.mod", "module x\n\nrequire github.com/myorg/ok v1.0.0\n");

        let deps = find_matching_deps(dir.path(), &myorg());

        assert_eq!(strings(&deps), ["github.com/myorg/ok@v1.0.0"]);
    }

    #[tokio::test]
    async fn download_runs_go_once_with_cache_env() {
        let runner = Arc::new(ScriptedRunner::new());
        let cache = DependencyCache::new(runner.clone());
        let deps = vec![
            DepCoordinate::new("github.com/myorg/bar", "v0.4.0"),
            DepCoordinate::new("github.com/myorg/foo", "v1.2.3"),
        ];

        let path = cache.download(&deps, Path::new("/ex/abcd1234")).await.unwrap();

        assert_eq!(path, PathBuf::from("/ex/abcd1234/gomodcache"));
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].line(),
            "go mod download github.com/myorg/bar@v0.4.0 github.com/myorg/foo@v1.2.3"
        );
        let envs = calls[0].spec.envs();
        assert!(envs.contains(&("GOMODCACHE".to_string(), "/ex/abcd1234/gomodcache".to_string())));
        assert!(envs.contains(&("GOPROXY".to_string(), "direct".to_string())));
    }

    #[tokio::test]
    async fn download_failure_surfaces_tool_output() {
        let runner = Arc::new(ScriptedRunner::new().on(
            "go mod download",
            CommandOutput::failed("github.com/myorg/foo@v9.9.9: invalid version: unknown revision"),
        ));
        let cache = DependencyCache::new(runner);

        let err = cache
            .download(&[DepCoordinate::new("github.com/myorg/foo", "v9.9.9")], Path::new("/ex/j"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DependencyFetch(_)));
        assert!(err.to_string().contains("unknown revision"));
    }

    #[tokio::test]
    async fn download_with_nothing_to_fetch_is_noop() {
        let runner = Arc::new(ScriptedRunner::new());
        let cache = DependencyCache::new(runner.clone()).with_go("/usr/local/go/bin/go");

        let path = cache.download(&[], Path::new("/ex/j")).await.unwrap();

        assert_eq!(path, PathBuf::from("/ex/j/gomodcache"));
        assert!(runner.calls().is_empty());
    }
}
