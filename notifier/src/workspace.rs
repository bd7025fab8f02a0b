//! Build workspace access: glob listing and zip archiving.

use crate::errors::WorkspaceError;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::cell::Cell;
use std::fs::File;
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// A workspace the dispatch engine can query and archive.
///
/// Both methods block on filesystem access and are run on blocking threads.
pub trait Workspace: Send + Sync + 'static {
    /// Path of the workspace as reported to the service.
    fn remote_path(&self) -> String;

    /// Whether at least one file matches any of the patterns.
    fn has_matches(&self, patterns: &[String]) -> Result<bool, WorkspaceError>;

    /// Write a zip archive of every matching file into `sink`.
    fn archive(&self, patterns: &[String], sink: &mut dyn Write) -> Result<(), WorkspaceError>;
}

/// A workspace rooted in a local directory.
///
/// Patterns are relative to the root and use `/` separators. A single entry
/// may hold several comma-separated patterns. Only the directories under a
/// pattern's literal prefix are walked.
#[derive(Clone, Debug)]
pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directories to walk for `patterns`, with nested ones folded into their parent.
    fn walk_roots(&self, patterns: &[&str]) -> Vec<PathBuf> {
        let mut bases: Vec<PathBuf> = patterns
            .iter()
            .map(|p| match literal_prefix(p) {
                prefix if prefix.as_os_str().is_empty() => self.root.clone(),
                prefix => self.root.join(prefix),
            })
            .filter(|base| *base == self.root || base.is_dir())
            .collect();
        bases.sort();

        let mut roots: Vec<PathBuf> = Vec::with_capacity(bases.len());
        for base in bases {
            if roots.last().is_some_and(|kept| base.starts_with(kept)) {
                continue;
            }
            roots.push(base);
        }
        roots
    }

    fn matching_files(
        &self,
        patterns: &[String],
    ) -> Result<impl Iterator<Item = Result<(PathBuf, String), WorkspaceError>>, WorkspaceError>
    {
        let patterns = split(patterns);
        let globs = compile(&patterns)?;
        let roots = self.walk_roots(&patterns);
        let root = self.root.clone();

        let files = roots
            .into_iter()
            .flat_map(|base| WalkDir::new(base).sort_by_file_name())
            .filter_map(move |entry| {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => return Some(Err(WorkspaceError::from(e))),
                };
                if !entry.file_type().is_file() {
                    return None;
                }
                let relative = relative_name(&root, entry.path())?;
                globs
                    .is_match(&relative)
                    .then(|| Ok((entry.into_path(), relative)))
            });

        Ok(files)
    }

    fn write_entries<W: Write + Seek>(
        &self,
        patterns: &[String],
        zip: &mut ZipWriter<W>,
    ) -> Result<(), WorkspaceError> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for file in self.matching_files(patterns)? {
            let (path, name) = file?;
            tracing::debug!(file = %name, "adding file to archive");
            zip.start_file(name, options)?;
            let mut source = File::open(&path)?;
            io::copy(&mut source, zip)?;
        }
        Ok(())
    }
}

impl Workspace for LocalWorkspace {
    fn remote_path(&self) -> String {
        self.root.display().to_string()
    }

    fn has_matches(&self, patterns: &[String]) -> Result<bool, WorkspaceError> {
        match self.matching_files(patterns)?.next() {
            Some(Ok(_)) => Ok(true),
            Some(Err(e)) => Err(e),
            None => Ok(false),
        }
    }

    fn archive(&self, patterns: &[String], sink: &mut dyn Write) -> Result<(), WorkspaceError> {
        let failed = Cell::new(false);
        let mut zip = ZipWriter::new_stream(GuardedSink {
            inner: sink,
            failed: &failed,
        });

        match self.write_entries(patterns, &mut zip) {
            Ok(()) => {
                let mut sink = zip.finish()?;
                sink.flush()?;
                Ok(())
            }
            Err(e) => {
                // The zip writer finalizes itself on drop; that must not reach the sink.
                failed.set(true);
                drop(zip);
                Err(e)
            }
        }
    }
}

/// Passes writes through until the first failure, then discards them.
///
/// Keeps a half-written archive from being completed by the zip writer's drop.
struct GuardedSink<'a> {
    inner: &'a mut dyn Write,
    failed: &'a Cell<bool>,
}

impl Write for GuardedSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.failed.get() {
            return Ok(buf.len());
        }
        self.inner.write(buf).inspect_err(|_| self.failed.set(true))
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.failed.get() {
            return Ok(());
        }
        self.inner.flush().inspect_err(|_| self.failed.set(true))
    }
}

fn split(patterns: &[String]) -> Vec<&str> {
    patterns
        .iter()
        .flat_map(|p| p.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

fn compile(patterns: &[&str]) -> Result<GlobSet, WorkspaceError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|source| WorkspaceError::Pattern {
                pattern: pattern.to_string(),
                source,
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| WorkspaceError::Pattern {
        pattern: patterns.join(","),
        source,
    })
}

/// Leading directories of a pattern that hold no glob syntax.
fn literal_prefix(pattern: &str) -> PathBuf {
    let mut prefix = PathBuf::new();
    let mut parts = pattern.split('/').peekable();
    while let Some(part) = parts.next() {
        if parts.peek().is_none() || part.contains(['*', '?', '[', '{']) {
            break;
        }
        if !part.is_empty() && part != "." {
            prefix.push(part);
        }
    }
    prefix
}

fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::{Cursor, Read};

    fn patterns(p: &[&str]) -> Vec<String> {
        p.iter().map(|s| s.to_string()).collect()
    }

    fn workspace_with(files: &[(&str, &str)]) -> (tempfile::TempDir, LocalWorkspace) {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let workspace = LocalWorkspace::new(dir.path());
        (dir, workspace)
    }

    #[test]
    fn double_star_matches_root_and_nested_files() {
        let (_dir, ws) = workspace_with(&[("a.xml", ""), ("target/site/b.xml", "")]);

        assert!(ws.has_matches(&patterns(&["**/*.xml"])).unwrap());
        assert!(ws.has_matches(&patterns(&["target/**/b.xml"])).unwrap());
    }

    #[test]
    fn single_star_does_not_cross_directories() {
        let (_dir, ws) = workspace_with(&[("reports/lint.txt", "")]);

        assert!(!ws.has_matches(&patterns(&["*.txt"])).unwrap());
        assert!(ws.has_matches(&patterns(&["reports/*.txt"])).unwrap());
    }

    #[test]
    fn comma_separated_entries_are_split() {
        let (_dir, ws) = workspace_with(&[("pmd.xml", "")]);

        assert!(ws.has_matches(&patterns(&["*.nope, pmd.xml"])).unwrap());
        assert!(!ws.has_matches(&patterns(&["*.nope"])).unwrap());
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let (_dir, ws) = workspace_with(&[]);

        let err = ws.has_matches(&patterns(&["a[b"])).unwrap_err();
        assert!(matches!(err, WorkspaceError::Pattern { .. }));
    }

    #[test]
    fn missing_root_is_an_error() {
        let ws = LocalWorkspace::new("/definitely/not/a/workspace");
        assert!(matches!(
            ws.has_matches(&patterns(&["**"])),
            Err(WorkspaceError::Walk(_))
        ));
    }

    #[test]
    fn archive_contains_only_matching_files() {
        let (_dir, ws) = workspace_with(&[
            ("cov/one.xml", "<coverage/>"),
            ("cov/two.xml", "<coverage line-rate=\"1\"/>"),
            ("cov/readme.md", "ignored"),
        ]);

        let mut bytes = Vec::new();
        ws.archive(&patterns(&["cov/*.xml"]), &mut bytes).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<_> = archive.file_names().map(String::from).collect();
        names.sort();
        assert_eq!(names, vec!["cov/one.xml", "cov/two.xml"]);

        let mut content = String::new();
        archive
            .by_name("cov/one.xml")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "<coverage/>");
    }

    #[test]
    fn walks_only_literal_prefixes() {
        let (dir, ws) = workspace_with(&[
            ("target/a.xml", ""),
            ("target/site/b.html", ""),
            ("lib/c.jar", ""),
            ("node_modules/d.xml", ""),
        ]);

        let roots = ws.walk_roots(&["target/*.xml", "target/site/**/*.html", "lib/c.jar"]);
        assert_eq!(roots, vec![dir.path().join("lib"), dir.path().join("target")]);

        assert_eq!(ws.walk_roots(&["**/*.xml", "target/*.xml"]), vec![dir.path().to_path_buf()]);
    }

    #[test]
    fn literal_prefix_stops_at_glob_syntax() {
        assert_eq!(literal_prefix("target/**/x.xml"), PathBuf::from("target"));
        assert_eq!(literal_prefix("./a/b/*.xml"), PathBuf::from("a/b"));
        assert_eq!(literal_prefix("a/{b,c}/x.xml"), PathBuf::from("a"));
        assert_eq!(literal_prefix("x.xml"), PathBuf::new());
    }

    #[test]
    fn missing_prefix_directory_matches_nothing() {
        let (_dir, ws) = workspace_with(&[("a.xml", "")]);

        assert!(!ws.has_matches(&patterns(&["target/*.xml"])).unwrap());
        assert!(ws.has_matches(&patterns(&["target/*.xml", "*.xml"])).unwrap());
    }

    /// Fails every write and counts the ones that arrive after the first.
    #[derive(Default)]
    struct ClosedSink {
        failed: bool,
        writes_after_failure: usize,
    }

    impl Write for ClosedSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            if self.failed {
                self.writes_after_failure += 1;
            }
            self.failed = true;
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn closed_sink_is_not_written_again() {
        let (_dir, ws) = workspace_with(&[("a.xml", &"x".repeat(64 * 1024))]);
        let mut sink = ClosedSink::default();

        let err = ws.archive(&patterns(&["*.xml"]), &mut sink).unwrap_err();

        assert!(err.is_stream_closed());
        assert_eq!(sink.writes_after_failure, 0);
    }
}
