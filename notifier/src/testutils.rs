use crate::config::Instance;
use crate::errors::WorkspaceError;
use crate::metadata::{BuildMetadata, BuildRun, EnvVars};
use crate::workspace::{LocalWorkspace, Workspace};
use std::io::Write;
use wiremock::{Match, MockServer, Request};

pub const API_KEY: &str = "secret";
pub const SOURCE_KEY: &str = "my-source";

pub fn workspace_with(files: &[(&str, &str)]) -> (tempfile::TempDir, LocalWorkspace) {
    let dir = tempfile::tempdir().unwrap();
    for (name, content) in files {
        let path = dir.path().join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    let workspace = LocalWorkspace::new(dir.path());
    (dir, workspace)
}

pub fn instance_for(server: &MockServer, api_key: &str) -> Instance {
    Instance {
        name: "mock".into(),
        url: server.uri().parse().unwrap(),
        api_key: api_key.into(),
    }
}

pub fn base_metadata() -> BuildMetadata {
    let env: EnvVars = [("GIT_COMMIT", "abc123"), ("GIT_BRANCH", "main")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    BuildMetadata::build(&BuildRun::with_env_vars(1_700_000_000_000, env), "/ws")
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Matches uploads whose metadata part carries the given data type.
pub struct DataType(pub String);

impl Match for DataType {
    fn matches(&self, request: &Request) -> bool {
        let needle = format!(r#""dataType":"{}""#, self.0);
        contains(&request.body, needle.as_bytes())
    }
}

/// A workspace whose listing always fails.
pub struct UnlistableWorkspace;

impl Workspace for UnlistableWorkspace {
    fn remote_path(&self) -> String {
        "/unlistable".into()
    }

    fn has_matches(&self, _patterns: &[String]) -> Result<bool, WorkspaceError> {
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no listing for you").into())
    }

    fn archive(&self, _patterns: &[String], _sink: &mut dyn Write) -> Result<(), WorkspaceError> {
        unreachable!("archive must not run when listing fails")
    }
}

/// A workspace that matches everything but fails part way through archiving.
pub struct BrokenArchiveWorkspace;

impl Workspace for BrokenArchiveWorkspace {
    fn remote_path(&self) -> String {
        "/broken".into()
    }

    fn has_matches(&self, _patterns: &[String]) -> Result<bool, WorkspaceError> {
        Ok(true)
    }

    fn archive(&self, _patterns: &[String], sink: &mut dyn Write) -> Result<(), WorkspaceError> {
        sink.write_all(b"PK\x03\x04 half an archive")?;
        sink.flush()?;
        Err(std::io::Error::other("report file vanished").into())
    }
}

/// A workspace that panics in one of its operations.
pub enum PanickingWorkspace {
    OnListing,
    OnArchive,
}

impl Workspace for PanickingWorkspace {
    fn remote_path(&self) -> String {
        "/panicking".into()
    }

    fn has_matches(&self, _patterns: &[String]) -> Result<bool, WorkspaceError> {
        match self {
            PanickingWorkspace::OnListing => panic!("listing blew up"),
            PanickingWorkspace::OnArchive => Ok(true),
        }
    }

    fn archive(&self, _patterns: &[String], sink: &mut dyn Write) -> Result<(), WorkspaceError> {
        sink.write_all(b"PK\x03\x04")?;
        panic!("archiving blew up")
    }
}
