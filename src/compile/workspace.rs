use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};
use uuid::Uuid;

use crate::core::error::CompileResult;

const FILE_PREFIX: &str = "oker-";
const FILE_SUFFIX: &str = ".oker";

/// A request-scoped source file. Never shared between requests.
#[derive(Debug, PartialEq, Eq)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Allocates and reclaims workspaces.
#[async_trait]
pub trait WorkspaceManager: Send + Sync {
    /// Creates a fresh, uniquely named file holding exactly `content`.
    async fn acquire(&self, content: &str) -> CompileResult<Workspace>;

    /// Deletes the backing file. Best-effort: failures are logged, never returned.
    fn release(&self, workspace: Workspace);
}

/// Releases its workspace when dropped, whichever way the scope is left.
pub struct WorkspaceGuard<'a> {
    manager: &'a dyn WorkspaceManager,
    workspace: Option<Workspace>,
}

impl<'a> WorkspaceGuard<'a> {
    pub fn new(manager: &'a dyn WorkspaceManager, workspace: Workspace) -> Self {
        Self {
            manager,
            workspace: Some(workspace),
        }
    }

    pub fn path(&self) -> &Path {
        // Only `drop` takes the workspace out.
        self.workspace
            .as_ref()
            .map(Workspace::path)
            .unwrap_or_else(|| Path::new(""))
    }
}

impl Drop for WorkspaceGuard<'_> {
    fn drop(&mut self) {
        if let Some(workspace) = self.workspace.take() {
            self.manager.release(workspace);
        }
    }
}

/// Workspaces backed by files in a temp directory.
pub struct TempWorkspaces {
    dir: PathBuf,
}

impl TempWorkspaces {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn next_path(&self) -> PathBuf {
        self.dir
            .join(format!("{FILE_PREFIX}{}{FILE_SUFFIX}", Uuid::new_v4().simple()))
    }
}

#[async_trait]
impl WorkspaceManager for TempWorkspaces {
    async fn acquire(&self, content: &str) -> CompileResult<Workspace> {
        let path = self.next_path();

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        let written = async {
            file.write_all(content.as_bytes()).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            drop(file);
            self.release(Workspace::new(path));
            return Err(e.into());
        }

        log::debug!("Workspace created at {}", path.display());
        Ok(Workspace::new(path))
    }

    // Called from `Drop`, so the unlink is synchronous.
    fn release(&self, workspace: Workspace) {
        match std::fs::remove_file(workspace.path()) {
            Ok(()) => log::debug!("Workspace {} removed", workspace.path().display()),
            Err(e) => log::warn!(
                "Failed to remove workspace {}: {e}",
                workspace.path().display()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn init_log() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[tokio::test]
    async fn test_acquire_writes_exact_bytes() {
        init_log();
        let dir = tempfile::tempdir().unwrap();
        let workspaces = TempWorkspaces::new(dir.path());

        let code = "let s = \"héllo ✓\";\r\n\tprint(s)\n\0tail";
        let workspace = workspaces.acquire(code).await.unwrap();

        assert!(workspace.path().starts_with(dir.path()));
        let name = workspace.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(FILE_PREFIX));
        assert!(name.ends_with(FILE_SUFFIX));
        assert_eq!(code.as_bytes(), std::fs::read(workspace.path()).unwrap());

        workspaces.release(workspace);
    }

    #[tokio::test]
    async fn test_acquire_empty_content() {
        init_log();
        let dir = tempfile::tempdir().unwrap();
        let workspaces = TempWorkspaces::new(dir.path());

        let workspace = workspaces.acquire("").await.unwrap();
        assert_eq!(0, std::fs::metadata(workspace.path()).unwrap().len());
        workspaces.release(workspace);
    }

    #[tokio::test]
    async fn test_paths_are_unique() {
        init_log();
        let dir = tempfile::tempdir().unwrap();
        let workspaces = TempWorkspaces::new(dir.path());

        let a = workspaces.acquire("a").await.unwrap();
        let b = workspaces.acquire("b").await.unwrap();
        assert_ne!(a.path(), b.path());

        workspaces.release(a);
        workspaces.release(b);
    }

    #[tokio::test]
    async fn test_release_removes_file() {
        init_log();
        let dir = tempfile::tempdir().unwrap();
        let workspaces = TempWorkspaces::new(dir.path());

        let workspace = workspaces.acquire("print(1)").await.unwrap();
        let path = workspace.path().to_path_buf();
        assert!(path.exists());

        workspaces.release(workspace);
        assert!(!path.exists());
    }

    #[test]
    fn test_release_missing_file_is_silent() {
        init_log();
        let dir = tempfile::tempdir().unwrap();
        let workspaces = TempWorkspaces::new(dir.path());

        workspaces.release(Workspace::new(dir.path().join("never-created.oker")));
    }

    #[tokio::test]
    async fn test_acquire_in_missing_dir_fails() {
        init_log();
        let dir = tempfile::tempdir().unwrap();
        let workspaces = TempWorkspaces::new(dir.path().join("does/not/exist"));

        let err = workspaces.acquire("print(1)").await.unwrap_err();
        assert!(matches!(err, crate::core::error::CompileError::Io(_)));
    }

    struct CountingManager {
        released: AtomicUsize,
    }

    #[async_trait]
    impl WorkspaceManager for CountingManager {
        async fn acquire(&self, _content: &str) -> CompileResult<Workspace> {
            Ok(Workspace::new(PathBuf::from("/tmp/unused.oker")))
        }

        fn release(&self, _workspace: Workspace) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_guard_releases_once_on_drop() {
        let manager = CountingManager {
            released: AtomicUsize::new(0),
        };

        {
            let guard = WorkspaceGuard::new(&manager, Workspace::new(PathBuf::from("/tmp/x")));
            assert_eq!(Path::new("/tmp/x"), guard.path());
        }

        assert_eq!(1, manager.released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_guard_releases_on_panic() {
        let manager = CountingManager {
            released: AtomicUsize::new(0),
        };

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = WorkspaceGuard::new(&manager, Workspace::new(PathBuf::from("/tmp/y")));
            panic!("invoker blew up");
        }));

        assert!(result.is_err());
        assert_eq!(1, manager.released.load(Ordering::SeqCst));
    }
}
