//! Project snapshot and the folder/file capabilities it is built from.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extension (without the dot) of the source files a project is made of
pub const SCRIPT_EXTENSION: &str = "cs";
/// Language name used when talking about the scripts
pub const SCRIPT_LANGUAGE: &str = "C#";

/// Handle granting read/overwrite access to a single file
#[async_trait]
pub trait FileCapability: Send + Sync {
    async fn read_text(&self) -> Result<String>;
    async fn write_text(&self, content: &str) -> Result<()>;
}

/// Handle granting access to the immediate entries of one folder
#[async_trait]
pub trait FolderCapability: Send + Sync {
    /// Human-readable location, used in logs and the UI title
    fn label(&self) -> String;

    /// Names of the files directly inside the folder (no recursion)
    async fn file_names(&self) -> Result<Vec<String>>;

    /// Open a file by name. With `create`, a missing file is created empty.
    async fn file(&self, name: &str, create: bool) -> Result<Box<dyn FileCapability>>;
}

/// Why a folder grant did not produce a capability
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PickError {
    #[error("folder selection cancelled")]
    Cancelled,
    #[error("{0}")]
    Failed(String),
}

/// Source of folder grants, usually backed by an interactive prompt
#[async_trait]
pub trait FolderPicker: Send {
    async fn pick(&mut self) -> std::result::Result<Box<dyn FolderCapability>, PickError>;
}

/// A single source file known to the snapshot
pub struct ScriptRecord {
    pub name: String,
    pub content: String,
    handle: Box<dyn FileCapability>,
}

impl ScriptRecord {
    pub fn new(name: impl Into<String>, content: impl Into<String>, handle: Box<dyn FileCapability>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            handle,
        }
    }

    pub fn handle(&self) -> &dyn FileCapability {
        self.handle.as_ref()
    }
}

impl std::fmt::Debug for ScriptRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptRecord")
            .field("name", &self.name)
            .field("content_len", &self.content.len())
            .finish()
    }
}

pub fn is_script_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == SCRIPT_EXTENSION)
}

/// Every script found in the selected folder at the time of the last scan
#[derive(Debug, Default)]
pub struct ProjectSnapshot {
    scripts: Vec<ScriptRecord>,
}

impl ProjectSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Enumerate `folder` and read every script. The snapshot is built
    /// completely before it is returned, so callers can swap it in whole.
    pub async fn scan(folder: &dyn FolderCapability) -> Result<Self> {
        let names = folder
            .file_names()
            .await
            .with_context(|| format!("Failed to list {}", folder.label()))?;

        let mut scripts = Vec::new();
        for name in names.into_iter().filter(|n| is_script_name(n)) {
            let handle = folder.file(&name, false).await?;
            let content = handle
                .read_text()
                .await
                .with_context(|| format!("Failed to read {}", name))?;
            scripts.push(ScriptRecord::new(name, content, handle));
        }

        Ok(Self { scripts })
    }

    pub fn scripts(&self) -> &[ScriptRecord] {
        &self.scripts
    }

    pub fn get(&self, name: &str) -> Option<&ScriptRecord> {
        self.scripts.iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

/// Create or overwrite `name` inside `folder` with `content`
pub async fn write_script(folder: &dyn FolderCapability, name: &str, content: &str) -> Result<()> {
    let handle = folder.file(name, true).await?;
    handle
        .write_text(content)
        .await
        .with_context(|| format!("Failed to write {}", name))
}

/// Folder capability over a directory on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalFolder {
    root: PathBuf,
}

impl LocalFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let candidate = Path::new(name);
        let is_plain = candidate.components().count() == 1
            && candidate.file_name().is_some_and(|f| f == candidate.as_os_str());
        if !is_plain {
            return Err(anyhow!("'{}' is not a file name inside the project folder", name));
        }
        Ok(self.root.join(candidate))
    }
}

#[async_trait]
impl FolderCapability for LocalFolder {
    fn label(&self) -> String {
        self.root.display().to_string()
    }

    async fn file_names(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            // Subdirectories are not traversed
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    async fn file(&self, name: &str, create: bool) -> Result<Box<dyn FileCapability>> {
        let path = self.resolve(name)?;
        if !create && !tokio::fs::try_exists(&path).await? {
            return Err(anyhow!("{} does not exist", path.display()));
        }
        Ok(Box::new(LocalFile { path }))
    }
}

#[derive(Debug)]
struct LocalFile {
    path: PathBuf,
}

#[async_trait]
impl FileCapability for LocalFile {
    async fn read_text(&self) -> Result<String> {
        Ok(tokio::fs::read_to_string(&self.path).await?)
    }

    async fn write_text(&self, content: &str) -> Result<()> {
        Ok(tokio::fs::write(&self.path, content).await?)
    }
}

/// Picker that grants a folder the user already named, e.g. typed into a
/// prompt. `None` means the prompt was dismissed.
#[derive(Debug, Clone)]
pub struct PathPicker {
    answer: Option<PathBuf>,
}

impl PathPicker {
    pub fn new(answer: Option<PathBuf>) -> Self {
        Self { answer }
    }
}

#[async_trait]
impl FolderPicker for PathPicker {
    async fn pick(&mut self) -> std::result::Result<Box<dyn FolderCapability>, PickError> {
        let path = self.answer.take().ok_or(PickError::Cancelled)?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| PickError::Failed(format!("{}: {}", path.display(), e)))?;
        if !metadata.is_dir() {
            return Err(PickError::Failed(format!("{} is not a directory", path.display())));
        }
        // Reading one entry surfaces permission problems at grant time
        let unreadable = |e: std::io::Error| PickError::Failed(format!("{}: {}", path.display(), e));
        let mut listing = tokio::fs::read_dir(&path).await.map_err(unreadable)?;
        listing.next_entry().await.map_err(unreadable)?;
        Ok(Box::new(LocalFolder::new(path)))
    }
}
