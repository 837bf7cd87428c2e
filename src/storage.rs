//! Local directory layout of a course
//!
//! Every path handed to a [`LocalStorage`] is relative to the course root.
//! Paths are validated before use so that a malicious item name cannot
//! escape the root.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

use crate::error::SyncError;
use crate::logging::*;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, SyncError>;

/// File-system boundary used by the executor
#[async_trait]
pub trait LocalStorage: Send + Sync {
	/// Create a directory and any missing parents
	async fn create_directory(&mut self, path: &Path) -> StorageResult<()>;

	/// Remove a directory recursively; a missing directory is not an error
	async fn delete_directory(&mut self, path: &Path) -> StorageResult<()>;

	/// Rename the last component of `path` to `new_name`, keeping its parent
	async fn rename_directory(&mut self, path: &Path, new_name: &str) -> StorageResult<()>;

	/// Create or truncate a file, creating parent directories as needed
	async fn write_file(&mut self, path: &Path, content: &str) -> StorageResult<()>;

	async fn read_file(&self, path: &Path) -> StorageResult<String>;

	async fn exists(&self, path: &Path) -> bool;
}

/// Check that a path stays under the course root
pub fn validate_relative(path: &Path) -> StorageResult<()> {
	for component in path.components() {
		match component {
			Component::Normal(_) | Component::CurDir => {}
			Component::ParentDir => {
				return Err(SyncError::InvalidPath {
					path: path.display().to_string(),
					reason: "contains parent directory reference (..)".to_string(),
				});
			}
			Component::RootDir | Component::Prefix(_) => {
				return Err(SyncError::InvalidPath {
					path: path.display().to_string(),
					reason: "must be relative to the course root".to_string(),
				});
			}
		}
	}
	Ok(())
}

/// Check that an item name is usable as a single path component
pub fn validate_name(name: &str) -> StorageResult<()> {
	let reason = if name.is_empty() {
		Some("name is empty")
	} else if name == "." || name == ".." {
		Some("name is a directory reference")
	} else if name.contains('/') || name.contains('\\') {
		Some("name contains a path separator")
	} else {
		None
	};
	match reason {
		Some(reason) => {
			Err(SyncError::InvalidPath { path: name.to_string(), reason: reason.to_string() })
		}
		None => Ok(()),
	}
}

/// [`LocalStorage`] on the real file system, rooted at the course directory
pub struct FsStorage {
	root: PathBuf,
}

impl FsStorage {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		FsStorage { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	fn resolve(&self, path: &Path) -> StorageResult<PathBuf> {
		validate_relative(path)?;
		Ok(self.root.join(path))
	}
}

#[async_trait]
impl LocalStorage for FsStorage {
	async fn create_directory(&mut self, path: &Path) -> StorageResult<()> {
		let full = self.resolve(path)?;
		debug!("mkdir {}", full.display());
		tokio::fs::create_dir_all(&full).await?;
		Ok(())
	}

	async fn delete_directory(&mut self, path: &Path) -> StorageResult<()> {
		let full = self.resolve(path)?;
		if path.as_os_str().is_empty() {
			return Err(SyncError::InvalidPath {
				path: full.display().to_string(),
				reason: "refusing to delete the course root".to_string(),
			});
		}
		match tokio::fs::remove_dir_all(&full).await {
			Ok(()) => {
				debug!("rmdir {}", full.display());
				Ok(())
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

	async fn rename_directory(&mut self, path: &Path, new_name: &str) -> StorageResult<()> {
		validate_name(new_name)?;
		let from = self.resolve(path)?;
		let to = from.with_file_name(new_name);
		if tokio::fs::try_exists(&to).await? {
			return Err(SyncError::DirectoryConflict {
				path: to.display().to_string(),
				moved_to: String::new(),
			});
		}
		debug!("rename {} -> {}", from.display(), to.display());
		tokio::fs::rename(&from, &to).await?;
		Ok(())
	}

	async fn write_file(&mut self, path: &Path, content: &str) -> StorageResult<()> {
		let full = self.resolve(path)?;
		if let Some(parent) = full.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		tokio::fs::write(&full, content).await?;
		Ok(())
	}

	async fn read_file(&self, path: &Path) -> StorageResult<String> {
		let full = self.resolve(path)?;
		Ok(tokio::fs::read_to_string(&full).await?)
	}

	async fn exists(&self, path: &Path) -> bool {
		match self.resolve(path) {
			Ok(full) => tokio::fs::try_exists(&full).await.unwrap_or(false),
			Err(_) => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_validate_relative() {
		assert!(validate_relative(Path::new("Basics/Intro")).is_ok());
		assert!(validate_relative(Path::new("../outside")).is_err());
		assert!(validate_relative(Path::new("/etc")).is_err());
	}

	#[test]
	fn test_validate_name() {
		assert!(validate_name("old_Basics").is_ok());
		assert!(validate_name("").is_err());
		assert!(validate_name("a/b").is_err());
		assert!(validate_name("..").is_err());
	}

	#[tokio::test]
	async fn test_write_rename_delete() {
		let dir = TempDir::new().unwrap();
		let mut storage = FsStorage::new(dir.path());

		storage.write_file(Path::new("Intro/Hello/Main.kt"), "fun main() {}").await.unwrap();
		assert!(storage.exists(Path::new("Intro/Hello/Main.kt")).await);

		storage.rename_directory(Path::new("Intro"), "Basics").await.unwrap();
		assert!(!storage.exists(Path::new("Intro")).await);
		let text = storage.read_file(Path::new("Basics/Hello/Main.kt")).await.unwrap();
		assert_eq!(text, "fun main() {}");

		storage.delete_directory(Path::new("Basics")).await.unwrap();
		assert!(!storage.exists(Path::new("Basics")).await);
		// deleting again is a no-op
		storage.delete_directory(Path::new("Basics")).await.unwrap();
	}

	#[tokio::test]
	async fn test_rename_onto_existing_directory_fails() {
		let dir = TempDir::new().unwrap();
		let mut storage = FsStorage::new(dir.path());
		storage.create_directory(Path::new("A")).await.unwrap();
		storage.create_directory(Path::new("B")).await.unwrap();
		let result = storage.rename_directory(Path::new("A"), "B").await;
		assert!(matches!(result, Err(SyncError::DirectoryConflict { .. })));
	}

	#[tokio::test]
	async fn test_escaping_paths_are_rejected() {
		let dir = TempDir::new().unwrap();
		let mut storage = FsStorage::new(dir.path());
		let result = storage.write_file(Path::new("../evil.txt"), "x").await;
		assert!(matches!(result, Err(SyncError::InvalidPath { .. })));
		assert!(storage.delete_directory(Path::new("")).await.is_err());
	}
}

// vim: ts=4
