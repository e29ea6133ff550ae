//! The remote site seam and the whole-tree operations built on it

use crate::client::TransferListener;
use crate::error::Result;
use crate::listing;
use crate::local;
use crate::remote::{self, RemoteDirectory, RemoteFile, RemoteObject};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use walkdir::WalkDir;

/// Operations a mirror needs from a remote server.
///
/// `sub_dir` arguments are remote paths relative to the login directory;
/// `None` means the login directory itself.
pub trait RemoteSite {
    /// One directory level, in listing order
    fn list_objects(&mut self, sub_dir: Option<&str>) -> Result<Vec<RemoteObject>>;

    /// Fetch `file` into `local_dir`, creating it if needed, and stamp the
    /// local copy with the remote modification time. Returns the local path.
    fn download(&mut self, file: &RemoteFile, local_dir: &Path) -> Result<PathBuf>;

    fn upload_file(&mut self, local: &Path, sub_dir: Option<&str>) -> Result<()>;

    fn delete_file(&mut self, name: &str, sub_dir: Option<&str>) -> Result<()>;

    fn make_directory(&mut self, name: &str, sub_dir: Option<&str>) -> Result<()>;

    fn remove_directory(&mut self, name: &str, sub_dir: Option<&str>) -> Result<()>;

    /// Remote modification time, falling back to the listing timestamp when
    /// the server cannot tell
    fn modified_time(&mut self, object: &RemoteObject) -> Result<SystemTime>;

    fn subscribe(&mut self, listener: Arc<dyn TransferListener>);

    /// Delete a listed file by its full remote path
    fn delete_object(&mut self, object: &RemoteFile) -> Result<()> {
        self.delete_file(object.uri(), None)
    }

    /// Remove a listed directory by its full remote path
    fn remove_object(&mut self, directory: &RemoteDirectory) -> Result<()> {
        self.remove_directory(directory.path(), None)
    }

    /// Walk the whole tree below `sub_dir`.
    ///
    /// Order is pre-order with files before sub-directories at each level.
    /// Every object carries the directory it was found in, relative to
    /// `sub_dir`.
    fn list_all_objects(
        &mut self,
        sub_dir: Option<&str>,
    ) -> Result<(Vec<RemoteFile>, Vec<RemoteDirectory>)> {
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        walk(self, sub_dir, "", &mut files, &mut dirs)?;
        Ok((files, dirs))
    }

    /// Mirror the tree below `sub_dir` into `local_root`.
    ///
    /// A directory that already exists locally keeps its timestamp but is
    /// still descended into.
    fn download_all(&mut self, local_root: &Path, sub_dir: Option<&str>) -> Result<()> {
        let (files, dirs) = remote::partition(self.list_objects(sub_dir)?);
        for file in &files {
            self.download(file, local_root)?;
        }
        for dir in dirs {
            let local_dir = local_root.join(dir.name());
            let created = !local_dir.exists();
            if created {
                local::ensure_dir_exists(&local_dir)?;
            }
            self.download_all(&local_dir, Some(dir.path()))?;
            // Stamped after its contents, which would move the time again
            if created {
                let modified = self.modified_time(&RemoteObject::Directory(dir.clone()))?;
                local::stamp(&local_dir, modified)?;
            }
        }
        Ok(())
    }

    /// Push the local tree at `local_root` into `sub_dir`, files first, in
    /// name order. Symlinks are followed. Existing remote directories are
    /// reused.
    fn upload_all(&mut self, local_root: &Path, sub_dir: Option<&str>) -> Result<()> {
        let entries = WalkDir::new(local_root)
            .follow_links(true)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(std::io::Error::from)?;

        for entry in entries.iter().filter(|e| e.file_type().is_file()) {
            self.upload_file(entry.path(), sub_dir)?;
        }
        for entry in entries.iter().filter(|e| e.file_type().is_dir()) {
            let name = entry.file_name().to_string_lossy();
            self.ensure_directory(&name, sub_dir)?;
            let child = listing::join_uri(sub_dir.unwrap_or(""), &name);
            self.upload_all(entry.path(), Some(&child))?;
        }
        Ok(())
    }

    /// Create `name` under `sub_dir` unless a directory of that name is
    /// already listed there
    fn ensure_directory(&mut self, name: &str, sub_dir: Option<&str>) -> Result<()> {
        let exists = self
            .list_objects(sub_dir)?
            .iter()
            .any(|object| object.is_directory() && object.name() == name);
        if exists {
            log::debug!("remote directory {} already exists", name);
            return Ok(());
        }
        self.make_directory(name, sub_dir)
    }
}

fn walk<S: RemoteSite + ?Sized>(
    site: &mut S,
    sub_dir: Option<&str>,
    relative: &str,
    files: &mut Vec<RemoteFile>,
    dirs: &mut Vec<RemoteDirectory>,
) -> Result<()> {
    let objects = site
        .list_objects(sub_dir)?
        .into_iter()
        .map(|object| object.with_relative_directory(relative))
        .collect();
    let (level_files, level_dirs) = remote::partition(objects);
    files.extend(level_files);
    for dir in level_dirs {
        let path = dir.path().to_string();
        let child_relative = dir.relative_path();
        dirs.push(dir);
        walk(site, Some(&path), &child_relative, files, dirs)?;
    }
    Ok(())
}
