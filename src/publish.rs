//! Writes artifacts to the destination directory.
//!
//! A full publish never modifies the destination in place: everything is
//! written to a sibling staging directory which is then swapped in, so a
//! failure leaves the previous output untouched. Watch mode uses
//! [`publish_changes`] instead, which compares content digests against the
//! previous [`Manifest`] and only rewrites what changed.
//!
//! Both are guarded by a [`Lock`] so that two builds never share a
//! destination.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::artifact::Artifact;

/// An exclusive claim on a destination directory, held as a `.<name>.lock`
/// file next to it. Released when dropped.
#[derive(Debug)]
pub struct Lock {
    path: PathBuf,
}

impl Lock {
    pub fn acquire(destination: &Path) -> Result<Lock> {
        let path = sibling(destination, "lock")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| Error::Io {
                path: parent.to_owned(),
                err,
            })?;
        }
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                // The pid is informational only.
                let _ = writeln!(file, "{}", std::process::id());
                tracing::debug!(lock = %path.display(), "acquired lock");
                Ok(Lock { path })
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Err(Error::Locked { path }),
            Err(err) => Err(Error::Io { path, err }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            tracing::warn!(lock = %self.path.display(), %err, "failed to remove lock file");
        }
    }
}

/// The SHA-256 digest of every published artifact, by path.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Manifest(BTreeMap<PathBuf, String>);

impl Manifest {
    pub fn of(artifacts: &[Artifact]) -> Manifest {
        Manifest(
            artifacts
                .iter()
                .map(|a| (a.path.clone(), digest(&a.contents)))
                .collect(),
        )
    }

    pub fn get(&self, path: &Path) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.0.keys().map(PathBuf::as_path)
    }
}

fn digest(contents: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents);
    hex::encode(hasher.finalize())
}

/// What [`publish_changes`] did.
#[derive(Debug, Default, PartialEq)]
pub struct Changes {
    pub written: Vec<PathBuf>,
    pub unchanged: usize,
    pub removed: Vec<PathBuf>,
}

/// Replaces the destination with exactly `artifacts`.
pub fn publish(destination: &Path, artifacts: &[Artifact]) -> Result<Manifest> {
    let staging = sibling(destination, "staging")?;
    remove_dir(&staging)?;
    if let Err(err) = write_all(&staging, artifacts) {
        let _ = fs::remove_dir_all(&staging);
        return Err(err);
    }

    let previous = sibling(destination, "old")?;
    remove_dir(&previous)?;
    let had_previous = destination.exists();
    if had_previous {
        if let Err(err) = fs::rename(destination, &previous) {
            let _ = fs::remove_dir_all(&staging);
            return Err(Error::Io {
                path: destination.to_owned(),
                err,
            });
        }
    }
    if let Err(err) = fs::rename(&staging, destination) {
        if had_previous {
            let _ = fs::rename(&previous, destination);
        }
        let _ = fs::remove_dir_all(&staging);
        return Err(Error::Io {
            path: destination.to_owned(),
            err,
        });
    }
    remove_dir(&previous)?;

    tracing::info!(
        destination = %destination.display(),
        artifacts = artifacts.len(),
        "published site"
    );
    Ok(Manifest::of(artifacts))
}

/// Brings the destination from `previous` up to date with `artifacts`,
/// touching only the files whose content changed.
pub fn publish_changes(
    destination: &Path,
    artifacts: &[Artifact],
    previous: &Manifest,
) -> Result<(Manifest, Changes)> {
    let manifest = Manifest::of(artifacts);
    let mut changes = Changes::default();

    for artifact in artifacts {
        let target = destination.join(&artifact.path);
        if previous.get(&artifact.path) == manifest.get(&artifact.path) && target.is_file() {
            changes.unchanged += 1;
            continue;
        }
        replace_file(&target, &artifact.contents)?;
        tracing::debug!(path = %artifact.path.display(), "wrote artifact");
        changes.written.push(artifact.path.clone());
    }

    for path in previous.paths() {
        if manifest.get(path).is_some() {
            continue;
        }
        let target = destination.join(path);
        match fs::remove_file(&target) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(Error::Io { path: target, err }),
        }
        prune_empty_parents(destination, &target);
        tracing::debug!(path = %path.display(), "removed artifact");
        changes.removed.push(path.to_owned());
    }

    Ok((manifest, changes))
}

fn write_all(root: &Path, artifacts: &[Artifact]) -> Result<()> {
    fs::create_dir_all(root).map_err(|err| Error::Io {
        path: root.to_owned(),
        err,
    })?;
    for artifact in artifacts {
        let target = root.join(&artifact.path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|err| Error::Io {
                path: parent.to_owned(),
                err,
            })?;
        }
        fs::write(&target, &artifact.contents).map_err(|err| Error::Io { path: target, err })?;
    }
    Ok(())
}

// Writes to a temporary file in the same directory and renames it over the
// target, so readers never see a partial file.
fn replace_file(target: &Path, contents: &[u8]) -> Result<()> {
    let io_error = |err| Error::Io {
        path: target.to_owned(),
        err,
    };
    let parent = target.parent().ok_or_else(|| Error::Destination(target.to_owned()))?;
    fs::create_dir_all(parent).map_err(io_error)?;
    let temporary = sibling(target, "tmp")?;
    fs::write(&temporary, contents).map_err(io_error)?;
    if let Err(err) = fs::rename(&temporary, target) {
        let _ = fs::remove_file(&temporary);
        return Err(io_error(err));
    }
    Ok(())
}

fn prune_empty_parents(root: &Path, file: &Path) {
    let mut dir = file.parent();
    while let Some(current) = dir {
        if current == root || !current.starts_with(root) || fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
}

fn remove_dir(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::Io {
            path: path.to_owned(),
            err,
        }),
    }
}

// `dir/name` -> `dir/.name.<suffix>`. Hidden, so the scanner never picks it
// up when the destination lives inside the content root.
fn sibling(path: &Path, suffix: &str) -> Result<PathBuf> {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            Ok(parent.join(format!(".{}.{}", name.to_string_lossy(), suffix)))
        }
        _ => Err(Error::Destination(path.to_owned())),
    }
}

/// Represents the result of publishing.
pub type Result<T> = std::result::Result<T, Error>;

/// A publishing failure. Fatal.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when another build holds the destination's lock.
    #[error(
        "destination is locked by another build (remove `{}` if that build is gone)",
        .path.display()
    )]
    Locked { path: PathBuf },

    /// Returned when the destination has no parent directory or file name.
    #[error("invalid destination `{}`", .0.display())]
    Destination(PathBuf),

    #[error("writing `{}`: {err}", .path.display())]
    Io { path: PathBuf, err: io::Error },
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::artifact::ContentType;

    fn artifact(path: &str, contents: &str) -> Artifact {
        Artifact {
            path: PathBuf::from(path),
            contents: contents.as_bytes().to_vec(),
            content_type: ContentType::HTML,
            date: None,
            indexable: true,
            origin: String::from(path),
        }
    }

    fn read(root: &Path, path: &str) -> String {
        fs::read_to_string(root.join(path)).unwrap()
    }

    #[test]
    fn test_lock() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("_site");
        let lock = Lock::acquire(&destination)?;
        assert_eq!(dir.path().join("._site.lock"), lock.path());
        assert!(matches!(Lock::acquire(&destination), Err(Error::Locked { .. })));
        drop(lock);
        assert!(!dir.path().join("._site.lock").exists());
        Lock::acquire(&destination)?;
        Ok(())
    }

    #[test]
    fn test_publish_replaces_destination() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("_site");
        fs::create_dir_all(destination.join("stale")).unwrap();
        fs::write(destination.join("stale/old.html"), "old").unwrap();

        let manifest = publish(
            &destination,
            &[artifact("index.html", "home"), artifact("a/b.html", "b")],
        )?;
        assert_eq!(2, manifest.len());
        assert_eq!("home", read(&destination, "index.html"));
        assert_eq!("b", read(&destination, "a/b.html"));
        assert!(!destination.join("stale").exists());
        assert!(!dir.path().join("._site.staging").exists());
        assert!(!dir.path().join("._site.old").exists());
        Ok(())
    }

    #[test]
    fn test_publish_changes() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("_site");
        let first = [
            artifact("index.html", "home"),
            artifact("a/b.html", "b"),
            artifact("c.html", "c"),
        ];
        let manifest = publish(&destination, &first)?;

        let second = [artifact("index.html", "home v2"), artifact("c.html", "c")];
        let (manifest, changes) = publish_changes(&destination, &second, &manifest)?;
        assert_eq!(vec![PathBuf::from("index.html")], changes.written);
        assert_eq!(1, changes.unchanged);
        assert_eq!(vec![PathBuf::from("a/b.html")], changes.removed);
        assert_eq!("home v2", read(&destination, "index.html"));
        assert!(!destination.join("a").exists());
        assert_eq!(Manifest::of(&second), manifest);
        Ok(())
    }

    #[test]
    fn test_digest() {
        assert_eq!(
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            digest(b"")
        );
    }
}
