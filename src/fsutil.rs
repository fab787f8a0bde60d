//! Filesystem helpers backing download resolution and archive handling.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{Error, Result};

/// Characters disallowed in reserved filenames.
const DISALLOWED_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Create a directory and its parents. Returns whether anything was created.
/// A non-directory already occupying the path is an error.
pub fn mkdir(path: &Path) -> Result<bool> {
    if path.exists() {
        if !path.is_dir() {
            return Err(Error::io("a file (not a directory) already exists on the path"));
        }
        return Ok(false);
    }
    fs::create_dir_all(path)?;
    Ok(true)
}

pub fn exists(path: &Path) -> bool {
    path.exists()
}

pub fn is_dir(path: &Path) -> bool {
    fs::metadata(path).map(|meta| meta.is_dir()).unwrap_or(false)
}

pub fn is_file(path: &Path) -> bool {
    fs::metadata(path).map(|meta| meta.is_file()).unwrap_or(false)
}

/// Find a free path for `name` under `dir`.
///
/// When the name is taken, an incrementing `_N` suffix is inserted before
/// the extension (`report.txt` -> `report_1.txt`) until a free path is
/// found. The name itself must be non-empty and free of path separators and
/// other disallowed characters.
pub fn reserve_file_path(dir: &Path, name: &str) -> Result<PathBuf> {
    if !is_dir(dir) {
        return Err(Error::download("specified directory path is not a directory"));
    }
    if name.is_empty() || name.contains(DISALLOWED_CHARS) {
        return Err(Error::download(
            "filename is empty or contains disallowed characters",
        ));
    }
    let mut destination = dir.join(name);
    let (stem, extension) = split_extension(name);
    let mut index = 1;
    while destination.exists() {
        destination = dir.join(format!("{}_{}{}", stem, index, extension));
        index += 1;
    }
    Ok(destination)
}

/// Split a filename into stem and final extension (dot included).
/// A leading dot alone does not start an extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(idx) => (&name[..idx], &name[idx..]),
    }
}

/// Extract a zip archive with the OS command.
///
/// Uses `unzip`, falling back to `tar` on Windows where `unzip` is commonly
/// absent. Extraction inherits the working directory unless `dest_dir` is
/// given (which must exist).
pub fn unzip(archive: &Path, dest_dir: Option<&Path>) -> Result<()> {
    if !exists(archive) {
        return Err(Error::io("there is no file on the zip path"));
    }
    if let Some(dir) = dest_dir {
        if !is_dir(dir) {
            return Err(Error::io("the destination directory was not found"));
        }
    }

    let mut unzip_cmd = Command::new("unzip");
    unzip_cmd.arg("-o");
    if let Some(dir) = dest_dir {
        unzip_cmd.arg("-d").arg(dir);
    }
    unzip_cmd.arg(archive);
    match run_quiet(&mut unzip_cmd) {
        Ok(true) => return Ok(()),
        Ok(false) => return Err(Error::io("unzip command failed")),
        Err(spawn_err) if !cfg!(windows) => {
            return Err(Error::io(format!(
                "\"unzip\" command is not available: {}",
                spawn_err
            )));
        }
        Err(_) => {}
    }

    let mut tar_cmd = Command::new("tar");
    if let Some(dir) = dest_dir {
        tar_cmd.arg("-C").arg(dir);
    }
    tar_cmd.arg("-xf").arg(archive);
    match run_quiet(&mut tar_cmd) {
        Ok(true) => Ok(()),
        Ok(false) => Err(Error::io("tar extraction failed")),
        Err(spawn_err) => Err(Error::io(format!(
            "no archive command available: {}",
            spawn_err
        ))),
    }
}

fn run_quiet(command: &mut Command) -> io::Result<bool> {
    command
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_free_name_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let reserved = reserve_file_path(dir.path(), "report.txt").unwrap();
        assert_eq!(reserved, dir.path().join("report.txt"));
    }

    #[test]
    fn test_reserve_collision_appends_suffix_before_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("report.txt"), b"taken").unwrap();

        let reserved = reserve_file_path(dir.path(), "report.txt").unwrap();
        assert_eq!(reserved, dir.path().join("report_1.txt"));

        fs::write(&reserved, b"also taken").unwrap();
        let reserved = reserve_file_path(dir.path(), "report.txt").unwrap();
        assert_eq!(reserved, dir.path().join("report_2.txt"));
    }

    #[test]
    fn test_reserve_collision_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("archive"), b"taken").unwrap();

        let reserved = reserve_file_path(dir.path(), "archive").unwrap();
        assert_eq!(reserved, dir.path().join("archive_1"));
    }

    #[test]
    fn test_reserve_rejects_invalid_names() {
        let dir = tempfile::tempdir().unwrap();
        assert!(reserve_file_path(dir.path(), "").is_err());
        assert!(reserve_file_path(dir.path(), "a/b.txt").is_err());
        assert!(reserve_file_path(dir.path(), "a:b").is_err());
    }

    #[test]
    fn test_reserve_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        fs::write(&file, b"x").unwrap();
        assert!(reserve_file_path(&file, "name.txt").is_err());
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("report.txt"), ("report", ".txt"));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension("noext"), ("noext", ""));
        assert_eq!(split_extension(".bashrc"), (".bashrc", ""));
    }

    #[test]
    fn test_mkdir_idempotent_and_rejects_files() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        assert!(mkdir(&nested).unwrap());
        assert!(!mkdir(&nested).unwrap());

        let file = dir.path().join("file");
        fs::write(&file, b"x").unwrap();
        assert!(mkdir(&file).is_err());
    }
}
