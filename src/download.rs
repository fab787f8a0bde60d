//! Download destination resolution and streaming for attachment responses.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::fsutil;
use crate::transport::h1::H1Connection;

/// Filename prefix used when the disposition carries no filename.
const FALLBACK_PREFIX: &str = "guise-download";

/// Resolve where an attachment should land on disk.
///
/// A requested path naming an existing file, or a fresh filename whose
/// parent directory exists, is used verbatim. A path naming an existing
/// directory gets the disposition filename (or a synthesized one) joined
/// under it with collision avoidance. No requested path behaves like the
/// current working directory.
pub fn resolve_download_path(requested: Option<&Path>, disposition: &str) -> Result<PathBuf> {
    if let Some(path) = requested {
        if fsutil::is_dir(path) {
            return append_filename(path, disposition);
        }
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !fsutil::is_dir(&parent) {
            return Err(Error::download(
                "directory of the download file was not found",
            ));
        }
        return Ok(path.to_path_buf());
    }
    append_filename(Path::new("."), disposition)
}

fn append_filename(dir: &Path, disposition: &str) -> Result<PathBuf> {
    let name = extract_filename(disposition).unwrap_or_else(synthesized_filename);
    fsutil::reserve_file_path(dir, &name)
}

/// Pull the `filename` parameter out of a Content-Disposition value.
fn extract_filename(disposition: &str) -> Option<String> {
    disposition.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let name = value.trim().trim_matches('"').trim();
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    })
}

fn synthesized_filename() -> String {
    format!(
        "{}_{}",
        FALLBACK_PREFIX,
        chrono::Utc::now().format("%Y%m%d%H%M%S")
    )
}

/// Stream the remaining response body to `destination`.
pub(crate) async fn save_body(connection: &mut H1Connection, destination: &Path) -> Result<()> {
    let mut file = File::create(destination).await?;
    while let Some(chunk) = connection.next_chunk().await? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_filename_variants() {
        assert_eq!(
            extract_filename(r#"attachment; filename="report.txt""#).unwrap(),
            "report.txt"
        );
        assert_eq!(
            extract_filename("attachment; filename=report.txt").unwrap(),
            "report.txt"
        );
        assert_eq!(
            extract_filename(r#"attachment; size=42; filename="a.zip""#).unwrap(),
            "a.zip"
        );
        assert!(extract_filename("attachment").is_none());
        assert!(extract_filename(r#"attachment; filename="""#).is_none());
    }

    #[test]
    fn test_directory_target_joins_disposition_filename() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_download_path(
            Some(dir.path()),
            r#"attachment; filename="report.txt""#,
        )
        .unwrap();
        assert_eq!(resolved, dir.path().join("report.txt"));
    }

    #[test]
    fn test_directory_target_avoids_collisions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.txt"), b"taken").unwrap();

        let resolved = resolve_download_path(
            Some(dir.path()),
            r#"attachment; filename="report.txt""#,
        )
        .unwrap();
        assert_eq!(resolved, dir.path().join("report_1.txt"));
    }

    #[test]
    fn test_file_target_used_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("fresh-name.bin");
        let resolved =
            resolve_download_path(Some(&target), "attachment; filename=x.bin").unwrap();
        assert_eq!(resolved, target);
    }

    #[test]
    fn test_missing_parent_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing/sub.txt");
        let result = resolve_download_path(Some(&target), "attachment; filename=x.bin");
        assert!(matches!(result, Err(Error::DownloadResolution(_))));
    }

    #[test]
    fn test_missing_filename_synthesized() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_download_path(Some(dir.path()), "attachment").unwrap();
        let name = resolved.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(FALLBACK_PREFIX));
    }
}
