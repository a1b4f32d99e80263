// Fetcher - archive extraction and atomic install
//
// Archives are gzip-compressed tar directories with a single top-level
// content root. Extraction happens inside the private staging area; the
// content root is then swapped into the canonical model directory with one
// rename, so no observer ever sees a half-populated model directory.

use flate2::read::GzDecoder;
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use super::FetchError;

/// Extract the archive into `<staging_dir>/extract` and return the path of
/// its content root (the archive's first top-level directory).
pub fn extract_archive(archive_path: &Path, staging_dir: &Path) -> Result<PathBuf, FetchError> {
    let extract_dir = staging_dir.join("extract");
    fs::create_dir_all(&extract_dir)
        .map_err(|e| FetchError::Disk(format!("Failed to create extraction directory: {}", e)))?;

    let file = fs::File::open(archive_path)
        .map_err(|e| FetchError::Disk(format!("Failed to open downloaded archive: {}", e)))?;

    let decoder = GzDecoder::new(BufReader::new(file));
    let mut archive = tar::Archive::new(decoder);
    archive
        .unpack(&extract_dir)
        .map_err(|e| FetchError::CorruptArchive(format!("Archive extraction failed: {}", e)))?;

    content_root(&extract_dir)
}

/// Locate the extracted archive's content root.
fn content_root(extract_dir: &Path) -> Result<PathBuf, FetchError> {
    let entries = fs::read_dir(extract_dir)
        .map_err(|e| FetchError::Disk(format!("Failed to read extraction directory: {}", e)))?;

    let mut root = None;
    for entry in entries {
        let entry = entry
            .map_err(|e| FetchError::Disk(format!("Failed to read extraction directory: {}", e)))?;
        if entry.path().is_dir() {
            root = Some(entry.path());
            break;
        }
    }

    root.ok_or_else(|| {
        FetchError::CorruptArchive("Archive contains no top-level model directory".to_string())
    })
}

/// Swap the extracted content root into the canonical model directory.
/// Whole-directory rename, never an item-by-item copy.
pub fn install_atomic(content_root: &Path, final_dir: &Path) -> Result<(), FetchError> {
    if let Some(parent) = final_dir.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| FetchError::Disk(format!("Failed to create models directory: {}", e)))?;
    }

    // A previous install being replaced goes away first; the new directory
    // still appears in a single rename.
    if final_dir.exists() {
        fs::remove_dir_all(final_dir)
            .map_err(|e| FetchError::Disk(format!("Failed to clear previous install: {}", e)))?;
    }

    fs::rename(content_root, final_dir)
        .map_err(|e| FetchError::Disk(format!("Failed to install model directory: {}", e)))?;

    log::info!("Installed model directory: {}", final_dir.display());
    Ok(())
}

/// Build an in-memory tar.gz model archive for tests.
#[cfg(test)]
pub(crate) fn build_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn extract_finds_content_root() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("model.tar.gz");
        let bytes = build_archive(&[
            ("model-root/am/final.mdl", b"acoustic data"),
            ("model-root/conf/model.conf", b"--sample-rate=16000"),
        ]);
        std::fs::write(&archive_path, bytes).unwrap();

        let root = extract_archive(&archive_path, dir.path()).unwrap();
        assert_eq!(root.file_name().unwrap(), "model-root");
        assert!(root.join("am/final.mdl").exists());
    }

    #[test]
    fn extract_rejects_garbage() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("model.tar.gz");
        std::fs::write(&archive_path, b"this is not a gzip stream").unwrap();

        let err = extract_archive(&archive_path, dir.path()).unwrap_err();
        assert!(matches!(err, FetchError::CorruptArchive(_)));
    }

    #[test]
    fn extract_rejects_archive_without_directory_root() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("model.tar.gz");
        let bytes = build_archive(&[("loose-file.bin", b"no directory here")]);
        std::fs::write(&archive_path, bytes).unwrap();

        let err = extract_archive(&archive_path, dir.path()).unwrap_err();
        assert!(matches!(err, FetchError::CorruptArchive(_)));
    }

    #[test]
    fn install_replaces_previous_directory() {
        let dir = tempdir().unwrap();
        let staged = dir.path().join("staged-root");
        std::fs::create_dir_all(&staged).unwrap();
        let mut f = std::fs::File::create(staged.join("new.bin")).unwrap();
        f.write_all(b"new").unwrap();

        let final_dir = dir.path().join("models").join("en-small");
        std::fs::create_dir_all(&final_dir).unwrap();
        std::fs::write(final_dir.join("old.bin"), b"old").unwrap();

        install_atomic(&staged, &final_dir).unwrap();
        assert!(final_dir.join("new.bin").exists());
        assert!(!final_dir.join("old.bin").exists());
        assert!(!staged.exists());
    }
}
