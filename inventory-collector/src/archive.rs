//! Append-only tar archives fed through staging files.
//!
//! Every payload is first written to a staging file, appended to its archive
//! as a single entry named after the staging file, and the staging file is
//! then removed. A crash leaves at most one staging file behind, never a
//! half-written entry in front of valid ones.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom};
use std::path::Path;

use tracing::{debug, error};

use crate::error::{CollectorError, Result};

const BLOCK_SIZE: u64 = 512;

/// Write `payload` to a new staging file, replacing any previous content.
pub fn write_staging(staging_path: &Path, payload: &[u8]) -> Result<()> {
    std::fs::write(staging_path, payload)?;
    Ok(())
}

/// Append the staging file as one entry of `archive_path`, then delete it.
///
/// The archive is created when absent. On failure the staging file is kept
/// for diagnosis and its path is logged.
pub fn append_entry(archive_path: &Path, staging_path: &Path) -> Result<()> {
    if let Err(source) = append_to_archive(archive_path, staging_path) {
        error!(
            archive = %archive_path.display(),
            staging = %staging_path.display(),
            error = %source,
            "Archive append failed, staging file left in place"
        );
        return Err(CollectorError::Archive {
            archive: archive_path.to_path_buf(),
            staging: staging_path.to_path_buf(),
            source,
        });
    }

    std::fs::remove_file(staging_path)?;

    debug!(
        archive = %archive_path.display(),
        staging = %staging_path.display(),
        "Archived entry"
    );

    Ok(())
}

/// Stage `payload` at `staging_path` and append it to `archive_path`.
pub fn stage_and_append(archive_path: &Path, staging_path: &Path, payload: &[u8]) -> Result<()> {
    write_staging(staging_path, payload)?;
    append_entry(archive_path, staging_path)
}

/// Names of all entries in an archive, in archive order.
pub fn read_entry_names(archive_path: &Path) -> Result<Vec<String>> {
    let file = File::open(archive_path)?;
    let mut archive = tar::Archive::new(file);
    let mut names = Vec::new();

    for entry in archive.entries()? {
        let entry = entry?;
        names.push(entry.path()?.to_string_lossy().into_owned());
    }

    Ok(names)
}

fn append_to_archive(archive_path: &Path, staging_path: &Path) -> io::Result<()> {
    let name = staging_path.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "staging path has no file name")
    })?;

    let mut archive = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(archive_path)?;

    let end = end_of_entries(&archive)?;
    archive.seek(SeekFrom::Start(end))?;

    let mut staging = File::open(staging_path)?;
    let mut builder = tar::Builder::new(&mut archive);
    builder.append_file(name, &mut staging)?;
    let archive = builder.into_inner()?;

    // Drop whatever followed the old end-of-archive marker.
    let len = archive.stream_position()?;
    archive.set_len(len)?;
    archive.sync_all()
}

/// Offset just past the data of the last entry, i.e. where the end-of-archive
/// marker starts. Zero for an empty file.
fn end_of_entries(file: &File) -> io::Result<u64> {
    if file.metadata()?.len() == 0 {
        return Ok(0);
    }

    let mut reader = file;
    reader.seek(SeekFrom::Start(0))?;

    let mut archive = tar::Archive::new(reader);
    let mut end = 0;
    for entry in archive.entries()? {
        let entry = entry?;
        let size = entry.header().entry_size()?;
        end = entry.raw_file_position() + size.div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
    }

    Ok(end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn entries(path: &Path) -> Vec<(String, String)> {
        let mut archive = tar::Archive::new(File::open(path).unwrap());
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let mut e = e.unwrap();
                let name = e.path().unwrap().to_string_lossy().into_owned();
                let mut body = String::new();
                e.read_to_string(&mut body).unwrap();
                (name, body)
            })
            .collect()
    }

    #[test]
    fn test_append_creates_archive_and_removes_staging() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("a.tar");
        let staging = dir.path().join("dpkg_@_node1_@_1");

        stage_and_append(&archive, &staging, b"ii  bash 5.1").unwrap();

        assert!(!staging.exists());
        assert_eq!(
            entries(&archive),
            vec![("dpkg_@_node1_@_1".to_string(), "ii  bash 5.1".to_string())]
        );
    }

    #[test]
    fn test_appends_accumulate_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("a.tar");

        // Sizes straddle block boundaries on purpose.
        let payloads = ["x".repeat(511), "y".repeat(512), "z".repeat(1300), String::new()];
        for (i, payload) in payloads.iter().enumerate() {
            let staging = dir.path().join(format!("entry{i}"));
            stage_and_append(&archive, &staging, payload.as_bytes()).unwrap();
        }

        let found = entries(&archive);
        assert_eq!(found.len(), payloads.len());
        for (i, (name, body)) in found.iter().enumerate() {
            assert_eq!(name, &format!("entry{i}"));
            assert_eq!(body, &payloads[i]);
        }
    }

    #[test]
    fn test_duplicate_names_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("a.tar");
        let staging = dir.path().join("juju_bundle_@_m_@_1");

        stage_and_append(&archive, &staging, b"first").unwrap();
        stage_and_append(&archive, &staging, b"second").unwrap();

        let found = entries(&archive);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].1, "first");
        assert_eq!(found[1].1, "second");
    }

    #[test]
    fn test_failed_append_keeps_staging() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as an archive.
        let archive = dir.path().join("not-a-file.tar");
        std::fs::create_dir(&archive).unwrap();
        let staging = dir.path().join("kernel_@_node1_@_1");

        let result = stage_and_append(&archive, &staging, b"6.8.0");

        assert!(matches!(result, Err(CollectorError::Archive { .. })));
        assert!(staging.exists());
    }

    #[test]
    fn test_read_entry_names() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("a.tar");
        stage_and_append(&archive, &dir.path().join("one"), b"1").unwrap();
        stage_and_append(&archive, &dir.path().join("two"), b"2").unwrap();

        assert_eq!(read_entry_names(&archive).unwrap(), vec!["one", "two"]);
    }
}
