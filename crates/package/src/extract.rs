//! APKG extraction: unpacks a fetched package archive (`tar.gz`) into a
//! fresh directory under the package cache, which is what every downstream
//! stage (manifest reader, environment builder, supervisor) treats as the
//! package root.

use crate::error::{Error, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use tar::Archive;

/// Extracts the `tar.gz` archive at `archive_path` into `dest_dir`,
/// replacing any prior contents. `dest_dir`'s parent must already exist;
/// the directory itself is created fresh so a half-extracted tree from a
/// previous failed attempt can never be mistaken for a complete one.
pub async fn extract_apkg(archive_path: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let archive_path = archive_path.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        if dest_dir.exists() {
            std::fs::remove_dir_all(&dest_dir)?;
        }
        std::fs::create_dir_all(&dest_dir)?;

        let tar_gz = File::open(&archive_path)?;
        let gz = flate2::read::GzDecoder::new(tar_gz);
        let mut archive = Archive::new(gz);
        archive
            .unpack(&dest_dir)
            .map_err(|e| Error::ExtractFailed(format!("failed to unpack {}: {e}", archive_path.display())))?;

        Ok(dest_dir)
    })
    .await
    .map_err(|e| Error::ExtractFailed(format!("extraction task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture_archive(path: &Path, files: &[(&str, &[u8])]) {
        let tar_gz = File::create(path).unwrap();
        let enc = flate2::write::GzEncoder::new(tar_gz, flate2::Compression::default());
        let mut builder = tar::Builder::new(enc);
        for (name, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *contents).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[tokio::test]
    async fn extracts_files_into_dest_dir() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("pkg.apkg");
        write_fixture_archive(
            &archive_path,
            &[("agent.manifest.toml", b"name = \"a\"\n"), ("server.py", b"# hi")],
        );

        let dest = dir.path().join("extracted");
        let root = extract_apkg(&archive_path, &dest).await.unwrap();
        assert!(root.join("agent.manifest.toml").exists());
        assert!(root.join("server.py").exists());
    }

    #[tokio::test]
    async fn replaces_stale_contents_from_a_prior_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("pkg.apkg");
        write_fixture_archive(&archive_path, &[("new.txt", b"new")]);

        let dest = dir.path().join("extracted");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale.txt"), b"stale").unwrap();

        let root = extract_apkg(&archive_path, &dest).await.unwrap();
        assert!(!root.join("stale.txt").exists());
        assert!(root.join("new.txt").exists());
    }

    #[tokio::test]
    async fn malformed_archive_fails_with_extract_failed() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("bad.apkg");
        std::fs::write(&archive_path, b"not a tarball").unwrap();

        let dest = dir.path().join("extracted");
        let err = extract_apkg(&archive_path, &dest).await.unwrap_err();
        assert!(matches!(err, Error::ExtractFailed(_)));
    }
}
