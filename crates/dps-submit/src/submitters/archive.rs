//! Repository archive download and extraction
//!
//! # Supported Formats
//!
//! - **Zip** (.zip)
//! - **Tar** (.tar)
//! - **Tar.gz** (.tar.gz, .tgz)
//! - **Gzip** (.gz), a single compressed file
//!
//! Archives found inside the unpacked tree are not expanded again and are
//! left out of the listing, as are macOS metadata files.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use futures::StreamExt;
use reqwest::Client;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "tar", "gz", "tgz"];
const IGNORED_FILES: &[&str] = &[".DS_Store"];
const IGNORED_DIRS: &[&str] = &["__MACOSX"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
    Gz,
}

impl ArchiveKind {
    pub(crate) fn detect(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        if name.ends_with(".zip") {
            Ok(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(Self::TarGz)
        } else if name.ends_with(".tar") {
            Ok(Self::Tar)
        } else if name.ends_with(".gz") {
            Ok(Self::Gz)
        } else {
            anyhow::bail!("Unsupported archive format: {}", path.display())
        }
    }
}

/// A regular file of the unpacked tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UnpackedFile {
    pub path: PathBuf,
    /// Path below the extraction root
    pub relative: PathBuf,
}

/// Stream the archive at `url` into `dir`, keeping its file name
pub(crate) async fn download(client: &Client, url: &str, dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let file_name = url
        .split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .unwrap_or("archive");
    let target = dir.join(file_name);

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to request {}", url))?
        .error_for_status()
        .with_context(|| format!("Failed to download {}", url))?;

    let mut file = tokio::fs::File::create(&target)
        .await
        .with_context(|| format!("Failed to create {}", target.display()))?;
    let mut body = response.bytes_stream();
    let mut written = 0usize;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.with_context(|| format!("Failed to read {}", url))?;
        written += chunk.len();
        file.write_all(&chunk)
            .await
            .with_context(|| format!("Failed to write {}", target.display()))?;
    }
    file.flush().await?;

    debug!(url, bytes = written, path = %target.display(), "Downloaded archive");
    Ok(target)
}

/// Extract `archive` into `target` off the async runtime and list the files
pub(crate) async fn unpack(archive: PathBuf, target: PathBuf) -> Result<Vec<UnpackedFile>> {
    tokio::task::spawn_blocking(move || {
        extract(&archive, &target)?;
        list_files(&target)
    })
    .await
    .context("Archive extraction task failed")?
}

fn extract(archive: &Path, target: &Path) -> Result<()> {
    std::fs::create_dir_all(target)
        .with_context(|| format!("Failed to create {}", target.display()))?;
    let file = File::open(archive).with_context(|| format!("Failed to open {}", archive.display()))?;
    let reader = BufReader::new(file);

    match ArchiveKind::detect(archive)? {
        ArchiveKind::Zip => {
            let mut zip = zip::ZipArchive::new(reader).context("Failed to read zip archive")?;
            zip.extract(target).context("Failed to extract zip archive")?;
        },
        ArchiveKind::Tar => {
            tar::Archive::new(reader)
                .unpack(target)
                .context("Failed to extract tar archive")?;
        },
        ArchiveKind::TarGz => {
            tar::Archive::new(GzDecoder::new(reader))
                .unpack(target)
                .context("Failed to extract tar.gz archive")?;
        },
        ArchiveKind::Gz => {
            let name = archive
                .file_stem()
                .context("Gzip archive has no file name")?;
            let mut output = File::create(target.join(name))
                .with_context(|| format!("Failed to create {}", target.join(name).display()))?;
            std::io::copy(&mut GzDecoder::new(reader), &mut output)
                .context("Failed to decompress gzip data")?;
        },
    }

    debug!(archive = %archive.display(), "Extracted archive");
    Ok(())
}

/// Regular files under `root`, sorted by path
pub(crate) fn list_files(root: &Path) -> Result<Vec<UnpackedFile>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_ignored_dir(entry));
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() || is_ignored_file(&entry) {
            continue;
        }
        if is_archive(entry.path()) {
            debug!(path = %entry.path().display(), "Skipping nested archive");
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", entry.path().display(), root.display()))?
            .to_path_buf();
        files.push(UnpackedFile {
            path: entry.path().to_path_buf(),
            relative,
        });
    }

    Ok(files)
}

fn is_ignored_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && IGNORED_DIRS
            .iter()
            .any(|dir| entry.file_name() == *dir)
}

fn is_ignored_file(entry: &DirEntry) -> bool {
    IGNORED_FILES.iter().any(|name| entry.file_name() == *name)
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| ARCHIVE_EXTENSIONS.contains(&ext.as_str()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, content) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn write_tar_gz(path: &Path, entries: &[(&str, &str)]) {
        let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_detect_kind() {
        assert_eq!(ArchiveKind::detect(Path::new("a.zip")).unwrap(), ArchiveKind::Zip);
        assert_eq!(ArchiveKind::detect(Path::new("a.TGZ")).unwrap(), ArchiveKind::TarGz);
        assert_eq!(ArchiveKind::detect(Path::new("a.tar.gz")).unwrap(), ArchiveKind::TarGz);
        assert_eq!(ArchiveKind::detect(Path::new("a.tar")).unwrap(), ArchiveKind::Tar);
        assert_eq!(ArchiveKind::detect(Path::new("a.xml.gz")).unwrap(), ArchiveKind::Gz);
        assert!(ArchiveKind::detect(Path::new("a.rar")).is_err());
    }

    #[tokio::test]
    async fn test_unpack_zip_skips_metadata_and_nested_archives() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("records.zip");
        write_zip(
            &archive,
            &[
                ("b.xml", "<b/>"),
                ("nested/a.xml", "<a/>"),
                (".DS_Store", ""),
                ("__MACOSX/._b.xml", ""),
                ("inner.zip", "not really"),
            ],
        );

        let files = unpack(archive, dir.path().join("content")).await.unwrap();
        let relative: Vec<_> = files.iter().map(|f| f.relative.clone()).collect();
        assert_eq!(
            relative,
            vec![PathBuf::from("b.xml"), PathBuf::from("nested").join("a.xml")]
        );
    }

    #[tokio::test]
    async fn test_unpack_tar_gz() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("records.tar.gz");
        write_tar_gz(&archive, &[("one.xml", "<one/>"), ("two.xml", "<two/>")]);

        let files = unpack(archive, dir.path().join("content")).await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(
            std::fs::read_to_string(&files[0].path).unwrap(),
            "<one/>"
        );
    }

    #[tokio::test]
    async fn test_unpack_single_gzip() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("record.xml.gz");
        let mut encoder = GzEncoder::new(File::create(&archive).unwrap(), Compression::default());
        encoder.write_all(b"<record/>").unwrap();
        encoder.finish().unwrap();

        let files = unpack(archive, dir.path().join("content")).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative, PathBuf::from("record.xml"));
    }
}
