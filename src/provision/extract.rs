//! Distribution archive extraction

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use xz2::read::XzDecoder;

use crate::error::{Result, SandboxError};

/// Compression of a tar archive, detected from its file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// .tar.gz / .tgz
    Gzip,
    /// .tar.xz / .txz
    Xz,
    /// .tar.zst
    Zstd,
    /// .tar.bz2 / .tbz2
    Bzip2,
    /// Plain .tar
    None,
}

impl Compression {
    /// Detect compression from the archive file name
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if name.ends_with(".gz") || name.ends_with(".tgz") {
            Self::Gzip
        } else if name.ends_with(".xz") || name.ends_with(".txz") {
            Self::Xz
        } else if name.ends_with(".zst") {
            Self::Zstd
        } else if name.ends_with(".bz2") || name.ends_with(".tbz2") {
            Self::Bzip2
        } else {
            Self::None
        }
    }
}

/// Extract `archive` into `dest`, dropping the first path component of every
/// entry. Returns the number of entries written.
pub fn extract_stripped(archive: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive)
        .map_err(|e| SandboxError::extract(archive, format!("cannot open archive: {}", e)))?;
    let reader = BufReader::new(file);

    let count = match Compression::from_path(archive) {
        Compression::Gzip => unpack(Archive::new(GzDecoder::new(reader)), archive, dest),
        Compression::Xz => unpack(Archive::new(XzDecoder::new(reader)), archive, dest),
        Compression::Zstd => {
            let decoder = zstd::Decoder::new(reader)
                .map_err(|e| SandboxError::extract(archive, e.to_string()))?;
            unpack(Archive::new(decoder), archive, dest)
        }
        Compression::Bzip2 => unpack(
            Archive::new(bzip2::read::BzDecoder::new(reader)),
            archive,
            dest,
        ),
        Compression::None => unpack(Archive::new(reader), archive, dest),
    }?;

    if count == 0 {
        return Err(SandboxError::extract(archive, "archive has no entries below its top-level directory"));
    }

    Ok(count)
}

fn unpack<R: Read>(mut tar: Archive<R>, archive: &Path, dest: &Path) -> Result<usize> {
    let fail = |msg: String| SandboxError::extract(archive, msg);
    let mut count = 0;

    let entries = tar.entries().map_err(|e| fail(e.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| fail(e.to_string()))?;
        let path = entry.path().map_err(|e| fail(e.to_string()))?.into_owned();

        let Some(relative) = strip_first_component(&path).map_err(fail)? else {
            continue;
        };
        let target = dest.join(&relative);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| fail(format!("{}: {}", parent.display(), e)))?;
        }

        if entry.header().entry_type() == EntryType::Link {
            // Hard link targets name the archive's top-level directory too.
            let link = entry
                .link_name()
                .map_err(|e| fail(e.to_string()))?
                .ok_or_else(|| fail(format!("hard link {} has no target", path.display())))?
                .into_owned();
            let link_target = strip_first_component(&link)
                .map_err(fail)?
                .ok_or_else(|| fail(format!("hard link {} points outside the archive", path.display())))?;
            fs::hard_link(dest.join(link_target), &target)
                .map_err(|e| fail(format!("{}: {}", target.display(), e)))?;
        } else {
            entry
                .unpack(&target)
                .map_err(|e| fail(format!("{}: {}", target.display(), e)))?;
        }

        count += 1;
    }

    Ok(count)
}

/// Drop the leading component of an archive path.
///
/// Returns `None` for the top-level directory itself and an error for paths
/// that would escape the destination.
fn strip_first_component(path: &Path) -> std::result::Result<Option<PathBuf>, String> {
    let mut components = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir));

    match components.next() {
        None => return Ok(None),
        Some(Component::Normal(_)) => {}
        Some(_) => return Err(format!("unsafe archive path: {}", path.display())),
    }

    let mut stripped = PathBuf::new();
    for component in components {
        match component {
            Component::Normal(part) => stripped.push(part),
            _ => return Err(format!("unsafe archive path: {}", path.display())),
        }
    }

    if stripped.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(stripped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn gz_archive(dir: &Path, name: &str, files: &[(&str, &str)]) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for (entry, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o755);
            header.set_entry_type(EntryType::Regular);
            header.set_cksum();
            builder.append_data(&mut header, entry, content.as_bytes()).unwrap();
        }

        builder.into_inner().unwrap().finish().unwrap();
        path
    }

    #[test]
    fn test_compression_detection() {
        assert_eq!(Compression::from_path(Path::new("a-1.tar.gz")), Compression::Gzip);
        assert_eq!(Compression::from_path(Path::new("a-1.tgz")), Compression::Gzip);
        assert_eq!(Compression::from_path(Path::new("a-1.tar.xz")), Compression::Xz);
        assert_eq!(Compression::from_path(Path::new("a-1.tar.zst")), Compression::Zstd);
        assert_eq!(Compression::from_path(Path::new("a-1.tar.bz2")), Compression::Bzip2);
        assert_eq!(Compression::from_path(Path::new("a-1.tar")), Compression::None);
    }

    #[test]
    fn test_strip_first_component() {
        assert_eq!(
            strip_first_component(Path::new("server-5.5.10/bin/mysqld")).unwrap(),
            Some(PathBuf::from("bin/mysqld"))
        );
        assert_eq!(
            strip_first_component(Path::new("./server-5.5.10/lib")).unwrap(),
            Some(PathBuf::from("lib"))
        );
        assert_eq!(strip_first_component(Path::new("server-5.5.10/")).unwrap(), None);
        assert!(strip_first_component(Path::new("server/../../etc/passwd")).is_err());
        assert!(strip_first_component(Path::new("/etc/passwd")).is_err());
    }

    #[test]
    fn test_extract_strips_top_level() {
        let temp_dir = TempDir::new().unwrap();
        let archive = gz_archive(
            temp_dir.path(),
            "server-5.5.10-linux-x86_64.tar.gz",
            &[
                ("server-5.5.10-linux-x86_64/bin/mysqld_safe", "#!/bin/sh\n"),
                ("server-5.5.10-linux-x86_64/lib/README", "libs\n"),
            ],
        );
        let dest = temp_dir.path().join("out");
        fs::create_dir_all(&dest).unwrap();

        let count = extract_stripped(&archive, &dest).unwrap();
        assert_eq!(count, 2);
        assert!(dest.join("bin/mysqld_safe").is_file());
        assert!(dest.join("lib/README").is_file());
        assert!(!dest.join("server-5.5.10-linux-x86_64").exists());
    }

    #[test]
    fn test_extract_rebases_hard_links() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("server-5.5.10-linux-x86_64.tar.gz");
        let encoder = flate2::write::GzEncoder::new(
            File::create(&path).unwrap(),
            flate2::Compression::default(),
        );
        let mut builder = tar::Builder::new(encoder);

        let content = "#!/bin/sh\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o755);
        header.set_entry_type(EntryType::Regular);
        header.set_cksum();
        builder
            .append_data(&mut header, "top/bin/mysqld", content.as_bytes())
            .unwrap();

        let mut link = tar::Header::new_gnu();
        link.set_size(0);
        link.set_mode(0o755);
        link.set_entry_type(EntryType::Link);
        link.set_link_name("top/bin/mysqld").unwrap();
        link.set_cksum();
        builder
            .append_data(&mut link, "top/bin/mysqld-debug", std::io::empty())
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let dest = temp_dir.path().join("basedir");
        fs::create_dir_all(&dest).unwrap();
        assert_eq!(extract_stripped(&path, &dest).unwrap(), 2);

        use std::os::unix::fs::MetadataExt;
        let original = fs::metadata(dest.join("bin/mysqld")).unwrap();
        let linked = fs::metadata(dest.join("bin/mysqld-debug")).unwrap();
        assert_eq!(original.ino(), linked.ino());
        assert_eq!(original.nlink(), 2);
        assert!(!dest.join("top").exists());
    }

    #[test]
    fn test_extract_rejects_escaping_entry() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("server-5.5.10-linux-x86_64.tar");
        let mut builder = tar::Builder::new(File::create(&path).unwrap());

        // The builder refuses `..` in paths, so write the raw name field
        let content = "owned\n";
        let name = b"top/../../escape";
        let mut header = tar::Header::new_old();
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        header.set_cksum();
        builder.append(&header, content.as_bytes()).unwrap();
        builder.into_inner().unwrap();

        let dest = temp_dir.path().join("a").join("b");
        fs::create_dir_all(&dest).unwrap();

        let err = extract_stripped(&path, &dest).unwrap_err();
        assert!(matches!(err, SandboxError::Extraction { .. }));
        assert!(!temp_dir.path().join("a").join("escape").exists());
        assert!(!temp_dir.path().join("escape").exists());
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[test]
    fn test_extract_corrupt_archive() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("server-5.5.10.tar.gz");
        fs::write(&archive, b"definitely not gzip").unwrap();

        let err = extract_stripped(&archive, temp_dir.path()).unwrap_err();
        assert!(matches!(err, SandboxError::Extraction { .. }));
    }

    #[test]
    fn test_extract_missing_archive() {
        let temp_dir = TempDir::new().unwrap();
        let err = extract_stripped(&temp_dir.path().join("nope-1.0.tar.gz"), temp_dir.path())
            .unwrap_err();
        assert!(matches!(err, SandboxError::Extraction { .. }));
    }
}
