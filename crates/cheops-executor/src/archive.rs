//! Tar encoding of a build context directory.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use tracing::debug;

/// Write every regular file and directory under `root` to `writer` as a tar
/// stream, with paths relative to `root`. Entries are sorted so the archive
/// is deterministic.
///
/// Symlinks are stored as link entries and never followed, so nothing
/// outside `root` reaches the archive. An unreadable file fails the walk.
/// Returns the writer once the archive trailer has been written.
pub fn write_context<W: Write>(root: &Path, writer: W) -> io::Result<W> {
    let mut builder = tar::Builder::new(writer);
    builder.follow_symlinks(false);
    append_dir(&mut builder, root, Path::new(""))?;
    builder.into_inner()
}

fn append_dir<W: Write>(
    builder: &mut tar::Builder<W>,
    root: &Path,
    relative: &Path,
) -> io::Result<()> {
    let dir = root.join(relative);
    let mut entries = fs::read_dir(&dir)?
        .map(|entry| entry.map(|e| e.file_name()))
        .collect::<io::Result<Vec<_>>>()?;
    entries.sort();

    for name in entries {
        let rel = relative.join(&name);
        let path = root.join(&rel);
        let metadata = fs::symlink_metadata(&path).map_err(|e| with_path(e, &rel))?;

        if metadata.file_type().is_symlink() {
            builder
                .append_path_with_name(&path, &rel)
                .map_err(|e| with_path(e, &rel))?;
        } else if metadata.is_dir() {
            builder.append_dir(&rel, &path).map_err(|e| with_path(e, &rel))?;
            append_dir(builder, root, &rel)?;
        } else if metadata.is_file() {
            let mut file = File::open(&path).map_err(|e| with_path(e, &rel))?;
            builder
                .append_file(&rel, &mut file)
                .map_err(|e| with_path(e, &rel))?;
        } else {
            debug!(path = %rel.display(), "Skipping special file");
        }
    }
    Ok(())
}

fn with_path(err: io::Error, rel: &Path) -> io::Error {
    io::Error::new(err.kind(), format!("{}: {}", rel.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(archive: &[u8]) -> Vec<String> {
        let mut archive = tar::Archive::new(archive);
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let path = e.unwrap().path().unwrap().to_string_lossy().to_string();
                path.trim_end_matches('/').to_string()
            })
            .collect()
    }

    #[test]
    fn test_archives_tree_with_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();

        let archive = write_context(dir.path(), Vec::new()).unwrap();
        let names = entries(&archive);

        assert_eq!(names, vec!["Dockerfile", "a.txt", "src", "src/main.rs"]);
    }

    #[test]
    fn test_file_contents_preserved() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "hello").unwrap();

        let archive = write_context(dir.path(), Vec::new()).unwrap();
        let mut archive = tar::Archive::new(archive.as_slice());
        let mut entry = archive.entries().unwrap().next().unwrap().unwrap();
        let mut contents = String::new();
        io::Read::read_to_string(&mut entry, &mut contents).unwrap();
        assert_eq!(contents, "hello");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_stored_as_links() {
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("host-secret"), "HOST-ONLY-DATA").unwrap();

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::os::unix::fs::symlink(outside.path().join("host-secret"), dir.path().join("leak"))
            .unwrap();
        std::os::unix::fs::symlink(".", dir.path().join("loop")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("dangling"))
            .unwrap();

        let archive = write_context(dir.path(), Vec::new()).unwrap();
        let mut archive = tar::Archive::new(archive.as_slice());
        let mut seen = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().to_string();
            let mut contents = String::new();
            io::Read::read_to_string(&mut entry, &mut contents).unwrap();
            assert!(!contents.contains("HOST-ONLY-DATA"), "{name} leaked host data");
            seen.push((name, entry.header().entry_type()));
        }

        assert_eq!(
            seen,
            vec![
                ("a.txt".to_string(), tar::EntryType::Regular),
                ("dangling".to_string(), tar::EntryType::Symlink),
                ("leak".to_string(), tar::EntryType::Symlink),
                ("loop".to_string(), tar::EntryType::Symlink),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_fails() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locked");
        fs::write(&path, "x").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();
        if File::open(&path).is_ok() {
            // permission bits do not apply to root
            return;
        }

        let err = write_context(dir.path(), Vec::new()).unwrap_err();
        assert!(err.to_string().contains("locked"));
    }
}
