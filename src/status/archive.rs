//! Transparent unpacking of gzip archives dropped into a lake directory.

use crate::{
    error::{Result, StoreError},
    log,
};
use flate2::read::GzDecoder;
use glob::Pattern;
use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

/// Unpack every `*.gz` member of `dir` whose unpacked name matches `keep`.
///
/// Each archive is removed once its content is fully written. Returns the
/// paths of the unpacked files.
pub fn unpack(dir: &Path, keep: &Pattern) -> Result<Vec<PathBuf>> {
    let mut archives: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|err| StoreError::Io(dir.to_path_buf(), err))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|e| e == "gz"))
        .collect();
    archives.sort();

    let mut unpacked = Vec::new();
    for archive in archives {
        let target = archive.with_extension("");
        let matches = target
            .file_name()
            .is_some_and(|name| keep.matches(&name.to_string_lossy()));
        if !matches {
            continue;
        }
        gunzip(&archive, &target)?;
        fs::remove_file(&archive).map_err(|err| StoreError::Io(archive.clone(), err))?;
        log!("status"; "unpacked {}", target.display());
        unpacked.push(target);
    }
    Ok(unpacked)
}

fn gunzip(archive: &Path, target: &Path) -> Result<()> {
    let input = File::open(archive).map_err(|err| StoreError::Io(archive.to_path_buf(), err))?;
    let output = File::create(target).map_err(|err| StoreError::Io(target.to_path_buf(), err))?;
    let mut decoder = GzDecoder::new(BufReader::new(input));
    let mut writer = BufWriter::new(output);
    let written = io::copy(&mut decoder, &mut writer).and_then(|_| writer.flush());
    if let Err(err) = written {
        // a partial file would be picked up as data
        drop(writer);
        let _ = fs::remove_file(target);
        return Err(StoreError::Io(archive.to_path_buf(), err));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compression, write::GzEncoder};
    use tempfile::TempDir;

    fn gz(path: &Path, content: &str) {
        let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap();
    }

    #[test]
    fn test_unpack_matching_archives() {
        let dir = TempDir::new().unwrap();
        gz(&dir.path().join("20240101_DAM.csv.gz"), "datetime,x\n");
        gz(&dir.path().join("20240101_IDM.csv.gz"), "datetime,y\n");

        let pattern = Pattern::new("*DAM*.csv").unwrap();
        let unpacked = unpack(dir.path(), &pattern).unwrap();

        assert_eq!(unpacked, vec![dir.path().join("20240101_DAM.csv")]);
        assert_eq!(fs::read_to_string(&unpacked[0]).unwrap(), "datetime,x\n");
        assert!(!dir.path().join("20240101_DAM.csv.gz").exists());
        // non-matching archives stay packed
        assert!(dir.path().join("20240101_IDM.csv.gz").exists());
    }

    #[test]
    fn test_corrupt_archive_is_kept() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("20240101_DAM.csv.gz");
        fs::write(&archive, b"not gzip").unwrap();

        let pattern = Pattern::new("*.csv").unwrap();
        assert!(unpack(dir.path(), &pattern).is_err());
        assert!(archive.exists());
        assert!(!dir.path().join("20240101_DAM.csv").exists());
    }
}
