use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::{ImportError, MissingFilesError};

/// Deflate rarely beats this ratio on text tables; larger claimed sizes are
/// grown into instead of reserved up front.
const MAX_PREALLOCATION_RATIO: usize = 16;

/// Text tables of one feed, keyed by base file name.
#[derive(Debug, Clone, Default)]
pub struct ArchiveContents {
    files: BTreeMap<String, String>,
}

impl ArchiveContents {
    /// Reads every `.txt` entry of a zip archive. Entries nested in folders
    /// are keyed by their base name; directories and other files are ignored.
    pub fn from_zip_bytes(bytes: &[u8]) -> Result<Self, ImportError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut contents = Self::default();

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let entry_name = entry.name().to_string();
            if entry_name.starts_with("__MACOSX/") {
                continue;
            }
            let Some(name) = base_txt_name(&entry_name) else {
                debug!(entry = %entry_name, "skipping non-table archive entry");
                continue;
            };

            let mut raw = Vec::with_capacity(entry_capacity(entry.size(), bytes.len()));
            entry
                .read_to_end(&mut raw)
                .map_err(|source| ImportError::ArchiveEntry {
                    file: entry_name.clone(),
                    source,
                })?;
            contents.insert(name, &raw);
        }

        Ok(contents)
    }

    /// Reads every `.txt` file of an unpacked feed directory.
    pub fn from_directory(path: &Path) -> Result<Self, ImportError> {
        let io_error = |source| ImportError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut contents = Self::default();

        for entry in fs::read_dir(path).map_err(io_error)? {
            let entry = entry.map_err(io_error)?;
            let file_path = entry.path();
            if !file_path.is_file() {
                continue;
            }
            let Some(name) = file_path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(base_txt_name)
            else {
                continue;
            };
            let raw = fs::read(&file_path).map_err(|source| ImportError::Io {
                path: file_path.clone(),
                source,
            })?;
            contents.insert(name, &raw);
        }

        Ok(contents)
    }

    pub fn from_files<I, K, V>(files: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            files: files
                .into_iter()
                .map(|(name, text)| (name.into(), text.into()))
                .collect(),
        }
    }

    fn insert(&mut self, name: &str, raw: &[u8]) {
        if self.files.contains_key(name) {
            warn!(file = name, "archive contains the file twice, keeping the first");
            return;
        }
        let text = String::from_utf8_lossy(raw).into_owned();
        self.files.insert(name.to_string(), text);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(String::as_str)
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn check_required(&self, required: &[&str]) -> Result<(), MissingFilesError> {
        let names: Vec<String> = required
            .iter()
            .filter(|name| !self.files.contains_key(**name))
            .map(|name| name.to_string())
            .collect();
        if names.is_empty() {
            Ok(())
        } else {
            Err(MissingFilesError { names })
        }
    }
}

/// Buffer size to reserve for an entry; the size an archive claims is not
/// trusted beyond a multiple of the archive itself.
fn entry_capacity(claimed_size: u64, archive_len: usize) -> usize {
    let bound = archive_len.saturating_mul(MAX_PREALLOCATION_RATIO);
    usize::try_from(claimed_size).unwrap_or(usize::MAX).min(bound)
}

fn base_txt_name(entry_name: &str) -> Option<&str> {
    let base = entry_name.rsplit('/').next()?;
    if base.ends_with(".txt") && base.len() > ".txt".len() {
        Some(base)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::{SystemTime, UNIX_EPOCH};
    use zip::write::FileOptions;
    use zip::ZipWriter;

    #[test]
    fn claimed_entry_size_is_bounded_by_archive_length() {
        assert_eq!(entry_capacity(0xFFFF_FFF0, 120), 120 * MAX_PREALLOCATION_RATIO);
        assert_eq!(entry_capacity(300, 120), 300);
        assert_eq!(entry_capacity(u64::MAX, 0), 0);
    }

    fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            if name.ends_with('/') {
                writer
                    .add_directory(*name, FileOptions::default())
                    .expect("add dir");
            } else {
                writer
                    .start_file(*name, FileOptions::default())
                    .expect("start file");
                writer.write_all(content.as_bytes()).expect("write");
            }
        }
        writer.finish().expect("finish zip").into_inner()
    }

    fn temp_dir(prefix: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("{}_{}_{}", prefix, std::process::id(), nanos));
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn keeps_only_txt_entries_keyed_by_base_name() {
        let bytes = zip_bytes(&[
            ("feed/", ""),
            ("feed/stops.txt", "stop_id\nA\n"),
            ("feed/readme.md", "ignored"),
            ("agency.txt", "agency_name\nX\n"),
        ]);
        let contents = ArchiveContents::from_zip_bytes(&bytes).expect("archive");

        let names: Vec<&str> = contents.file_names().collect();
        assert_eq!(names, vec!["agency.txt", "stops.txt"]);
        assert_eq!(contents.get("stops.txt"), Some("stop_id\nA\n"));
    }

    #[test]
    fn rejects_bytes_that_are_not_a_zip() {
        let err = ArchiveContents::from_zip_bytes(b"definitely not a zip").unwrap_err();
        assert!(matches!(err, ImportError::Archive(_)));
    }

    #[test]
    fn reports_every_missing_required_file() {
        let contents = ArchiveContents::from_files([("agency.txt", "")]);
        let err = contents
            .check_required(&["agency.txt", "stops.txt", "trips.txt"])
            .unwrap_err();
        assert_eq!(err.names, vec!["stops.txt".to_string(), "trips.txt".to_string()]);
    }

    #[test]
    fn reads_feed_directory() {
        let dir = temp_dir("schedule_archive");
        fs::write(dir.join("stops.txt"), "stop_id\nA\n").expect("write stops");
        fs::write(dir.join("notes.csv"), "x").expect("write notes");

        let contents = ArchiveContents::from_directory(&dir).expect("directory");
        assert_eq!(contents.file_names().collect::<Vec<_>>(), vec!["stops.txt"]);

        fs::remove_dir_all(&dir).ok();
    }
}
