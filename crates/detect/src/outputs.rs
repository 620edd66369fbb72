//! Output-directory snapshot and diff.
//!
//! The last-resort completion signal: list the engine's output directory
//! before submission, list it again after the other signals fire (or as a
//! polling strategy of its own), and attribute new files to the job.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use genbridge_core::types::JobOutputs;

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];
const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "webm", "gif"];

/// The set of files present in the output directory at one point in time.
#[derive(Debug, Clone, Default)]
pub struct OutputSnapshot {
    files: HashSet<PathBuf>,
}

impl OutputSnapshot {
    /// Recursively list the output directory.
    ///
    /// A missing or unreadable directory yields an empty snapshot: the
    /// engine may simply not have created it yet, and the diff degrades to
    /// "everything that appears later is new".
    pub fn capture(output_dir: &Path) -> Self {
        let mut files = HashSet::new();
        collect_files(output_dir, &mut files);
        Self { files }
    }

    /// Files present now but not in this snapshot, classified by extension.
    ///
    /// Files with extensions that are neither image nor video are ignored;
    /// the engine writes bookkeeping files alongside real outputs.
    pub fn diff(&self, output_dir: &Path) -> JobOutputs {
        let mut outputs = JobOutputs::default();
        let mut current = HashSet::new();
        collect_files(output_dir, &mut current);

        let mut fresh: Vec<&PathBuf> = current.difference(&self.files).collect();
        fresh.sort();

        for path in fresh {
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            let ext = ext.to_ascii_lowercase();
            if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                outputs.images.push(path.clone());
            } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
                outputs.videos.push(path.clone());
            }
        }

        outputs
    }

    /// Number of files in the snapshot.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Walk `dir` recursively, collecting files. I/O errors on individual
/// entries are skipped; a directory listing race with the engine writing
/// files is normal here.
fn collect_files(dir: &Path, files: &mut HashSet<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        match entry.file_type() {
            Ok(ft) if ft.is_dir() => collect_files(&path, files),
            Ok(ft) if ft.is_file() => {
                files.insert(path);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_of_missing_directory_is_empty() {
        let snapshot = OutputSnapshot::capture(Path::new("/nonexistent/genbridge-test"));
        assert!(snapshot.is_empty());
    }

    #[test]
    fn diff_finds_new_files_and_classifies_them() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.png"), b"old").unwrap();

        let snapshot = OutputSnapshot::capture(dir.path());
        assert_eq!(snapshot.len(), 1);

        std::fs::write(dir.path().join("new.png"), b"new").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("clip.mp4"), b"vid").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"meta").unwrap();

        let outputs = snapshot.diff(dir.path());
        assert_eq!(outputs.images, vec![dir.path().join("new.png")]);
        assert_eq!(outputs.videos, vec![dir.path().join("sub").join("clip.mp4")]);
    }

    #[test]
    fn diff_with_no_changes_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"a").unwrap();

        let snapshot = OutputSnapshot::capture(dir.path());
        assert!(snapshot.diff(dir.path()).is_empty());
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = OutputSnapshot::capture(dir.path());

        std::fs::write(dir.path().join("shot.PNG"), b"img").unwrap();
        let outputs = snapshot.diff(dir.path());
        assert_eq!(outputs.images.len(), 1);
    }
}
