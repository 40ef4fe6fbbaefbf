// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! VG metadata archiving: `${system_dir}/backup/<vgname>_<index>.vg`,
//! one immutable text-format snapshot per commit, pruned by age and a
//! retained-count floor. Grounded on `lib/format_text/backup.c`, with
//! one deliberate deviation: that source's temp-file dance is
//! `mkstemp` + `rename`, built by hand against a fixed-size buffer and
//! prone to an already-acknowledged race if the backup directory is
//! concurrently recreated. Here `tempfile::Builder` does the
//! create-then-atomically-rename sequence instead.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::{Error, ErrorKind, Result};

/// `retain_days`/`min_retains` from `backup/retain_days` and
/// `backup/retain_min` in the config tree.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub retain_days: u32,
    pub min_retains: u32,
}

impl Default for RetentionPolicy {
    fn default() -> RetentionPolicy {
        RetentionPolicy {
            retain_days: 30,
            min_retains: 10,
        }
    }
}

/// One archived snapshot found on disk.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub path: PathBuf,
    pub vg_name: String,
    pub index: u32,
}

pub struct Archiver {
    dir: PathBuf,
    policy: RetentionPolicy,
}

impl Archiver {
    pub fn new(dir: impl Into<PathBuf>, policy: RetentionPolicy) -> Archiver {
        Archiver { dir: dir.into(), policy }
    }

    /// Writes `rendered` (the output of `format::text::render`) as the
    /// next-numbered archive for `vg_name`, then prunes old entries.
    /// The write itself goes through a temp file in the same directory
    /// so a crash mid-write never leaves a half-written `.vg` file
    /// visible under its final name.
    pub fn archive(&self, vg_name: &str, rendered: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let next_index = self.list_for(vg_name)?.iter().map(|e| e.index + 1).max().unwrap_or(0);
        let final_path = self.dir.join(format!("{}_{}.vg", vg_name, next_index));

        let mut tmp = tempfile::Builder::new().prefix(&format!("{}_", vg_name)).suffix(".tmp").tempfile_in(&self.dir)?;
        use std::io::Write;
        tmp.write_all(rendered)?;
        tmp.flush()?;
        tmp.persist(&final_path).map_err(|e| Error::new(ErrorKind::Io, e.to_string()))?;

        self.prune(vg_name)?;
        Ok(final_path)
    }

    /// Every archive for `vg_name`, sorted oldest-index first.
    pub fn list_for(&self, vg_name: &str) -> Result<Vec<ArchiveEntry>> {
        let mut entries = Vec::new();
        let dir = match fs::read_dir(&self.dir) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e.into()),
        };
        for entry in dir {
            let entry = entry?;
            if let Some(parsed) = parse_backup_filename(&entry.file_name().to_string_lossy()) {
                if parsed.0 == vg_name {
                    entries.push(ArchiveEntry {
                        path: entry.path(),
                        vg_name: parsed.0,
                        index: parsed.1,
                    });
                }
            }
        }
        entries.sort_by_key(|e| e.index);
        Ok(entries)
    }

    /// Removes archives older than `retain_days`, except the
    /// `min_retains` most recent are always kept regardless of age —
    /// retention is the union of the two rules, not their minimum.
    pub fn prune(&self, vg_name: &str) -> Result<()> {
        let mut entries = self.list_for(vg_name)?;
        entries.sort_by_key(|e| std::cmp::Reverse(e.index));

        let now = SystemTime::now();
        let max_age = Duration::from_secs(self.policy.retain_days as u64 * 86_400);

        for (rank, entry) in entries.into_iter().enumerate() {
            if (rank as u32) < self.policy.min_retains {
                continue;
            }
            let age = fs::metadata(&entry.path).ok().and_then(|m| m.modified().ok()).and_then(|mtime| now.duration_since(mtime).ok());
            if age.map(|a| a > max_age).unwrap_or(false) {
                fs::remove_file(&entry.path)?;
            }
        }
        Ok(())
    }
}

/// `<vgname>_<index>.vg`, mirroring `_scan_vg`'s `rindex('_')` +
/// `sscanf("%u")` parse: the vg name may itself contain underscores, so
/// the split point is the *last* one, not the first.
fn parse_backup_filename(filename: &str) -> Option<(String, u32)> {
    let stem = filename.strip_suffix(".vg")?;
    let (name, index_str) = stem.rsplit_once('_')?;
    if name.is_empty() {
        return None;
    }
    let index = index_str.parse().ok()?;
    Some((name.to_string(), index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn archive_numbers_snapshots_sequentially() {
        let dir = tempdir().unwrap();
        let archiver = Archiver::new(dir.path(), RetentionPolicy::default());
        let p0 = archiver.archive("vg1", b"first").unwrap();
        let p1 = archiver.archive("vg1", b"second").unwrap();
        assert!(p0.to_string_lossy().ends_with("vg1_0.vg"));
        assert!(p1.to_string_lossy().ends_with("vg1_1.vg"));
    }

    #[test]
    fn underscore_in_vg_name_does_not_confuse_the_index_parse() {
        let dir = tempdir().unwrap();
        let archiver = Archiver::new(dir.path(), RetentionPolicy::default());
        archiver.archive("my_vg", b"data").unwrap();
        let entries = archiver.list_for("my_vg").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].index, 0);
    }

    #[test]
    fn min_retains_keeps_recent_entries_even_if_policy_says_zero_days() {
        let dir = tempdir().unwrap();
        let policy = RetentionPolicy { retain_days: 0, min_retains: 2 };
        let archiver = Archiver::new(dir.path(), policy);
        for i in 0..5 {
            archiver.archive("vg1", format!("snapshot {}", i).as_bytes()).unwrap();
        }
        let remaining = archiver.list_for("vg1").unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining.last().unwrap().index, 4);
    }

    #[test]
    fn parse_backup_filename_splits_on_last_underscore() {
        assert_eq!(parse_backup_filename("my_vg_3.vg"), Some(("my_vg".to_string(), 3)));
        assert_eq!(parse_backup_filename("not-a-backup.txt"), None);
    }
}
