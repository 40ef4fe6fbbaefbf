// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The indexed set of block devices, as `lib/device/dev-cache.c`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use super::{DevId, Device};
use crate::error::{Error, ErrorKind, Result};
use crate::filter::Filter;

/// Abstracts "list the block device nodes under a directory" so
/// [`DeviceCache::scan`] can be exercised without real `/dev` entries.
/// `forensicxlab-exhume_lvm`'s `Body` trait plays the same role for
/// reading bytes out of an image; here it's reading directory structure.
pub trait DirProbe {
    /// One entry per path found while walking `dir`, non-recursively,
    /// skipping symlinks to directories (real subdirectories are
    /// returned too, so the caller can recurse by calling `add_dir`
    /// again).
    fn list(&self, dir: &Path) -> std::io::Result<Vec<DirEntry>>;
}

pub enum DirEntry {
    BlockDevice { path: PathBuf, id: DevId },
    Directory { path: PathBuf },
}

/// Walks the real filesystem with `stat(2)`.
pub struct RealDirProbe;

impl DirProbe for RealDirProbe {
    fn list(&self, dir: &Path) -> std::io::Result<Vec<DirEntry>> {
        use std::os::unix::fs::{FileTypeExt, MetadataExt};
        let mut out = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let ft = entry.file_type()?;
            if ft.is_symlink() {
                continue;
            }
            if ft.is_dir() {
                out.push(DirEntry::Directory { path: entry.path() });
            } else if ft.is_block_device() {
                let meta = entry.metadata()?;
                let rdev = meta.rdev();
                out.push(DirEntry::BlockDevice {
                    path: entry.path(),
                    id: DevId::new(libc_major(rdev), libc_minor(rdev)),
                });
            }
        }
        Ok(out)
    }
}

fn libc_major(rdev: u64) -> u32 {
    ((rdev >> 8) & 0xfff) as u32 | (((rdev >> 32) & !0xfff) as u32)
}

fn libc_minor(rdev: u64) -> u32 {
    (rdev & 0xff) as u32 | (((rdev >> 12) & !0xff) as u32)
}

/// The indexed directory of block devices.
pub struct DeviceCache {
    dirs: Vec<PathBuf>,
    devices: Vec<Device>,
    by_path: HashMap<String, usize>,
    by_devt: BTreeMap<DevId, usize>,
    has_scanned: bool,
}

impl DeviceCache {
    pub fn new() -> DeviceCache {
        DeviceCache {
            dirs: Vec::new(),
            devices: Vec::new(),
            by_path: HashMap::new(),
            by_devt: BTreeMap::new(),
            has_scanned: false,
        }
    }

    pub fn add_dir(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.dirs.contains(&path) {
            self.dirs.push(path);
        }
    }

    pub fn has_scanned(&self) -> bool {
        self.has_scanned
    }

    /// Walk every watched directory, inserting or aliasing each block
    /// device found. A no-op if already scanned unless `force`.
    pub fn scan(&mut self, force: bool, probe: &dyn DirProbe) -> Result<()> {
        if self.has_scanned && !force {
            return Ok(());
        }

        let mut pending = self.dirs.clone();
        let mut i = 0;
        while i < pending.len() {
            let dir = pending[i].clone();
            i += 1;
            let entries = match probe.list(&dir) {
                Ok(e) => e,
                Err(_) => continue,
            };
            for entry in entries {
                match entry {
                    DirEntry::Directory { path } => {
                        if !pending.contains(&path) {
                            pending.push(path);
                        }
                    }
                    DirEntry::BlockDevice { path, id } => {
                        self.insert_or_alias(id, path);
                    }
                }
            }
        }

        self.has_scanned = true;
        Ok(())
    }

    fn insert_or_alias(&mut self, id: DevId, path: PathBuf) {
        let path = path.to_string_lossy().into_owned();
        if let Some(&idx) = self.by_devt.get(&id) {
            self.devices[idx].add_alias(path.clone());
            self.by_path.insert(path, idx);
            return;
        }

        let idx = self.devices.len();
        self.devices.push(Device::new(id, path.clone()));
        self.by_devt.insert(id, idx);
        self.by_path.insert(path, idx);
    }

    /// Look up the device whose canonical alias is `name`, applying
    /// `filter`. Returns `None` if absent or filtered out.
    pub fn get(&self, name: &str, filter: &dyn Filter) -> Option<&Device> {
        let idx = *self.by_path.get(name)?;
        let dev = &self.devices[idx];
        if filter.passes_filter(dev) {
            Some(dev)
        } else {
            None
        }
    }

    pub fn get_by_id(&self, id: DevId) -> Option<&Device> {
        self.by_devt.get(&id).map(|&idx| &self.devices[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn iter_filtered<'a>(&'a self, filter: &'a dyn Filter) -> impl Iterator<Item = &'a Device> {
        self.devices.iter().filter(move |d| filter.passes_filter(d))
    }

    /// Revalidate the first alias of `id`, repairing the path hash if it
    /// no longer resolves; returns the new canonical name or an error if
    /// every alias is now gone.
    pub fn dev_name_confirmed(&mut self, id: DevId, probe: &dyn DirProbe) -> Result<String> {
        let idx = *self
            .by_devt
            .get(&id)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "device not in cache"))?;

        let candidates = self.devices[idx].aliases().to_vec();
        for alias in &candidates {
            let parent = Path::new(alias).parent().unwrap_or_else(|| Path::new("/"));
            let still_present = probe.list(parent).ok().is_some_and(|entries| {
                entries.iter().any(|e| matches!(
                    e, DirEntry::BlockDevice { path, id: found } if path.to_string_lossy() == *alias && *found == id
                ))
            });
            if still_present {
                return Ok(alias.clone());
            }
            self.devices[idx].remove_alias(alias);
            self.by_path.remove(alias);
        }

        Err(Error::new(
            ErrorKind::NotFound,
            "no alias for device resolves any longer",
        ))
    }
}

impl Default for DeviceCache {
    fn default() -> DeviceCache {
        DeviceCache::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::AcceptAllFilter;
    use std::cell::RefCell;
    use std::collections::HashMap as StdHashMap;

    struct FakeProbe {
        listing: StdHashMap<PathBuf, Vec<DirEntry>>,
        calls: RefCell<usize>,
    }

    impl DirProbe for FakeProbe {
        fn list(&self, dir: &Path) -> std::io::Result<Vec<DirEntry>> {
            *self.calls.borrow_mut() += 1;
            Ok(self
                .listing
                .get(dir)
                .map(|v| {
                    v.iter()
                        .map(|e| match e {
                            DirEntry::BlockDevice { path, id } => {
                                DirEntry::BlockDevice { path: path.clone(), id: *id }
                            }
                            DirEntry::Directory { path } => DirEntry::Directory { path: path.clone() },
                        })
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    #[test]
    fn scan_indexes_devices_by_path_and_devt() {
        let mut listing = StdHashMap::new();
        listing.insert(
            PathBuf::from("/dev"),
            vec![DirEntry::BlockDevice {
                path: PathBuf::from("/dev/sda"),
                id: DevId::new(8, 0),
            }],
        );
        let probe = FakeProbe {
            listing,
            calls: RefCell::new(0),
        };

        let mut cache = DeviceCache::new();
        cache.add_dir("/dev");
        cache.scan(false, &probe).unwrap();

        assert!(cache.get("/dev/sda", &AcceptAllFilter).is_some());
        assert!(cache.get_by_id(DevId::new(8, 0)).is_some());
    }

    #[test]
    fn second_scan_without_force_is_a_no_op() {
        let probe = FakeProbe {
            listing: StdHashMap::new(),
            calls: RefCell::new(0),
        };
        let mut cache = DeviceCache::new();
        cache.add_dir("/dev");
        cache.scan(false, &probe).unwrap();
        cache.scan(false, &probe).unwrap();
        assert_eq!(*probe.calls.borrow(), 1);
    }

    #[test]
    fn aliasing_adds_a_second_path_for_the_same_devt() {
        let mut listing = StdHashMap::new();
        listing.insert(
            PathBuf::from("/dev"),
            vec![
                DirEntry::BlockDevice { path: PathBuf::from("/dev/sda"), id: DevId::new(8, 0) },
                DirEntry::BlockDevice { path: PathBuf::from("/dev/disk/by-id/x"), id: DevId::new(8, 0) },
            ],
        );
        let probe = FakeProbe { listing, calls: RefCell::new(0) };
        let mut cache = DeviceCache::new();
        cache.add_dir("/dev");
        cache.scan(false, &probe).unwrap();

        let dev = cache.get_by_id(DevId::new(8, 0)).unwrap();
        assert_eq!(dev.aliases().len(), 2);
        assert_eq!(dev.name(), "/dev/sda");
    }
}
