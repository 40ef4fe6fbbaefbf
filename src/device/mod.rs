// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Device identity, the device cache, and page-aligned device I/O.

pub mod cache;
pub mod io;

bitflags::bitflags! {
    /// Per-device flag bits, mirroring the handful the original sources
    /// track on `struct device`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceFlags: u32 {
        const ACCESSED_W    = 0x0001;
        const O_DIRECT_TESTED = 0x0002;
        const O_DIRECT_OK   = 0x0004;
        const REGULAR       = 0x0008;
    }
}

/// A `(major, minor)` pair identifying a block device, deduplicated
/// globally within a [`cache::DeviceCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DevId {
    pub major: u32,
    pub minor: u32,
}

impl DevId {
    pub fn new(major: u32, minor: u32) -> DevId {
        DevId { major, minor }
    }
}

/// A block device, keyed by [`DevId`] but known to the rest of the system
/// by its (possibly several) path aliases.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: DevId,
    /// Path aliases in preferred order; `aliases[0]` is the canonical
    /// name returned by lookups.
    aliases: Vec<String>,
    pub pvid: Option<crate::uuid::Uuid>,
    pub flags: DeviceFlags,
}

impl Device {
    pub fn new(id: DevId, first_alias: String) -> Device {
        Device {
            id,
            aliases: vec![first_alias],
            pvid: None,
            flags: DeviceFlags::empty(),
        }
    }

    pub fn name(&self) -> &str {
        &self.aliases[0]
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Insert `path` into the alias list at the position dictated by
    /// [`alias_rank`], keeping the list sorted by preference.
    pub fn add_alias(&mut self, path: String) {
        if self.aliases.iter().any(|a| a == &path) {
            return;
        }
        let rank = alias_rank(&path);
        let pos = self
            .aliases
            .iter()
            .position(|a| alias_rank(a) > rank)
            .unwrap_or(self.aliases.len());
        self.aliases.insert(pos, path);
    }

    pub fn remove_alias(&mut self, path: &str) {
        self.aliases.retain(|a| a != path);
    }
}

/// Ranks an alias path for ordering: fewer path separators first, then
/// lexicographically. The original also prefers paths that pass through
/// a symlink over a tie in slash count; that distinction requires
/// consulting the filesystem, which the device cache does explicitly via
/// its directory probe rather than here.
fn alias_rank(path: &str) -> (usize, &str) {
    (path.matches('/').count(), path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorter_alias_paths_sort_first() {
        let mut d = Device::new(DevId::new(8, 0), "/dev/block/8:0".into());
        d.add_alias("/dev/sda".into());
        assert_eq!(d.name(), "/dev/sda");
    }

    #[test]
    fn duplicate_alias_is_a_no_op() {
        let mut d = Device::new(DevId::new(8, 0), "/dev/sda".into());
        d.add_alias("/dev/sda".into());
        assert_eq!(d.aliases().len(), 1);
    }
}
