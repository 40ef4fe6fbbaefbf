// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A metadata area descriptor, as `struct metadata_area`.

use bitflags::bitflags;

use crate::device::DevId;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MdaFlags: u32 {
        const IGNORED      = 0x01;
        const INCONSISTENT = 0x02;
    }
}

/// One copy of a VG's metadata: where it lives, and whether it's
/// currently trusted.
#[derive(Debug, Clone)]
pub struct MetadataArea {
    pub dev: DevId,
    pub offset: u64,
    pub size: u64,
    pub flags: MdaFlags,
}

impl MetadataArea {
    pub fn new(dev: DevId, offset: u64, size: u64) -> MetadataArea {
        MetadataArea {
            dev,
            offset,
            size,
            flags: MdaFlags::empty(),
        }
    }

    pub fn is_ignored(&self) -> bool {
        self.flags.contains(MdaFlags::IGNORED)
    }

    pub fn is_inconsistent(&self) -> bool {
        self.flags.contains(MdaFlags::INCONSISTENT)
    }
}

/// A VG's MDAs, split the way commit policy needs: only `in_use` is
/// touched by a write.
#[derive(Debug, Clone, Default)]
pub struct MdaSet {
    pub in_use: Vec<MetadataArea>,
    pub ignored: Vec<MetadataArea>,
}

impl MdaSet {
    pub fn new() -> MdaSet {
        MdaSet::default()
    }

    /// Moves the MDA at `idx` of `in_use` into `ignored`, refusing to
    /// ignore the last remaining used MDA in the VG.
    pub fn set_ignored(&mut self, idx: usize) -> crate::error::Result<()> {
        if self.in_use.len() <= 1 {
            return Err(crate::error::Error::new(
                crate::error::ErrorKind::InvalidArgument,
                "cannot ignore the last metadata area in use",
            ));
        }
        let mut mda = self.in_use.remove(idx);
        mda.flags.insert(MdaFlags::IGNORED);
        self.ignored.push(mda);
        Ok(())
    }

    pub fn set_used(&mut self, idx: usize) {
        let mut mda = self.ignored.remove(idx);
        mda.flags.remove(MdaFlags::IGNORED);
        self.in_use.push(mda);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cannot_ignore_last_used_mda() {
        let mut set = MdaSet::new();
        set.in_use.push(MetadataArea::new(DevId::new(8, 0), 4096, 1024 * 1024));
        assert!(set.set_ignored(0).is_err());
    }

    #[test]
    fn ignoring_moves_mda_between_lists() {
        let mut set = MdaSet::new();
        set.in_use.push(MetadataArea::new(DevId::new(8, 0), 4096, 1024 * 1024));
        set.in_use.push(MetadataArea::new(DevId::new(8, 1), 4096, 1024 * 1024));
        set.set_ignored(0).unwrap();
        assert_eq!(set.in_use.len(), 1);
        assert_eq!(set.ignored.len(), 1);
        assert!(set.ignored[0].is_ignored());
    }
}
