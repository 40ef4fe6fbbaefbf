// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `logical_volume`, grounded on the teacher's `lv.rs`.

use crate::error::{Error, ErrorKind, Result};
use crate::metadata::segment::LvSegment;
use crate::metadata::status::LvStatus;

#[derive(Debug, Clone)]
pub struct Lv {
    pub name: String,
    /// VG uuid + LV uuid, formatted as the pair the original `lvid` is.
    pub lvid: String,
    pub status: LvStatus,
    pub alloc: AllocPolicy,
    pub read_ahead: Option<u32>,
    pub major_minor: Option<(u32, u32)>,
    pub le_count: u64,
    pub segments: Vec<LvSegment>,
    pub tags: Vec<String>,
    pub profile: Option<String>,
    pub creation_host: Option<String>,
    pub creation_time: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocPolicy {
    Contiguous,
    Normal,
    Anywhere,
    Inherit,
}

impl Lv {
    pub fn new(name: impl Into<String>, lvid: impl Into<String>) -> Lv {
        Lv {
            name: name.into(),
            lvid: lvid.into(),
            status: LvStatus::LVM_READ | LvStatus::LVM_WRITE,
            alloc: AllocPolicy::Inherit,
            read_ahead: None,
            major_minor: None,
            le_count: 0,
            segments: Vec::new(),
            tags: Vec::new(),
            profile: None,
            creation_host: None,
            creation_time: None,
        }
    }

    pub fn size_sectors(&self, extent_size: u64) -> u64 {
        self.le_count * extent_size
    }

    /// Segments must tile `[0, le_count)` with no gap or overlap,
    /// ordered by `le`.
    pub fn check_tiling(&self) -> Result<()> {
        let mut expected = 0u64;
        for seg in &self.segments {
            if seg.le != expected {
                return Err(Error::new(
                    ErrorKind::Inconsistent,
                    format!(
                        "lv {}: segment gap/overlap at le {} (expected {})",
                        self.name, seg.le, expected
                    ),
                ));
            }
            expected = seg.end();
        }
        if expected != self.le_count {
            return Err(Error::new(
                ErrorKind::Inconsistent,
                format!(
                    "lv {}: segments cover {} extents, le_count is {}",
                    self.name, expected, self.le_count
                ),
            ));
        }
        Ok(())
    }

    pub fn append_segment(&mut self, seg: LvSegment) {
        self.le_count = self.le_count.max(seg.end());
        self.segments.push(seg);
    }

    pub fn is_active_and_visible(&self) -> bool {
        !self.status.intersects(
            LvStatus::MIRROR_IMAGE | LvStatus::MIRROR_LOG | LvStatus::RAID_IMAGE | LvStatus::RAID_META,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::segment::LvSegment;

    #[test]
    fn contiguous_segments_pass_tiling_check() {
        let mut lv = Lv::new("lv1", "vgid/lvid");
        lv.append_segment(LvSegment::new(0, 10, "striped"));
        lv.append_segment(LvSegment::new(10, 5, "striped"));
        lv.check_tiling().unwrap();
        assert_eq!(lv.le_count, 15);
    }

    #[test]
    fn gap_between_segments_fails_tiling_check() {
        let mut lv = Lv::new("lv1", "vgid/lvid");
        lv.segments.push(LvSegment::new(0, 10, "striped"));
        lv.segments.push(LvSegment::new(12, 5, "striped"));
        lv.le_count = 17;
        assert!(lv.check_tiling().is_err());
    }

    #[test]
    fn sub_lvs_are_not_independently_visible() {
        let mut lv = Lv::new("lv1_rimage_0", "vgid/lvid");
        lv.status |= LvStatus::RAID_IMAGE;
        assert!(!lv.is_active_and_visible());
    }
}
