// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Concrete segment types, one struct per named segtype. Feature flags
//! follow `original_source/lib/<name>/<name>.c`'s `_*_ops.features`
//! assignment; anything not called out there defaults to none.

use super::SegmentTypeOps;
use crate::metadata::SegFlags;

/// `lib/striped/striped.c`: plain linear/striped areas, the only
/// segtype format1 can also represent.
pub struct Striped;

impl SegmentTypeOps for Striped {
    fn name(&self) -> &'static str {
        "striped"
    }

    fn flags(&self) -> SegFlags {
        SegFlags::SEG_CAN_SPLIT | SegFlags::SEG_AREAS_STRIPED | SegFlags::SEG_FORMAT1_SUPPORT
    }
}

/// `lib/mirror/mirrored.c`: an `mirror` segment referencing N mirror
/// images plus an optional log area.
pub struct Mirror;

impl SegmentTypeOps for Mirror {
    fn name(&self) -> &'static str {
        "mirror"
    }

    fn flags(&self) -> SegFlags {
        SegFlags::SEG_AREAS_MIRRORED | SegFlags::SEG_FORMAT1_SUPPORT
    }
}

/// The disk-log sub-LV a `mirror` segment's `meta_areas` entry points at.
/// Not independently allocatable; never user-visible.
pub struct MirrorLog;

impl SegmentTypeOps for MirrorLog {
    fn name(&self) -> &'static str {
        "mirror_log"
    }

    fn flags(&self) -> SegFlags {
        SegFlags::SEG_ONLY_EXCLUSIVE
    }
}

/// `lib/snapshot/snapshot.c`: a virtual origin-plus-COW-store pairing.
/// Origins report `SEG_VIRTUAL` only when backed by a zero device
/// (`lv_is_virtual_origin`); the common disk-backed case does not, so
/// this carries just `SEG_SNAPSHOT`.
pub struct Snapshot;

impl SegmentTypeOps for Snapshot {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn flags(&self) -> SegFlags {
        SegFlags::SEG_SNAPSHOT | SegFlags::SEG_ONLY_EXCLUSIVE
    }

    fn merge_segments(&self, _a: &crate::metadata::LvSegment, _b: &crate::metadata::LvSegment) -> bool {
        false
    }
}

/// `lib/error/errseg.c`: every I/O to the segment fails. Used as
/// a placeholder for a missing device's sub-LV.
pub struct ErrorSegment;

impl SegmentTypeOps for ErrorSegment {
    fn name(&self) -> &'static str {
        "error"
    }

    fn flags(&self) -> SegFlags {
        SegFlags::SEG_VIRTUAL | SegFlags::SEG_CANNOT_BE_ZEROED
    }
}

/// `lib/zero/zero.c`: reads as zero, discards writes.
pub struct ZeroSegment;

impl SegmentTypeOps for ZeroSegment {
    fn name(&self) -> &'static str {
        "zero"
    }

    fn flags(&self) -> SegFlags {
        SegFlags::SEG_VIRTUAL
    }
}

/// `lib/thin/thin.c`'s pool half: backs N thin volumes, carries its own
/// metadata sub-LV in `meta_areas`.
pub struct ThinPool;

impl SegmentTypeOps for ThinPool {
    fn name(&self) -> &'static str {
        "thin-pool"
    }

    fn flags(&self) -> SegFlags {
        SegFlags::SEG_THIN_POOL | SegFlags::SEG_ONLY_EXCLUSIVE | SegFlags::SEG_CANNOT_BE_ZEROED
    }

    fn modules_needed(&self) -> Vec<&'static str> {
        vec!["thin-pool"]
    }
}

/// `lib/thin/thin.c`'s volume half: a thin LV inside a `thin-pool`.
pub struct ThinVolume;

impl SegmentTypeOps for ThinVolume {
    fn name(&self) -> &'static str {
        "thin"
    }

    fn flags(&self) -> SegFlags {
        SegFlags::SEG_THIN_VOLUME | SegFlags::SEG_VIRTUAL
    }

    fn modules_needed(&self) -> Vec<&'static str> {
        vec!["thin"]
    }
}

/// `lib/cache_segtype/cache.c`'s pool half: fast-device cache data plus
/// metadata sub-LVs.
pub struct CachePool;

impl SegmentTypeOps for CachePool {
    fn name(&self) -> &'static str {
        "cache-pool"
    }

    fn flags(&self) -> SegFlags {
        SegFlags::SEG_CACHE_POOL | SegFlags::SEG_ONLY_EXCLUSIVE
    }

    fn modules_needed(&self) -> Vec<&'static str> {
        vec!["cache-pool"]
    }
}

/// The cached origin LV referencing a `cache-pool`.
pub struct Cache;

impl SegmentTypeOps for Cache {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn flags(&self) -> SegFlags {
        SegFlags::SEG_CACHE | SegFlags::SEG_ONLY_EXCLUSIVE
    }

    fn modules_needed(&self) -> Vec<&'static str> {
        vec!["cache"]
    }
}

/// `lib/replicator/replicator.c`: a replication-group LV.
pub struct Replicator;

impl SegmentTypeOps for Replicator {
    fn name(&self) -> &'static str {
        "replicator"
    }

    fn flags(&self) -> SegFlags {
        SegFlags::SEG_REPLICATOR | SegFlags::SEG_VIRTUAL
    }

    fn modules_needed(&self) -> Vec<&'static str> {
        vec!["clog"]
    }
}

/// One replicated device slot within a `replicator` group.
pub struct ReplicatorDev;

impl SegmentTypeOps for ReplicatorDev {
    fn name(&self) -> &'static str {
        "replicator-dev"
    }

    fn flags(&self) -> SegFlags {
        SegFlags::SEG_REPLICATOR_DEV
    }
}

/// `lib/raid/raid.c`: one struct per level, since the text-format name
/// and device-mapper target module both vary by level but the
/// allocation/manipulation semantics (always `SEG_RAID`, always
/// `SEG_AREAS_MIRRORED`-shaped image/meta pairing, never merged) do not.
pub struct Raid {
    level: &'static str,
}

impl Raid {
    pub const ALL_LEVELS: [&'static str; 6] = ["raid1", "raid4", "raid5", "raid6", "raid10", "raid0"];

    pub fn new(level: &'static str) -> Raid {
        Raid { level }
    }

    pub fn level(&self) -> &'static str {
        self.level
    }
}

impl SegmentTypeOps for Raid {
    fn name(&self) -> &'static str {
        self.level
    }

    fn flags(&self) -> SegFlags {
        let mut f = SegFlags::SEG_RAID | SegFlags::SEG_AREAS_MIRRORED;
        if self.level == "raid0" {
            f |= SegFlags::SEG_CAN_SPLIT;
        }
        f
    }

    fn modules_needed(&self) -> Vec<&'static str> {
        vec!["raid"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_raid0_can_split() {
        assert!(!Raid::new("raid1").flags().contains(SegFlags::SEG_CAN_SPLIT));
        assert!(Raid::new("raid0").flags().contains(SegFlags::SEG_CAN_SPLIT));
    }

    #[test]
    fn striped_is_the_only_format1_compatible_type_here() {
        assert!(Striped.flags().contains(SegFlags::SEG_FORMAT1_SUPPORT));
        assert!(!Mirror.flags().contains(SegFlags::SEG_FORMAT1_SUPPORT));
    }
}
