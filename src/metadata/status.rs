// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Typed status/feature bitfields that still round-trip to the same
//! string tokens the text format stores them as
//! (`original_source/lib/metadata/metadata.h`), replacing the teacher's
//! loose `Vec<String>` status lists.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PvStatus: u32 {
        const ALLOCATABLE = 0x01;
        const EXPORTED    = 0x02;
        const MISSING     = 0x04;
        const USED        = 0x08;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VgStatus: u32 {
        const LVM_READ     = 0x0001;
        const LVM_WRITE    = 0x0002;
        const RESIZEABLE   = 0x0004;
        const CLUSTERED    = 0x0008;
        const EXPORTED     = 0x0010;
        const PARTIAL      = 0x0020;
        const SHARED       = 0x0040;
        const PRECOMMITTED = 0x0080;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LvStatus: u32 {
        const LVM_READ           = 0x0000_0001;
        const LVM_WRITE          = 0x0000_0002;
        const MIRRORED           = 0x0000_0004;
        const MIRROR_IMAGE       = 0x0000_0008;
        const MIRROR_LOG         = 0x0000_0010;
        const RAID               = 0x0000_0020;
        const RAID_IMAGE         = 0x0000_0040;
        const RAID_META          = 0x0000_0080;
        const THIN_POOL          = 0x0000_0100;
        const PVMOVE             = 0x0000_0200;
        const LOCKED             = 0x0000_0400;
        const FIXED_MINOR        = 0x0000_0800;
        const SNAPSHOT           = 0x0000_1000;
        const VIRTUAL            = 0x0000_2000;
        const PARTIAL            = 0x0000_4000;
        const LV_REBUILD         = 0x0000_8000;
        const LV_WRITEMOSTLY     = 0x0001_0000;
        const LV_NOTSYNCED       = 0x0002_0000;
        const LV_ACTIVATION_SKIP = 0x0004_0000;
        const LV_TEMPORARY       = 0x0008_0000;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SegFlags: u32 {
        const SEG_CAN_SPLIT        = 0x0000_0001;
        const SEG_AREAS_STRIPED    = 0x0000_0002;
        const SEG_AREAS_MIRRORED   = 0x0000_0004;
        const SEG_SNAPSHOT         = 0x0000_0008;
        const SEG_VIRTUAL          = 0x0000_0010;
        const SEG_THIN_POOL        = 0x0000_0020;
        const SEG_THIN_VOLUME      = 0x0000_0040;
        const SEG_CACHE            = 0x0000_0080;
        const SEG_CACHE_POOL       = 0x0000_0100;
        const SEG_RAID             = 0x0000_0200;
        const SEG_REPLICATOR       = 0x0000_0400;
        const SEG_REPLICATOR_DEV   = 0x0000_0800;
        const SEG_ONLY_EXCLUSIVE   = 0x0000_1000;
        const SEG_CANNOT_BE_ZEROED = 0x0000_2000;
        const SEG_MONITORED        = 0x0000_4000;
        const SEG_FORMAT1_SUPPORT  = 0x0000_8000;
    }
}

/// Shared by every status type above: format as the bracketed string
/// list the text format stores (`status = ["READ", "WRITE"]`) and parse
/// it back.
pub trait StatusStrings: bitflags::Flags + std::ops::BitOrAssign + Sized {
    fn to_strings(&self) -> Vec<String> {
        self.iter_names().map(|(name, _)| name.to_string()).collect()
    }

    fn from_strings(tokens: &[impl AsRef<str>]) -> Self {
        let mut flags = Self::empty();
        for t in tokens {
            if let Some(f) = Self::from_name(t.as_ref()) {
                flags |= f;
            }
        }
        flags
    }
}

impl StatusStrings for PvStatus {}
impl StatusStrings for VgStatus {}
impl StatusStrings for LvStatus {}
impl StatusStrings for SegFlags {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        let s = VgStatus::LVM_READ | VgStatus::LVM_WRITE | VgStatus::RESIZEABLE;
        let tokens = s.to_strings();
        assert!(tokens.contains(&"LVM_WRITE".to_string()));
        let back = VgStatus::from_strings(&tokens);
        assert_eq!(s, back);
    }

    #[test]
    fn unknown_token_is_ignored_not_fatal() {
        let back = PvStatus::from_strings(&["ALLOCATABLE", "NONSENSE"]);
        assert_eq!(back, PvStatus::ALLOCATABLE);
    }
}
