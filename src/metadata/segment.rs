// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `lv_segment`: a contiguous run of an LV's extents, backed by one
//! segment type.

use crate::device::DevId;
use crate::metadata::status::SegFlags;

/// One data or metadata area of a segment: either a range of a PV, or
/// (for RAID/thin stacks) a range of another LV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Area {
    Pv { pv: DevId, pe: u64 },
    Lv { lv: String, le: u64 },
}

#[derive(Debug, Clone)]
pub struct LvSegment {
    pub le: u64,
    pub len: u64,
    pub segtype: String,
    pub status: SegFlags,
    pub stripe_size: u32,
    pub region_size: u32,
    pub chunk_size: u32,
    pub extents_copied: u64,
    pub areas: Vec<Area>,
    pub meta_areas: Vec<Area>,

    // Segtype-specific fields, left as opaque strings (name → value)
    // rather than one exhaustive struct: only the segtype implementation
    // that owns a key interprets it (pool_lv, origin, feature_flags,
    // transaction_id, device_id, ...).
    pub params: std::collections::BTreeMap<String, String>,
}

impl LvSegment {
    pub fn new(le: u64, len: u64, segtype: impl Into<String>) -> LvSegment {
        LvSegment {
            le,
            len,
            segtype: segtype.into(),
            status: SegFlags::empty(),
            stripe_size: 0,
            region_size: 0,
            chunk_size: 0,
            extents_copied: 0,
            areas: Vec::new(),
            meta_areas: Vec::new(),
            params: std::collections::BTreeMap::new(),
        }
    }

    pub fn end(&self) -> u64 {
        self.le + self.len
    }

    pub fn area_count(&self) -> usize {
        self.areas.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_end_is_le_plus_len() {
        let seg = LvSegment::new(10, 5, "striped");
        assert_eq!(seg.end(), 15);
    }
}
