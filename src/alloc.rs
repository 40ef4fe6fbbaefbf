// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Extent allocation. Grounded on `lib/metadata/pv_map.c` (`_create_maps`/
//! `_fill_bitsets`' per-PV free-extent map) and `lib/metadata/raid_manip.c`'s
//! `_alloc_image_components` (policy dispatch and per-leg consumption).

use std::collections::BTreeMap;

use crate::collections::BitSet;
use crate::device::DevId;
use crate::error::{Error, ErrorKind, Result};
use crate::metadata::{AllocPolicy, Area, Vg};

/// One maximal run of unallocated extents on a PV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PvArea {
    pub pv: DevId,
    pub start: u64,
    pub count: u64,
}

/// A PV's free-extent map: one bit per extent (set = allocated), plus
/// the current sorted-by-size area list derived from it.
#[derive(Debug)]
pub struct PvMap {
    pub pv: DevId,
    pub pe_count: u64,
    allocated: BitSet,
}

impl PvMap {
    pub fn new(pv: DevId, pe_count: u64) -> PvMap {
        PvMap {
            pv,
            pe_count,
            allocated: BitSet::new(pe_count.max(1) as usize),
        }
    }

    /// Marks `[start, start+len)` as consumed. Returns an error if any
    /// extent in the range is already marked, since that can only mean
    /// two segments in the VG's metadata claim the same PE.
    pub fn mark_allocated(&mut self, start: u64, len: u64) -> Result<()> {
        for pe in start..start + len {
            if pe >= self.pe_count {
                return Err(Error::new(ErrorKind::Inconsistent, "segment extends past pv_count"));
            }
            if self.allocated.get(pe as usize) {
                return Err(Error::new(
                    ErrorKind::Inconsistent,
                    format!("extent {} double-allocated on a pv", pe),
                ));
            }
            self.allocated.set(pe as usize);
        }
        Ok(())
    }

    /// Every maximal run of clear bits, largest first (ties broken by
    /// ascending start so iteration order is deterministic).
    pub fn free_areas(&self) -> Vec<PvArea> {
        let mut areas = Vec::new();
        let mut pe = 0u64;
        while pe < self.pe_count {
            if self.allocated.get(pe as usize) {
                pe += 1;
                continue;
            }
            let start = pe;
            let mut len = 0u64;
            while pe < self.pe_count && !self.allocated.get(pe as usize) {
                len += 1;
                pe += 1;
            }
            areas.push(PvArea {
                pv: self.pv,
                start,
                count: len,
            });
        }
        areas.sort_by(|a, b| b.count.cmp(&a.count).then(a.start.cmp(&b.start)));
        areas
    }
}

/// Builds one [`PvMap`] per PV in `vg`, pre-marking every extent already
/// owned by an existing segment. A double-allocated extent (the same PE
/// claimed by two segments) is a hard error, never silently resolved.
pub fn build_pv_maps(vg: &Vg) -> Result<BTreeMap<DevId, PvMap>> {
    let mut maps: BTreeMap<DevId, PvMap> = vg.pvs.values().map(|pv| (pv.dev, PvMap::new(pv.dev, pv.pe_count))).collect();

    for lv in vg.lvs.values() {
        for seg in &lv.segments {
            for area in seg.areas.iter().chain(seg.meta_areas.iter()) {
                if let Area::Pv { pv, pe } = area {
                    let map = maps
                        .get_mut(pv)
                        .ok_or_else(|| Error::new(ErrorKind::MissingPv, format!("segment references unknown pv {:?}", pv)))?;
                    map.mark_allocated(*pe, seg.len)?;
                }
            }
        }
    }

    Ok(maps)
}

/// One leg (stripe or mirror image) chosen for a request, before it is
/// folded into an `lv_segment`'s area list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub pv: DevId,
    pub start: u64,
    pub count: u64,
}

/// Extents already claimed by legs chosen earlier in the same request,
/// so "normal" placement can refuse to double up on a PV.
struct ParallelAreas {
    pvs_used: std::collections::HashSet<DevId>,
}

/// Picks `extents_needed` extents for one leg of a request from `map`
/// according to `policy`, honouring `prev_end` (the PV/offset the
/// previous segment of the same LV ended at, for `Contiguous`) and
/// `parallel` (the set of PVs other legs of this same request already
/// used, for `Normal`). `Inherit` is rejected — callers resolve it to
/// the VG's policy before calling in, since spec forbids it at VG scope
/// too and there is no further fallback.
fn select_area(map: &mut PvMap, extents_needed: u64, policy: AllocPolicy, prev_end: Option<(DevId, u64)>, parallel: &ParallelAreas) -> Option<PvArea> {
    match policy {
        AllocPolicy::Inherit => None,
        AllocPolicy::Contiguous => {
            let (prev_pv, prev_off) = prev_end?;
            if prev_pv != map.pv {
                return None;
            }
            map.free_areas().into_iter().find(|a| a.start == prev_off && a.count >= extents_needed)
        }
        AllocPolicy::Normal => {
            if parallel.pvs_used.contains(&map.pv) {
                return None;
            }
            map.free_areas().into_iter().find(|a| a.count >= extents_needed)
        }
        AllocPolicy::Anywhere => map.free_areas().into_iter().find(|a| a.count >= extents_needed),
    }
}

/// Marks `count` extents starting at `area.start` as consumed and
/// returns the `Allocation` describing what was taken. `to_go` is
/// truncated to `area.count` since a caller may ask for fewer extents
/// than a chosen area holds, in which case the remainder stays free for
/// the next leg.
fn consume_pv_area(map: &mut PvMap, area: &PvArea, to_go: u64) -> Result<Allocation> {
    let count = to_go.min(area.count);
    map.mark_allocated(area.start, count)?;
    Ok(Allocation {
        pv: area.pv,
        start: area.start,
        count,
    })
}

/// Allocates `extents_per_leg` extents for each of `legs` (1 for a
/// simple linear/striped LV, N for an N-way mirror or raid image set),
/// using `policy` and refusing to place two legs of the same request on
/// the same PV under `Normal`. `prev_end` is the `(pv, end)` of the
/// previous segment of the LV being extended, consulted only by
/// `Contiguous`; pass `None` when there is no previous segment (a fresh
/// LV) or the legs being allocated aren't an extension of one (a new
/// mirror/raid image set). Returns one [`Allocation`] per leg, in leg
/// order. On any leg failing to find space the whole request fails
/// without mutating `maps` further than the legs already consumed —
/// callers that need atomicity should operate on a cloned map set and
/// only apply the mutation to the real one once every leg succeeds.
pub fn allocate(maps: &mut BTreeMap<DevId, PvMap>, legs: usize, extents_per_leg: u64, policy: AllocPolicy, prev_end: Option<(DevId, u64)>) -> Result<Vec<Allocation>> {
    if policy == AllocPolicy::Inherit {
        return Err(Error::new(ErrorKind::InvalidArgument, "inherit is not a usable allocation policy at this scope"));
    }

    let mut parallel = ParallelAreas {
        pvs_used: std::collections::HashSet::new(),
    };
    let mut out = Vec::with_capacity(legs);

    for leg in 0..legs {
        let mut remaining = extents_per_leg;
        let mut leg_allocs = Vec::new();
        // Contiguous placement only ever continues the LV's own previous
        // segment, which has exactly one leg; a second or later leg in
        // this same request has nothing to be contiguous with.
        let mut cursor = if leg == 0 { prev_end } else { None };

        while remaining > 0 {
            let mut chosen: Option<(DevId, PvArea)> = None;
            for (dev, map) in maps.iter_mut() {
                if let Some(area) = select_area(map, 1, policy, cursor, &parallel) {
                    chosen = Some((*dev, area));
                    break;
                }
            }
            let (dev, area) = chosen.ok_or_else(|| Error::new(ErrorKind::OutOfSpace, "insufficient free extents to satisfy allocation"))?;
            let map = maps.get_mut(&dev).expect("map for chosen pv must exist");
            let alloc = consume_pv_area(map, &area, remaining)?;
            remaining -= alloc.count;
            cursor = Some((alloc.pv, alloc.start + alloc.count));
            parallel.pvs_used.insert(dev);
            leg_allocs.push(alloc);
        }

        out.extend(leg_allocs);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Lv, LvSegment, Pv, Vg};
    use crate::uuid::Uuid;

    fn vg_with_one_pv(pe_count: u64) -> (Vg, DevId) {
        let mut vg = Vg::create(Uuid::create().unwrap(), "vg1", 8192);
        let dev = DevId::new(8, 0);
        let mut pv = Pv::new(Uuid::create().unwrap(), dev, pe_count * 8192 + 8192, 8192, 8192);
        pv.pe_count = pe_count;
        vg.pv_add(pv).unwrap();
        (vg, dev)
    }

    #[test]
    fn free_areas_cover_the_whole_unallocated_pv() {
        let (vg, dev) = vg_with_one_pv(20);
        let maps = build_pv_maps(&vg).unwrap();
        let areas = maps[&dev].free_areas();
        assert_eq!(areas, vec![PvArea { pv: dev, start: 0, count: 20 }]);
    }

    #[test]
    fn existing_segment_shrinks_the_free_area() {
        let (mut vg, dev) = vg_with_one_pv(20);
        let mut lv = Lv::new("lv1", "vgid/lvid");
        let mut seg = LvSegment::new(0, 5, "striped");
        seg.areas.push(Area::Pv { pv: dev, pe: 0 });
        lv.append_segment(seg);
        vg.lvs.insert(lv.name.clone(), lv);

        let maps = build_pv_maps(&vg).unwrap();
        let areas = maps[&dev].free_areas();
        assert_eq!(areas, vec![PvArea { pv: dev, start: 5, count: 15 }]);
    }

    #[test]
    fn double_allocated_extent_is_a_hard_error() {
        let (mut vg, dev) = vg_with_one_pv(20);
        for name in ["a", "b"] {
            let mut lv = Lv::new(name, "vgid/lvid");
            let mut seg = LvSegment::new(0, 5, "striped");
            seg.areas.push(Area::Pv { pv: dev, pe: 0 });
            lv.append_segment(seg);
            vg.lvs.insert(lv.name.clone(), lv);
        }
        let err = build_pv_maps(&vg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Inconsistent);
    }

    #[test]
    fn normal_policy_spreads_mirror_legs_across_pvs() {
        let mut vg = Vg::create(Uuid::create().unwrap(), "vg1", 8192);
        let devs = [DevId::new(8, 0), DevId::new(8, 1)];
        for d in devs {
            let mut pv = Pv::new(Uuid::create().unwrap(), d, 20 * 8192 + 8192, 8192, 8192);
            pv.pe_count = 20;
            vg.pv_add(pv).unwrap();
        }
        let mut maps = build_pv_maps(&vg).unwrap();
        let allocs = allocate(&mut maps, 2, 5, AllocPolicy::Normal, None).unwrap();
        assert_eq!(allocs.len(), 2);
        assert_ne!(allocs[0].pv, allocs[1].pv);
    }

    #[test]
    fn out_of_space_reports_the_right_error_kind() {
        let (_vg, dev) = vg_with_one_pv(4);
        let mut maps = BTreeMap::new();
        maps.insert(dev, PvMap::new(dev, 4));
        let err = allocate(&mut maps, 1, 10, AllocPolicy::Anywhere, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfSpace);
    }

    #[test]
    fn inherit_policy_is_rejected_outright() {
        let (_vg, dev) = vg_with_one_pv(4);
        let mut maps = BTreeMap::new();
        maps.insert(dev, PvMap::new(dev, 4));
        let err = allocate(&mut maps, 1, 1, AllocPolicy::Inherit, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn contiguous_policy_extends_right_after_prev_end() {
        let (vg, dev) = vg_with_one_pv(20);
        let mut maps = build_pv_maps(&vg).unwrap();
        let first = allocate(&mut maps, 1, 5, AllocPolicy::Anywhere, None).unwrap();
        let prev_end = (first[0].pv, first[0].start + first[0].count);

        let second = allocate(&mut maps, 1, 5, AllocPolicy::Contiguous, Some(prev_end)).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].pv, dev);
        assert_eq!(second[0].start, prev_end.1);
    }

    #[test]
    fn contiguous_policy_fails_when_space_right_after_prev_end_is_taken() {
        let (vg, dev) = vg_with_one_pv(20);
        let mut maps = build_pv_maps(&vg).unwrap();
        // Consume the extent immediately after the would-be prev_end so
        // nothing abuts it.
        maps.get_mut(&dev).unwrap().mark_allocated(5, 1).unwrap();

        let err = allocate(&mut maps, 1, 5, AllocPolicy::Contiguous, Some((dev, 5))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfSpace);
    }
}
