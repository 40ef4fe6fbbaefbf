// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `volume_group`, grounded on the teacher's `vg.rs` (the most complete
//! snapshot in the pack) and generalised past format1's 8192-sector
//! fixed extent size to the general case.

use std::collections::BTreeMap;

use crate::device::DevId;
use crate::error::{Error, ErrorKind, Result};
use crate::metadata::lv::{AllocPolicy, Lv};
use crate::metadata::mda::MdaSet;
use crate::metadata::pv::Pv;
use crate::metadata::status::VgStatus;
use crate::uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Vg {
    pub id: Uuid,
    pub name: String,
    pub system_id: Option<String>,
    pub seqno: u64,
    pub extent_size: u64,
    pub max_lv: u32,
    pub max_pv: u32,
    pub status: VgStatus,
    pub alloc: AllocPolicy,
    pub mda_copies: u32,
    pub pvs: BTreeMap<DevId, Pv>,
    pub lvs: BTreeMap<String, Lv>,
    pub tags: Vec<String>,
    pub mdas: MdaSet,
}

/// Formats that can't represent more than 255 of something clamp here.
pub const FORMAT1_MAX_COUNT: u32 = 255;

impl Vg {
    pub fn create(id: Uuid, name: impl Into<String>, extent_size: u64) -> Vg {
        Vg {
            id,
            name: name.into(),
            system_id: None,
            seqno: 0,
            extent_size,
            max_lv: 0,
            max_pv: 0,
            status: VgStatus::LVM_READ | VgStatus::LVM_WRITE | VgStatus::RESIZEABLE,
            alloc: AllocPolicy::Normal,
            mda_copies: 1,
            pvs: BTreeMap::new(),
            lvs: BTreeMap::new(),
            tags: Vec::new(),
            mdas: MdaSet::new(),
        }
    }

    pub fn extent_count(&self) -> u64 {
        self.pvs.values().map(|pv| pv.pe_count).sum()
    }

    pub fn free_count(&self) -> u64 {
        self.pvs.values().map(Pv::pe_free).sum()
    }

    pub fn pv_add(&mut self, mut pv: Pv) -> Result<()> {
        if pv.pe_size != self.extent_size {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "PV extent size does not match VG extent size",
            ));
        }
        pv.vg_name = self.name.clone();
        self.pvs.insert(pv.dev, pv);
        Ok(())
    }

    /// Refuses if any PE on the PV is allocated, per
    /// `vgreduce_single`'s first check.
    pub fn pv_remove(&mut self, dev: DevId) -> Result<Pv> {
        let pv = self
            .pvs
            .get(&dev)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "no such PV in this VG"))?;
        if pv.pe_alloc_count > 0 {
            return Err(Error::new(
                ErrorKind::Busy,
                "PV has allocated extents, cannot remove",
            ));
        }
        let mut pv = self.pvs.remove(&dev).unwrap();
        pv.vg_name.clear();
        Ok(pv)
    }

    pub fn lv_get(&self, name: &str) -> Option<&Lv> {
        self.lvs.get(name)
    }

    pub fn lv_list(&self) -> impl Iterator<Item = &Lv> {
        self.lvs.values()
    }

    pub fn pv_list(&self) -> impl Iterator<Item = &Pv> {
        self.pvs.values()
    }

    pub fn lv_remove(&mut self, name: &str) -> Result<Lv> {
        let lv = self
            .lvs
            .remove(name)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "no such LV in this VG"))?;
        for seg in &lv.segments {
            for area in seg.areas.iter().chain(seg.meta_areas.iter()) {
                if let crate::metadata::segment::Area::Pv { pv, .. } = area {
                    if let Some(p) = self.pvs.get_mut(pv) {
                        p.pe_alloc_count = p.pe_alloc_count.saturating_sub(seg.len);
                    }
                }
            }
        }
        Ok(lv)
    }

    /// Rewrites every PV's `pe_size` and every LV segment's geometry by
    /// exact integer division; fails if the new size doesn't divide
    /// evenly.
    pub fn set_extent_size(&mut self, new_size: u64) -> Result<()> {
        if new_size == 0 {
            return Err(Error::new(ErrorKind::InvalidArgument, "extent size cannot be zero"));
        }
        if self.extent_size % new_size != 0 {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "new extent size does not evenly divide the old one",
            ));
        }
        let factor = self.extent_size / new_size;
        if factor == 0 {
            return Err(Error::new(ErrorKind::InvalidArgument, "invalid extent size"));
        }

        for lv in self.lvs.values() {
            if lv.le_count % factor != 0 {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!("lv {} extent count does not scale exactly", lv.name),
                ));
            }
        }

        for pv in self.pvs.values_mut() {
            pv.pe_size = new_size;
            pv.pe_count *= factor;
            pv.pe_alloc_count *= factor;
        }
        for lv in self.lvs.values_mut() {
            lv.le_count *= factor;
            for seg in lv.segments.iter_mut() {
                seg.le *= factor;
                seg.len *= factor;
            }
        }
        self.extent_size = new_size;
        Ok(())
    }

    /// Refuses to un-cluster while any non-exclusively active LV exists.
    /// lvmcore has no activation state, so "active" is approximated by
    /// every visible (non-sub-LV) LV; callers above this layer that do
    /// track real activation should pre-filter before calling.
    pub fn set_clustered(&mut self, clustered: bool, any_non_exclusive_active: bool) -> Result<()> {
        if !clustered && self.status.contains(VgStatus::CLUSTERED) && any_non_exclusive_active {
            return Err(Error::new(
                ErrorKind::Busy,
                "cannot un-cluster VG while a non-exclusively active LV exists",
            ));
        }
        self.status.set(VgStatus::CLUSTERED, clustered);
        Ok(())
    }

    pub fn set_max_lv(&mut self, n: u32, format_clamps_at_255: bool) -> Result<()> {
        if n != 0 && (n as usize) < self.lvs.len() {
            return Err(Error::new(ErrorKind::InvalidArgument, "max_lv below current LV count"));
        }
        self.max_lv = if format_clamps_at_255 { n.min(FORMAT1_MAX_COUNT) } else { n };
        Ok(())
    }

    pub fn set_max_pv(&mut self, n: u32, format_clamps_at_255: bool) -> Result<()> {
        if n != 0 && (n as usize) < self.pvs.len() {
            return Err(Error::new(ErrorKind::InvalidArgument, "max_pv below current PV count"));
        }
        self.max_pv = if format_clamps_at_255 { n.min(FORMAT1_MAX_COUNT) } else { n };
        Ok(())
    }

    pub fn set_alloc_policy(&mut self, policy: AllocPolicy) -> Result<()> {
        if policy == AllocPolicy::Inherit {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "ALLOC_INHERIT is not valid at VG scope",
            ));
        }
        self.alloc = policy;
        Ok(())
    }

    /// A no-op if the format encodes system ids per-PV (it would no
    /// longer round-trip); `format_encodes_system_id_per_pv` stands in
    /// for a per-format capability flag.
    pub fn set_system_id(&mut self, id: Option<String>, format_encodes_system_id_per_pv: bool) {
        if format_encodes_system_id_per_pv {
            return;
        }
        self.system_id = id;
    }

    /// Advances `seqno`. The caller is responsible for actually
    /// persisting the new metadata through a format handler; this only
    /// captures the in-core half of `vg_commit`.
    pub fn commit(&mut self) -> u64 {
        self.seqno += 1;
        self.seqno
    }

    pub fn check_invariants(&self) -> Result<()> {
        for pv in self.pvs.values() {
            pv.check_invariants()?;
            if pv.pe_size != self.extent_size {
                return Err(Error::internal("PV extent size diverges from VG extent size"));
            }
        }
        for lv in self.lvs.values() {
            lv.check_tiling()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vg_with_one_pv() -> Vg {
        let mut vg = Vg::create(Uuid::create().unwrap(), "vg1", 8192);
        let pv = Pv::new(Uuid::create().unwrap(), DevId::new(8, 0), 1_048_576, 8192, 8192);
        vg.pv_add(pv).unwrap();
        vg
    }

    #[test]
    fn extent_and_free_counts_match_pv_totals() {
        let vg = vg_with_one_pv();
        assert_eq!(vg.extent_count(), vg.pvs.values().next().unwrap().pe_count);
        assert_eq!(vg.free_count(), vg.extent_count());
    }

    #[test]
    fn pv_remove_refuses_when_extents_allocated() {
        let mut vg = vg_with_one_pv();
        let dev = *vg.pvs.keys().next().unwrap();
        vg.pvs.get_mut(&dev).unwrap().pe_alloc_count = 1;
        assert!(vg.pv_remove(dev).is_err());
    }

    #[test]
    fn pv_remove_resets_pv_to_orphan() {
        let mut vg = vg_with_one_pv();
        let dev = *vg.pvs.keys().next().unwrap();
        let pv = vg.pv_remove(dev).unwrap();
        assert!(pv.is_orphan());
    }

    #[test]
    fn set_extent_size_scales_lv_geometry() {
        let mut vg = Vg::create(Uuid::create().unwrap(), "vg1", 4);
        let mut pv = Pv::new(Uuid::create().unwrap(), DevId::new(8, 0), 400, 4, 0);
        pv.pe_count = 100;
        vg.pvs.insert(pv.dev, pv);
        let mut lv = Lv::new("lv1", "vgid/lvid");
        lv.le_count = 25;
        vg.lvs.insert(lv.name.clone(), lv);

        vg.set_extent_size(8).unwrap();
        assert_eq!(vg.extent_size, 8);
        assert_eq!(vg.lvs["lv1"].le_count, 12);
    }

    #[test]
    fn set_extent_size_fails_on_odd_remainder() {
        let mut vg = Vg::create(Uuid::create().unwrap(), "vg1", 4);
        let mut lv = Lv::new("lv1", "vgid/lvid");
        lv.le_count = 25;
        vg.lvs.insert(lv.name.clone(), lv);
        assert!(vg.set_extent_size(8).is_err());
    }

    #[test]
    fn alloc_inherit_rejected_at_vg_scope() {
        let mut vg = vg_with_one_pv();
        assert!(vg.set_alloc_policy(AllocPolicy::Inherit).is_err());
    }

    #[test]
    fn commit_strictly_increases_seqno() {
        let mut vg = vg_with_one_pv();
        let a = vg.commit();
        let b = vg.commit();
        assert!(b > a);
    }
}
