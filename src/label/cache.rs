// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `lvmcache`: the vgname → vginfo → pvid indices kept coherent across
//! label scans.

use std::collections::HashMap;

use crate::device::DevId;
use crate::uuid::Uuid;

/// Everything the cache knows about one PV.
#[derive(Debug, Clone)]
pub struct CacheInfo {
    pub dev: DevId,
    pub pvid: Uuid,
    pub vgid: Option<Uuid>,
    /// Set to request a targeted re-read on the next scan.
    pub invalid: bool,
}

/// Everything the cache knows about one VG: the list of PVs that claim
/// membership in it.
#[derive(Debug, Default)]
pub struct CacheVgInfo {
    pub name: String,
    pub vgid: Option<Uuid>,
    pub pvids: Vec<Uuid>,
}

/// The process-wide (here: `ToolContext`-owned) cache. Re-entrancy is
/// guarded by `in_progress` rather than a real global, per the "Global
/// state" design note.
pub struct LvmCache {
    by_pvid: HashMap<Uuid, CacheInfo>,
    by_vgid: HashMap<Uuid, CacheVgInfo>,
    /// The empty name is the orphan bucket; kept last by `vgnames()`.
    by_vgname: HashMap<String, Uuid>,
    in_progress: bool,
}

const ORPHAN_VGNAME: &str = "";

impl LvmCache {
    pub fn new() -> LvmCache {
        let mut by_vgid = HashMap::new();
        let mut by_vgname = HashMap::new();
        // The orphan VG always exists, keyed on a reserved nil uuid-like
        // sentinel computed once here rather than persisted.
        let orphan_id = Uuid::parse(&"0".repeat(32)).expect("constant uuid parses");
        by_vgid.insert(
            orphan_id,
            CacheVgInfo {
                name: ORPHAN_VGNAME.to_string(),
                vgid: Some(orphan_id),
                pvids: Vec::new(),
            },
        );
        by_vgname.insert(ORPHAN_VGNAME.to_string(), orphan_id);

        LvmCache {
            by_pvid: HashMap::new(),
            by_vgid,
            by_vgname,
            in_progress: false,
        }
    }

    pub fn orphan_vgid(&self) -> Uuid {
        *self.by_vgname.get(ORPHAN_VGNAME).expect("orphan bucket always present")
    }

    /// Starts a scan if one isn't already running; returns `false` on a
    /// nested call, matching `cache_label_scan`'s single in-progress flag.
    pub fn begin_scan(&mut self) -> bool {
        if self.in_progress {
            return false;
        }
        self.in_progress = true;
        true
    }

    pub fn end_scan(&mut self) {
        self.in_progress = false;
    }

    /// Insert or update a PV's cache entry. `vgid` of `None` files it
    /// under the orphan VG.
    pub fn update(&mut self, dev: DevId, pvid: Uuid, vgid: Option<Uuid>) {
        let target_vgid = vgid.unwrap_or_else(|| self.orphan_vgid());

        if let Some(existing) = self.by_pvid.get(&pvid) {
            if let Some(old_vgid) = existing.vgid.or(Some(self.orphan_vgid())) {
                if old_vgid != target_vgid {
                    self.unlink_pv(old_vgid, pvid);
                }
            }
        }

        self.by_pvid.insert(
            pvid,
            CacheInfo {
                dev,
                pvid,
                vgid: Some(target_vgid),
                invalid: false,
            },
        );

        let vginfo = self.by_vgid.entry(target_vgid).or_default();
        if !vginfo.pvids.contains(&pvid) {
            vginfo.pvids.push(pvid);
        }
    }

    /// Records the name for a previously orphan-or-unnamed vgid and
    /// indexes it by name too.
    pub fn set_vgname(&mut self, vgid: Uuid, name: impl Into<String>) {
        let name = name.into();
        if let Some(info) = self.by_vgid.get_mut(&vgid) {
            info.name = name.clone();
            info.vgid = Some(vgid);
        }
        self.by_vgname.insert(name, vgid);
    }

    fn unlink_pv(&mut self, vgid: Uuid, pvid: Uuid) {
        let mut now_empty = false;
        if let Some(info) = self.by_vgid.get_mut(&vgid) {
            info.pvids.retain(|p| *p != pvid);
            now_empty = info.pvids.is_empty() && vgid != self.orphan_vgid();
        }
        if now_empty {
            if let Some(info) = self.by_vgid.remove(&vgid) {
                self.by_vgname.remove(&info.name);
            }
        }
    }

    pub fn info_by_pvid(&self, pvid: Uuid) -> Option<&CacheInfo> {
        self.by_pvid.get(&pvid)
    }

    pub fn vginfo_by_id(&self, vgid: Uuid) -> Option<&CacheVgInfo> {
        self.by_vgid.get(&vgid)
    }

    pub fn vginfo_by_name(&self, name: &str) -> Option<&CacheVgInfo> {
        let vgid = self.by_vgname.get(name)?;
        self.by_vgid.get(vgid)
    }

    pub fn mark_invalid(&mut self, pvid: Uuid) {
        if let Some(info) = self.by_pvid.get_mut(&pvid) {
            info.invalid = true;
        }
    }

    pub fn vgnames(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .by_vgname
            .keys()
            .map(|s| s.as_str())
            .filter(|n| *n != ORPHAN_VGNAME)
            .collect();
        names.sort();
        names.push(ORPHAN_VGNAME);
        names
    }
}

impl Default for LvmCache {
    fn default() -> LvmCache {
        LvmCache::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pvid(n: u8) -> Uuid {
        Uuid::parse(&n.to_string().repeat(32)).unwrap()
    }

    #[test]
    fn new_pv_files_under_orphan_by_default() {
        let mut cache = LvmCache::new();
        let id = pvid(1);
        cache.update(DevId::new(8, 0), id, None);
        assert_eq!(cache.vginfo_by_id(cache.orphan_vgid()).unwrap().pvids, vec![id]);
    }

    #[test]
    fn moving_a_pv_between_vgs_unlinks_the_old_entry() {
        let mut cache = LvmCache::new();
        let pv = pvid(2);
        let vg_a = pvid(3);
        let vg_b = pvid(4);
        cache.set_vgname(vg_a, "vg_a");
        cache.set_vgname(vg_b, "vg_b");

        cache.update(DevId::new(8, 0), pv, Some(vg_a));
        assert!(cache.vginfo_by_id(vg_a).unwrap().pvids.contains(&pv));

        cache.update(DevId::new(8, 0), pv, Some(vg_b));
        assert!(!cache.vginfo_by_id(vg_a).unwrap().pvids.contains(&pv));
        assert!(cache.vginfo_by_id(vg_b).unwrap().pvids.contains(&pv));
    }

    #[test]
    fn empty_vginfo_is_torn_down() {
        let mut cache = LvmCache::new();
        let pv = pvid(5);
        let vg = pvid(6);
        cache.set_vgname(vg, "vg_x");
        cache.update(DevId::new(8, 0), pv, Some(vg));
        cache.update(DevId::new(8, 0), pv, None);
        assert!(cache.vginfo_by_name("vg_x").is_none());
    }

    #[test]
    fn nested_scan_is_rejected() {
        let mut cache = LvmCache::new();
        assert!(cache.begin_scan());
        assert!(!cache.begin_scan());
        cache.end_scan();
        assert!(cache.begin_scan());
    }
}
