// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The read-only `format_pool` layout: a VG is described as a list of
//! subpools, each striped across a fixed set of devices, reconstructed
//! from each PV's own pool label rather than from one shared
//! text-format MDA. Grounded on `lib/format_pool/format_pool.c`.
//!
//! This format has no corresponding write path upstream (`_write` just
//! logs "not supported"), so only import is implemented here.

use std::collections::BTreeMap;

use crate::device::DevId;
use crate::error::{Error, ErrorKind, Result};

/// One device slot within a subpool, as read off a single PV's pool
/// label.
#[derive(Debug, Clone)]
pub struct PoolDevice {
    pub dev: DevId,
    pub dev_id_within_subpool: u32,
    pub blocks: u64,
}

/// One subpool: a striped group of devices sharing a striping factor
/// and a pool type (data/metadata/whatever `pl_sp_type` encodes).
#[derive(Debug, Clone, Default)]
pub struct SubPool {
    pub id: u32,
    pub striping: u32,
    pub sp_type: u32,
    pub num_devs: u32,
    pub devs: BTreeMap<u32, PoolDevice>,
}

/// One PV's pool label, as decoded off sector 0 by the labeller.
#[derive(Debug, Clone)]
pub struct PoolLabel {
    pub pv: DevId,
    pub sp_id: u32,
    pub sp_devid: u32,
    pub sp_devs: u32,
    pub striping: u32,
    pub sp_type: u32,
    pub blocks: u64,
}

/// Groups the flat per-PV label list into subpools, as `_build_usp`
/// does, keyed by `sp_id` so labels can arrive in any order.
pub fn build_subpools(labels: &[PoolLabel]) -> BTreeMap<u32, SubPool> {
    let mut pools: BTreeMap<u32, SubPool> = BTreeMap::new();

    for label in labels {
        let sp = pools.entry(label.sp_id).or_insert_with(|| SubPool {
            id: label.sp_id,
            striping: label.striping,
            sp_type: label.sp_type,
            num_devs: label.sp_devs,
            devs: BTreeMap::new(),
        });
        sp.devs.insert(
            label.sp_devid,
            PoolDevice {
                dev: label.pv,
                dev_id_within_subpool: label.sp_devid,
                blocks: label.blocks,
            },
        );
    }

    pools
}

/// Refuses a partial VG: every subpool id in `0..sp_count` must be
/// present, and every device slot `0..num_devs` within it must be
/// filled. Mirrors `_check_usp` exactly, including which id is reported
/// first.
pub fn check_subpools(vg_name: &str, pools: &BTreeMap<u32, SubPool>, sp_count: u32) -> Result<()> {
    for i in 0..sp_count {
        let sp = pools
            .get(&i)
            .ok_or_else(|| Error::new(ErrorKind::Inconsistent, format!("missing subpool {} in pool {}", i, vg_name)))?;
        for j in 0..sp.num_devs {
            if !sp.devs.contains_key(&j) {
                return Err(Error::new(
                    ErrorKind::Inconsistent,
                    format!("missing device {} for subpool {} in pool {}", j, i, vg_name),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(sp_id: u32, sp_devid: u32, sp_devs: u32) -> PoolLabel {
        PoolLabel {
            pv: DevId::new(8, sp_devid),
            sp_id,
            sp_devid,
            sp_devs,
            striping: 1,
            sp_type: 0,
            blocks: 1024,
        }
    }

    #[test]
    fn complete_subpools_pass_the_check() {
        let labels = vec![label(0, 0, 2), label(0, 1, 2), label(1, 0, 1)];
        let pools = build_subpools(&labels);
        check_subpools("vg1", &pools, 2).unwrap();
    }

    #[test]
    fn missing_subpool_is_reported() {
        let labels = vec![label(0, 0, 2), label(0, 1, 2)];
        let pools = build_subpools(&labels);
        let err = check_subpools("vg1", &pools, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Inconsistent);
    }

    #[test]
    fn missing_device_within_a_subpool_is_reported() {
        let labels = vec![label(0, 0, 2)];
        let pools = build_subpools(&labels);
        let err = check_subpools("vg1", &pools, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Inconsistent);
    }
}
