// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `physical_volume`, grounded on the teacher's `pv.rs` and generalised
//! to the full attribute/invariant set of `original_source/lib/metadata/metadata.h`.

use crate::device::DevId;
use crate::error::{Error, ErrorKind, Result};
use crate::metadata::status::PvStatus;
use crate::uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Pv {
    pub id: Uuid,
    pub dev: DevId,
    /// Empty string means orphan (not part of any real VG).
    pub vg_name: String,
    pub size: u64,
    pub pe_size: u64,
    pub pe_start: u64,
    pub pe_count: u64,
    pub pe_alloc_count: u64,
    pub status: PvStatus,
}

impl Pv {
    pub fn new(id: Uuid, dev: DevId, size: u64, pe_size: u64, pe_start: u64) -> Pv {
        let pe_count = (size - pe_start) / pe_size;
        Pv {
            id,
            dev,
            vg_name: String::new(),
            size,
            pe_size,
            pe_start,
            pe_count,
            pe_alloc_count: 0,
            status: PvStatus::ALLOCATABLE,
        }
    }

    pub fn is_orphan(&self) -> bool {
        self.vg_name.is_empty()
    }

    pub fn pe_free(&self) -> u64 {
        self.pe_count - self.pe_alloc_count
    }

    /// Validates the PV-level invariants from spec §3:
    /// `pe_alloc_count <= pe_count` and `pe_start + pe_count*pe_size <= size`.
    pub fn check_invariants(&self) -> Result<()> {
        if self.pe_alloc_count > self.pe_count {
            return Err(Error::internal("pe_alloc_count exceeds pe_count"));
        }
        if self.pe_start + self.pe_count * self.pe_size > self.size {
            return Err(Error::internal("pe map extends past device size"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pv() -> Pv {
        Pv::new(Uuid::create().unwrap(), DevId::new(8, 0), 1_048_576, 8192, 8192)
    }

    #[test]
    fn pe_count_derived_from_size_and_extent_size() {
        let p = pv();
        assert_eq!(p.pe_count, (1_048_576 - 8192) / 8192);
    }

    #[test]
    fn fresh_pv_is_an_orphan() {
        assert!(pv().is_orphan());
    }

    #[test]
    fn invariants_hold_for_a_freshly_created_pv() {
        pv().check_invariants().unwrap();
    }

    #[test]
    fn over_allocated_pv_fails_invariant_check() {
        let mut p = pv();
        p.pe_alloc_count = p.pe_count + 1;
        assert!(p.check_invariants().is_err());
    }
}
