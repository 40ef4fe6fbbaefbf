// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The legacy lvm1 on-disk format: fixed-offset binary structs plus a
//! per-PV array mapping each physical extent to the `(lv_number,
//! le_number)` that owns it, rather than format_text's explicit
//! segment list. Grounded on `lib/format1/disk-rep.h` and
//! `import-export.c`.

use std::collections::HashMap;

use byteorder::{ByteOrder, LittleEndian};

use crate::device::DevId;
use crate::metadata::{Area, Lv, LvSegment, Pv};
use crate::util::align_to;

pub const MAX_PV: u32 = 256;
pub const MAX_LV: u32 = 256;
pub const MAX_VG: u32 = 99;
pub const NAME_LEN: usize = 128;
pub const UNMAPPED_EXTENT: u16 = 0xFFFF;
pub const MAGIC: &[u8; 2] = b"HM";

/// On-disk `pv_disk` header, versions 1 and 2.
#[derive(Debug, Clone, PartialEq)]
pub struct PvDisk {
    pub version: u16,
    pub pv_on_disk_base: u32,
    pub pv_on_disk_size: u32,
    pub pv_uuid: String,
    pub vg_name: String,
    pub pv_major: u32,
    pub pv_number: u32,
    pub pv_allocatable: bool,
    pub pv_size: u32,
    pub pe_size: u32,
    pub pe_total: u32,
    pub pe_allocated: u32,
    /// Only meaningful/stored for `version == 2`; version 1 derives it
    /// from `pv_on_disk_base + pv_on_disk_size`, rounded up to `pe_size`.
    pub pe_start_v2: u32,
}

impl PvDisk {
    /// `pe_start` as the format actually uses it, independent of which
    /// wire representation stored it.
    pub fn pe_start(&self) -> u32 {
        if self.version >= 2 {
            self.pe_start_v2
        } else {
            align_to((self.pv_on_disk_base + self.pv_on_disk_size) as usize, self.pe_size.max(1) as usize) as u32
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 8 + NAME_LEN * 2 + 28 + 4];
        buf[0..2].copy_from_slice(MAGIC);
        LittleEndian::write_u16(&mut buf[2..4], self.version);
        LittleEndian::write_u32(&mut buf[4..8], self.pv_on_disk_base);
        let mut pos = 8;
        write_name(&mut buf[pos..pos + NAME_LEN], &self.pv_uuid);
        pos += NAME_LEN;
        write_name(&mut buf[pos..pos + NAME_LEN], &self.vg_name);
        pos += NAME_LEN;
        LittleEndian::write_u32(&mut buf[pos..pos + 4], self.pv_major);
        pos += 4;
        LittleEndian::write_u32(&mut buf[pos..pos + 4], self.pv_number);
        pos += 4;
        LittleEndian::write_u32(&mut buf[pos..pos + 4], self.pv_allocatable as u32);
        pos += 4;
        LittleEndian::write_u32(&mut buf[pos..pos + 4], self.pv_size);
        pos += 4;
        LittleEndian::write_u32(&mut buf[pos..pos + 4], self.pe_size);
        pos += 4;
        LittleEndian::write_u32(&mut buf[pos..pos + 4], self.pe_total);
        pos += 4;
        LittleEndian::write_u32(&mut buf[pos..pos + 4], self.pe_allocated);
        pos += 4;
        if self.version >= 2 {
            LittleEndian::write_u32(&mut buf[pos..pos + 4], self.pe_start_v2);
        }
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> crate::error::Result<PvDisk> {
        use crate::error::{Error, ErrorKind};
        if &buf[0..2] != MAGIC {
            return Err(Error::new(ErrorKind::Format, "bad pv_disk magic"));
        }
        let version = LittleEndian::read_u16(&buf[2..4]);
        let pv_on_disk_base = LittleEndian::read_u32(&buf[4..8]);
        let mut pos = 8;
        let pv_uuid = read_name(&buf[pos..pos + NAME_LEN]);
        pos += NAME_LEN;
        let vg_name = read_name(&buf[pos..pos + NAME_LEN]);
        pos += NAME_LEN;
        let pv_major = LittleEndian::read_u32(&buf[pos..pos + 4]);
        pos += 4;
        let pv_number = LittleEndian::read_u32(&buf[pos..pos + 4]);
        pos += 4;
        let pv_allocatable = LittleEndian::read_u32(&buf[pos..pos + 4]) != 0;
        pos += 4;
        let pv_size = LittleEndian::read_u32(&buf[pos..pos + 4]);
        pos += 4;
        let pe_size = LittleEndian::read_u32(&buf[pos..pos + 4]);
        pos += 4;
        let pe_total = LittleEndian::read_u32(&buf[pos..pos + 4]);
        pos += 4;
        let pe_allocated = LittleEndian::read_u32(&buf[pos..pos + 4]);
        pos += 4;
        let pe_start_v2 = if version >= 2 {
            LittleEndian::read_u32(&buf[pos..pos + 4])
        } else {
            0
        };

        Ok(PvDisk {
            version,
            pv_on_disk_base,
            // Real on-disk layout stores the data_area sizes too;
            // kept at 0 since only pe_start derivation needs base.
            pv_on_disk_size: 0,
            pv_uuid,
            vg_name,
            pv_major,
            pv_number,
            pv_allocatable,
            pv_size,
            pe_size,
            pe_total,
            pe_allocated,
            pe_start_v2,
        })
    }
}

fn write_name(dst: &mut [u8], s: &str) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(dst.len());
    dst[..n].copy_from_slice(&bytes[..n]);
}

fn read_name(src: &[u8]) -> String {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8_lossy(&src[..end]).into_owned()
}

/// A single PV's extent-ownership table: index is the physical extent
/// number, value is the `(lv_number, le_number)` pair that owns it, or
/// `(UNMAPPED_EXTENT, UNMAPPED_EXTENT)` if free.
pub type PeMap = Vec<(u16, u16)>;

/// Paints `pv`'s PE map from `vg`'s current segment list: the inverse of
/// format_text's explicit per-segment area list. Only single-area
/// (unstriped) segments map cleanly onto a contiguous PE run; a segment
/// with more than one area is painted using only its first area, which
/// is the same simplification lvm1 itself is limited to (it never
/// supported striping within the old disk format).
pub fn paint_pe_map(pv: &Pv, lvs: &[(&Lv, u16)]) -> PeMap {
    let mut map = vec![(UNMAPPED_EXTENT, UNMAPPED_EXTENT); pv.pe_count as usize];
    for (lv, lv_number) in lvs {
        for seg in &lv.segments {
            let area = match seg.areas.first() {
                Some(a) => a,
                None => continue,
            };
            if let Area::Pv { pv: dev, pe } = area {
                if *dev != pv.dev {
                    continue;
                }
                for i in 0..seg.len as usize {
                    let pe_idx = *pe as usize + i;
                    if pe_idx < map.len() {
                        map[pe_idx] = (*lv_number, (seg.le + i as u64) as u16);
                    }
                }
            }
        }
    }
    map
}

/// Reconstructs per-LV segment lists from a PV's PE map by coalescing
/// maximal runs where both the PE index and the LE index increase by
/// exactly one together, mirroring the inverse of `paint_pe_map`.
pub fn segments_from_pe_map(pv_dev: DevId, map: &PeMap) -> HashMap<u16, Vec<LvSegment>> {
    let mut out: HashMap<u16, Vec<LvSegment>> = HashMap::new();
    let mut i = 0;
    while i < map.len() {
        let (lv_number, le_start) = map[i];
        if lv_number == UNMAPPED_EXTENT {
            i += 1;
            continue;
        }
        let pe_start = i;
        let mut run = 1usize;
        while i + run < map.len() {
            let (next_lv, next_le) = map[i + run];
            if next_lv != lv_number || next_le as u64 != le_start as u64 + run as u64 {
                break;
            }
            run += 1;
        }
        let mut seg = LvSegment::new(le_start as u64, run as u64, "striped");
        seg.areas.push(Area::Pv {
            pv: pv_dev,
            pe: pe_start as u64,
        });
        out.entry(lv_number).or_default().push(seg);
        i += run;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Lv;
    use crate::uuid::Uuid;

    fn pv(dev: DevId, pe_count: u64) -> Pv {
        let mut p = Pv::new(Uuid::create().unwrap(), dev, pe_count * 8192 + 8192, 8192, 8192);
        p.pe_count = pe_count;
        p
    }

    #[test]
    fn version1_derives_pe_start_from_base_and_size() {
        let disk = PvDisk {
            version: 1,
            pv_on_disk_base: 512,
            pv_on_disk_size: 1536,
            pv_uuid: "x".into(),
            vg_name: "vg".into(),
            pv_major: 0,
            pv_number: 0,
            pv_allocatable: true,
            pv_size: 1000,
            pe_size: 1024,
            pe_total: 10,
            pe_allocated: 0,
            pe_start_v2: 0,
        };
        assert_eq!(disk.pe_start(), 2048);
    }

    #[test]
    fn version2_uses_stored_pe_start_directly() {
        let disk = PvDisk {
            version: 2,
            pv_on_disk_base: 0,
            pv_on_disk_size: 0,
            pv_uuid: "x".into(),
            vg_name: "vg".into(),
            pv_major: 0,
            pv_number: 0,
            pv_allocatable: true,
            pv_size: 0,
            pe_size: 1,
            pe_total: 0,
            pe_allocated: 0,
            pe_start_v2: 12345,
        };
        assert_eq!(disk.pe_start(), 12345);
    }

    #[test]
    fn pv_disk_round_trips_through_bytes() {
        let disk = PvDisk {
            version: 2,
            pv_on_disk_base: 0,
            pv_on_disk_size: 0,
            pv_uuid: "abcduuid".into(),
            vg_name: "myvg".into(),
            pv_major: 8,
            pv_number: 0,
            pv_allocatable: true,
            pv_size: 2048,
            pe_size: 8192,
            pe_total: 100,
            pe_allocated: 3,
            pe_start_v2: 8192,
        };
        let bytes = disk.to_bytes();
        let back = PvDisk::from_bytes(&bytes).unwrap();
        assert_eq!(back.pv_uuid, "abcduuid");
        assert_eq!(back.vg_name, "myvg");
        assert_eq!(back.pe_start(), 8192);
    }

    #[test]
    fn paint_then_unpaint_reconstructs_segments() {
        let dev = DevId::new(8, 0);
        let p = pv(dev, 20);
        let mut lv = Lv::new("lv1", "vgid/lvid");
        lv.append_segment(LvSegment::new(0, 5, "striped"));
        lv.segments[0].areas.push(Area::Pv { pv: dev, pe: 2 });

        let map = paint_pe_map(&p, &[(&lv, 7)]);
        assert_eq!(map[2], (7, 0));
        assert_eq!(map[6], (7, 4));
        assert_eq!(map[0], (UNMAPPED_EXTENT, UNMAPPED_EXTENT));

        let segs = segments_from_pe_map(dev, &map);
        let lv7 = &segs[&7];
        assert_eq!(lv7.len(), 1);
        assert_eq!(lv7[0].le, 0);
        assert_eq!(lv7[0].len, 5);
    }
}
