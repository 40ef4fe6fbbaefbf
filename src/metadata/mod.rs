// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The in-core metadata model: PVs, VGs, LVs and the segments tiling
//! them, independent of any on-disk representation.

pub mod lv;
pub mod mda;
pub mod pv;
pub mod segment;
pub mod status;
pub mod vg;

pub use lv::{AllocPolicy, Lv};
pub use mda::{MdaFlags, MdaSet, MetadataArea};
pub use pv::Pv;
pub use segment::{Area, LvSegment};
pub use status::{LvStatus, PvStatus, SegFlags, StatusStrings, VgStatus};
pub use vg::Vg;
