// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Metadata core of an LVM2-style volume manager: on-disk codecs
//! (`format_text`, `format1`, `format_pool`), the in-core VG/LV/PV
//! model, the device cache and label scanner, a small regex engine for
//! device filters, the extent allocator, and the RAID image-count
//! manipulator.

pub mod alloc;
pub mod backup;
pub mod collections;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod filter;
pub mod flock;
pub mod format;
pub mod label;
pub mod metadata;
pub mod pool;
pub mod raid;
pub mod regex;
pub mod segtype;
pub mod util;
pub mod uuid;

pub use error::{Error, ErrorKind, Result};
