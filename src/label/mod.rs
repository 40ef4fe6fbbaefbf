// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Label scanning and the lvmcache vgname/vgid/pvid indices.

pub mod cache;
pub mod scan;

pub use cache::{CacheVgInfo, LvmCache};
pub use scan::{label_scan, Labeller, ScannedLabel};
