// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! On-disk metadata formats: `format_text` (the modern, writable
//! default), `format1` (legacy lvm1 binary layout) and `format_pool`
//! (read-only). Each is reached through the [`FormatHandler`] vtable
//! rather than the teacher's single hardcoded layout.

pub mod format1;
pub mod pool;
pub mod text;

use crate::device::io::{BlockDevice, PageIo};
use crate::error::Result;
use crate::metadata::Vg;

/// One on-disk metadata representation. `lvmcore` only ships
/// `format_text` as read-write; `format1` and `format_pool` exist for
/// reading VGs created by older or different tools.
pub trait FormatHandler {
    fn name(&self) -> &'static str;

    fn supports_write(&self) -> bool {
        true
    }
}

/// The read/write surface a concrete metadata area implementation
/// exposes, independent of which [`FormatHandler`] owns it.
pub trait MetadataAreaOps<D: BlockDevice> {
    fn read_vg(&self, io: &mut PageIo<D>) -> Result<Vg>;
    fn write_vg(&self, io: &mut PageIo<D>, vg: &Vg) -> Result<()>;
}

/// `format_text`'s MDA: a label + PV header pointing at one or two
/// circular text areas.
pub struct TextMetadataArea {
    pub header: text::PvHeader,
}

impl FormatHandler for TextMetadataArea {
    fn name(&self) -> &'static str {
        "lvm2"
    }
}

impl<D: BlockDevice> MetadataAreaOps<D> for TextMetadataArea {
    fn read_vg(&self, io: &mut PageIo<D>) -> Result<Vg> {
        let tree = text::read_metadata(&self.header, io)?;
        text::configtree_to_vg(&tree)
    }

    fn write_vg(&self, io: &mut PageIo<D>, vg: &Vg) -> Result<()> {
        let tree = text::vg_to_configtree(vg);
        text::write_metadata(&self.header, io, &tree)
    }
}

/// A registry of the formats `lvmcore` knows about, by name
/// (`global/format_libraries` in the config tree names additional ones
/// in the real tool; none are loaded here).
pub struct FormatRegistry {
    names: Vec<&'static str>,
}

impl FormatRegistry {
    pub fn new() -> FormatRegistry {
        FormatRegistry {
            names: vec!["lvm2", "lvm1", "pool"],
        }
    }

    pub fn supports(&self, name: &str) -> bool {
        self.names.contains(&name)
    }
}

impl Default for FormatRegistry {
    fn default() -> FormatRegistry {
        FormatRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_knows_all_three_formats() {
        let reg = FormatRegistry::new();
        assert!(reg.supports("lvm2"));
        assert!(reg.supports("lvm1"));
        assert!(reg.supports("pool"));
        assert!(!reg.supports("btrfs"));
    }
}
