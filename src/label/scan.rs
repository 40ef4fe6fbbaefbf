// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Reads the first label-scan window of each filtered device and routes
//! it to whichever registered labeller claims it, as `lib/label/label.h`'s
//! `labeller` vtable and `lib/label/lvm2_label.c`'s concrete labeller.

use crate::device::Device;
use crate::error::Result;
use crate::uuid::Uuid;

pub const LABEL_SCAN_SECTORS: usize = 4;
pub const SECTOR_SIZE: usize = 512;

/// What one successful label read yields.
#[derive(Debug, Clone)]
pub struct ScannedLabel {
    pub pvid: Uuid,
    pub format_name: &'static str,
}

/// A format plugin that can recognise and decode its own label.
pub trait Labeller {
    fn name(&self) -> &'static str;

    /// Returns `Some` if `buf` (the first [`LABEL_SCAN_SECTORS`] sectors
    /// of the device) belongs to this format.
    fn sniff(&self, buf: &[u8]) -> Option<ScannedLabel>;
}

/// Iterates `devices`, asking each labeller in turn; the first match
/// wins and populates `cache` via [`super::LvmCache::update`].
pub fn label_scan(
    devices: impl IntoIterator<Item = Device>,
    labellers: &[Box<dyn Labeller>],
    mut read_window: impl FnMut(&Device) -> Result<Vec<u8>>,
    cache: &mut super::LvmCache,
) -> Result<usize> {
    let mut found = 0;
    for dev in devices {
        let buf = match read_window(&dev) {
            Ok(b) => b,
            Err(_) => continue,
        };

        for labeller in labellers {
            if let Some(label) = labeller.sniff(&buf) {
                cache.update(dev.id, label.pvid, None);
                found += 1;
                break;
            }
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DevId;

    struct FixedLabeller(&'static str, u8);
    impl Labeller for FixedLabeller {
        fn name(&self) -> &'static str {
            self.0
        }
        fn sniff(&self, buf: &[u8]) -> Option<ScannedLabel> {
            if buf.first() == Some(&self.1) {
                Some(ScannedLabel {
                    pvid: Uuid::create().unwrap(),
                    format_name: self.0,
                })
            } else {
                None
            }
        }
    }

    #[test]
    fn first_matching_labeller_wins() {
        let labellers: Vec<Box<dyn Labeller>> = vec![
            Box::new(FixedLabeller("lvm1", 1)),
            Box::new(FixedLabeller("text", 2)),
        ];
        let mut cache = super::super::LvmCache::new();
        let dev = Device::new(DevId::new(8, 0), "/dev/sda".into());
        let n = label_scan(vec![dev], &labellers, |_| Ok(vec![2u8; 10]), &mut cache).unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn unreadable_device_is_skipped_not_fatal() {
        let labellers: Vec<Box<dyn Labeller>> = vec![Box::new(FixedLabeller("text", 2))];
        let mut cache = super::super::LvmCache::new();
        let dev = Device::new(DevId::new(8, 0), "/dev/sda".into());
        let n = label_scan(
            vec![dev],
            &labellers,
            |_| Err(crate::error::Error::new(crate::error::ErrorKind::Io, "boom")),
            &mut cache,
        )
        .unwrap();
        assert_eq!(n, 0);
    }
}
