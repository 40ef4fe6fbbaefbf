// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crc::{Crc, CRC_32_ISO_HDLC};

/// The initial value the original sources feed into `calc_crc`. Both the
/// seed and the final result are bitwise negated relative to a textbook
/// CRC32/ISO-HDLC run, to match what LVM2's on-disk format expects.
const INITIAL_CRC: u32 = 0xf597a6cf;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Round `num` up to the next multiple of `align_to`, which must be a
/// power of two.
pub fn align_to(num: usize, align_to: usize) -> usize {
    let agn = align_to - 1;
    (num + agn) & !agn
}

/// Endian-independent CRC32 matching LVM2's on-disk checksums.
///
/// `crc`'s `CRC_32_ISO_HDLC` algorithm is the complemented variant
/// (`init`/`xorout` both `0xffff_ffff`, `refin`/`refout` both set), and a
/// `Digest`'s internal register lives in the reflected domain, i.e.
/// `digest_with_initial(x)` starts the register at `reverse_bits(x)` and
/// `finalize()` returns `register ^ xorout`. LVM2's `calc_crc` runs the
/// same reflected update with no init/final complement at all, so the
/// complement has to be cancelled on both ends: seed with
/// `INITIAL_CRC.reverse_bits()` so the register starts at `INITIAL_CRC`,
/// and complement `finalize()`'s output to undo its `xorout`.
pub fn crc32_calc(buf: &[u8]) -> u32 {
    let mut digest = CRC32.digest_with_initial(INITIAL_CRC.reverse_bits());
    digest.update(buf);
    !digest.finalize()
}
