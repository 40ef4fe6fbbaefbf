// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! 32-character base-62 UUIDs, as used for PVIDs and VGIDs.
//!
//! This is *not* RFC 4122: the alphabet is `[0-9a-zA-Z]` and the printed
//! form groups the 32 raw characters `6-4-4-4-4-4-6` with hyphens, per
//! `lib/uuid/uuid.c`.

use std::fmt;
use std::fs::File;
use std::io::Read;

use crate::error::{Error, ErrorKind, Result};

const ID_LEN: usize = 32;
const ALPHABET: &[u8; 62] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const GROUP_SIZES: [usize; 7] = [6, 4, 4, 4, 4, 4, 6];

/// A 32-character LVM identifier (PVID or VGID).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uuid([u8; ID_LEN]);

impl Uuid {
    /// Generate a fresh id by reading `/dev/urandom` and mapping each byte
    /// modulo 62 into the alphabet, as `id_create` does.
    pub fn create() -> Result<Uuid> {
        let mut raw = [0u8; ID_LEN];
        File::open("/dev/urandom")?.read_exact(&mut raw)?;
        let mut out = [0u8; ID_LEN];
        for (o, b) in out.iter_mut().zip(raw.iter()) {
            *o = ALPHABET[(*b as usize) % ALPHABET.len()];
        }
        Ok(Uuid(out))
    }

    /// Parse either a bare 32-character id or a hyphenated, formatted one
    /// (hyphens are simply stripped, as `id_read_format` does).
    pub fn parse(s: &str) -> Result<Uuid> {
        let mut out = [0u8; ID_LEN];
        let mut n = 0;
        for c in s.chars() {
            if c == '-' {
                continue;
            }
            if n >= ID_LEN {
                return Err(Error::new(
                    ErrorKind::Format,
                    "too many characters to be a uuid",
                ));
            }
            if !c.is_ascii() || !ALPHABET.contains(&(c as u8)) {
                return Err(Error::new(ErrorKind::Format, "uuid contains invalid character"));
            }
            out[n] = c as u8;
            n += 1;
        }
        if n != ID_LEN {
            return Err(Error::new(
                ErrorKind::Format,
                "incorrect number of characters for a uuid",
            ));
        }
        Ok(Uuid(out))
    }

    /// The raw, unhyphenated 32-character form.
    pub fn raw(&self) -> &str {
        std::str::from_utf8(&self.0).expect("alphabet is ascii")
    }

    /// The formatted `6-4-4-4-4-4-6` grouped form.
    pub fn format(&self) -> String {
        let mut s = String::with_capacity(ID_LEN + 6);
        let mut pos = 0;
        for (i, len) in GROUP_SIZES.iter().enumerate() {
            if i > 0 {
                s.push('-');
            }
            s.push_str(std::str::from_utf8(&self.0[pos..pos + len]).unwrap());
            pos += len;
        }
        s
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uuid({})", self.format())
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_then_parse_round_trips() {
        let id = Uuid::create().unwrap();
        let formatted = id.format();
        assert_eq!(formatted.len(), ID_LEN + 6);
        let parsed = Uuid::parse(&formatted).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_raw_without_hyphens() {
        let id = Uuid::create().unwrap();
        let parsed = Uuid::parse(id.raw()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!(Uuid::parse("abc").is_err());
    }

    #[test]
    fn parse_rejects_invalid_characters() {
        let mut s = "x".repeat(32);
        s.replace_range(0..1, "!");
        assert!(Uuid::parse(&s).is_err());
    }

    #[test]
    fn group_sizes_sum_to_id_len() {
        assert_eq!(GROUP_SIZES.iter().sum::<usize>(), ID_LEN);
    }
}
