// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The `format_text` on-disk representation: a binary label + PV header
//! followed by one or two metadata areas holding the VG's metadata as
//! text, read and written as a circular buffer.
//!
//! Grounded almost verbatim on the teacher's `pvlabel.rs` (label/PV
//! header layout, MDA header, cyclic read/write) and `parser.rs` (the
//! lexer and section-tree grammar), generalised from the teacher's
//! fixed single-PV/single-LV shape to the full [`Vg`] model.

use std::cmp::min;
use std::collections::BTreeMap;

use crate::config::{ConfigTree, Value};
use crate::device::io::{BlockDevice, PageIo};
use crate::device::DevId;
use crate::error::{Error, ErrorKind, Result};
use crate::metadata::{Area, Lv, LvSegment, Pv, StatusStrings, Vg};
use crate::uuid::Uuid;
use crate::util::{align_to, crc32_calc};

pub const LABEL_SCAN_SECTORS: usize = 4;
pub const SECTOR_SIZE: u64 = 512;
const ID_LEN: usize = 32;
const LABEL_SIZE: u32 = 32;
const LABEL_SECTOR: u64 = 1;
const MDA_HEADER_SIZE: u64 = 512;
const MDA_MAGIC: &[u8] = b"\x20\x4c\x56\x4d\x32\x20\x78\x5b\x35\x41\x25\x72\x30\x4e\x2a\x3e";
pub const DEFAULT_MDA_SIZE: u64 = 1024 * 1024;

// --- lexer --------------------------------------------------------------

#[derive(Debug, PartialEq, Clone)]
enum Token<'a> {
    CurlyOpen,
    CurlyClose,
    BracketOpen,
    BracketClose,
    Equals,
    Comma,
    String(&'a [u8]),
    Ident(&'a [u8]),
    Number(i64),
    Comment,
}

struct Lexer<'a> {
    chars: &'a [u8],
    cursor: usize,
    next_is_ident: bool,
}

impl<'a> Lexer<'a> {
    fn new(chars: &'a [u8]) -> Lexer<'a> {
        Lexer {
            chars,
            cursor: 0,
            next_is_ident: false,
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>>;

    fn next(&mut self) -> Option<Result<Token<'a>>> {
        while self.cursor < self.chars.len() {
            let start = self.cursor;
            let c = self.chars[self.cursor];
            self.cursor += 1;
            match c {
                b'{' => {
                    self.next_is_ident = true;
                    return Some(Ok(Token::CurlyOpen));
                }
                b'}' => return Some(Ok(Token::CurlyClose)),
                b'[' => return Some(Ok(Token::BracketOpen)),
                b']' => return Some(Ok(Token::BracketClose)),
                b'=' => return Some(Ok(Token::Equals)),
                b',' => return Some(Ok(Token::Comma)),
                b' ' | b'\n' | b'\t' | b'\r' | b'\0' => continue,
                b'#' => {
                    while self.cursor < self.chars.len() && self.chars[self.cursor] != b'\n' {
                        self.cursor += 1;
                    }
                    return Some(Ok(Token::Comment));
                }
                b'"' => {
                    let str_start = self.cursor;
                    while self.cursor < self.chars.len() && self.chars[self.cursor] != b'"' {
                        self.cursor += 1;
                    }
                    if self.cursor >= self.chars.len() {
                        return Some(Err(Error::new(ErrorKind::Format, "unterminated string")));
                    }
                    let s = &self.chars[str_start..self.cursor];
                    self.cursor += 1;
                    return Some(Ok(Token::String(s)));
                }
                b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'.' => {
                    while self.cursor < self.chars.len()
                        && matches!(self.chars[self.cursor], b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'.' | b'-')
                    {
                        self.cursor += 1;
                    }
                    self.next_is_ident = false;
                    return Some(Ok(Token::Ident(&self.chars[start..self.cursor])));
                }
                b'0'..=b'9' | b'-' if !self.next_is_ident => {
                    while self.cursor < self.chars.len() && self.chars[self.cursor].is_ascii_digit() {
                        self.cursor += 1;
                    }
                    let s = std::str::from_utf8(&self.chars[start..self.cursor]).unwrap();
                    return Some(match s.parse() {
                        Ok(n) => Ok(Token::Number(n)),
                        Err(_) => Err(Error::new(ErrorKind::Format, "bad integer literal")),
                    });
                }
                b'0'..=b'9' | b'-' => {
                    while self.cursor < self.chars.len()
                        && matches!(self.chars[self.cursor], b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'.' | b'-')
                    {
                        self.cursor += 1;
                    }
                    self.next_is_ident = false;
                    return Some(Ok(Token::Ident(&self.chars[start..self.cursor])));
                }
                other => return Some(Err(Error::new(ErrorKind::Format, format!("unexpected byte {:#x}", other)))),
            }
        }
        None
    }
}

fn parse_section(tokens: &[Token], pos: &mut usize) -> Result<ConfigTree> {
    let mut tree = ConfigTree::new();
    while *pos < tokens.len() && tokens[*pos] != Token::CurlyClose {
        let ident = match &tokens[*pos] {
            Token::Ident(x) => String::from_utf8_lossy(x).into_owned(),
            Token::Comment => {
                *pos += 1;
                continue;
            }
            other => return Err(Error::new(ErrorKind::Format, format!("expected ident, got {:?}", other))),
        };
        *pos += 1;

        match tokens.get(*pos) {
            Some(Token::Equals) => {
                *pos += 1;
                let value = parse_value(tokens, pos)?;
                tree.set(ident, value);
            }
            Some(Token::CurlyOpen) => {
                *pos += 1;
                let sub = parse_section(tokens, pos)?;
                if tokens.get(*pos) != Some(&Token::CurlyClose) {
                    return Err(Error::new(ErrorKind::Format, "unterminated section"));
                }
                *pos += 1;
                tree.set(ident, Value::Section(sub));
            }
            other => return Err(Error::new(ErrorKind::Format, format!("unexpected {:?} after ident", other))),
        }
    }
    Ok(tree)
}

fn parse_value(tokens: &[Token], pos: &mut usize) -> Result<Value> {
    match tokens.get(*pos) {
        Some(Token::Number(n)) => {
            *pos += 1;
            Ok(Value::Int(*n))
        }
        Some(Token::String(s)) => {
            *pos += 1;
            Ok(Value::Str(String::from_utf8_lossy(s).into_owned()))
        }
        Some(Token::BracketOpen) => {
            *pos += 1;
            let mut items = Vec::new();
            while tokens.get(*pos) != Some(&Token::BracketClose) {
                match tokens.get(*pos) {
                    Some(Token::Comma) => {
                        *pos += 1;
                    }
                    _ => items.push(parse_value(tokens, pos)?),
                }
            }
            *pos += 1;
            Ok(Value::List(items))
        }
        other => Err(Error::new(ErrorKind::Format, format!("unexpected {:?} as value", other))),
    }
}

/// Parses a whole text metadata blob, which is implicitly one top-level
/// section (no enclosing braces in the on-disk form).
pub fn parse(buf: &[u8]) -> Result<ConfigTree> {
    let mut tokens = Vec::new();
    for tok in Lexer::new(buf) {
        tokens.push(tok?);
    }
    let mut pos = 0;
    parse_section(&tokens, &mut pos)
}

/// Renders a tree back to the same textual grammar it was parsed from.
pub fn render(tree: &ConfigTree) -> Vec<u8> {
    render_entries(tree)
}

fn render_entries(tree: &ConfigTree) -> Vec<u8> {
    let mut out = Vec::new();
    for (k, v) in tree.iter() {
        render_entry(&mut out, k, v);
    }
    out
}

fn render_entry(out: &mut Vec<u8>, key: &str, value: &Value) {
    match value {
        Value::Str(s) => {
            out.extend(key.as_bytes());
            out.extend(b" = \"");
            out.extend(s.as_bytes());
            out.extend(b"\"\n");
        }
        Value::Int(n) => {
            out.extend(key.as_bytes());
            out.extend(format!(" = {}\n", n).as_bytes());
        }
        Value::List(items) => {
            out.extend(key.as_bytes());
            out.extend(b" = [");
            let rendered: Vec<String> = items
                .iter()
                .map(|item| match item {
                    Value::Str(s) => format!("\"{}\"", s),
                    Value::Int(n) => n.to_string(),
                    _ => String::new(),
                })
                .collect();
            out.extend(rendered.join(", ").as_bytes());
            out.extend(b"]\n");
        }
        Value::Section(sub) => {
            out.extend(key.as_bytes());
            out.extend(b" {\n");
            out.extend(render_entries(sub));
            out.extend(b"}\n");
        }
    }
}

// --- VG <-> config tree ---------------------------------------------------

fn status_list<S: StatusStrings>(status: S) -> Value {
    Value::List(status.to_strings().into_iter().map(Value::Str).collect())
}

fn status_from_value<S: StatusStrings>(v: Option<&Value>) -> S {
    match v {
        Some(Value::List(items)) => {
            let tokens: Vec<String> = items
                .iter()
                .filter_map(|i| match i {
                    Value::Str(s) => Some(s.clone()),
                    _ => None,
                })
                .collect();
            S::from_strings(&tokens)
        }
        Some(Value::Str(s)) => S::from_strings(&[s.clone()]),
        _ => S::empty(),
    }
}

fn area_to_value(area: &Area) -> (String, i64) {
    match area {
        Area::Pv { pv, pe } => (format!("pv{}:{}", pv.major, pv.minor), *pe as i64),
        Area::Lv { lv, le } => (lv.clone(), *le as i64),
    }
}

fn areas_from_list(items: &[Value]) -> Vec<Area> {
    let mut areas = Vec::new();
    for pair in items.chunks(2) {
        if let [Value::Str(name), Value::Int(offset)] = pair {
            if let Some(rest) = name.strip_prefix("pv") {
                if let Some((maj, min)) = rest.split_once(':') {
                    if let (Ok(maj), Ok(min)) = (maj.parse(), min.parse()) {
                        areas.push(Area::Pv {
                            pv: DevId::new(maj, min),
                            pe: *offset as u64,
                        });
                        continue;
                    }
                }
            }
            areas.push(Area::Lv {
                lv: name.clone(),
                le: *offset as u64,
            });
        }
    }
    areas
}

fn segment_to_tree(seg: &LvSegment) -> ConfigTree {
    let mut t = ConfigTree::new();
    t.set("start_extent", Value::Int(seg.le as i64));
    t.set("extent_count", Value::Int(seg.len as i64));
    t.set("type", Value::Str(seg.segtype.clone()));
    if seg.stripe_size != 0 {
        t.set("stripe_size", Value::Int(seg.stripe_size as i64));
    }
    if !seg.areas.is_empty() {
        let mut items = Vec::new();
        for area in &seg.areas {
            let (name, offset) = area_to_value(area);
            items.push(Value::Str(name));
            items.push(Value::Int(offset));
        }
        t.set("stripes", Value::List(items));
    }
    for (k, v) in &seg.params {
        t.set(k.clone(), Value::Str(v.clone()));
    }
    t
}

fn segment_from_tree(t: &ConfigTree) -> Result<LvSegment> {
    let err = || Error::new(ErrorKind::Format, "malformed segment");
    let le = match t.get("start_extent") {
        Some(Value::Int(n)) => *n as u64,
        _ => return Err(err()),
    };
    let len = match t.get("extent_count") {
        Some(Value::Int(n)) => *n as u64,
        _ => return Err(err()),
    };
    let segtype = t.get_str("type")?.to_string();
    let mut seg = LvSegment::new(le, len, segtype);
    if let Some(Value::List(items)) = t.get("stripes") {
        seg.areas = areas_from_list(items);
    }
    Ok(seg)
}

fn lv_to_tree(lv: &Lv) -> ConfigTree {
    let mut t = ConfigTree::new();
    t.set("id", Value::Str(lv.lvid.clone()));
    t.set("status", status_list(lv.status));
    t.set("segment_count", Value::Int(lv.segments.len() as i64));
    for (i, seg) in lv.segments.iter().enumerate() {
        t.set(format!("segment{}", i + 1), Value::Section(segment_to_tree(seg)));
    }
    t
}

fn lv_from_tree(name: &str, t: &ConfigTree) -> Result<Lv> {
    let id = t.get_str("id")?.to_string();
    let mut lv = Lv::new(name, id);
    lv.status = status_from_value(t.get("status"));
    let seg_count = match t.get("segment_count") {
        Some(Value::Int(n)) => *n,
        _ => 0,
    };
    for i in 0..seg_count {
        let key = format!("segment{}", i + 1);
        let sub = t
            .section(&key)
            .ok_or_else(|| Error::new(ErrorKind::Format, format!("missing {}", key)))?;
        lv.append_segment(segment_from_tree(sub)?);
    }
    Ok(lv)
}

fn pv_to_tree(pv: &Pv) -> ConfigTree {
    let mut t = ConfigTree::new();
    t.set("id", Value::Str(pv.id.format()));
    t.set("device", Value::Str(format!("{}:{}", pv.dev.major, pv.dev.minor)));
    t.set("status", status_list(pv.status));
    t.set("dev_size", Value::Int(pv.size as i64));
    t.set("pe_start", Value::Int(pv.pe_start as i64));
    t.set("pe_count", Value::Int(pv.pe_count as i64));
    t
}

fn pv_from_tree(t: &ConfigTree, pe_size: u64) -> Result<Pv> {
    let id = Uuid::parse(t.get_str("id")?)?;
    let device = t.get_str("device")?;
    let (maj, min) = device
        .split_once(':')
        .ok_or_else(|| Error::new(ErrorKind::Format, "malformed device field"))?;
    let dev = DevId::new(
        maj.parse().map_err(|_| Error::new(ErrorKind::Format, "bad major"))?,
        min.parse().map_err(|_| Error::new(ErrorKind::Format, "bad minor"))?,
    );
    let size = match t.get("dev_size") {
        Some(Value::Int(n)) => *n as u64,
        _ => return Err(Error::new(ErrorKind::Format, "missing dev_size")),
    };
    let pe_start = match t.get("pe_start") {
        Some(Value::Int(n)) => *n as u64,
        _ => return Err(Error::new(ErrorKind::Format, "missing pe_start")),
    };
    let mut pv = Pv::new(id, dev, size, pe_size, pe_start);
    pv.status = status_from_value(t.get("status"));
    if let Some(Value::Int(n)) = t.get("pe_count") {
        pv.pe_count = *n as u64;
    }
    Ok(pv)
}

pub fn vg_to_configtree(vg: &Vg) -> ConfigTree {
    let mut root = ConfigTree::new();
    let mut body = ConfigTree::new();
    body.set("id", Value::Str(vg.id.format()));
    body.set("seqno", Value::Int(vg.seqno as i64));
    body.set("format", Value::Str("lvm2".into()));
    body.set("status", status_list(vg.status));
    body.set("extent_size", Value::Int(vg.extent_size as i64));
    body.set("max_lv", Value::Int(vg.max_lv as i64));
    body.set("max_pv", Value::Int(vg.max_pv as i64));
    body.set("metadata_copies", Value::Int(vg.mda_copies as i64));
    if let Some(sid) = &vg.system_id {
        body.set("system_id", Value::Str(sid.clone()));
    }

    let mut pvs = ConfigTree::new();
    for (i, pv) in vg.pvs.values().enumerate() {
        pvs.set(format!("pv{}", i), Value::Section(pv_to_tree(pv)));
    }
    body.set("physical_volumes", Value::Section(pvs));

    let mut lvs = ConfigTree::new();
    for lv in vg.lvs.values() {
        lvs.set(lv.name.clone(), Value::Section(lv_to_tree(lv)));
    }
    body.set("logical_volumes", Value::Section(lvs));

    root.set(vg.name.clone(), Value::Section(body));
    root
}

pub fn configtree_to_vg(tree: &ConfigTree) -> Result<Vg> {
    let (name, body) = tree
        .iter()
        .next()
        .and_then(|(k, v)| match v {
            Value::Section(s) => Some((k.clone(), s)),
            _ => None,
        })
        .ok_or_else(|| Error::new(ErrorKind::Format, "empty metadata"))?;

    let id = Uuid::parse(body.get_str("id")?)?;
    let extent_size = match body.get("extent_size") {
        Some(Value::Int(n)) => *n as u64,
        _ => return Err(Error::new(ErrorKind::Format, "missing extent_size")),
    };
    let mut vg = Vg::create(id, name, extent_size);
    vg.status = status_from_value(body.get("status"));
    vg.seqno = match body.get("seqno") {
        Some(Value::Int(n)) => *n as u64,
        _ => 0,
    };
    vg.max_lv = match body.get("max_lv") {
        Some(Value::Int(n)) => *n as u32,
        _ => 0,
    };
    vg.max_pv = match body.get("max_pv") {
        Some(Value::Int(n)) => *n as u32,
        _ => 0,
    };
    vg.mda_copies = match body.get("metadata_copies") {
        Some(Value::Int(n)) => *n as u32,
        _ => 1,
    };
    if let Ok(sid) = body.get_str("system_id") {
        vg.system_id = Some(sid.to_string());
    }

    let pvs = body
        .section("physical_volumes")
        .ok_or_else(|| Error::new(ErrorKind::Format, "missing physical_volumes"))?;
    for (_, v) in pvs.iter() {
        if let Value::Section(s) = v {
            let pv = pv_from_tree(s, extent_size)?;
            vg.pvs.insert(pv.dev, pv);
        }
    }

    if let Some(lvs) = body.section("logical_volumes") {
        for (name, v) in lvs.iter() {
            if let Value::Section(s) = v {
                let lv = lv_from_tree(name, s)?;
                vg.lvs.insert(lv.name.clone(), lv);
            }
        }
    }

    Ok(vg)
}

// --- on-disk label / PV header / MDA -------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct RawLocn {
    pub offset: u64,
    pub size: u64,
    pub checksum: u32,
    pub ignored: bool,
}

/// Area bounds relative to the start of the device, as found in the PV
/// header (data area 0, metadata area 0/1).
#[derive(Debug, Clone, Copy)]
pub struct PvArea {
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct PvHeader {
    pub uuid: Uuid,
    pub size: u64,
    pub data_areas: Vec<PvArea>,
    pub metadata_areas: Vec<PvArea>,
}

/// Scans the first [`LABEL_SCAN_SECTORS`] sectors for `"LABELONE"`,
/// verifies its CRC, and returns the byte offset of the PV header that
/// immediately follows.
fn find_label_offset(buf: &[u8]) -> Result<u32> {
    for x in 0..LABEL_SCAN_SECTORS {
        let base = x * SECTOR_SIZE as usize;
        let sector = &buf[base..base + SECTOR_SIZE as usize];
        if &sector[..8] == b"LABELONE" {
            let crc = u32::from_le_bytes(sector[16..20].try_into().unwrap());
            if crc != crc32_calc(&sector[20..SECTOR_SIZE as usize]) {
                return Err(Error::new(ErrorKind::Inconsistent, "label CRC mismatch"));
            }
            let sector_field = u64::from_le_bytes(sector[8..16].try_into().unwrap());
            if sector_field != x as u64 {
                return Err(Error::new(ErrorKind::Inconsistent, "label sector field mismatch"));
            }
            let offset = u32::from_le_bytes(sector[20..24].try_into().unwrap());
            return Ok(offset + base as u32);
        }
    }
    Err(Error::new(ErrorKind::NotFound, "no LVM label found"))
}

fn read_pv_area_list(buf: &[u8]) -> (Vec<PvArea>, usize) {
    let mut areas = Vec::new();
    let mut pos = 0;
    loop {
        let offset = u64::from_le_bytes(buf[pos..pos + 8].try_into().unwrap());
        let size = u64::from_le_bytes(buf[pos + 8..pos + 16].try_into().unwrap());
        pos += 16;
        if offset == 0 {
            break;
        }
        areas.push(PvArea { offset, size });
    }
    (areas, pos)
}

fn parse_pv_header(buf: &[u8]) -> Result<PvHeader> {
    let uuid = Uuid::parse(&String::from_utf8_lossy(&buf[..ID_LEN]))?;
    let size = u64::from_le_bytes(buf[ID_LEN..ID_LEN + 8].try_into().unwrap());
    let mut pos = ID_LEN + 8;
    let (data_areas, used) = read_pv_area_list(&buf[pos..]);
    pos += used;
    let (metadata_areas, used) = read_pv_area_list(&buf[pos..]);
    let _ = used;

    Ok(PvHeader {
        uuid,
        size,
        data_areas,
        metadata_areas,
    })
}

/// Reads the label sector and PV header off `io`.
pub fn read_pv_header<D: BlockDevice>(io: &mut PageIo<D>) -> Result<PvHeader> {
    let buf = io.read(0, LABEL_SCAN_SECTORS * SECTOR_SIZE as usize)?;
    let offset = find_label_offset(&buf)?;
    let header_buf = io.read(offset as u64, 1024.min(buf.len() - offset as usize))?;
    parse_pv_header(&header_buf)
}

fn read_raw_locn(hdr: &[u8]) -> Option<RawLocn> {
    let offset = u64::from_le_bytes(hdr[40..48].try_into().unwrap());
    if offset == 0 {
        return None;
    }
    let size = u64::from_le_bytes(hdr[48..56].try_into().unwrap());
    let checksum = u32::from_le_bytes(hdr[56..60].try_into().unwrap());
    let flags = u32::from_le_bytes(hdr[60..64].try_into().unwrap());
    Some(RawLocn {
        offset,
        size,
        checksum,
        ignored: flags & 1 != 0,
    })
}

fn read_mda_header<D: BlockDevice>(area: &PvArea, io: &mut PageIo<D>) -> Result<Option<RawLocn>> {
    let hdr = io.read(area.offset, MDA_HEADER_SIZE as usize)?;
    let csum = u32::from_le_bytes(hdr[..4].try_into().unwrap());
    if csum != crc32_calc(&hdr[4..]) {
        return Err(Error::new(ErrorKind::Inconsistent, "MDA header checksum failure"));
    }
    if &hdr[4..20] != MDA_MAGIC {
        return Err(Error::new(ErrorKind::Format, "MDA magic mismatch"));
    }
    Ok(read_raw_locn(&hdr))
}

fn write_mda_header<D: BlockDevice>(area: &PvArea, io: &mut PageIo<D>, rl: &RawLocn) -> Result<()> {
    let mut hdr = vec![0u8; MDA_HEADER_SIZE as usize];
    hdr[4..20].copy_from_slice(MDA_MAGIC);
    hdr[20..24].copy_from_slice(&1u32.to_le_bytes());
    hdr[24..32].copy_from_slice(&area.offset.to_le_bytes());
    hdr[32..40].copy_from_slice(&area.size.to_le_bytes());
    hdr[40..48].copy_from_slice(&rl.offset.to_le_bytes());
    hdr[48..56].copy_from_slice(&rl.size.to_le_bytes());
    hdr[56..60].copy_from_slice(&rl.checksum.to_le_bytes());
    hdr[60..64].copy_from_slice(&(rl.ignored as u32).to_le_bytes());
    let csum = crc32_calc(&hdr[4..]);
    hdr[..4].copy_from_slice(&csum.to_le_bytes());
    io.write(area.offset, &hdr)?;
    Ok(())
}

/// Reads the VG metadata out of the first valid, non-ignored MDA.
///
/// The text area is a circular buffer: a record may wrap from the end of
/// the area back to just past the MDA header, so a short first read is
/// followed by a second read from the wrap point. This mirrors the
/// teacher's `PvHeader::read_metadata` exactly.
pub fn read_metadata<D: BlockDevice>(header: &PvHeader, io: &mut PageIo<D>) -> Result<ConfigTree> {
    for area in &header.metadata_areas {
        let rl = match read_mda_header(area, io)? {
            None => continue,
            Some(rl) => rl,
        };
        if rl.ignored || rl.size == 0 {
            continue;
        }

        let mut text = vec![0u8; rl.size as usize];
        let first_read = min(area.size - rl.offset, rl.size) as usize;
        let chunk = io.read(area.offset + rl.offset, first_read)?;
        text[..first_read].copy_from_slice(&chunk);

        if first_read != rl.size as usize {
            let rest = rl.size as usize - first_read;
            let chunk = io.read(area.offset + MDA_HEADER_SIZE, rest)?;
            text[first_read..].copy_from_slice(&chunk);
        }

        if rl.checksum != crc32_calc(&text) {
            return Err(Error::new(ErrorKind::Inconsistent, "MDA text checksum failure"));
        }

        return parse(&text);
    }
    Err(Error::new(ErrorKind::NotFound, "no valid metadata area"))
}

/// Appends `tree`'s rendering to every active MDA's cyclic text area,
/// always advancing past the previously committed record (wrapping to
/// just past the header if the new payload would not otherwise fit).
pub fn write_metadata<D: BlockDevice>(header: &PvHeader, io: &mut PageIo<D>, tree: &ConfigTree) -> Result<()> {
    let mut text = render(tree);
    text.push(0);

    for area in &header.metadata_areas {
        let rl = match read_mda_header(area, io)? {
            None => RawLocn {
                offset: MDA_HEADER_SIZE,
                size: 0,
                checksum: 0,
                ignored: false,
            },
            Some(rl) => rl,
        };
        if rl.ignored {
            continue;
        }

        let start_off = min(
            MDA_HEADER_SIZE,
            (align_to((rl.offset + rl.size) as usize, SECTOR_SIZE as usize) as u64) % area.size,
        );
        let tail_space = area.size - start_off;

        let written = if tail_space != 0 {
            let n = min(tail_space as usize, text.len());
            io.write(area.offset + start_off, &text[..n])?;
            n
        } else {
            0
        };

        if written != text.len() {
            io.write(area.offset + MDA_HEADER_SIZE, &text[written..])?;
        }

        let new_rl = RawLocn {
            offset: start_off,
            size: text.len() as u64,
            checksum: crc32_calc(&text),
            ignored: rl.ignored,
        };
        write_mda_header(area, io, &new_rl)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexer_round_trips_a_simple_section() {
        let text = b"vg1 {\n  id = \"abc\"\n  seqno = 3\n  flags = [\"A\", \"B\"]\n}\n";
        let tree = parse(text).unwrap();
        let vg1 = tree.section("vg1").unwrap();
        assert_eq!(vg1.get_str("id").unwrap(), "abc");
        assert_eq!(vg1.get_int("seqno", 0), 3);
        assert_eq!(vg1.get_str_list("flags"), vec!["A", "B"]);
    }

    #[test]
    fn render_then_parse_round_trips() {
        let mut inner = ConfigTree::new();
        inner.set("seqno", Value::Int(5));
        inner.set("name", Value::Str("hi".into()));
        let mut root = ConfigTree::new();
        root.set("vg1", Value::Section(inner));

        let buf = render(&root);
        let back = parse(&buf).unwrap();
        assert_eq!(back.section("vg1").unwrap().get_int("seqno", 0), 5);
    }

    #[test]
    fn vg_round_trips_through_configtree() {
        let mut vg = Vg::create(Uuid::create().unwrap(), "myvg", 8192);
        let pv = Pv::new(Uuid::create().unwrap(), DevId::new(8, 0), 1_048_576, 8192, 8192);
        vg.pv_add(pv).unwrap();
        let mut lv = Lv::new("lv1", "lvid-1");
        lv.append_segment(LvSegment::new(0, 4, "striped"));
        vg.lvs.insert(lv.name.clone(), lv);

        let tree = vg_to_configtree(&vg);
        let back = configtree_to_vg(&tree).unwrap();
        assert_eq!(back.name, "myvg");
        assert_eq!(back.extent_size, 8192);
        assert_eq!(back.pvs.len(), 1);
        assert_eq!(back.lvs["lv1"].segments.len(), 1);
    }

    #[test]
    fn metadata_cycle_writes_then_reads_back() {
        let dev = crate::device::io::MemDevice::new(4 * 1024 * 1024, 512);
        let mut io = PageIo::new(dev);

        let header = PvHeader {
            uuid: Uuid::create().unwrap(),
            size: 4 * 1024 * 1024,
            data_areas: vec![],
            metadata_areas: vec![PvArea {
                offset: 4096,
                size: 1024 * 1024,
            }],
        };

        let mut vg = Vg::create(Uuid::create().unwrap(), "vgx", 4096);
        let pv = Pv::new(Uuid::create().unwrap(), DevId::new(8, 0), 1_048_576, 4096, 4096);
        vg.pv_add(pv).unwrap();
        let tree = vg_to_configtree(&vg);

        write_metadata(&header, &mut io, &tree).unwrap();
        let back = read_metadata(&header, &mut io).unwrap();
        let vg_back = configtree_to_vg(&back).unwrap();
        assert_eq!(vg_back.name, "vgx");
    }
}
