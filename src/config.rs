// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! An opaque key → value/list configuration tree, used only to bootstrap
//! [`crate::context::ToolContext`]. This is a distinct instance of the
//! same section/value grammar `format::text` parses for on-disk VG
//! metadata (`lib/config/config.c` upstream), kept deliberately dumb:
//! `lvmcore` only ever reads the handful of keys `create_toolcontext`
//! names, never interprets the tree generally.

use std::collections::BTreeMap;

use crate::error::{Error, ErrorKind, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Section(ConfigTree),
}

/// A section of `key = value` / `key { ... }` entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigTree {
    entries: BTreeMap<String, Value>,
}

impl ConfigTree {
    pub fn new() -> ConfigTree {
        ConfigTree::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        match self.get(key) {
            Some(Value::Str(s)) => Ok(s),
            Some(_) => Err(Error::new(ErrorKind::Format, format!("{} is not a string", key))),
            None => Err(Error::new(ErrorKind::NotFound, format!("missing config key {}", key))),
        }
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.get(key) {
            Some(Value::Int(n)) => *n,
            _ => default,
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(Value::Int(n)) => *n != 0,
            _ => default,
        }
    }

    pub fn get_list(&self, key: &str) -> Vec<&Value> {
        match self.get(key) {
            Some(Value::List(l)) => l.iter().collect(),
            _ => Vec::new(),
        }
    }

    pub fn get_str_list(&self, key: &str) -> Vec<&str> {
        self.get_list(key)
            .into_iter()
            .filter_map(|v| match v {
                Value::Str(s) => Some(s.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn section(&self, key: &str) -> Option<&ConfigTree> {
        match self.get(key) {
            Some(Value::Section(s)) => Some(s),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Dotted-path lookup, e.g. `"devices/scan"`.
    pub fn get_path_str(&self, path: &str) -> Result<&str> {
        let (section, key) = split_path(path);
        match section {
            Some(s) => self
                .section(s)
                .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("missing section {}", s)))?
                .get_str(key),
            None => self.get_str(key),
        }
    }

    pub fn get_path_str_list(&self, path: &str) -> Vec<&str> {
        let (section, key) = split_path(path);
        match section {
            Some(s) => self.section(s).map(|t| t.get_str_list(key)).unwrap_or_default(),
            None => self.get_str_list(key),
        }
    }

    pub fn get_path_bool(&self, path: &str, default: bool) -> bool {
        let (section, key) = split_path(path);
        match section {
            Some(s) => self.section(s).map(|t| t.get_bool(key, default)).unwrap_or(default),
            None => self.get_bool(key, default),
        }
    }
}

fn split_path(path: &str) -> (Option<&str>, &str) {
    match path.rsplit_once('/') {
        Some((section, key)) => (Some(section), key),
        None => (None, path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_path_reads_into_a_section() {
        let mut devices = ConfigTree::new();
        devices.set("scan", Value::List(vec![Value::Str("/dev".into())]));
        let mut root = ConfigTree::new();
        root.set("devices", Value::Section(devices));

        assert_eq!(root.get_path_str_list("devices/scan"), vec!["/dev"]);
    }

    #[test]
    fn missing_key_reports_not_found() {
        let root = ConfigTree::new();
        let err = root.get_path_str("log/level").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn bool_defaults_when_absent() {
        let root = ConfigTree::new();
        assert!(root.get_path_bool("devices/sysfs_scan", true));
        assert!(!root.get_path_bool("devices/sysfs_scan", false));
    }
}
