// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Composable device filters, as `lib/filters/filter-regex.c`,
//! `filter-usable.c`, `filter-mpath.c` and `filter-persistent.h`.
//!
//! Each filter answers one yes/no question about a [`Device`]; a
//! [`Chain`] short-circuits on the first rejection, the same chaining
//! `dev_filter`s are composed with throughout that directory.

use std::collections::HashSet;

use crate::device::Device;
use crate::regex::Matcher;

pub trait Filter {
    fn passes_filter(&self, dev: &Device) -> bool;

    fn wipe(&mut self, _dev: &Device) {}
    fn destroy(&mut self) {}
}

/// Accepts everything; used in tests and as the identity element of a
/// chain.
pub struct AcceptAllFilter;

impl Filter for AcceptAllFilter {
    fn passes_filter(&self, _dev: &Device) -> bool {
        true
    }
}

/// Runs filters in order, rejecting as soon as one does.
pub struct Chain {
    filters: Vec<Box<dyn Filter>>,
}

impl Chain {
    pub fn new() -> Chain {
        Chain { filters: Vec::new() }
    }

    pub fn push(mut self, f: Box<dyn Filter>) -> Chain {
        self.filters.push(f);
        self
    }
}

impl Default for Chain {
    fn default() -> Chain {
        Chain::new()
    }
}

impl Filter for Chain {
    fn passes_filter(&self, dev: &Device) -> bool {
        self.filters.iter().all(|f| f.passes_filter(dev))
    }

    fn wipe(&mut self, dev: &Device) {
        for f in self.filters.iter_mut() {
            f.wipe(dev);
        }
    }

    fn destroy(&mut self) {
        for f in self.filters.iter_mut() {
            f.destroy();
        }
    }
}

/// One reject-or-accept rule: `"a|<pattern>|"` to accept matches,
/// `"r|<pattern>|"` to reject them.
pub enum Rule {
    Accept(String),
    Reject(String),
}

/// Regex-based allow/deny list. Precedence is first match wins, scanning
/// the rule list in the order given (§4.G: "earlier rules in the user
/// config dominate").
pub struct RegexFilter {
    rules: Vec<(Rule, Matcher)>,
}

impl RegexFilter {
    pub fn new(rules: Vec<Rule>) -> Result<RegexFilter, crate::regex::ParseError> {
        let compiled = rules
            .into_iter()
            .map(|r| {
                let pat = match &r {
                    Rule::Accept(p) | Rule::Reject(p) => p.clone(),
                };
                Matcher::new(&[pat]).map(|m| (r, m))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RegexFilter { rules: compiled })
    }
}

impl Filter for RegexFilter {
    fn passes_filter(&self, dev: &Device) -> bool {
        for (rule, matcher) in &self.rules {
            if matcher.matches(dev.name()) {
                return matches!(rule, Rule::Accept(_));
            }
        }
        // No rule matched: default accept, as the original filter does.
        true
    }
}

/// Rejects devices whose major number names a disallowed device type
/// (configured, not hardcoded, e.g. `loop` or bare `md`).
pub struct TypeFilter {
    disallowed_majors: HashSet<u32>,
}

impl TypeFilter {
    pub fn new(disallowed_majors: impl IntoIterator<Item = u32>) -> TypeFilter {
        TypeFilter {
            disallowed_majors: disallowed_majors.into_iter().collect(),
        }
    }
}

impl Filter for TypeFilter {
    fn passes_filter(&self, dev: &Device) -> bool {
        !self.disallowed_majors.contains(&dev.id.major)
    }
}

/// Minimum PV size and a set of reserved names a device can never be
/// usable as, e.g. `/dev/zero`.
pub struct UsableFilter {
    pub min_size_sectors: u64,
    pub reserved_names: HashSet<String>,
    /// Per-device size lookup, injected so this filter doesn't need to
    /// touch the real device itself.
    pub sizes: std::collections::HashMap<String, u64>,
}

impl Filter for UsableFilter {
    fn passes_filter(&self, dev: &Device) -> bool {
        if self.reserved_names.contains(dev.name()) {
            return false;
        }
        match self.sizes.get(dev.name()) {
            Some(&sz) => sz >= self.min_size_sectors,
            None => true,
        }
    }
}

/// Caches accept/reject decisions so repeated scans skip the expensive
/// filters behind it.
pub struct PersistentFilter<F: Filter> {
    inner: F,
    cache: std::cell::RefCell<std::collections::HashMap<String, bool>>,
}

impl<F: Filter> PersistentFilter<F> {
    pub fn new(inner: F) -> PersistentFilter<F> {
        PersistentFilter {
            inner,
            cache: std::cell::RefCell::new(std::collections::HashMap::new()),
        }
    }

    pub fn load(&mut self, entries: impl IntoIterator<Item = (String, bool)>) {
        self.cache.borrow_mut().extend(entries);
    }

    pub fn dump(&self) -> Vec<(String, bool)> {
        self.cache.borrow().iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    pub fn wipe_cache(&mut self) {
        self.cache.borrow_mut().clear();
    }
}

impl<F: Filter> Filter for PersistentFilter<F> {
    fn passes_filter(&self, dev: &Device) -> bool {
        if let Some(&cached) = self.cache.borrow().get(dev.name()) {
            return cached;
        }
        let result = self.inner.passes_filter(dev);
        self.cache.borrow_mut().insert(dev.name().to_string(), result);
        result
    }

    fn wipe(&mut self, dev: &Device) {
        self.cache.borrow_mut().remove(dev.name());
        self.inner.wipe(dev);
    }

    fn destroy(&mut self) {
        self.wipe_cache();
        self.inner.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DevId;

    fn dev(name: &str, major: u32) -> Device {
        Device::new(DevId::new(major, 0), name.to_string())
    }

    #[test]
    fn regex_filter_first_match_wins() {
        let f = RegexFilter::new(vec![
            Rule::Accept(r"sda".into()),
            Rule::Reject(r".*".into()),
        ])
        .unwrap();
        assert!(f.passes_filter(&dev("/dev/sda1", 8)));
        assert!(!f.passes_filter(&dev("/dev/sdb1", 8)));
    }

    #[test]
    fn type_filter_rejects_disallowed_major() {
        let f = TypeFilter::new([7]);
        assert!(!f.passes_filter(&dev("/dev/loop0", 7)));
        assert!(f.passes_filter(&dev("/dev/sda", 8)));
    }

    #[test]
    fn chain_short_circuits_on_first_reject() {
        let chain = Chain::new()
            .push(Box::new(TypeFilter::new([7])))
            .push(Box::new(AcceptAllFilter));
        assert!(!chain.passes_filter(&dev("/dev/loop0", 7)));
        assert!(chain.passes_filter(&dev("/dev/sda", 8)));
    }

    #[test]
    fn persistent_filter_memoises_decisions() {
        struct CountingFilter(std::cell::Cell<u32>);
        impl Filter for CountingFilter {
            fn passes_filter(&self, _dev: &Device) -> bool {
                self.0.set(self.0.get() + 1);
                true
            }
        }
        let pf = PersistentFilter::new(CountingFilter(std::cell::Cell::new(0)));
        let d = dev("/dev/sda", 8);
        pf.passes_filter(&d);
        pf.passes_filter(&d);
        assert_eq!(pf.inner.0.get(), 1);
    }
}
