// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! NFA-to-DFA compilation and matching, as `lib/regex/matcher.c`.
//!
//! All patterns given to [`Matcher::new`] are joined into a single regex
//! `(.*(p0)\0)|(.*(p1)\0)|...` and compiled into one DFA, so testing a
//! path against N patterns costs one linear scan rather than N. The
//! trailing NUL in each alternative is never part of any real path; it
//! exists purely so the DFA can mark which alternative matched last.

use std::collections::HashMap;

use super::parser::{self, Node, ParseError};
use crate::collections::BitSet;

const TARGET_TRANS: usize = 0;

enum RawNode {
    Charset(BitSet),
    Cat(usize, usize),
    Or(usize, usize),
    Star(usize),
    Plus(usize),
    Quest(usize),
}

fn flatten(node: &Node, out: &mut Vec<RawNode>) -> usize {
    match node {
        Node::Charset(bs) => {
            out.push(RawNode::Charset((**bs).clone()));
            out.len() - 1
        }
        Node::Cat(l, r) => {
            let li = flatten(l, out);
            let ri = flatten(r, out);
            out.push(RawNode::Cat(li, ri));
            out.len() - 1
        }
        Node::Or(l, r) => {
            let li = flatten(l, out);
            let ri = flatten(r, out);
            out.push(RawNode::Or(li, ri));
            out.len() - 1
        }
        Node::Star(inner) => {
            let ii = flatten(inner, out);
            out.push(RawNode::Star(ii));
            out.len() - 1
        }
        Node::Plus(inner) => {
            let ii = flatten(inner, out);
            out.push(RawNode::Plus(ii));
            out.len() - 1
        }
        Node::Quest(inner) => {
            let ii = flatten(inner, out);
            out.push(RawNode::Quest(ii));
            out.len() - 1
        }
    }
}

struct Annotated {
    nodes: Vec<RawNode>,
    firstpos: Vec<BitSet>,
    lastpos: Vec<BitSet>,
    followpos: Vec<BitSet>,
    nullable: Vec<bool>,
    /// 1-based rank of the pattern this node's trailing marker belongs
    /// to, or 0 if this node isn't a marker.
    final_rank: Vec<u32>,
}

fn annotate(nodes: Vec<RawNode>) -> Annotated {
    let n = nodes.len();
    let mut firstpos: Vec<BitSet> = (0..n).map(|_| BitSet::new(n)).collect();
    let mut lastpos: Vec<BitSet> = (0..n).map(|_| BitSet::new(n)).collect();
    let mut followpos: Vec<BitSet> = (0..n).map(|_| BitSet::new(n)).collect();
    let mut nullable = vec![false; n];
    let mut final_rank = vec![0u32; n];
    let mut next_rank = 1u32;

    for i in 0..n {
        match &nodes[i] {
            RawNode::Charset(bs) => {
                if bs.get(TARGET_TRANS) {
                    final_rank[i] = next_rank;
                    next_rank += 1;
                }
                firstpos[i].set(i);
                lastpos[i].set(i);
                nullable[i] = false;
            }
            RawNode::Cat(l, r) => {
                let (l, r) = (*l, *r);
                if nullable[l] {
                    let (a, b) = (firstpos[l].clone(), firstpos[r].clone());
                    firstpos[i].union_of(&a, &b);
                } else {
                    firstpos[i] = firstpos[l].clone();
                }
                if nullable[r] {
                    let (a, b) = (lastpos[l].clone(), lastpos[r].clone());
                    lastpos[i].union_of(&a, &b);
                } else {
                    lastpos[i] = lastpos[r].clone();
                }
                nullable[i] = nullable[l] && nullable[r];

                let first_r = firstpos[r].clone();
                for j in lastpos[l].iter() {
                    followpos[j].union_with(&first_r);
                }
            }
            RawNode::Or(l, r) => {
                let (l, r) = (*l, *r);
                let (fl, fr) = (firstpos[l].clone(), firstpos[r].clone());
                firstpos[i].union_of(&fl, &fr);
                let (ll, lr) = (lastpos[l].clone(), lastpos[r].clone());
                lastpos[i].union_of(&ll, &lr);
                nullable[i] = nullable[l] || nullable[r];
            }
            RawNode::Plus(inner) => {
                let inner = *inner;
                firstpos[i] = firstpos[inner].clone();
                lastpos[i] = lastpos[inner].clone();
                nullable[i] = nullable[inner];

                let first_i = firstpos[i].clone();
                for j in lastpos[i].iter() {
                    followpos[j].union_with(&first_i);
                }
            }
            RawNode::Star(inner) => {
                let inner = *inner;
                firstpos[i] = firstpos[inner].clone();
                lastpos[i] = lastpos[inner].clone();
                nullable[i] = true;

                let first_i = firstpos[i].clone();
                for j in lastpos[i].iter() {
                    followpos[j].union_with(&first_i);
                }
            }
            RawNode::Quest(inner) => {
                let inner = *inner;
                firstpos[i] = firstpos[inner].clone();
                lastpos[i] = lastpos[inner].clone();
                nullable[i] = true;
            }
        }
    }

    Annotated {
        nodes,
        firstpos,
        lastpos,
        followpos,
        nullable,
        final_rank,
    }
}

struct DfaState {
    /// Highest pattern rank accepted at this state, 0 if none.
    final_rank: u32,
    lookup: Box<[Option<usize>; 256]>,
}

/// A compiled, DFA-backed set of patterns.
pub struct Matcher {
    states: Vec<DfaState>,
    start: usize,
}

impl Matcher {
    /// Compile `patterns` into one DFA. Patterns are numbered from zero
    /// in the order given; [`Matcher::test`] returns that index on match.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Matcher, ParseError> {
        if patterns.is_empty() {
            return Err(ParseError("no patterns given".into()));
        }

        let joined = patterns
            .iter()
            .map(|p| format!("(.*({})\u{0})", p.as_ref()))
            .collect::<Vec<_>>()
            .join("|");
        let tree = parser::parse(&joined)?;

        let mut raw = Vec::new();
        let root = flatten(&tree, &mut raw);
        let ann = annotate(raw);
        let _ = root;

        Ok(Matcher::build(&ann))
    }

    fn build(ann: &Annotated) -> Matcher {
        let n = ann.nodes.len();
        let mut states: Vec<DfaState> = Vec::new();
        let mut memo: HashMap<BitSet, usize> = HashMap::new();

        let root_firstpos = {
            // Root is always the last node appended by flatten().
            ann.firstpos[n - 1].clone()
        };

        states.push(DfaState {
            final_rank: 0,
            lookup: Box::new([None; 256]),
        });
        memo.insert(root_firstpos.clone(), 0);

        let mut queue = vec![(0usize, root_firstpos)];
        while let Some((state_id, bits)) = queue.pop() {
            for a in 0..256usize {
                let mut union = BitSet::new(n);
                let mut any = false;
                let mut final_rank = states[state_id].final_rank;

                for i in bits.iter() {
                    if let RawNode::Charset(cs) = &ann.nodes[i] {
                        if cs.get(a) {
                            if a == TARGET_TRANS && ann.final_rank[i] > 0 {
                                final_rank = ann.final_rank[i];
                            }
                            union.union_with(&ann.followpos[i]);
                            any = true;
                        }
                    }
                }

                if a == TARGET_TRANS {
                    states[state_id].final_rank = final_rank;
                }

                if !any {
                    continue;
                }

                let next_id = match memo.get(&union) {
                    Some(&id) => id,
                    None => {
                        let id = states.len();
                        states.push(DfaState {
                            final_rank: 0,
                            lookup: Box::new([None; 256]),
                        });
                        memo.insert(union.clone(), id);
                        queue.push((id, union.clone()));
                        id
                    }
                };
                states[state_id].lookup[a] = Some(next_id);
            }
        }

        Matcher { states, start: 0 }
    }

    /// Run `s` through the DFA and return the 0-based index of the
    /// highest-ranked pattern that matched, or `None` if none did.
    pub fn test(&self, s: &[u8]) -> Option<usize> {
        let mut cs = self.start;
        let mut best = 0u32;
        for &b in s {
            match self.states[cs].lookup[b as usize] {
                Some(next) => cs = next,
                None => break,
            }
            let fr = self.states[cs].final_rank;
            if fr > best {
                best = fr;
            }
        }
        if best > 0 {
            Some((best - 1) as usize)
        } else {
            None
        }
    }

    /// Convenience for when only a yes/no answer is needed.
    pub fn matches(&self, s: &str) -> bool {
        self.test(s.as_bytes()).is_some()
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_any_of_several_patterns() {
        let m = Matcher::new(&["sda[0-9]*", "dm-[0-9]+"]).unwrap();
        assert!(m.matches("/dev/sda1"));
        assert!(m.matches("/dev/dm-3"));
        assert!(!m.matches("/dev/sr0"));
    }

    #[test]
    fn test_reports_matching_pattern_index() {
        let m = Matcher::new(&["loop", "sd"]).unwrap();
        assert_eq!(m.test(b"sda"), Some(1));
    }

    #[test]
    fn rejects_non_matching_strings() {
        let m = Matcher::new(&["cdrom"]).unwrap();
        assert!(!m.matches("/dev/sda1"));
    }

    #[test]
    fn single_pattern_matches_substring_by_default() {
        let m = Matcher::new(&["loop"]).unwrap();
        assert!(m.matches("/dev/loop0"));
    }

    #[test]
    fn propagates_parse_errors() {
        assert!(Matcher::new(&["[unterminated"]).is_err());
    }
}
