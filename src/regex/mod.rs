// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A small regex engine used by the device filter chain.
//!
//! This isn't meant to be general-purpose: it supports exactly the
//! syntax the original `lib/regex` parser does (concatenation, `|`,
//! `*`/`+`/`?`, parenthesized groups, `[...]`/`[^...]` charsets, `.`, and
//! `\n`/`\r`/`\t` escapes) and compiles a whole pattern *set* into one DFA
//! so that matching any one of N patterns against a device path costs a
//! single linear scan instead of N.
//!
//! `parser` builds the syntax tree (`lib/regex/parse_rx.c`); `matcher`
//! turns a tree per pattern into firstpos/lastpos/followpos sets and
//! subset-constructs the DFA (`lib/regex/matcher.c`).

mod matcher;
mod parser;

pub use matcher::Matcher;
pub use parser::{parse, Node, ParseError};
