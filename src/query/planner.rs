//! Translation of parsed regular expressions into trigram queries.
//!
//! [`plan`] produces a [`Query`] that is *sound*: every string matched
//! by the pattern satisfies the query over its set of trigrams. It is
//! also as *tight* as we can make it cheaply, so the store rejects as
//! many non-matching documents as possible.
//!
//! The analysis runs bottom-up over the parsed syntax tree, tracking
//! for each sub-expression what is known about its match set: the exact
//! strings it can match (when finite and small), the possible prefixes
//! and suffixes, whether it can match the empty string, and a query of
//! trigrams that must appear in any match. Sets are kept small; when
//! they grow past their bounds the information they carry is first
//! harvested into the trigram query and then truncated, so tightness
//! survives as conjunctions of trigrams.

use regex_syntax::hir::{Class, Hir, HirKind};

use crate::query::Query;

/// Bound on the cardinality of an exact match set.
const MAX_EXACT: usize = 7;

/// Bound on the cardinality of prefix/suffix sets after simplification.
const MAX_SET: usize = 20;

/// Character classes wider than this are treated as "any character".
const MAX_CLASS: u64 = 4;

/// Parse `pattern` (Perl-flavored, inline flags allowed) and plan the
/// trigram query for it. Never fails on a parseable pattern; degenerate
/// patterns such as `.*` plan to the ALL query.
pub fn plan(pattern: &str) -> Result<Query, regex_syntax::Error> {
    let hir = regex_syntax::parse(pattern)?;
    Ok(query_for(&hir))
}

/// Plan the trigram query for an already-parsed pattern.
pub fn query_for(hir: &Hir) -> Query {
    let mut info = analyze(hir);
    info.simplify(true);
    info.add_exact();
    info.query
}

/// What the analysis knows about the set of strings a sub-expression
/// can match.
struct RegexInfo {
    /// Whether the empty string is among the matches.
    can_empty: bool,
    /// The exact set of match strings, or `None` when unknown or
    /// unbounded. When set, `prefix` and `suffix` are unused.
    exact: Option<Vec<Vec<u8>>>,
    /// Byte strings one of which starts any match.
    prefix: Vec<Vec<u8>>,
    /// Byte strings one of which ends any match.
    suffix: Vec<Vec<u8>>,
    /// Trigrams that must appear somewhere in any match.
    query: Query,
}

/// Matches anything, including the empty string. The result for
/// sub-expressions we cannot see through, e.g. `x*`.
fn any_match() -> RegexInfo {
    RegexInfo {
        can_empty: true,
        exact: None,
        prefix: vec![Vec::new()],
        suffix: vec![Vec::new()],
        query: Query::all(),
    }
}

/// Matches some single character.
fn any_char() -> RegexInfo {
    RegexInfo {
        can_empty: false,
        exact: None,
        prefix: vec![Vec::new()],
        suffix: vec![Vec::new()],
        query: Query::all(),
    }
}

/// Matches nothing at all.
fn no_match() -> RegexInfo {
    RegexInfo {
        can_empty: false,
        exact: None,
        prefix: Vec::new(),
        suffix: Vec::new(),
        query: Query::none(),
    }
}

/// Matches exactly the empty string. Also the result for zero-width
/// assertions such as `^` and `$`.
fn empty_string() -> RegexInfo {
    RegexInfo {
        can_empty: true,
        exact: Some(vec![Vec::new()]),
        prefix: Vec::new(),
        suffix: Vec::new(),
        query: Query::all(),
    }
}

fn exact_set(strings: Vec<Vec<u8>>) -> RegexInfo {
    let mut info = RegexInfo {
        can_empty: false,
        exact: Some(strings),
        prefix: Vec::new(),
        suffix: Vec::new(),
        query: Query::all(),
    };
    info.simplify(false);
    info
}

fn analyze(hir: &Hir) -> RegexInfo {
    match hir.kind() {
        HirKind::Empty | HirKind::Look(_) => empty_string(),

        HirKind::Literal(lit) => {
            if lit.0.is_empty() {
                empty_string()
            } else {
                exact_set(vec![lit.0.to_vec()])
            }
        }

        HirKind::Class(class) => analyze_class(class),

        HirKind::Capture(cap) => analyze(&cap.sub),

        HirKind::Concat(subs) => match subs.len() {
            0 => empty_string(),
            1 => analyze(&subs[0]),
            _ => {
                let mut info = concat(analyze(&subs[0]), analyze(&subs[1]));
                for sub in &subs[2..] {
                    info = concat(info, analyze(sub));
                }
                info
            }
        },

        HirKind::Alternation(subs) => match subs.len() {
            0 => no_match(),
            1 => analyze(&subs[0]),
            _ => {
                let mut info = alternate(analyze(&subs[0]), analyze(&subs[1]));
                for sub in &subs[2..] {
                    info = alternate(info, analyze(sub));
                }
                info
            }
        },

        HirKind::Repetition(rep) => {
            if rep.min == 0 && rep.max == Some(1) {
                // x? matches x or the empty string.
                return alternate(analyze(&rep.sub), empty_string());
            }
            if rep.min == 0 {
                // x* tells us nothing; assume the worst.
                return any_match();
            }
            // x+ and x{n,}: at least one x, so prefixes, suffixes and
            // required trigrams carry over, but exactness is lost.
            let mut info = analyze(&rep.sub);
            if let Some(exact) = info.exact.take() {
                info.prefix = exact.clone();
                info.suffix = exact;
            }
            info.simplify(false);
            info
        }
    }
}

/// Analyze a character class: materialize small ones as exact sets,
/// overestimate wide ones as "any character".
fn analyze_class(class: &Class) -> RegexInfo {
    match class {
        Class::Unicode(cls) => {
            let mut count: u64 = 0;
            for range in cls.iter() {
                count += u64::from(range.end() as u32) - u64::from(range.start() as u32) + 1;
                if count > MAX_CLASS {
                    return any_char();
                }
            }
            if count == 0 {
                return no_match();
            }
            let mut strings = Vec::new();
            for range in cls.iter() {
                for cp in range.start() as u32..=range.end() as u32 {
                    if let Some(ch) = char::from_u32(cp) {
                        let mut buf = [0u8; 4];
                        strings.push(ch.encode_utf8(&mut buf).as_bytes().to_vec());
                    }
                }
            }
            exact_set(strings)
        }
        Class::Bytes(cls) => {
            let mut count: u64 = 0;
            for range in cls.iter() {
                count += u64::from(range.end()) - u64::from(range.start()) + 1;
                if count > MAX_CLASS {
                    return any_char();
                }
            }
            if count == 0 {
                return no_match();
            }
            let mut strings = Vec::new();
            for range in cls.iter() {
                for b in range.start()..=range.end() {
                    strings.push(vec![b]);
                }
            }
            exact_set(strings)
        }
    }
}

/// Combine the analyses of `x` and `y` into the analysis of `xy`.
fn concat(x: RegexInfo, y: RegexInfo) -> RegexInfo {
    let mut out = RegexInfo {
        can_empty: x.can_empty && y.can_empty,
        exact: None,
        prefix: Vec::new(),
        suffix: Vec::new(),
        query: x.query.and(y.query),
    };

    match (&x.exact, &y.exact) {
        (Some(xe), Some(ye)) => {
            out.exact = Some(cross(xe, ye, false));
        }
        _ => {
            if let Some(xe) = &x.exact {
                out.prefix = cross(xe, &y.prefix, false);
            } else {
                out.prefix = x.prefix.clone();
                if x.can_empty {
                    out.prefix = union(out.prefix, y.prefix.clone(), false);
                }
            }
            if let Some(ye) = &y.exact {
                out.suffix = cross(&x.suffix, ye, true);
            } else {
                out.suffix = y.suffix.clone();
                if y.can_empty {
                    out.suffix = union(out.suffix, x.suffix.clone(), true);
                }
            }
        }
    }

    // If every string across the boundary between x and y is at least
    // three bytes long, some trigram spanning the boundary must be
    // present, and it is not necessarily accounted for in the new
    // prefix or suffix sets.
    if x.exact.is_none()
        && y.exact.is_none()
        && x.suffix.len() <= MAX_SET
        && y.prefix.len() <= MAX_SET
        && min_len(&x.suffix) + min_len(&y.prefix) >= 3
    {
        out.query = out.query.and_trigrams(&cross(&x.suffix, &y.prefix, false));
    }

    out.simplify(false);
    out
}

/// Combine the analyses of `x` and `y` into the analysis of `x|y`.
fn alternate(mut x: RegexInfo, mut y: RegexInfo) -> RegexInfo {
    let mut out = RegexInfo {
        can_empty: x.can_empty || y.can_empty,
        exact: None,
        prefix: Vec::new(),
        suffix: Vec::new(),
        query: Query::all(),
    };

    match (x.exact.take(), y.exact.take()) {
        (Some(xe), Some(ye)) => {
            out.exact = Some(union(xe, ye, false));
        }
        (Some(xe), None) => {
            out.prefix = union(xe.clone(), y.prefix.clone(), false);
            out.suffix = union(xe.clone(), y.suffix.clone(), true);
            // x is losing its exactness; keep its trigrams.
            x.query = x.query.and_trigrams(&xe);
        }
        (None, Some(ye)) => {
            out.prefix = union(x.prefix.clone(), ye.clone(), false);
            out.suffix = union(x.suffix.clone(), ye.clone(), true);
            y.query = y.query.and_trigrams(&ye);
        }
        (None, None) => {
            out.prefix = union(x.prefix.clone(), y.prefix.clone(), false);
            out.suffix = union(x.suffix.clone(), y.suffix.clone(), true);
        }
    }

    out.query = x.query.or(y.query);
    out.simplify(false);
    out
}

impl RegexInfo {
    /// Conjoin the trigrams implied by the exact set into the query.
    fn add_exact(&mut self) {
        if let Some(exact) = &self.exact {
            let q = std::mem::replace(&mut self.query, Query::all());
            self.query = q.and_trigrams(exact);
        }
    }

    /// Bound the sizes of the exact, prefix and suffix sets, harvesting
    /// trigrams before discarding information.
    fn simplify(&mut self, force: bool) {
        let needs_flush = match &mut self.exact {
            Some(exact) => {
                clean(exact, false);
                exact.len() > MAX_EXACT
                    || (min_len(exact) >= 3 && force)
                    || min_len(exact) >= 4
            }
            None => false,
        };

        if needs_flush {
            // Too many exact strings, or strings long enough that
            // their trigrams say it all. Keep the trigrams in the
            // query and reduce the strings to prefix/suffix seeds.
            self.add_exact();
            let exact = self.exact.take().unwrap();
            for s in exact {
                if s.len() < 3 {
                    self.prefix.push(s.clone());
                    self.suffix.push(s);
                } else {
                    self.prefix.push(s[..2].to_vec());
                    self.suffix.push(s[s.len() - 2..].to_vec());
                }
            }
        }

        if self.exact.is_none() {
            self.simplify_set(false);
            self.simplify_set(true);
        }
    }

    /// Shrink the prefix (or suffix) set. Long strings and large sets
    /// are not worth carrying around: their trigrams go into the query,
    /// then the strings are truncated until the set is small.
    fn simplify_set(&mut self, is_suffix: bool) {
        let mut set = std::mem::take(if is_suffix {
            &mut self.suffix
        } else {
            &mut self.prefix
        });
        clean(&mut set, is_suffix);

        let q = std::mem::replace(&mut self.query, Query::all());
        self.query = q.and_trigrams(&set);

        let mut n = 3usize;
        while n == 3 || set.len() > MAX_SET {
            for s in set.iter_mut() {
                if s.len() >= n {
                    if is_suffix {
                        *s = s[s.len() - (n - 1)..].to_vec();
                    } else {
                        s.truncate(n - 1);
                    }
                }
            }
            clean(&mut set, is_suffix);
            if n == 1 {
                break;
            }
            n -= 1;
        }

        // Drop entries subsumed by a shorter neighbor: knowing "ab" is
        // a possible prefix makes "abc" redundant.
        let mut kept: Vec<Vec<u8>> = Vec::with_capacity(set.len());
        for s in set {
            let redundant = kept.last().is_some_and(|prev: &Vec<u8>| {
                if is_suffix {
                    s.ends_with(prev)
                } else {
                    s.starts_with(prev)
                }
            });
            if !redundant {
                kept.push(s);
            }
        }

        if is_suffix {
            self.suffix = kept;
        } else {
            self.prefix = kept;
        }
    }
}

/// Sort and deduplicate a string set. Suffix sets order by reversed
/// bytes so that redundancy pruning can compare neighbors.
fn clean(set: &mut Vec<Vec<u8>>, is_suffix: bool) {
    if is_suffix {
        set.sort_by(|a, b| a.iter().rev().cmp(b.iter().rev()));
    } else {
        set.sort();
    }
    set.dedup();
}

/// Cross product: every string of `a` concatenated with every string
/// of `b`.
fn cross(a: &[Vec<u8>], b: &[Vec<u8>], is_suffix: bool) -> Vec<Vec<u8>> {
    let mut out = Vec::with_capacity(a.len() * b.len());
    for x in a {
        for y in b {
            let mut s = Vec::with_capacity(x.len() + y.len());
            s.extend_from_slice(x);
            s.extend_from_slice(y);
            out.push(s);
        }
    }
    clean(&mut out, is_suffix);
    out
}

fn union(mut a: Vec<Vec<u8>>, b: Vec<Vec<u8>>, is_suffix: bool) -> Vec<Vec<u8>> {
    a.extend(b);
    clean(&mut a, is_suffix);
    a
}

fn min_len(set: &[Vec<u8>]) -> usize {
    set.iter().map(|s| s.len()).min().unwrap_or(0)
}
