//! Boolean trigram queries.
//!
//! A [`Query`] describes the trigrams that must be present in any
//! document matching a regular expression. The [`planner`] builds these
//! bottom-up from the parsed pattern; the index serializes them into
//! the store's boolean form.

pub mod planner;

use std::collections::HashSet;
use std::fmt;

pub use planner::plan;

/// Operator of a query node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
    /// Every document matches.
    All,
    /// No document matches.
    None,
    /// All trigrams and sub-queries must match.
    And,
    /// At least one trigram or sub-query must match.
    Or,
}

/// A boolean query over trigrams.
///
/// Invariants: `All` and `None` nodes carry no trigrams or sub-queries;
/// `trigram` is sorted and deduplicated and every entry is an exact
/// three-byte string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub op: QueryOp,
    pub trigram: Vec<String>,
    pub sub: Vec<Query>,
}

impl Query {
    pub fn all() -> Query {
        Query {
            op: QueryOp::All,
            trigram: Vec::new(),
            sub: Vec::new(),
        }
    }

    pub fn none() -> Query {
        Query {
            op: QueryOp::None,
            trigram: Vec::new(),
            sub: Vec::new(),
        }
    }

    fn and_node(trigram: Vec<String>) -> Query {
        Query {
            op: QueryOp::And,
            trigram,
            sub: Vec::new(),
        }
    }

    /// `self AND other`, simplified.
    pub fn and(self, other: Query) -> Query {
        self.and_or(other, QueryOp::And)
    }

    /// `self OR other`, simplified.
    pub fn or(self, other: Query) -> Query {
        self.and_or(other, QueryOp::Or)
    }

    fn and_or(mut self, mut other: Query, op: QueryOp) -> Query {
        // A node with a single sub-query and no trigrams is that sub-query.
        if self.trigram.is_empty() && self.sub.len() == 1 {
            self = self.sub.pop().unwrap();
        }
        if other.trigram.is_empty() && other.sub.len() == 1 {
            other = other.sub.pop().unwrap();
        }

        // If self => other then self AND other == self and
        // self OR other == other, and symmetrically. This also covers
        // the ALL/NONE identities.
        if self.implies(&other) {
            return if op == QueryOp::And { self } else { other };
        }
        if other.implies(&self) {
            return if op == QueryOp::And { other } else { self };
        }

        let self_atom = self.trigram.len() == 1 && self.sub.is_empty();
        let other_atom = other.trigram.len() == 1 && other.sub.is_empty();

        // Merge nodes of the matching operator. Single-trigram atoms
        // merge regardless of their nominal operator.
        if self.op == op && (other.op == op || other_atom) {
            self.trigram = union_strings(self.trigram, other.trigram);
            self.sub.extend(other.sub);
            return self;
        }
        if other.op == op && self_atom {
            other.trigram = union_strings(other.trigram, self.trigram);
            return other;
        }
        if self_atom && other_atom {
            self.op = op;
            self.trigram = union_strings(self.trigram, other.trigram);
            return self;
        }

        // If one side already has the right operator, absorb the other.
        if self.op == op {
            self.sub.push(other);
            return self;
        }
        if other.op == op {
            other.sub.push(self);
            return other;
        }

        // We are building an AND of ORs or an OR of ANDs. Factor out any
        // common trigrams first:
        //   (t AND a) OR (t AND b) == t AND (a OR b)
        //   (t OR a) AND (t OR b)  == t OR (a AND b)
        let common: Vec<String> = self
            .trigram
            .iter()
            .filter(|t| other.trigram.binary_search(t).is_ok())
            .cloned()
            .collect();
        if !common.is_empty() {
            self.trigram.retain(|t| common.binary_search(t).is_err());
            other.trigram.retain(|t| common.binary_search(t).is_err());
            let flipped = if op == QueryOp::And {
                QueryOp::Or
            } else {
                QueryOp::And
            };
            let rest = self.and_or(other, op);
            let factored = Query {
                op: flipped,
                trigram: common,
                sub: Vec::new(),
            };
            return factored.and_or(rest, flipped);
        }

        Query {
            op,
            trigram: Vec::new(),
            sub: vec![self, other],
        }
    }

    /// `self AND (OR over the trigrams of each string in strings)`.
    ///
    /// Every matching document contains one of the strings in full, so
    /// it must contain all trigrams of at least one of them. Strings
    /// shorter than three bytes guarantee nothing, and a three-byte
    /// window that is not valid UTF-8 cannot be expressed as a store
    /// term; both degrade toward ALL rather than risk excluding a match.
    pub fn and_trigrams(self, strings: &[Vec<u8>]) -> Query {
        if min_len(strings) < 3 {
            return self;
        }

        let mut or = Query::none();
        for s in strings {
            let mut trigrams = Vec::new();
            for window in s.windows(3) {
                let folded = [
                    window[0].to_ascii_lowercase(),
                    window[1].to_ascii_lowercase(),
                    window[2].to_ascii_lowercase(),
                ];
                if let Ok(t) = std::str::from_utf8(&folded) {
                    trigrams.push(t.to_string());
                }
            }
            trigrams.sort();
            trigrams.dedup();
            if trigrams.is_empty() {
                // Nothing expressible for this alternative; the whole
                // disjunction collapses to ALL.
                return self;
            }
            or = or.or(Query::and_node(trigrams));
        }
        self.and(or)
    }

    /// Whether `self` matching implies `other` matching. False negatives
    /// are fine; false positives are not.
    fn implies(&self, other: &Query) -> bool {
        if self.op == QueryOp::None || other.op == QueryOp::All {
            return true;
        }
        if self.op == QueryOp::All || other.op == QueryOp::None {
            return false;
        }

        if self.op == QueryOp::And
            || (self.op == QueryOp::Or && self.trigram.len() == 1 && self.sub.is_empty())
        {
            return trigrams_imply(&self.trigram, other);
        }

        if self.op == QueryOp::Or
            && other.op == QueryOp::Or
            && !self.trigram.is_empty()
            && self.sub.is_empty()
            && self
                .trigram
                .iter()
                .all(|t| other.trigram.binary_search(t).is_ok())
        {
            return true;
        }
        false
    }

    /// Evaluate the query against the set of trigrams of a document.
    pub fn matches(&self, trigrams: &HashSet<String>) -> bool {
        match self.op {
            QueryOp::All => true,
            QueryOp::None => false,
            QueryOp::And => {
                self.trigram.iter().all(|t| trigrams.contains(t))
                    && self.sub.iter().all(|q| q.matches(trigrams))
            }
            QueryOp::Or => {
                self.trigram.iter().any(|t| trigrams.contains(t))
                    || self.sub.iter().any(|q| q.matches(trigrams))
            }
        }
    }
}

/// Whether a conjunction of the trigrams `t` implies the query `q`.
fn trigrams_imply(t: &[String], q: &Query) -> bool {
    match q.op {
        QueryOp::Or => {
            q.sub.iter().any(|sub| trigrams_imply(t, sub))
                || t.iter().any(|tt| q.trigram.binary_search(tt).is_ok())
        }
        QueryOp::And => {
            q.sub.iter().all(|sub| trigrams_imply(t, sub))
                && q.trigram.iter().all(|tt| t.contains(tt))
        }
        _ => false,
    }
}

fn union_strings(mut a: Vec<String>, b: Vec<String>) -> Vec<String> {
    a.extend(b);
    a.sort();
    a.dedup();
    a
}

fn min_len(strings: &[Vec<u8>]) -> usize {
    strings.iter().map(|s| s.len()).min().unwrap_or(0)
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            QueryOp::All => write!(f, "+"),
            QueryOp::None => write!(f, "-"),
            QueryOp::And | QueryOp::Or => {
                let sep = if self.op == QueryOp::And { " " } else { "|" };
                let mut first = true;
                for t in &self.trigram {
                    if !first {
                        write!(f, "{}", sep)?;
                    }
                    first = false;
                    write!(f, "{:?}", t)?;
                }
                for q in &self.sub {
                    if !first {
                        write!(f, "{}", sep)?;
                    }
                    first = false;
                    write!(f, "({})", q)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri(s: &str) -> Query {
        Query::and_node(vec![s.to_string()])
    }

    #[test]
    fn and_with_all_is_identity() {
        let q = tri("abc");
        assert_eq!(Query::all().and(q.clone()), q);
        assert_eq!(q.clone().and(Query::all()), q);
    }

    #[test]
    fn or_with_none_is_identity() {
        let q = tri("abc");
        assert_eq!(Query::none().or(q.clone()), q);
        assert_eq!(q.clone().or(Query::none()), q);
    }

    #[test]
    fn and_with_none_absorbs() {
        assert_eq!(tri("abc").and(Query::none()), Query::none());
        assert_eq!(Query::none().and(tri("abc")), Query::none());
    }

    #[test]
    fn or_with_all_absorbs() {
        assert_eq!(tri("abc").or(Query::all()), Query::all());
        assert_eq!(Query::all().or(tri("abc")), Query::all());
    }

    #[test]
    fn atoms_merge() {
        let q = tri("abc").and(tri("bcd"));
        assert_eq!(q.op, QueryOp::And);
        assert_eq!(q.trigram, vec!["abc".to_string(), "bcd".to_string()]);
        assert!(q.sub.is_empty());
    }

    #[test]
    fn duplicate_trigrams_dedup() {
        let q = tri("abc").and(tri("abc"));
        assert_eq!(q, tri("abc"));
    }

    #[test]
    fn nested_same_op_flattens() {
        let q = tri("abc").and(tri("bcd")).and(tri("cde"));
        assert_eq!(q.op, QueryOp::And);
        assert_eq!(q.trigram.len(), 3);
        assert!(q.sub.is_empty());
    }

    #[test]
    fn common_trigram_factoring() {
        // (baz AND foo) OR (baz AND bar) == baz AND (foo OR bar)
        let left = Query::and_node(vec!["baz".into(), "foo".into()]);
        let right = Query::and_node(vec!["bar".into(), "baz".into()]);
        let q = left.or(right);
        assert_eq!(q.op, QueryOp::And);
        assert_eq!(q.trigram, vec!["baz".to_string()]);
        assert_eq!(q.sub.len(), 1);
        assert_eq!(q.sub[0].op, QueryOp::Or);
    }

    #[test]
    fn and_implied_by_superset_collapses() {
        // {abc, bcd} AND {abc} == {abc, bcd}
        let big = Query::and_node(vec!["abc".into(), "bcd".into()]);
        let small = tri("abc");
        assert_eq!(big.clone().and(small), big);
    }

    #[test]
    fn and_trigrams_short_string_is_noop() {
        let q = Query::all().and_trigrams(&[b"ab".to_vec()]);
        assert_eq!(q, Query::all());
    }

    #[test]
    fn and_trigrams_lowercases() {
        let q = Query::all().and_trigrams(&[b"HELLO".to_vec()]);
        assert_eq!(q.op, QueryOp::And);
        assert_eq!(
            q.trigram,
            vec!["ell".to_string(), "hel".to_string(), "llo".to_string()]
        );
    }

    #[test]
    fn and_trigrams_invalid_utf8_window_dropped() {
        // "aéé" is 61 C3 A9 C3 A9. The windows C3 A9 C3 and A9 C3 A9
        // split code points and must not become store terms; only the
        // leading "aé" window survives.
        let q = Query::all().and_trigrams(&["aéé".as_bytes().to_vec()]);
        assert_eq!(q.op, QueryOp::And);
        assert_eq!(q.trigram, vec!["aé".to_string()]);
    }

    #[test]
    fn and_trigrams_all_windows_invalid_is_noop() {
        // "éé" alone yields no valid window at all, so the string
        // contributes no constraint.
        let q = Query::all().and_trigrams(&["éé".as_bytes().to_vec()]);
        assert_eq!(q, Query::all());
    }

    #[test]
    fn matches_evaluates() {
        let q = Query::and_node(vec!["abc".into(), "bcd".into()]);
        let mut set = HashSet::new();
        set.insert("abc".to_string());
        assert!(!q.matches(&set));
        set.insert("bcd".to_string());
        assert!(q.matches(&set));
        assert!(Query::all().matches(&HashSet::new()));
        assert!(!Query::none().matches(&set));
    }

    #[test]
    fn reapplying_identities_is_stable() {
        let q = tri("abc").and(tri("bcd")).or(tri("abc").and(tri("cde")));
        let again = q.clone().and(Query::all()).or(Query::none());
        assert_eq!(q, again);
    }
}
