//! Path assertion state machine.
//!
//! A [`PathAssertion`] decides, step by step, what to check in the store and
//! what to fetch for one (subject, path) pair. It performs no I/O: the driver
//! asks for the next [`Step`], carries it out and feeds the result back.
//!
//! Scan order is longest prefix first. Every confirmed non-empty prefix gets
//! the terms at its end refreshed. After refreshing a prefix shorter than the
//! path, the next longer prefix is checked again, since the fetched documents
//! may have extended the chain. Reaching the empty prefix ends the scan;
//! without full-depth confirmation the subject itself is fetched once (the
//! bounce) and the scan runs again. A second incomplete scan is final.
//!
//! Each assertion may request at most `2 * max_depth + 1` URIs. While the
//! bounce is still pending one request of that budget stays reserved for it.

use crate::path::AssertPath;
use crate::report::{FetchReport, PathAssertionReport};
use lodharvest_core::{NamedNode, Term};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReason {
    Wildcard,
    /// Refresh the ends of the confirmed prefix of this length.
    Refresh(usize),
    Bounce,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Ask the store for the terms reached by the prefix of length `depth`.
    Check { depth: usize, query: String, variable: String },
    Fetch { uris: Vec<String>, reason: FetchReason },
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Start,
    /// Next: check the prefix of length `depth`.
    Scanning { depth: usize },
    AwaitingCheck { depth: usize },
    Refreshing { depth: usize, targets: Vec<String> },
    Done,
}

#[derive(Debug, Clone)]
pub struct PathAssertion {
    subject: NamedNode,
    path: AssertPath,
    phase: Phase,
    bounced: bool,
    deepest: Option<usize>,
    fetched: HashSet<String>,
    fetch_calls: usize,
    budget: usize,
    fetches: Vec<FetchReport>,
    aborted: Option<String>,
}

impl PathAssertion {
    pub fn new(subject: NamedNode, path: AssertPath) -> Self {
        let budget = if path.is_wildcard() { 1 } else { 2 * path.max_depth() + 1 };
        Self {
            subject,
            path,
            phase: Phase::Start,
            bounced: false,
            deepest: None,
            fetched: HashSet::new(),
            fetch_calls: 0,
            budget,
            fetches: Vec::new(),
            aborted: None,
        }
    }

    pub fn subject(&self) -> &NamedNode {
        &self.subject
    }

    pub fn path(&self) -> &AssertPath {
        &self.path
    }

    pub fn bounced(&self) -> bool {
        self.bounced
    }

    /// Deepest prefix length confirmed so far.
    pub fn deepest(&self) -> usize {
        self.deepest.unwrap_or(0)
    }

    /// URIs handed out for fetching so far. Never exceeds [`Self::budget`].
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    pub fn is_success(&self) -> bool {
        self.aborted.is_none() && self.is_done() && self.deepest() == self.path.max_depth()
    }

    pub fn next_step(&mut self) -> Step {
        loop {
            match std::mem::replace(&mut self.phase, Phase::Done) {
                Phase::Start => {
                    if self.path.is_wildcard() {
                        self.deepest = Some(0);
                        return self.fetch(vec![self.subject.as_str().to_string()], FetchReason::Wildcard);
                    }
                    self.phase = Phase::Scanning { depth: self.path.max_depth() };
                }
                Phase::Scanning { depth } => {
                    if depth == 0 {
                        return self.end_scan();
                    }
                    let Some(query) = self.path.prefix_query(&self.subject, depth) else {
                        self.phase = Phase::Scanning { depth: depth - 1 };
                        continue;
                    };
                    self.phase = Phase::AwaitingCheck { depth };
                    return Step::Check {
                        depth,
                        query,
                        variable: AssertPath::prefix_variable(depth),
                    };
                }
                // no check result arrived; treat the prefix as unconfirmed
                Phase::AwaitingCheck { depth } => {
                    self.phase = Phase::Scanning { depth: depth - 1 };
                }
                Phase::Refreshing { depth, targets } => {
                    // every refresh spends budget, so climbing back up terminates
                    self.phase = if depth < self.path.max_depth() {
                        Phase::Scanning { depth: depth + 1 }
                    } else {
                        Phase::Scanning { depth: depth - 1 }
                    };
                    return self.fetch(targets, FetchReason::Refresh(depth));
                }
                Phase::Done => return Step::Done,
            }
        }
    }

    /// Terms reached by the checked prefix. Empty means not confirmed.
    pub fn on_checked(&mut self, objects: &[Term]) {
        let Phase::AwaitingCheck { depth } = self.phase else {
            return;
        };
        if objects.is_empty() {
            self.phase = Phase::Scanning { depth: depth - 1 };
            return;
        }

        self.deepest = Some(self.deepest().max(depth));
        let allowance = self.refresh_allowance();
        let mut targets: Vec<String> = Vec::new();
        for object in objects {
            if targets.len() >= allowance {
                break;
            }
            if let Term::NamedNode(node) = object {
                let uri = node.as_str();
                if !self.fetched.contains(uri) && !targets.iter().any(|t| t == uri) {
                    targets.push(uri.to_string());
                }
            }
        }
        self.phase = if targets.is_empty() {
            Phase::Scanning { depth: depth - 1 }
        } else {
            Phase::Refreshing { depth, targets }
        };
    }

    pub fn on_fetched(&mut self, report: FetchReport) {
        self.fetches.push(report);
    }

    /// Stop with a failure, e.g. after a store error or cancellation.
    pub fn abort(&mut self, reason: impl Into<String>) {
        self.aborted = Some(reason.into());
        self.phase = Phase::Done;
    }

    fn remaining(&self) -> usize {
        self.budget.saturating_sub(self.fetch_calls)
    }

    /// Requests a refresh may spend, keeping one back for a pending bounce.
    fn refresh_allowance(&self) -> usize {
        let reserve = usize::from(!self.bounced && self.deepest() < self.path.max_depth());
        self.remaining().saturating_sub(reserve)
    }

    fn fetch(&mut self, uris: Vec<String>, reason: FetchReason) -> Step {
        self.fetched.extend(uris.iter().cloned());
        self.fetch_calls += uris.len();
        Step::Fetch { uris, reason }
    }

    fn end_scan(&mut self) -> Step {
        if self.deepest() == self.path.max_depth() || self.bounced || self.remaining() == 0 {
            self.phase = Phase::Done;
            return Step::Done;
        }
        self.bounced = true;
        self.phase = Phase::Scanning { depth: self.path.max_depth() };
        self.fetch(vec![self.subject.as_str().to_string()], FetchReason::Bounce)
    }

    fn message(&self) -> String {
        if let Some(reason) = &self.aborted {
            return format!("aborted: {reason}");
        }
        if self.path.is_wildcard() {
            return format!("fetched {}", self.subject);
        }
        let max = self.path.max_depth();
        let depth = self.deepest();
        if depth == max {
            format!("path {} confirmed to full depth {max}", self.path)
        } else if depth == 0 {
            format!("no prefix of path {} confirmed (depth 0 of {max})", self.path)
        } else {
            format!(
                "path confirmed only up to {} (depth {depth} of {max})",
                self.path.render_prefix(depth)
            )
        }
    }

    pub fn report(&self) -> PathAssertionReport {
        PathAssertionReport {
            subject: self.subject.as_str().to_string(),
            path: self.path.to_string(),
            asserted_depth: self.deepest(),
            max_depth: self.path.max_depth(),
            bounced: self.bounced,
            success: self.is_success(),
            message: self.message(),
            fetches: self.fetches.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssertionId(usize);

/// Owns the runtime state of every (subject, path) pair of one task.
#[derive(Debug, Default)]
pub struct AssertionArena {
    slots: Vec<PathAssertion>,
}

impl AssertionArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, assertion: PathAssertion) -> AssertionId {
        self.slots.push(assertion);
        AssertionId(self.slots.len() - 1)
    }

    pub fn get(&self, id: AssertionId) -> Option<&PathAssertion> {
        self.slots.get(id.0)
    }

    pub fn get_mut(&mut self, id: AssertionId) -> Option<&mut PathAssertion> {
        self.slots.get_mut(id.0)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Disjoint mutable access, for driving assertions concurrently.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PathAssertion> {
        self.slots.iter_mut()
    }

    pub fn into_reports(self) -> Vec<PathAssertionReport> {
        self.slots.iter().map(PathAssertion::report).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefix::PrefixMap;
    use lodharvest_core::iri;

    fn node(s: &str) -> NamedNode {
        iri(s).unwrap()
    }

    fn nodes(prefix: &str, n: usize) -> Vec<Term> {
        (1..=n).map(|i| node(&format!("https://example.org/{prefix}{i}")).into()).collect()
    }

    fn assertion(path: &str) -> PathAssertion {
        let mut p = PrefixMap::new();
        p.bind("ex", "https://example.org/");
        PathAssertion::new(node("https://example.org/s"), AssertPath::parse(path, &p).unwrap())
    }

    #[test]
    fn wildcard_is_one_fetch() {
        let mut a = assertion("*");
        match a.next_step() {
            Step::Fetch { uris, reason } => {
                assert_eq!(uris, vec!["https://example.org/s"]);
                assert_eq!(reason, FetchReason::Wildcard);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(a.next_step(), Step::Done);
        assert!(a.is_success());
        assert_eq!(a.report().asserted_depth, 0);
        assert_eq!(a.fetch_calls(), 1);
        assert_eq!(a.budget(), 1);
    }

    #[test]
    fn full_path_present_needs_no_bounce() {
        let mut a = assertion("ex:a/ex:b");
        let end: Term = node("https://example.org/end").into();
        let mid: Term = node("https://example.org/mid").into();
        // depth 2 confirmed
        assert!(matches!(a.next_step(), Step::Check { depth: 2, .. }));
        a.on_checked(&[end.clone()]);
        assert!(matches!(a.next_step(), Step::Fetch { reason: FetchReason::Refresh(2), .. }));
        // depth 1 confirmed
        assert!(matches!(a.next_step(), Step::Check { depth: 1, .. }));
        a.on_checked(&[mid.clone()]);
        assert!(matches!(a.next_step(), Step::Fetch { reason: FetchReason::Refresh(1), .. }));
        // the refreshed middle is checked for a longer chain
        assert!(matches!(a.next_step(), Step::Check { depth: 2, .. }));
        a.on_checked(&[end]);
        assert!(matches!(a.next_step(), Step::Check { depth: 1, .. }));
        a.on_checked(&[mid]);
        assert_eq!(a.next_step(), Step::Done);
        assert!(a.is_success());
        assert!(!a.bounced());
        assert_eq!(a.fetch_calls(), 2);
    }

    #[test]
    fn refresh_of_short_prefix_rechecks_longer_one() {
        let mut a = assertion("ex:a/ex:b");
        assert!(matches!(a.next_step(), Step::Check { depth: 2, .. }));
        a.on_checked(&[]);
        assert!(matches!(a.next_step(), Step::Check { depth: 1, .. }));
        a.on_checked(&[node("https://example.org/mid").into()]);
        assert!(matches!(a.next_step(), Step::Fetch { reason: FetchReason::Refresh(1), .. }));
        // the refreshed document extended the chain
        assert!(matches!(a.next_step(), Step::Check { depth: 2, .. }));
        a.on_checked(&[lodharvest_core::Literal::new_simple_literal("e").into()]);
        assert!(matches!(a.next_step(), Step::Check { depth: 1, .. }));
        a.on_checked(&[node("https://example.org/mid").into()]);
        assert_eq!(a.next_step(), Step::Done);
        assert!(a.is_success());
        assert!(!a.bounced());
        assert_eq!(a.report().asserted_depth, 2);
    }

    #[test]
    fn nothing_known_bounces_once_then_fails() {
        let mut a = assertion("ex:a/ex:b");
        let mut fetches = 0;
        loop {
            match a.next_step() {
                Step::Check { .. } => a.on_checked(&[]),
                Step::Fetch { reason, .. } => {
                    assert_eq!(reason, FetchReason::Bounce);
                    fetches += 1;
                }
                Step::Done => break,
            }
        }
        assert_eq!(fetches, 1);
        assert!(a.bounced());
        assert!(!a.is_success());
        assert!(a.report().message.contains("depth 0 of 2"));
    }

    #[test]
    fn literal_ends_confirm_without_fetch() {
        let mut a = assertion("ex:name");
        assert!(matches!(a.next_step(), Step::Check { depth: 1, .. }));
        a.on_checked(&[lodharvest_core::Literal::new_simple_literal("x").into()]);
        assert_eq!(a.next_step(), Step::Done);
        assert!(a.is_success());
        assert_eq!(a.fetch_calls(), 0);
    }

    #[test]
    fn already_fetched_targets_are_skipped() {
        let mut a = assertion("ex:a/ex:b");
        let end = node("https://example.org/x");
        assert!(matches!(a.next_step(), Step::Check { depth: 2, .. }));
        a.on_checked(&[end.clone().into()]);
        assert!(matches!(a.next_step(), Step::Fetch { .. }));
        // the same term at depth 1 is not fetched again
        assert!(matches!(a.next_step(), Step::Check { depth: 1, .. }));
        a.on_checked(&[end.into()]);
        assert_eq!(a.next_step(), Step::Done);
        assert_eq!(a.fetch_calls(), 1);
    }

    #[test]
    fn many_ends_at_full_depth_are_capped() {
        let mut a = assertion("ex:a");
        assert_eq!(a.budget(), 3);
        assert!(matches!(a.next_step(), Step::Check { depth: 1, .. }));
        a.on_checked(&nodes("o", 5));
        match a.next_step() {
            Step::Fetch { uris, reason } => {
                assert_eq!(uris.len(), 3);
                assert_eq!(reason, FetchReason::Refresh(1));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(a.next_step(), Step::Done);
        assert!(a.is_success());
        assert_eq!(a.fetch_calls(), 3);
    }

    #[test]
    fn many_ends_keep_one_request_for_the_bounce() {
        let mut a = assertion("ex:a/ex:b");
        let mids = nodes("m", 10);
        let mut bounces = 0;
        loop {
            match a.next_step() {
                Step::Check { depth: 1, .. } => a.on_checked(&mids),
                Step::Check { .. } => a.on_checked(&[]),
                Step::Fetch { uris, reason } => {
                    assert!(!uris.is_empty());
                    if reason == FetchReason::Bounce {
                        bounces += 1;
                    }
                }
                Step::Done => break,
            }
        }
        assert_eq!(bounces, 1);
        assert_eq!(a.fetch_calls(), a.budget());
        assert_eq!(a.budget(), 5);
        assert!(!a.is_success());
    }

    #[test]
    fn partial_prefix_reports_deepest() {
        let mut a = assertion("ex:a/ex:b/ex:c");
        let mut mid = 0;
        loop {
            match a.next_step() {
                Step::Check { depth, .. } if depth == 1 => {
                    mid += 1;
                    a.on_checked(&[node(&format!("https://example.org/m{mid}")).into()])
                }
                Step::Check { .. } => a.on_checked(&[]),
                Step::Fetch { .. } => {}
                Step::Done => break,
            }
        }
        let report = a.report();
        assert!(!report.success);
        assert!(report.bounced);
        assert_eq!(report.asserted_depth, 1);
        assert_eq!(report.max_depth, 3);
        assert!(report.message.contains("<https://example.org/a>"));
        assert!(a.fetch_calls() <= 2 * 3 + 1);
    }

    #[test]
    fn abort_ends_with_failure() {
        let mut a = assertion("*");
        a.abort("cancelled");
        assert_eq!(a.next_step(), Step::Done);
        assert!(!a.is_success());
        assert!(a.report().message.starts_with("aborted"));
    }

    #[test]
    fn arena_hands_out_ids() {
        let mut arena = AssertionArena::new();
        let a = arena.insert(assertion("*"));
        let b = arena.insert(assertion("ex:a"));
        assert_ne!(a, b);
        assert_eq!(arena.len(), 2);
        assert!(arena.get(b).unwrap().path().max_depth() == 1);
        arena.get_mut(a).unwrap().abort("x");
        let reports = arena.into_reports();
        assert!(!reports[0].success);
    }
}
