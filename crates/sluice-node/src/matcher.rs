use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use sluice_core::{tokens, validate_pattern, SubjectError, FULL_WILDCARD, SINGLE_WILDCARD};
use tracing::trace;

/// Default number of subjects whose match results are memoized.
pub const DEFAULT_MATCH_CACHE_CAPACITY: usize = 1024;

/// Subscriber handle -> number of times it was inserted at this slot.
type Registrations<T> = HashMap<T, usize>;

struct Node<T> {
    literals: HashMap<String, Node<T>>,
    wildcard: Option<Box<Node<T>>>,
    /// Subscribers of `<path>.>`.
    full_wildcard: Registrations<T>,
    /// Subscribers whose pattern ends exactly here.
    terminal: Registrations<T>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            literals: HashMap::new(),
            wildcard: None,
            full_wildcard: HashMap::new(),
            terminal: HashMap::new(),
        }
    }
}

impl<T> Node<T> {
    fn is_empty(&self) -> bool {
        self.literals.is_empty()
            && self.wildcard.is_none()
            && self.full_wildcard.is_empty()
            && self.terminal.is_empty()
    }

    fn node_count(&self) -> usize {
        1 + self.literals.values().map(Node::node_count).sum::<usize>()
            + self.wildcard.as_deref().map_or(0, Node::node_count)
    }
}

#[derive(Clone, Copy)]
enum Slot {
    Terminal,
    FullWildcard,
}

/// Walks `pattern`, creating missing nodes, and returns the node and slot
/// the subscriber belongs in.
fn descend_or_create<'a, T>(mut node: &'a mut Node<T>, pattern: &str) -> (&'a mut Node<T>, Slot) {
    for token in tokens(pattern) {
        node = match token {
            FULL_WILDCARD => return (node, Slot::FullWildcard),
            SINGLE_WILDCARD => &mut **node.wildcard.get_or_insert_with(Box::default),
            literal => node.literals.entry(literal.to_string()).or_default(),
        };
    }
    (node, Slot::Terminal)
}

fn decrement<T: Eq + Hash>(set: &mut Registrations<T>, subscriber: &T) -> bool {
    let Some(count) = set.get_mut(subscriber) else {
        return false;
    };
    *count -= 1;
    if *count == 0 {
        set.remove(subscriber);
    }
    true
}

/// Removes one registration and prunes children left empty on the way back up.
fn remove_at<T: Eq + Hash>(node: &mut Node<T>, path: &[&str], subscriber: &T) -> bool {
    match path.split_first() {
        None => decrement(&mut node.terminal, subscriber),
        Some((&FULL_WILDCARD, _)) => decrement(&mut node.full_wildcard, subscriber),
        Some((&SINGLE_WILDCARD, rest)) => {
            let Some(child) = node.wildcard.as_deref_mut() else {
                return false;
            };
            let removed = remove_at(child, rest, subscriber);
            if removed && child.is_empty() {
                node.wildcard = None;
            }
            removed
        }
        Some((literal, rest)) => {
            let Some(child) = node.literals.get_mut(*literal) else {
                return false;
            };
            let removed = remove_at(child, rest, subscriber);
            if removed && child.is_empty() {
                node.literals.remove(*literal);
            }
            removed
        }
    }
}

fn collect<T: Eq + Hash + Clone>(root: &Node<T>, subject: &str) -> Vec<T> {
    let mut found: HashSet<&T> = HashSet::new();
    let mut frontier: Vec<&Node<T>> = vec![root];
    let mut next: Vec<&Node<T>> = Vec::new();
    for token in tokens(subject) {
        for node in frontier.drain(..) {
            // `>` needs at least one more token, which `token` is.
            found.extend(node.full_wildcard.keys());
            if let Some(child) = node.literals.get(token) {
                next.push(child);
            }
            if let Some(child) = node.wildcard.as_deref() {
                next.push(child);
            }
        }
        std::mem::swap(&mut frontier, &mut next);
        if frontier.is_empty() {
            break;
        }
    }
    for node in &frontier {
        found.extend(node.terminal.keys());
    }
    found.into_iter().cloned().collect()
}

/// Counters describing matcher activity since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatcherStats {
    pub inserts: u64,
    pub removes: u64,
    pub matches: u64,
    pub cache_hits: u64,
    pub cache_entries: usize,
}

struct Inner<T> {
    root: Node<T>,
    registrations: usize,
    cache: Option<LruCache<String, Vec<T>>>,
    stats: MatcherStats,
}

impl<T> Inner<T> {
    fn invalidate(&mut self) {
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
    }
}

/// Trie of subscription patterns with an optional LRU match cache.
///
/// Handles are identity-compared. Inserting the same (pattern, handle) pair
/// twice registers it twice; it must then be removed twice. All operations
/// take one lock, so a match never observes a half-applied mutation.
pub struct SubjectMatcher<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Eq + Hash + Clone> Default for SubjectMatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + Clone> SubjectMatcher<T> {
    /// Creates a matcher with a cache of [`DEFAULT_MATCH_CACHE_CAPACITY`] subjects.
    pub fn new() -> Self {
        Self::with_cache_capacity(DEFAULT_MATCH_CACHE_CAPACITY)
    }

    /// Creates a matcher caching up to `capacity` subjects; 0 disables caching.
    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                root: Node::default(),
                registrations: 0,
                cache: NonZeroUsize::new(capacity).map(LruCache::new),
                stats: MatcherStats::default(),
            }),
        }
    }

    /// Enables (or resizes) the match cache. A capacity of 0 disables it.
    pub fn enable_cache(&self, capacity: usize) {
        self.inner.lock().cache = NonZeroUsize::new(capacity).map(LruCache::new);
    }

    /// Disables the match cache; every match walks the trie.
    pub fn disable_cache(&self) {
        self.inner.lock().cache = None;
    }

    pub fn is_cache_enabled(&self) -> bool {
        self.inner.lock().cache.is_some()
    }

    /// Registers `subscriber` for `pattern`.
    pub fn insert(&self, pattern: &str, subscriber: T) -> Result<(), SubjectError> {
        validate_pattern(pattern)?;
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let (node, slot) = descend_or_create(&mut inner.root, pattern);
        let set = match slot {
            Slot::Terminal => &mut node.terminal,
            Slot::FullWildcard => &mut node.full_wildcard,
        };
        *set.entry(subscriber).or_insert(0) += 1;
        inner.registrations += 1;
        inner.stats.inserts += 1;
        inner.invalidate();
        trace!(pattern, registrations = inner.registrations, "subscription inserted");
        Ok(())
    }

    /// Removes one registration of `subscriber` for `pattern`.
    ///
    /// Returns whether a registration existed; a missing one is not an error.
    pub fn remove(&self, pattern: &str, subscriber: &T) -> bool {
        // Nothing can be registered under a malformed pattern.
        if validate_pattern(pattern).is_err() {
            return false;
        }
        let path: Vec<&str> = tokens(pattern).collect();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if !remove_at(&mut inner.root, &path, subscriber) {
            return false;
        }
        inner.registrations -= 1;
        inner.stats.removes += 1;
        inner.invalidate();
        trace!(pattern, registrations = inner.registrations, "subscription removed");
        true
    }

    /// Returns every subscriber whose pattern matches the literal `subject`.
    ///
    /// Each subscriber appears once; order is unspecified. Subjects with
    /// empty tokens match nothing.
    pub fn matches(&self, subject: &str) -> Vec<T> {
        if subject.is_empty() || tokens(subject).any(str::is_empty) {
            return Vec::new();
        }
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.stats.matches += 1;
        if let Some(hit) = inner.cache.as_mut().and_then(|cache| cache.get(subject)) {
            inner.stats.cache_hits += 1;
            return hit.clone();
        }
        let result = collect(&inner.root, subject);
        if let Some(cache) = inner.cache.as_mut() {
            cache.put(subject.to_string(), result.clone());
        }
        result
    }

    /// Number of live (pattern, subscriber) registrations.
    pub fn count(&self) -> usize {
        self.inner.lock().registrations
    }

    /// Number of live trie nodes, root included.
    pub fn node_count(&self) -> usize {
        self.inner.lock().root.node_count()
    }

    pub fn stats(&self) -> MatcherStats {
        let inner = self.inner.lock();
        MatcherStats {
            cache_entries: inner.cache.as_ref().map_or(0, LruCache::len),
            ..inner.stats
        }
    }
}
