//! `TrieNode` — a single edge/vertex pair in the compressed pattern trie.
//!
//! A node owns the label of the edge that leads to it, a fan-out of literal
//! children keyed by their first character, an optional wildcard child
//! (structural, never encoded into a label), and the handler sets that fire
//! when a dispatched name ends exactly here.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexSet;
use log::trace;

use super::kmp;
use super::segment::longest_common_prefix;
use crate::handler::HandlerId;

pub(crate) struct TrieNode {
    pub(crate) label: Vec<char>,
    pub(crate) children: HashMap<char, Box<TrieNode>>,
    pub(crate) wildcard: Option<Box<TrieNode>>,
    pub(crate) permanent: IndexSet<HandlerId>,
    pub(crate) oneshot: IndexSet<HandlerId>,
    failure: RefCell<Option<Rc<[usize]>>>,
}

impl TrieNode {
    pub(crate) fn new(label: Vec<char>) -> Self {
        Self {
            label,
            children: HashMap::new(),
            wildcard: None,
            permanent: IndexSet::new(),
            oneshot: IndexSet::new(),
            failure: RefCell::new(None),
        }
    }

    /// Length, in chars, of the common prefix between this node's label and
    /// `query[from..]`.
    pub(crate) fn longest_prefix_match(&self, query: &[char], from: usize) -> usize {
        longest_common_prefix(&self.label, query, from)
    }

    /// Lazily computed, cached KMP failure table for this node's label.
    pub(crate) fn failure_table(&self) -> Rc<[usize]> {
        if let Some(cached) = self.failure.borrow().as_ref() {
            return Rc::clone(cached);
        }
        let table: Rc<[usize]> = Rc::from(kmp::failure_table(&self.label));
        *self.failure.borrow_mut() = Some(Rc::clone(&table));
        table
    }

    fn invalidate_failure(&mut self) {
        *self.failure.borrow_mut() = None;
    }

    /// Splits `child` at `at` chars into a new parent holding `child`'s
    /// former prefix, with `child` demoted to hold the suffix.
    ///
    /// `at` must be a proper prefix length: `0 < at < child.label.len()`.
    pub(crate) fn split_off(mut child: Box<TrieNode>, at: usize) -> Box<TrieNode> {
        debug_assert!(at > 0 && at < child.label.len());
        let parent_label: Vec<char> = child.label[..at].to_vec();
        let suffix: Vec<char> = child.label[at..].to_vec();
        let key = suffix[0];
        trace!(
            "split at {}: parent label {:?}, demoted suffix {:?}",
            at,
            parent_label,
            suffix
        );
        child.label = suffix;
        child.invalidate_failure();
        let mut parent = Box::new(TrieNode::new(parent_label));
        parent.children.insert(key, child);
        parent
    }

    /// Removes `handler` (or, if `None`, every handler) from this node.
    /// Returns whether anything was actually removed.
    pub(crate) fn erase_handlers(&mut self, handler: Option<HandlerId>) -> bool {
        match handler {
            Some(h) => {
                if self.permanent.shift_remove(&h) {
                    true
                } else {
                    self.oneshot.shift_remove(&h)
                }
            }
            None => {
                if self.permanent.is_empty() && self.oneshot.is_empty() {
                    false
                } else {
                    self.permanent.clear();
                    self.oneshot.clear();
                    true
                }
            }
        }
    }

    /// True iff this node holds no handlers, no wildcard child, and no
    /// literal children — it contributes nothing to the trie and can be
    /// dropped outright.
    pub(crate) fn is_empty(&self) -> bool {
        self.permanent.is_empty()
            && self.oneshot.is_empty()
            && self.children.is_empty()
            && self.wildcard.is_none()
    }

    /// Restores the storage invariant after a handler or child was removed:
    /// a node with no handlers, no wildcard, and exactly one literal child
    /// is a redundant pass-through and gets merged into its sole child (its
    /// label grows, it adopts the child's children/wildcard/handlers).
    ///
    /// `never_merge` must be `true` for the root (whose label starts empty
    /// and stays the tree's anchor) and for any node reached via a parent's
    /// `wildcard` field (whose label must stay empty — dispatch never tests
    /// a wildcard node's own label against the query, only its children's,
    /// so merging a child's label into it would make that child unreachable
    /// while also making the wildcard fire unconditionally). Both cases
    /// still report "fully empty" (case 3) so the caller can detach them.
    ///
    /// Returns `true` when the node is now empty (case 3) or has merged
    /// (case 5); `false` when it must remain as-is (including case 6, the
    /// `never_merge` exactly-one-child case).
    pub(crate) fn shrink(&mut self, never_merge: bool) -> bool {
        if !self.permanent.is_empty() || !self.oneshot.is_empty() {
            return false;
        }
        if self.wildcard.is_some() {
            return false;
        }
        if self.children.is_empty() {
            return true;
        }
        if self.children.len() >= 2 {
            return false;
        }
        if never_merge {
            return false;
        }
        let (_, mut only_child) = self.children.drain().next().expect("exactly one child");
        trace!(
            "merging pass-through node (label {:?}) with its sole child (label {:?})",
            self.label,
            only_child.label
        );
        self.label.extend_from_slice(&only_child.label);
        self.children = std::mem::take(&mut only_child.children);
        self.wildcard = only_child.wildcard.take();
        self.permanent = std::mem::take(&mut only_child.permanent);
        self.oneshot = std::mem::take(&mut only_child.oneshot);
        self.invalidate_failure();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    fn leaf(label: &str) -> Box<TrieNode> {
        Box::new(TrieNode::new(chars(label)))
    }

    #[test]
    fn split_off_demotes_suffix_and_keys_by_first_char() {
        let child = leaf("hello");
        let parent = TrieNode::split_off(child, 2);
        assert_eq!(parent.label, chars("he"));
        let demoted = parent.children.get(&'l').expect("keyed by suffix's first char");
        assert_eq!(demoted.label, chars("llo"));
    }

    #[test]
    fn shrink_merges_single_pass_through_child() {
        let mut node = TrieNode::new(chars("a"));
        let mut child = TrieNode::new(chars("b"));
        child.permanent.insert(HandlerId::new(1));
        node.children.insert('b', Box::new(child));

        assert!(node.shrink(false));
        assert_eq!(node.label, chars("ab"));
        assert!(node.children.is_empty());
        assert!(node.permanent.contains(&HandlerId::new(1)));
    }

    #[test]
    fn shrink_refuses_when_node_holds_handlers() {
        let mut node = TrieNode::new(chars("a"));
        node.permanent.insert(HandlerId::new(7));
        let child = TrieNode::new(chars("b"));
        node.children.insert('b', Box::new(child));

        assert!(!node.shrink(false));
        assert_eq!(node.children.len(), 1);
    }

    #[test]
    fn shrink_root_never_merges() {
        let mut root = TrieNode::new(Vec::new());
        root.children.insert('a', leaf("a"));
        assert!(!root.shrink(true));
        assert_eq!(root.label, Vec::<char>::new());
        assert_eq!(root.children.len(), 1);
    }

    #[test]
    fn shrink_wildcard_node_never_merges_and_keeps_empty_label() {
        // A node reached through `wildcard` must never absorb a child's
        // label — dispatch relies on it always being empty.
        let mut wildcard = TrieNode::new(Vec::new());
        let mut child = TrieNode::new(chars("x"));
        child.permanent.insert(HandlerId::new(1));
        wildcard.children.insert('x', Box::new(child));

        assert!(!wildcard.shrink(true));
        assert_eq!(wildcard.label, Vec::<char>::new());
        assert_eq!(wildcard.children.len(), 1);
        assert!(wildcard.children.contains_key(&'x'));
    }

    #[test]
    fn is_empty_true_only_when_fully_vacant() {
        let mut node = TrieNode::new(chars("x"));
        assert!(node.is_empty());
        node.permanent.insert(HandlerId::new(1));
        assert!(!node.is_empty());
    }

    #[test]
    fn failure_table_cache_invalidates_on_split() {
        let mut child = leaf("abcabd");
        let first = child.failure_table();
        assert_eq!(&*first, &[0, 0, 1, 2, 1, 0]);
        child.invalidate_failure();
        let second = child.failure_table();
        assert_eq!(&*second, &*first);
    }
}
