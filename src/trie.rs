//! `PatternDispatcher` — the public wildcard pattern trie.
//!
//! Patterns are `&str`s built from literal characters and `*` wildcards,
//! each `*` standing in for any substring (including the empty one) of a
//! dispatched name. A handler is registered against a pattern either
//! permanently or as a one-shot that fires at most once. Dispatch returns
//! every handler whose pattern matches the dispatched name; callers decide
//! how to invoke them.

mod kmp;
mod node;
mod segment;

use indexmap::IndexSet;
use log::{debug, trace};

use crate::handler::HandlerId;
use node::TrieNode;

/// A compressed trie mapping wildcard patterns to registered handlers.
pub struct PatternDispatcher {
    root: TrieNode,
}

impl Default for PatternDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternDispatcher {
    /// Creates an empty dispatcher.
    pub fn new() -> Self {
        Self {
            root: TrieNode::new(Vec::new()),
        }
    }

    /// Registers `handler` against `pattern`.
    ///
    /// `*` collapses in runs (`"a**b"` behaves as `"a*b"`). If `oneshot` is
    /// `true`, the handler is removed automatically the first time it
    /// fires during [`dispatch`](Self::dispatch).
    pub fn insert(&mut self, pattern: &str, handler: HandlerId, oneshot: bool) {
        let normalized = segment::normalize(pattern);
        let segments = segment::split_segments(&normalized);
        let last = segments.len() - 1;
        debug!("insert pattern {:?} ({} segments)", pattern, segments.len());

        let mut node = &mut self.root;
        for (seg_idx, seg) in segments.iter().enumerate() {
            let mut c = 0usize;
            while c < seg.len() {
                let p = seg[c];
                if !node.children.contains_key(&p) {
                    let leaf = Box::new(TrieNode::new(seg[c..].to_vec()));
                    node.children.insert(p, leaf);
                    node = node.children.get_mut(&p).expect("just inserted");
                    c = seg.len();
                    continue;
                }

                let child_len = node.children[&p].label.len();
                let m = node.children[&p].longest_prefix_match(seg, c);
                if m == child_len {
                    node = node.children.get_mut(&p).expect("checked above");
                    c += m;
                } else {
                    let child = node.children.remove(&p).expect("checked above");
                    let parent = TrieNode::split_off(child, m);
                    node.children.insert(p, parent);
                    node = node.children.get_mut(&p).expect("just inserted");
                    c += m;
                }
            }

            if seg_idx < last {
                if node.wildcard.is_none() {
                    node.wildcard = Some(Box::new(TrieNode::new(Vec::new())));
                }
                node = node.wildcard.as_deref_mut().expect("just ensured");
            }
        }

        if oneshot {
            node.oneshot.insert(handler);
        } else {
            node.permanent.insert(handler);
        }
    }

    /// Removes a single `handler` from `pattern`, or every handler on
    /// `pattern` when `handler` is `None`. No-op if the pattern (or the
    /// handler on it) isn't present. Prunes the trie back down to the
    /// storage invariant afterward.
    pub fn remove(&mut self, pattern: &str, handler: Option<HandlerId>) {
        let normalized = segment::normalize(pattern);
        let segments = segment::split_segments(&normalized);
        debug!("remove pattern {:?} handler {:?}", pattern, handler);
        remove_rec(&mut self.root, &segments, 0, 0, handler, true);
    }

    /// Returns every handler whose pattern matches `name`, deduplicated and
    /// cleared of any one-shots that fired. Patterns collapsed to nothing
    /// by this dispatch are pruned automatically.
    pub fn dispatch(&mut self, name: &str) -> Vec<HandlerId> {
        let chars: Vec<char> = name.chars().collect();
        let mut fired = IndexSet::new();
        visit(&mut self.root, 0, &chars, true, &mut fired);
        trace!("dispatch {:?} fired {} handler(s)", name, fired.len());
        fired.into_iter().collect()
    }

    /// Convenience form of [`dispatch`](Self::dispatch) for callers that
    /// only care whether anything matched.
    pub fn dispatch_bool(&mut self, name: &str) -> bool {
        !self.dispatch(name).is_empty()
    }

    /// Returns every handler registered on exactly `pattern` (not a
    /// wildcard expansion of it — an exact structural lookup).
    pub fn handlers(&self, pattern: &str) -> Vec<HandlerId> {
        let normalized = segment::normalize(pattern);
        let segments = segment::split_segments(&normalized);
        match find_terminal(&self.root, &segments, 0, 0) {
            Some(node) => node
                .permanent
                .iter()
                .chain(node.oneshot.iter())
                .copied()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Number of handlers registered on exactly `pattern`.
    pub fn handlers_count(&self, pattern: &str) -> usize {
        let normalized = segment::normalize(pattern);
        let segments = segment::split_segments(&normalized);
        match find_terminal(&self.root, &segments, 0, 0) {
            Some(node) => node.permanent.len() + node.oneshot.len(),
            None => 0,
        }
    }

    /// Iterates every stored pattern (reconstructed, `*`-delimited) that
    /// has at least one handler registered on it.
    pub fn patterns(&self) -> PatternIter<'_> {
        PatternIter::new(&self.root)
    }

    /// Discards every pattern and handler.
    pub fn clear(&mut self) {
        self.root = TrieNode::new(Vec::new());
    }
}

/// Discovers every node whose path matches `chars` and, for each, fires its
/// handlers into `fired`, clears the fired one-shots, and prunes the trie.
///
/// This folds discovery and cleanup into a single bottom-up pass rather
/// than two literal passes over a recorded trail: every structural mutation
/// here (clearing a one-shot set, dropping an emptied child, merging a
/// pass-through node) only ever touches a node *after* that node's own
/// matches have already been collected, and dispatch only hands the result
/// back to its caller once this call returns — so no handler invoked by the
/// caller can observe a mid-dispatch tree. That's the externally visible
/// contract the two-phase design exists to guarantee; it holds here too.
fn visit(
    node: &mut TrieNode,
    cursor: usize,
    chars: &[char],
    never_merge: bool,
    fired: &mut IndexSet<HandlerId>,
) {
    if cursor == chars.len() {
        for h in node.permanent.iter() {
            fired.insert(*h);
        }
        for h in node.oneshot.iter() {
            fired.insert(*h);
        }
        node.oneshot.clear();
    }

    if cursor < chars.len() {
        let p = chars[cursor];
        let mut remove = false;
        if let Some(child) = node.children.get_mut(&p) {
            let m = child.longest_prefix_match(chars, cursor);
            if m == child.label.len() {
                visit(child, cursor + m, chars, false, fired);
                remove = child.is_empty();
            }
        }
        if remove {
            node.children.remove(&p);
        }
    }

    if node.wildcard.is_some() {
        // Literal continuations: the wildcard consumes some prefix of the
        // remaining suffix, then one of its literal children's label
        // matches exactly. KMP finds every valid consumption length at once.
        let targets: Vec<(char, usize)> = {
            let w = node.wildcard.as_deref().expect("checked above");
            let mut v = Vec::new();
            for (&key, g) in w.children.iter() {
                let table = g.failure_table();
                for end in kmp::search(chars, cursor, &g.label, &table) {
                    v.push((key, end));
                }
            }
            v
        };
        {
            let w = node.wildcard.as_deref_mut().expect("checked above");
            for (key, end) in targets {
                let mut remove = false;
                if let Some(g) = w.children.get_mut(&key) {
                    visit(g, end, chars, false, fired);
                    remove = g.is_empty();
                }
                if remove {
                    w.children.remove(&key);
                }
            }
        }

        // The wildcard may also absorb the entire remaining suffix by
        // itself (a trailing `*`, or a chain of wildcards that altogether
        // consume the rest of the name). `w`'s label must stay empty — it
        // is reached through `node.wildcard`, not a literal child slot, and
        // dispatch never tests a wildcard node's own label against `chars`
        // — so it is never allowed to merge with a sole literal child.
        {
            let w = node.wildcard.as_deref_mut().expect("checked above");
            visit(w, chars.len(), chars, true, fired);
        }

        let wildcard_empty = node
            .wildcard
            .as_deref()
            .expect("checked above")
            .is_empty();
        if wildcard_empty {
            node.wildcard = None;
        }
    }

    node.shrink(never_merge);
}

enum RemoveOutcome {
    NotFound,
    Removed,
}

fn remove_rec(
    node: &mut TrieNode,
    segments: &[Vec<char>],
    seg_idx: usize,
    char_idx: usize,
    handler: Option<HandlerId>,
    never_merge: bool,
) -> RemoveOutcome {
    let seg = &segments[seg_idx];

    if char_idx == seg.len() {
        if seg_idx + 1 == segments.len() {
            if !node.erase_handlers(handler) {
                return RemoveOutcome::NotFound;
            }
            node.shrink(never_merge);
            return RemoveOutcome::Removed;
        }

        if node.wildcard.is_none() {
            return RemoveOutcome::NotFound;
        }
        let outcome = {
            let w = node.wildcard.as_deref_mut().expect("checked above");
            // `w`'s label must stay empty (see `shrink`'s contract), so the
            // recursive call that descends into it must never merge it.
            remove_rec(w, segments, seg_idx + 1, 0, handler, true)
        };
        match outcome {
            RemoveOutcome::NotFound => RemoveOutcome::NotFound,
            RemoveOutcome::Removed => {
                if node.wildcard.as_deref().expect("checked above").is_empty() {
                    node.wildcard = None;
                }
                node.shrink(never_merge);
                RemoveOutcome::Removed
            }
        }
    } else {
        let p = seg[char_idx];
        if !node.children.contains_key(&p) {
            return RemoveOutcome::NotFound;
        }
        let child_len = node.children[&p].label.len();
        let m = node.children[&p].longest_prefix_match(seg, char_idx);
        if m != child_len {
            return RemoveOutcome::NotFound;
        }

        let outcome = {
            let child = node.children.get_mut(&p).expect("checked above");
            remove_rec(child, segments, seg_idx, char_idx + m, handler, false)
        };
        match outcome {
            RemoveOutcome::NotFound => RemoveOutcome::NotFound,
            RemoveOutcome::Removed => {
                if node.children[&p].is_empty() {
                    node.children.remove(&p);
                }
                node.shrink(never_merge);
                RemoveOutcome::Removed
            }
        }
    }
}

fn find_terminal<'a>(
    node: &'a TrieNode,
    segments: &[Vec<char>],
    seg_idx: usize,
    char_idx: usize,
) -> Option<&'a TrieNode> {
    let seg = &segments[seg_idx];
    if char_idx == seg.len() {
        if seg_idx + 1 == segments.len() {
            return Some(node);
        }
        return node
            .wildcard
            .as_deref()
            .and_then(|w| find_terminal(w, segments, seg_idx + 1, 0));
    }
    let p = seg[char_idx];
    let child = node.children.get(&p)?;
    let m = child.longest_prefix_match(seg, char_idx);
    if m != child.label.len() {
        return None;
    }
    find_terminal(child, segments, seg_idx, char_idx + m)
}

/// Lazy, explicit-stack iterator over every pattern with at least one
/// registered handler.
pub struct PatternIter<'a> {
    stack: Vec<(String, &'a TrieNode)>,
}

impl<'a> PatternIter<'a> {
    fn new(root: &'a TrieNode) -> Self {
        Self {
            stack: vec![(String::new(), root)],
        }
    }
}

impl<'a> Iterator for PatternIter<'a> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        while let Some((prefix, node)) = self.stack.pop() {
            for child in node.children.values() {
                let mut child_prefix = prefix.clone();
                child_prefix.extend(child.label.iter());
                self.stack.push((child_prefix, child));
            }
            if let Some(w) = node.wildcard.as_deref() {
                let mut wildcard_prefix = prefix.clone();
                wildcard_prefix.push('*');
                self.stack.push((wildcard_prefix, w));
            }
            if !node.permanent.is_empty() || !node.oneshot.is_empty() {
                return Some(prefix);
            }
        }
        None
    }
}
