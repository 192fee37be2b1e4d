//! Per-response tool call assembly.
//!
//! A call moves `unseen -> open -> accumulating* -> finalized`. Arguments
//! arrive either as whole objects (block-start priming, legacy merges) or as
//! ordered partial-JSON fragments; once any fragment is seen the fragment
//! buffer is authoritative.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::protocol::canonical::ToolCall;
use crate::repair::{merge_json_arguments, normalize_arguments};
use crate::sanitize::sanitize_tool_call_id;

/// One in-flight tool call.
#[derive(Debug, Clone, Default)]
pub struct ToolAccumulator {
    pub call: ToolCall,
    fragments: String,
    has_stream: bool,
    finalized: bool,
}

impl ToolAccumulator {
    fn new(id: &str, name: &str) -> Self {
        Self {
            call: ToolCall::new(id, name, String::new()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Raw fragment text received so far.
    #[must_use]
    pub fn fragments(&self) -> &str {
        &self.fragments
    }

    fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        if self.has_stream && !self.fragments.is_empty() {
            self.call.arguments.clone_from(&self.fragments);
        }
        if !self.call.arguments.is_empty() {
            self.call.arguments = normalize_arguments(&self.call.arguments);
        }
        self.finalized = true;
    }
}

/// Every tool call of one response, in first-seen order.
///
/// Delta-style frames name a call only by its content-block index, so the
/// index to id binding is kept here next to the calls themselves.
#[derive(Debug, Default)]
pub struct ToolCallSet {
    order: Vec<String>,
    by_id: FxHashMap<String, ToolAccumulator>,
    by_index: FxHashMap<usize, String>,
    /// Generated ids for open calls the upstream sent without one, by name.
    anonymous: FxHashMap<String, String>,
}

impl ToolCallSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Open `id` if unseen and return the id it is stored under.
    ///
    /// A later reference may fill in a missing name but never replaces one.
    /// A call with neither id nor name cannot be tracked and yields `None`.
    pub fn ensure(&mut self, id: &str, name: &str) -> Option<String> {
        let id = id.trim();
        let id = if id.is_empty() {
            if name.is_empty() {
                return None;
            }
            self.anonymous
                .entry(name.to_string())
                .or_insert_with(|| sanitize_tool_call_id(""))
                .clone()
        } else {
            id.to_string()
        };

        match self.by_id.get_mut(&id) {
            Some(acc) => {
                if acc.call.name.is_empty() && !name.is_empty() {
                    acc.call.name = name.to_string();
                }
            }
            None => {
                self.order.push(id.clone());
                self.by_id.insert(id.clone(), ToolAccumulator::new(&id, name));
            }
        }
        Some(id)
    }

    /// Bind a content-block index to `id`. An index is never rebound.
    pub fn bind_index(&mut self, index: usize, id: &str) -> bool {
        if let Some(bound) = self.by_index.get(&index) {
            if bound != id {
                tracing::debug!(index, bound = %bound, id, "ignoring rebind of block index");
            }
            return false;
        }
        self.by_index.insert(index, id.to_string());
        true
    }

    #[must_use]
    pub fn id_for_index(&self, index: usize) -> Option<&str> {
        self.by_index.get(&index).map(String::as_str)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ToolAccumulator> {
        self.by_id.get(id)
    }

    /// Whole-object priming; ignored once fragment streaming has begun.
    pub fn prime(&mut self, id: &str, arguments: &str) {
        if let Some(acc) = self.open_mut(id) {
            if !acc.has_stream {
                acc.call.arguments = arguments.to_string();
            }
        }
    }

    /// Merge a whole argument object key-wise into the current arguments.
    pub fn merge_object(&mut self, id: &str, arguments: &str) {
        if let Some(acc) = self.open_mut(id) {
            acc.call.arguments = merge_json_arguments(&acc.call.arguments, arguments);
        }
    }

    pub fn append_fragment(&mut self, id: &str, fragment: &str) {
        if let Some(acc) = self.open_mut(id) {
            acc.fragments.push_str(fragment);
            acc.has_stream = true;
        }
    }

    /// Freeze the arguments of `id` into normalized JSON. Idempotent.
    pub fn finalize(&mut self, id: &str) -> Option<&ToolCall> {
        let acc = self.by_id.get_mut(id)?;
        acc.finalize();
        if self
            .anonymous
            .get(&acc.call.name)
            .is_some_and(|anon| anon == id)
        {
            self.anonymous.remove(&acc.call.name);
        }
        Some(&acc.call)
    }

    pub fn finalize_all(&mut self) {
        for id in &self.order {
            if let Some(acc) = self.by_id.get_mut(id) {
                acc.finalize();
            }
        }
        self.anonymous.clear();
    }

    /// Calls in first-seen order, consuming the set.
    #[must_use]
    pub fn into_calls(mut self) -> Vec<ToolCall> {
        self.order
            .iter()
            .filter_map(|id| self.by_id.remove(id))
            .map(|acc| acc.call)
            .collect()
    }

    fn open_mut(&mut self, id: &str) -> Option<&mut ToolAccumulator> {
        self.by_id.get_mut(id).filter(|acc| !acc.finalized)
    }
}

/// Drop later calls whose `(name, arguments)` pair was already seen.
#[must_use]
pub fn dedup_tool_calls(calls: Vec<ToolCall>) -> Vec<ToolCall> {
    let mut seen: FxHashSet<(String, String)> = FxHashSet::default();
    calls
        .into_iter()
        .filter(|call| seen.insert((call.name.clone(), call.arguments.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_win_over_priming() {
        let mut set = ToolCallSet::new();
        let id = set.ensure("t1", "lookup").expect("id");
        set.prime(&id, r#"{"q":"primed"}"#);
        set.append_fragment(&id, r#"{"q""#);
        set.append_fragment(&id, r#":"streamed"}"#);
        let call = set.finalize(&id).expect("call");
        assert_eq!(call.arguments, r#"{"q":"streamed"}"#);
    }

    #[test]
    fn empty_fragment_buffer_keeps_priming() {
        let mut set = ToolCallSet::new();
        let id = set.ensure("t1", "lookup").expect("id");
        set.prime(&id, r#"{"q":1}"#);
        set.append_fragment(&id, "");
        assert_eq!(set.finalize(&id).expect("call").arguments, r#"{"q":1}"#);
    }

    #[test]
    fn finalize_is_idempotent_and_freezes_arguments() {
        let mut set = ToolCallSet::new();
        let id = set.ensure("t1", "f").expect("id");
        set.append_fragment(&id, "{a: 1,}");
        assert_eq!(set.finalize(&id).expect("call").arguments, r#"{"a": 1}"#);
        set.append_fragment(&id, "garbage");
        set.prime(&id, "{}");
        assert_eq!(set.finalize(&id).expect("call").arguments, r#"{"a": 1}"#);
        assert!(set.get(&id).expect("acc").is_finalized());
    }

    #[test]
    fn unrepairable_arguments_become_empty() {
        let mut set = ToolCallSet::new();
        let id = set.ensure("t1", "f").expect("id");
        set.append_fragment(&id, r#"{"a": "#);
        assert_eq!(set.finalize(&id).expect("call").arguments, "");
    }

    #[test]
    fn ensure_fills_missing_name_only() {
        let mut set = ToolCallSet::new();
        set.ensure("t1", "");
        set.ensure("t1", "first");
        set.ensure("t1", "second");
        assert_eq!(set.get("t1").expect("acc").call.name, "first");
        assert_eq!(set.len(), 1);
        assert_eq!(set.ensure("", ""), None);
    }

    #[test]
    fn anonymous_calls_share_an_id_until_finalized() {
        let mut set = ToolCallSet::new();
        let first = set.ensure("", "search").expect("id");
        assert!(first.starts_with("call_"));
        assert_eq!(set.ensure("  ", "search").as_deref(), Some(first.as_str()));
        set.finalize(&first);
        let second = set.ensure("", "search").expect("id");
        assert_ne!(first, second);
    }

    #[test]
    fn block_indices_are_never_rebound() {
        let mut set = ToolCallSet::new();
        assert!(set.bind_index(0, "a"));
        assert!(!set.bind_index(0, "b"));
        assert_eq!(set.id_for_index(0), Some("a"));
        assert_eq!(set.id_for_index(1), None);
    }

    #[test]
    fn legacy_objects_merge_key_wise() {
        let mut set = ToolCallSet::new();
        let id = set.ensure("call-1", "lookup").expect("id");
        set.merge_object(&id, r#"{"foo":"bar"}"#);
        set.merge_object(&id, r#"{"baz":1}"#);
        set.finalize_all();
        let calls = set.into_calls();
        assert_eq!(calls, vec![ToolCall::new("call-1", "lookup", r#"{"baz":1,"foo":"bar"}"#)]);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let calls = vec![
            ToolCall::new("a", "f", "{}"),
            ToolCall::new("b", "g", "{}"),
            ToolCall::new("c", "f", "{}"),
            ToolCall::new("d", "f", r#"{"x":1}"#),
        ];
        let once = dedup_tool_calls(calls);
        let ids: Vec<_> = once.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "d"]);
        assert_eq!(dedup_tool_calls(once.clone()), once);
    }
}
