//! Pure fork transforms over a single [`Timeline`].
//!
//! Each function returns `true` if it changed the timeline. A missing anchor
//! or a missing fork entry is a no-op. Every function preserves the fork
//! entry invariants checked by [`MessageForkEntry::check`]: the live branch is
//! the only [`BranchSlot::Inline`] slot, it sits at `position`, and an entry
//! with at most one branch left is collapsed and removed.

use std::collections::HashMap;

use chrono::Utc;
use strand_core::{BranchSlot, ForkBranch, Message, MessageForkEntry, MessageId, Timeline};
use tracing::debug;

/// Direction of a circular branch switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForkDirection {
    /// Following branch, wrapping to the first.
    Next,
    /// Preceding branch, wrapping to the last.
    Prev,
}

/// "Branch k of n" view of a fork entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForkInfo {
    /// Index of the live branch.
    pub position: usize,
    /// Number of branches.
    pub total: usize,
}

#[derive(Clone, Copy)]
enum Target {
    Step(ForkDirection),
    Index(usize),
}

/// Branch position and count for the fork entry at `anchor`.
pub fn fork_info(timeline: &Timeline, anchor: &MessageId) -> Option<ForkInfo> {
    timeline.forks.get(anchor).map(|entry| ForkInfo {
        position: entry.position,
        total: entry.lists.len(),
    })
}

/// Move everything after `anchor` out of line and open an empty live branch.
///
/// No-op if the anchor is missing or is the last message.
pub fn create_new_fork(timeline: &mut Timeline, anchor: &MessageId) -> bool {
    let Some(idx) = timeline.index_of(anchor) else {
        return false;
    };
    if idx + 1 >= timeline.messages.len() {
        return false;
    }
    let tail = timeline.messages.split_off(idx + 1);

    match timeline.forks.get_mut(anchor) {
        Some(entry) => {
            match entry.lists.get_mut(entry.position) {
                Some(slot) => *slot = ForkBranch::stored(tail),
                None => entry.lists.push(ForkBranch::stored(tail)),
            }
            entry.lists.push(ForkBranch::inline());
            entry.position = entry.lists.len() - 1;
            debug!(anchor = %anchor, branches = entry.lists.len(), "fork branch added");
        }
        None => {
            let entry = MessageForkEntry {
                position: 1,
                lists: vec![ForkBranch::stored(tail), ForkBranch::inline()],
                created_at: Utc::now(),
            };
            let _ = timeline.forks.insert(anchor.clone(), entry);
            debug!(anchor = %anchor, "fork entry created");
        }
    }
    true
}

/// Switch the live branch one step in `direction`, circularly.
///
/// If the live branch is empty it is pruned first; when pruning leaves at
/// most one branch the entry collapses into the timeline.
pub fn switch_fork(timeline: &mut Timeline, anchor: &MessageId, direction: ForkDirection) -> bool {
    switch_to(timeline, anchor, Target::Step(direction))
}

/// Switch the live branch to `target`.
///
/// No-op if `target` is out of bounds or already live.
pub fn switch_fork_to_position(timeline: &mut Timeline, anchor: &MessageId, target: usize) -> bool {
    switch_to(timeline, anchor, Target::Index(target))
}

/// Delete the live branch and promote a neighbour.
///
/// The timeline is trimmed to the anchor; the branch now at
/// `min(position, len - 1)` is spliced in. An entry left with at most one
/// branch is removed, and so is every entry anchored inside the deleted
/// branch.
pub fn delete_fork(timeline: &mut Timeline, anchor: &MessageId) -> bool {
    let Some(idx) = timeline.index_of(anchor) else {
        return false;
    };
    let Some(mut entry) = timeline.forks.remove(anchor) else {
        return false;
    };
    let discarded = timeline.messages.split_off(idx + 1);
    let dropped = drop_forks_within(&mut timeline.forks, discarded);
    if dropped > 0 {
        debug!(anchor = %anchor, dropped, "nested fork entries removed with branch");
    }

    if entry.position < entry.lists.len() {
        let _ = entry.lists.remove(entry.position);
    }
    if entry.lists.is_empty() {
        debug!(anchor = %anchor, "last fork branch deleted, entry removed");
        return true;
    }

    let position = entry.position.min(entry.lists.len() - 1);
    activate(&mut entry, position, &mut timeline.messages);
    if entry.lists.len() > 1 {
        let _ = timeline.forks.insert(anchor.clone(), entry);
    } else {
        debug!(anchor = %anchor, "fork entry collapsed after delete");
    }
    true
}

/// Concatenate every branch after the anchor, in list order, and drop the
/// entry. Lossy and irreversible.
pub fn expand_fork(timeline: &mut Timeline, anchor: &MessageId) -> bool {
    let Some(idx) = timeline.index_of(anchor) else {
        return false;
    };
    let Some(entry) = timeline.forks.remove(anchor) else {
        return false;
    };

    let mut live_tail = Some(timeline.messages.split_off(idx + 1));
    for branch in entry.lists {
        match branch.slot {
            BranchSlot::Inline => timeline.messages.extend(live_tail.take().unwrap_or_default()),
            BranchSlot::Stored(messages) => timeline.messages.extend(messages),
        }
    }
    timeline.messages.extend(live_tail.unwrap_or_default());
    debug!(anchor = %anchor, len = timeline.messages.len(), "fork expanded");
    true
}

// ─────────────────────────────────────────────────────────────────────────────
// Internals
// ─────────────────────────────────────────────────────────────────────────────

fn switch_to(timeline: &mut Timeline, anchor: &MessageId, target: Target) -> bool {
    let Some(idx) = timeline.index_of(anchor) else {
        return false;
    };
    let Some(entry) = timeline.forks.get(anchor) else {
        return false;
    };
    let (position, len) = (entry.position, entry.lists.len());
    if len <= 1 || position >= len {
        return false;
    }
    if let Target::Index(t) = target {
        if t >= len || t == position {
            return false;
        }
    }
    let Some(mut entry) = timeline.forks.remove(anchor) else {
        return false;
    };

    let tail = timeline.messages.split_off(idx + 1);
    let next = if tail.is_empty() {
        let _ = entry.lists.remove(position);
        let remaining = entry.lists.len();
        if remaining <= 1 {
            if let Some(BranchSlot::Stored(messages)) = entry.lists.pop().map(|b| b.slot) {
                timeline.messages.extend(messages);
            }
            debug!(anchor = %anchor, "empty live branch pruned, entry collapsed");
            return true;
        }
        debug!(anchor = %anchor, remaining, "empty live branch pruned");
        match target {
            Target::Step(ForkDirection::Next) => position % remaining,
            Target::Step(ForkDirection::Prev) => (position + remaining - 1) % remaining,
            Target::Index(t) if t > position => t - 1,
            Target::Index(t) => t,
        }
    } else {
        entry.lists[position].slot = BranchSlot::Stored(tail);
        match target {
            Target::Step(ForkDirection::Next) => (position + 1) % len,
            Target::Step(ForkDirection::Prev) => (position + len - 1) % len,
            Target::Index(t) => t,
        }
    };

    activate(&mut entry, next, &mut timeline.messages);
    debug!(anchor = %anchor, position = next, "fork switched");
    let _ = timeline.forks.insert(anchor.clone(), entry);
    true
}

/// Remove the entries anchored on `discarded`, then the entries anchored on
/// messages stored in their branches, and so on down. Returns how many were
/// removed.
fn drop_forks_within(
    forks: &mut HashMap<MessageId, MessageForkEntry>,
    discarded: Vec<Message>,
) -> usize {
    let mut pending = discarded;
    let mut dropped = 0;
    while let Some(message) = pending.pop() {
        let Some(entry) = forks.remove(&message.id) else {
            continue;
        };
        dropped += 1;
        for branch in entry.lists {
            if let BranchSlot::Stored(messages) = branch.slot {
                pending.extend(messages);
            }
        }
    }
    dropped
}

/// Splice branch `target` inline and mark it live.
fn activate(entry: &mut MessageForkEntry, target: usize, messages: &mut Vec<Message>) {
    if let Some(branch) = entry.lists.get_mut(target) {
        if let BranchSlot::Stored(content) = std::mem::replace(&mut branch.slot, BranchSlot::Inline) {
            messages.extend(content);
        }
    }
    entry.position = target;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn msg(id: &str) -> Message {
        Message::user(id).with_id(id)
    }

    fn timeline(ids: &[&str]) -> Timeline {
        Timeline::from_messages(ids.iter().map(|id| msg(id)).collect())
    }

    fn ids(timeline: &Timeline) -> Vec<String> {
        timeline.messages.iter().map(|m| m.id.to_string()).collect()
    }

    fn anchor(id: &str) -> MessageId {
        MessageId::from(id)
    }

    /// `[a, b, c]` forked at `a`, then `x` generated on the new branch.
    fn two_branches() -> Timeline {
        let mut t = timeline(&["a", "b", "c"]);
        assert!(create_new_fork(&mut t, &anchor("a")));
        t.messages.push(msg("x"));
        t
    }

    // -- create_new_fork --

    #[test]
    fn create_moves_tail_out_of_line() {
        let mut t = timeline(&["a", "b", "c"]);
        assert!(create_new_fork(&mut t, &anchor("a")));

        assert_eq!(ids(&t), vec!["a"]);
        let entry = &t.forks[&anchor("a")];
        assert_eq!(entry.position, 1);
        assert_eq!(entry.lists.len(), 2);
        assert!(entry.lists[1].slot.is_inline());
        match &entry.lists[0].slot {
            BranchSlot::Stored(stored) => assert_eq!(stored.len(), 2),
            BranchSlot::Inline => panic!("first branch should be stored"),
        }
        assert!(t.check_forks().is_ok());
    }

    #[test]
    fn create_with_empty_tail_is_noop() {
        let mut t = timeline(&["a", "b"]);
        let before = t.clone();
        assert!(!create_new_fork(&mut t, &anchor("b")));
        assert_eq!(t, before);
    }

    #[test]
    fn create_with_missing_anchor_is_noop() {
        let mut t = timeline(&["a", "b"]);
        assert!(!create_new_fork(&mut t, &anchor("zz")));
        assert!(t.forks.is_empty());
    }

    #[test]
    fn create_on_existing_entry_appends_branch() {
        let mut t = two_branches();
        assert!(create_new_fork(&mut t, &anchor("a")));

        let entry = &t.forks[&anchor("a")];
        assert_eq!(entry.lists.len(), 3);
        assert_eq!(entry.position, 2);
        assert_eq!(ids(&t), vec!["a"]);
        assert!(entry.check().is_ok());
    }

    // -- switch_fork --

    #[test]
    fn switch_next_then_prev_restores_tail() {
        let mut t = two_branches();
        let before = t.messages.clone();

        assert!(switch_fork(&mut t, &anchor("a"), ForkDirection::Next));
        assert_eq!(ids(&t), vec!["a", "b", "c"]);
        assert_eq!(t.forks[&anchor("a")].position, 0);

        assert!(switch_fork(&mut t, &anchor("a"), ForkDirection::Prev));
        assert_eq!(t.messages, before);
        assert_eq!(t.forks[&anchor("a")].position, 1);
        assert!(t.check_forks().is_ok());
    }

    #[test]
    fn switch_wraps_circularly() {
        let mut t = two_branches();
        assert!(create_new_fork(&mut t, &anchor("a")));
        t.messages.push(msg("y"));
        // branches: [b c], [x], [y*]
        assert!(switch_fork(&mut t, &anchor("a"), ForkDirection::Next));
        assert_eq!(ids(&t), vec!["a", "b", "c"]);
        assert!(switch_fork(&mut t, &anchor("a"), ForkDirection::Prev));
        assert_eq!(ids(&t), vec!["a", "y"]);
    }

    #[test]
    fn switch_prunes_empty_live_branch_and_collapses() {
        let mut t = timeline(&["a", "b"]);
        assert!(create_new_fork(&mut t, &anchor("a")));
        // new live branch left empty

        assert!(switch_fork(&mut t, &anchor("a"), ForkDirection::Next));
        assert_eq!(ids(&t), vec!["a", "b"]);
        assert!(t.forks.is_empty());

        // no way back: the pruned branch is gone
        assert!(!switch_fork(&mut t, &anchor("a"), ForkDirection::Prev));
    }

    #[test]
    fn switch_prunes_empty_live_branch_among_many() {
        let mut t = two_branches();
        assert!(create_new_fork(&mut t, &anchor("a")));
        // branches: [b c], [x], [empty*]
        assert!(switch_fork(&mut t, &anchor("a"), ForkDirection::Prev));
        assert_eq!(ids(&t), vec!["a", "x"]);
        let entry = &t.forks[&anchor("a")];
        assert_eq!(entry.lists.len(), 2);
        assert_eq!(entry.position, 1);
        assert!(entry.check().is_ok());
    }

    #[test]
    fn switch_without_entry_is_noop() {
        let mut t = timeline(&["a", "b"]);
        assert!(!switch_fork(&mut t, &anchor("a"), ForkDirection::Next));
    }

    // -- switch_fork_to_position --

    #[test]
    fn switch_to_position_jumps() {
        let mut t = two_branches();
        assert!(create_new_fork(&mut t, &anchor("a")));
        t.messages.push(msg("y"));

        assert!(switch_fork_to_position(&mut t, &anchor("a"), 1));
        assert_eq!(ids(&t), vec!["a", "x"]);
        assert_eq!(fork_info(&t, &anchor("a")), Some(ForkInfo { position: 1, total: 3 }));
    }

    #[test]
    fn switch_to_current_or_out_of_bounds_is_noop() {
        let mut t = two_branches();
        let before = t.clone();
        assert!(!switch_fork_to_position(&mut t, &anchor("a"), 1));
        assert!(!switch_fork_to_position(&mut t, &anchor("a"), 7));
        assert_eq!(t, before);
    }

    #[test]
    fn switch_to_position_shifts_target_after_prune() {
        let mut t = two_branches();
        assert!(create_new_fork(&mut t, &anchor("a")));
        t.messages.push(msg("y"));
        assert!(switch_fork_to_position(&mut t, &anchor("a"), 0));
        t.messages.truncate(1);
        // branches: [empty*], [x], [y]
        assert!(switch_fork_to_position(&mut t, &anchor("a"), 2));
        assert_eq!(ids(&t), vec!["a", "y"]);
        assert_eq!(t.forks[&anchor("a")].position, 1);
    }

    // -- delete_fork --

    #[test]
    fn delete_promotes_neighbour_and_collapses() {
        let mut t = two_branches();
        assert!(delete_fork(&mut t, &anchor("a")));
        assert_eq!(ids(&t), vec!["a", "b", "c"]);
        assert!(t.forks.is_empty());
    }

    #[test]
    fn delete_keeps_entry_with_remaining_branches() {
        let mut t = two_branches();
        assert!(create_new_fork(&mut t, &anchor("a")));
        t.messages.push(msg("y"));
        assert!(switch_fork_to_position(&mut t, &anchor("a"), 1));

        assert!(delete_fork(&mut t, &anchor("a")));
        // [b c], [y] remain; position clamps to 1
        assert_eq!(ids(&t), vec!["a", "y"]);
        let entry = &t.forks[&anchor("a")];
        assert_eq!(entry.lists.len(), 2);
        assert_eq!(entry.position, 1);
        assert!(entry.check().is_ok());
    }

    #[test]
    fn delete_last_branch_trims_to_anchor() {
        let mut t = timeline(&["a", "b", "c"]);
        let entry = MessageForkEntry {
            position: 0,
            lists: vec![ForkBranch::inline()],
            created_at: Utc::now(),
        };
        let _ = t.forks.insert(anchor("a"), entry);

        assert!(delete_fork(&mut t, &anchor("a")));
        assert_eq!(ids(&t), vec!["a"]);
        assert!(t.forks.is_empty());
    }

    #[test]
    fn delete_drops_entries_anchored_in_deleted_branch() {
        let mut t = timeline(&["a", "b", "c"]);
        assert!(create_new_fork(&mut t, &anchor("a")));
        t.messages.extend([msg("x"), msg("y")]);
        assert!(create_new_fork(&mut t, &anchor("x")));
        t.messages.push(msg("z"));

        assert!(delete_fork(&mut t, &anchor("a")));
        assert_eq!(ids(&t), vec!["a", "b", "c"]);
        assert!(t.forks.is_empty());
    }

    #[test]
    fn delete_drops_entries_nested_in_stored_branches() {
        let mut t = timeline(&["a", "b"]);
        assert!(create_new_fork(&mut t, &anchor("a")));
        t.messages.extend([msg("x"), msg("y"), msg("w")]);
        // fork at y stores [w]; fork at x then stores [y, v] out of line
        assert!(create_new_fork(&mut t, &anchor("y")));
        t.messages.push(msg("v"));
        assert!(create_new_fork(&mut t, &anchor("x")));
        t.messages.push(msg("z"));
        assert_eq!(t.forks.len(), 3);

        assert!(delete_fork(&mut t, &anchor("a")));
        assert_eq!(ids(&t), vec!["a", "b"]);
        assert!(t.forks.is_empty());
    }

    #[test]
    fn delete_keeps_entries_of_surviving_branches() {
        let mut t = timeline(&["a", "b", "c"]);
        assert!(create_new_fork(&mut t, &anchor("b")));
        t.messages.push(msg("d"));
        // entry at b lives inside the branch that survives
        assert!(create_new_fork(&mut t, &anchor("a")));
        t.messages.push(msg("x"));

        assert!(delete_fork(&mut t, &anchor("a")));
        assert_eq!(ids(&t), vec!["a", "b", "d"]);
        assert!(t.forks.contains_key(&anchor("b")));
        assert!(t.check_forks().is_ok());
    }

    // -- expand_fork --

    #[test]
    fn expand_concatenates_in_list_order() {
        let mut t = two_branches();
        assert!(expand_fork(&mut t, &anchor("a")));
        assert_eq!(ids(&t), vec!["a", "b", "c", "x"]);
        assert!(t.forks.is_empty());
    }

    #[test]
    fn expand_without_entry_is_noop() {
        let mut t = timeline(&["a"]);
        assert!(!expand_fork(&mut t, &anchor("a")));
    }

    // -- invariants under random operation sequences --

    #[derive(Clone, Debug)]
    enum Op {
        Create,
        Next,
        Prev,
        Jump(usize),
        Delete,
        Generate,
        ClearTail,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Create),
            Just(Op::Next),
            Just(Op::Prev),
            (0usize..5).prop_map(Op::Jump),
            Just(Op::Delete),
            Just(Op::Generate),
            Just(Op::ClearTail),
        ]
    }

    proptest! {
        #[test]
        fn entries_stay_well_formed(ops in proptest::collection::vec(op(), 1..40)) {
            let mut t = timeline(&["root", "m0"]);
            let root = anchor("root");
            for (n, op) in ops.into_iter().enumerate() {
                match op {
                    Op::Create => { let _ = create_new_fork(&mut t, &root); }
                    Op::Next => { let _ = switch_fork(&mut t, &root, ForkDirection::Next); }
                    Op::Prev => { let _ = switch_fork(&mut t, &root, ForkDirection::Prev); }
                    Op::Jump(p) => { let _ = switch_fork_to_position(&mut t, &root, p); }
                    Op::Delete => { let _ = delete_fork(&mut t, &root); }
                    Op::Generate => t.messages.push(msg(&format!("g{n}"))),
                    Op::ClearTail => t.messages.truncate(1),
                }
                prop_assert_eq!(t.messages[0].id.as_str(), "root");
                if let Some(entry) = t.forks.get(&root) {
                    prop_assert!(entry.lists.len() > 1);
                    prop_assert!(entry.position < entry.lists.len());
                    prop_assert!(entry.check().is_ok());
                }
            }
        }

        #[test]
        fn next_then_prev_is_identity_for_non_empty_tail(extra in 1usize..4) {
            let mut t = two_branches();
            for i in 0..extra {
                t.messages.push(msg(&format!("e{i}")));
            }
            let before = t.clone();
            prop_assert!(switch_fork(&mut t, &anchor("a"), ForkDirection::Next));
            prop_assert!(switch_fork(&mut t, &anchor("a"), ForkDirection::Prev));
            prop_assert_eq!(t.messages, before.messages);
            prop_assert_eq!(t.forks[&anchor("a")].position, before.forks[&anchor("a")].position);
        }
    }
}
