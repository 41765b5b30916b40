use crate::context::SubtaskId;
use crate::state::EnumeratorState;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use tundra_common::{Error, Result, Split};

/// Which subtask received which split, and what is still unassigned.
///
/// A split id is either unassigned or in exactly one subtask's list. Assigned splits
/// whose rows have all been emitted are additionally marked finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentLedger {
    /// Every split, in creation order.
    splits: Vec<Split>,
    unassigned: VecDeque<Split>,
    assigned: BTreeMap<SubtaskId, Vec<Split>>,
    finished: BTreeSet<String>,
}

impl AssignmentLedger {
    pub fn new(splits: Vec<Split>) -> Self {
        let unassigned = splits.iter().cloned().collect();
        Self { splits, unassigned, assigned: BTreeMap::new(), finished: BTreeSet::new() }
    }

    pub fn splits(&self) -> &[Split] {
        &self.splits
    }

    /// The split the next assignment would hand out.
    pub fn peek_unassigned(&self) -> Option<&Split> {
        self.unassigned.front()
    }

    /// Moves the next unassigned split to `subtask`.
    pub fn commit_next(&mut self, subtask: SubtaskId) -> Option<Split> {
        let split = self.unassigned.pop_front()?;
        self.assigned.entry(subtask).or_default().push(split.clone());
        Some(split)
    }

    /// Records that `subtask` has emitted every row of `split_id`.
    pub fn complete(&mut self, subtask: SubtaskId, split_id: &str) -> Result<()> {
        if !self.assigned_to(subtask).iter().any(|s| s.split_id == split_id) {
            return Err(Error::protocol(format!("split {split_id} was not assigned to subtask {subtask}")));
        }
        if !self.finished.insert(split_id.to_string()) {
            return Err(Error::protocol(format!("split {split_id} completed twice")));
        }
        Ok(())
    }

    pub fn is_finished(&self, split_id: &str) -> bool {
        self.finished.contains(split_id)
    }

    /// Returns unfinished splits `subtask` had received to the front of the unassigned queue.
    ///
    /// Fails without change when a split is listed twice, is held by another subtask, or
    /// has already been read to the end.
    pub fn return_splits(&mut self, subtask: SubtaskId, splits: &[Split]) -> Result<()> {
        let held = self.assigned_to(subtask);
        let mut returned: HashSet<&str> = HashSet::with_capacity(splits.len());
        for split in splits {
            let id = split.split_id.as_str();
            if !returned.insert(id) {
                return Err(Error::protocol(format!("split {id} returned more than once")));
            }
            if !held.iter().any(|h| h.split_id == id) {
                return Err(Error::protocol(format!("split {id} was not assigned to subtask {subtask}")));
            }
            if self.finished.contains(id) {
                return Err(Error::protocol(format!("split {id} was already read to the end")));
            }
        }
        if let Some(list) = self.assigned.get_mut(&subtask) {
            list.retain(|s| !returned.contains(s.split_id.as_str()));
            if list.is_empty() {
                self.assigned.remove(&subtask);
            }
        }
        for split in splits.iter().rev() {
            self.unassigned.push_front(split.clone());
        }
        Ok(())
    }

    /// Moves every assigned but unfinished split back to the front of the unassigned queue,
    /// in creation order. Returns how many were moved.
    ///
    /// After a restart the readers that held them are gone, along with their progress.
    pub fn requeue_unfinished(&mut self) -> usize {
        let finished = &self.finished;
        let mut pending: HashSet<String> = HashSet::new();
        self.assigned.retain(|_, list| {
            list.retain(|s| {
                let done = finished.contains(&s.split_id);
                if !done {
                    pending.insert(s.split_id.clone());
                }
                done
            });
            !list.is_empty()
        });
        let requeued: Vec<Split> = self.splits.iter().filter(|s| pending.contains(&s.split_id)).cloned().collect();
        for split in requeued.iter().rev() {
            self.unassigned.push_front(split.clone());
        }
        requeued.len()
    }

    pub fn assigned_to(&self, subtask: SubtaskId) -> &[Split] {
        self.assigned.get(&subtask).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn unassigned_len(&self) -> usize {
        self.unassigned.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.unassigned.is_empty()
    }

    pub fn to_state(&self) -> EnumeratorState {
        fn ids<'a>(splits: impl IntoIterator<Item = &'a Split>) -> Vec<String> {
            splits.into_iter().map(|s| s.split_id.clone()).collect()
        }
        EnumeratorState {
            splits: self.splits.clone(),
            unassigned: ids(&self.unassigned),
            assignments: self.assigned.iter().map(|(id, list)| (*id, ids(list))).collect(),
            finished: ids(self.splits.iter().filter(|s| self.finished.contains(&s.split_id))),
        }
    }

    /// Rebuilds a ledger, checking that every split is accounted for exactly once.
    pub fn from_state(state: EnumeratorState) -> Result<Self> {
        let by_id: HashMap<&str, &Split> = state.splits.iter().map(|s| (s.split_id.as_str(), s)).collect();
        if by_id.len() != state.splits.len() {
            return Err(Error::State("duplicate split ids in snapshot".to_string()));
        }

        let mut seen = HashSet::new();
        let mut lookup = |id: &String| -> Result<Split> {
            let split = by_id.get(id.as_str()).ok_or_else(|| Error::State(format!("unknown split id {id}")))?;
            if !seen.insert(id.clone()) {
                return Err(Error::State(format!("split {id} recorded more than once")));
            }
            Ok((*split).clone())
        };

        let unassigned = state.unassigned.iter().map(&mut lookup).collect::<Result<VecDeque<_>>>()?;
        let mut assigned = BTreeMap::new();
        for (subtask, ids) in &state.assignments {
            let list = ids.iter().map(&mut lookup).collect::<Result<Vec<_>>>()?;
            if !list.is_empty() {
                assigned.insert(*subtask, list);
            }
        }
        if seen.len() != state.splits.len() {
            return Err(Error::State(format!(
                "snapshot accounts for {} of {} splits",
                seen.len(),
                state.splits.len()
            )));
        }

        let mut finished = BTreeSet::new();
        for id in &state.finished {
            if !assigned.values().flatten().any(|s: &Split| &s.split_id == id) {
                return Err(Error::State(format!("finished split {id} was never assigned")));
            }
            if !finished.insert(id.clone()) {
                return Err(Error::State(format!("split {id} finished more than once")));
            }
        }
        Ok(Self { splits: state.splits, unassigned, assigned, finished })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tundra_common::KeyRange;

    fn splits(n: usize) -> Vec<Split> {
        (0..n)
            .map(|i| Split::new(format!("t-{i}"), KeyRange::new("id", i as i64, i as i64).unwrap()))
            .collect()
    }

    #[test]
    fn commits_in_creation_order() {
        let mut ledger = AssignmentLedger::new(splits(3));
        assert_eq!(ledger.peek_unassigned().unwrap().split_id, "t-0");
        assert_eq!(ledger.commit_next(1).unwrap().split_id, "t-0");
        assert_eq!(ledger.commit_next(0).unwrap().split_id, "t-1");
        assert_eq!(ledger.commit_next(1).unwrap().split_id, "t-2");
        assert!(ledger.commit_next(0).is_none());
        assert!(ledger.is_exhausted());
        let ids: Vec<_> = ledger.assigned_to(1).iter().map(|s| s.split_id.as_str()).collect();
        assert_eq!(ids, vec!["t-0", "t-2"]);
    }

    #[test]
    fn returned_splits_are_reassigned_first() {
        let all = splits(3);
        let mut ledger = AssignmentLedger::new(all.clone());
        ledger.commit_next(0);
        ledger.commit_next(0);
        ledger.return_splits(0, &all[..2]).unwrap();
        assert!(ledger.assigned_to(0).is_empty());
        assert_eq!(ledger.unassigned_len(), 3);
        assert_eq!(ledger.commit_next(2).unwrap().split_id, "t-0");
    }

    #[test]
    fn returning_foreign_split_fails_without_change() {
        let all = splits(2);
        let mut ledger = AssignmentLedger::new(all.clone());
        ledger.commit_next(0);
        let before = ledger.clone();
        assert!(ledger.return_splits(1, &all[..1]).is_err());
        assert_eq!(ledger, before);
    }

    #[test]
    fn duplicate_return_fails_without_change() {
        let all = splits(2);
        let mut ledger = AssignmentLedger::new(all.clone());
        ledger.commit_next(0);
        let before = ledger.clone();
        let twice = [all[0].clone(), all[0].clone()];
        assert!(matches!(ledger.return_splits(0, &twice), Err(Error::Protocol(_))));
        assert_eq!(ledger, before);

        ledger.return_splits(0, &all[..1]).unwrap();
        assert_eq!(ledger.unassigned_len(), 2);
        assert_eq!(ledger.commit_next(1).unwrap().split_id, "t-0");
        assert_eq!(ledger.commit_next(1).unwrap().split_id, "t-1");
        assert!(ledger.commit_next(1).is_none());
    }

    #[test]
    fn finished_split_cannot_be_returned_or_completed_twice() {
        let all = splits(2);
        let mut ledger = AssignmentLedger::new(all.clone());
        ledger.commit_next(0);
        assert!(ledger.complete(1, "t-0").is_err());
        ledger.complete(0, "t-0").unwrap();
        assert!(ledger.is_finished("t-0"));
        assert!(ledger.complete(0, "t-0").is_err());
        assert!(ledger.return_splits(0, &all[..1]).is_err());
    }

    #[test]
    fn requeue_keeps_finished_and_returns_the_rest_in_creation_order() {
        let mut ledger = AssignmentLedger::new(splits(5));
        ledger.commit_next(1);
        ledger.commit_next(0);
        ledger.commit_next(1);
        ledger.complete(0, "t-1").unwrap();

        assert_eq!(ledger.requeue_unfinished(), 2);
        let held: Vec<_> = ledger.assigned_to(0).iter().map(|s| s.split_id.as_str()).collect();
        assert_eq!(held, vec!["t-1"]);
        assert!(ledger.assigned_to(1).is_empty());
        let order: Vec<_> = std::iter::from_fn(|| ledger.commit_next(2)).map(|s| s.split_id).collect();
        assert_eq!(order, vec!["t-0", "t-2", "t-3", "t-4"]);
    }

    #[test]
    fn state_round_trip_preserves_assignments() {
        let mut ledger = AssignmentLedger::new(splits(4));
        ledger.commit_next(0);
        ledger.commit_next(2);
        ledger.complete(2, "t-1").unwrap();
        let restored = AssignmentLedger::from_state(ledger.to_state()).unwrap();
        assert_eq!(restored, ledger);
    }

    #[test]
    fn inconsistent_state_is_rejected() {
        let mut ledger = AssignmentLedger::new(splits(2));
        ledger.commit_next(0);

        let mut duplicated = ledger.to_state();
        duplicated.unassigned.push("t-0".to_string());
        assert!(matches!(AssignmentLedger::from_state(duplicated), Err(Error::State(_))));

        let mut lost = ledger.to_state();
        lost.unassigned.clear();
        assert!(matches!(AssignmentLedger::from_state(lost), Err(Error::State(_))));

        let mut unknown = ledger.to_state();
        unknown.unassigned = vec!["t-9".to_string()];
        assert!(AssignmentLedger::from_state(unknown).is_err());

        let mut never_assigned = ledger.to_state();
        never_assigned.finished = vec!["t-1".to_string()];
        assert!(matches!(AssignmentLedger::from_state(never_assigned), Err(Error::State(_))));
    }
}
