//! Checkpoint snapshot of a split enumerator.

use crate::context::SubtaskId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tundra_common::{Error, Result, Split};

/// Everything needed to reopen an enumerator without assigning a split twice or losing one.
///
/// The encoded form is private to this crate and carries no compatibility promise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumeratorState {
    /// All splits in creation order.
    pub splits: Vec<Split>,
    /// Ids not yet handed out, in assignment order.
    pub unassigned: Vec<String>,
    /// Ids each subtask has received, in the order it received them.
    pub assignments: BTreeMap<SubtaskId, Vec<String>>,
    /// Assigned ids whose rows were all emitted, in creation order.
    #[serde(default)]
    pub finished: Vec<String>,
}

impl EnumeratorState {
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_cbor::to_vec(self).map_err(|e| Error::State(format!("failed to encode enumerator state: {e}")))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_cbor::from_slice(bytes).map_err(|e| Error::State(format!("failed to decode enumerator state: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tundra_common::KeyRange;

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(EnumeratorState::decode(&[0xff, 0x01]), Err(Error::State(_))));
    }

    #[test]
    fn encoded_state_keeps_empty_ranges() {
        let state = EnumeratorState {
            splits: vec![Split::new("t-0", KeyRange::empty("id"))],
            unassigned: vec!["t-0".to_string()],
            assignments: BTreeMap::new(),
            finished: vec![],
        };
        let decoded = EnumeratorState::decode(&state.encode().unwrap()).unwrap();
        assert!(decoded.splits[0].range.is_empty());
        assert_eq!(decoded, state);
    }
}
