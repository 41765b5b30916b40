use crate::context::{EnumeratorContext, SubtaskId};
use std::collections::BTreeMap;
use std::sync::Arc;
use tundra_common::{Error, Result};

#[derive(Debug)]
struct SubtaskEntry {
    context: Arc<EnumeratorContext>,
    /// The terminal no-more-splits signal has been delivered.
    finished: bool,
}

/// Registered, running reader subtasks and the contexts that reach them.
///
/// A subtask is either present (registered and running) or absent.
#[derive(Debug)]
pub struct SubtaskRegistry {
    parallelism: usize,
    entries: BTreeMap<SubtaskId, SubtaskEntry>,
}

impl SubtaskRegistry {
    pub fn new(parallelism: usize) -> Self {
        Self { parallelism, entries: BTreeMap::new() }
    }

    /// Registers the subtask behind `context`. Re-registering the same context is a no-op.
    pub fn register(&mut self, context: Arc<EnumeratorContext>) -> Result<()> {
        let id = context.subtask_id();
        if id >= self.parallelism {
            return Err(Error::protocol(format!(
                "subtask {id} is outside parallelism {}",
                self.parallelism
            )));
        }
        if let Some(existing) = self.entries.get(&id) {
            if Arc::ptr_eq(&existing.context, &context) {
                return Ok(());
            }
            return Err(Error::protocol(format!("subtask {id} is already registered")));
        }
        context.register();
        self.entries.insert(id, SubtaskEntry { context, finished: false });
        Ok(())
    }

    pub fn deregister(&mut self, id: SubtaskId) -> Option<Arc<EnumeratorContext>> {
        let entry = self.entries.remove(&id)?;
        entry.context.deregister();
        Some(entry.context)
    }

    pub fn context(&self, id: SubtaskId) -> Result<Arc<EnumeratorContext>> {
        self.entries
            .get(&id)
            .map(|e| e.context.clone())
            .ok_or_else(|| Error::protocol(format!("split requested by unregistered subtask {id}")))
    }

    pub fn mark_finished(&mut self, id: SubtaskId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.finished = true;
        }
    }

    pub fn is_finished(&self, id: SubtaskId) -> bool {
        self.entries.get(&id).is_some_and(|e| e.finished)
    }

    /// True when at least one subtask is registered and every one of them has finished.
    pub fn all_finished(&self) -> bool {
        !self.entries.is_empty() && self.entries.values().all(|e| e.finished)
    }

    pub fn ids(&self) -> Vec<SubtaskId> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deregisters every subtask.
    pub fn clear(&mut self) {
        for (_, entry) in std::mem::take(&mut self.entries) {
            entry.context.deregister();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(parallelism: usize, id: SubtaskId) -> Arc<EnumeratorContext> {
        Arc::new(EnumeratorContext::new(parallelism, id).0)
    }

    #[test]
    fn register_marks_context_running() {
        let mut registry = SubtaskRegistry::new(2);
        let ctx = context(2, 1);
        registry.register(ctx.clone()).unwrap();
        registry.register(ctx.clone()).unwrap();
        assert!(ctx.is_running());
        assert_eq!(registry.ids(), vec![1]);
    }

    #[test]
    fn rejects_out_of_range_and_duplicate_subtasks() {
        let mut registry = SubtaskRegistry::new(2);
        assert!(registry.register(context(2, 2)).is_err());
        registry.register(context(2, 0)).unwrap();
        assert!(registry.register(context(2, 0)).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_subtask_lookup_is_a_protocol_error() {
        let registry = SubtaskRegistry::new(2);
        assert!(matches!(registry.context(0), Err(Error::Protocol(_))));
    }

    #[test]
    fn all_finished_requires_every_registered_subtask() {
        let mut registry = SubtaskRegistry::new(3);
        assert!(!registry.all_finished());
        registry.register(context(3, 0)).unwrap();
        registry.register(context(3, 2)).unwrap();
        registry.mark_finished(0);
        assert!(!registry.all_finished());
        registry.mark_finished(2);
        assert!(registry.all_finished());
    }

    #[test]
    fn deregister_stops_the_context() {
        let mut registry = SubtaskRegistry::new(1);
        let ctx = context(1, 0);
        registry.register(ctx.clone()).unwrap();
        registry.deregister(0);
        assert!(!ctx.is_running());
        assert!(registry.is_empty());
    }
}
