//! Per-subtask coordination surface between the enumerator and one reader.
//!
//! Every subtask owns exactly one [`EnumeratorContext`] and the matching [`ReaderInbox`].
//! The enumerator is the only sender on the context; the reader is the only receiver.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tundra_common::{Error, Result, Split};

pub type SubtaskId = usize;

/// Messages delivered to a reader subtask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderEvent {
    AddSplits(Vec<Split>),
    /// Terminal: nothing else will be assigned to this subtask.
    NoMoreSplits,
}

/// Reader-directed control event. No event kinds are defined yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEvent {
    pub kind: String,
    pub payload: Vec<u8>,
}

#[derive(Debug)]
pub struct EnumeratorContext {
    subtask_id: SubtaskId,
    parallelism: usize,
    running: AtomicBool,
    outbox: mpsc::UnboundedSender<ReaderEvent>,
}

impl EnumeratorContext {
    /// Creates the context of `subtask_id` and the inbox its reader consumes.
    pub fn new(parallelism: usize, subtask_id: SubtaskId) -> (Self, ReaderInbox) {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let context = Self { subtask_id, parallelism, running: AtomicBool::new(false), outbox };
        (context, ReaderInbox { subtask_id, inbox })
    }

    pub fn subtask_id(&self) -> SubtaskId {
        self.subtask_id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Configured parallelism, or 0 while this subtask is not running.
    pub fn current_parallelism(&self) -> usize {
        if self.is_running() {
            self.parallelism
        } else {
            0
        }
    }

    /// This context's own subtask while running; a context never sees other subtasks.
    pub fn registered_readers(&self) -> BTreeSet<SubtaskId> {
        if self.is_running() {
            BTreeSet::from([self.subtask_id])
        } else {
            BTreeSet::new()
        }
    }

    /// Marks the subtask as running. Idempotent.
    pub fn register(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            tracing::debug!(subtask = self.subtask_id, "enumerator context registered");
        }
    }

    pub fn deregister(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Hands `splits` to the local reader.
    ///
    /// Returns `Ok(false)` without effect when `subtask_id` is not this context's subtask.
    pub fn assign_split(&self, subtask_id: SubtaskId, splits: Vec<Split>) -> Result<bool> {
        if !self.accepts(subtask_id)? {
            return Ok(false);
        }
        self.deliver(ReaderEvent::AddSplits(splits))?;
        Ok(true)
    }

    /// Tells the local reader that no further splits will arrive.
    ///
    /// Same identity filter as [`assign_split`](Self::assign_split).
    pub fn signal_no_more_splits(&self, subtask_id: SubtaskId) -> Result<bool> {
        if !self.accepts(subtask_id)? {
            return Ok(false);
        }
        self.deliver(ReaderEvent::NoMoreSplits)?;
        Ok(true)
    }

    pub fn send_event_to_source_reader(&self, subtask_id: SubtaskId, event: SourceEvent) -> Result<()> {
        Err(Error::NotSupported(format!(
            "source event `{}` for subtask {subtask_id}: reader events are not defined",
            event.kind
        )))
    }

    fn accepts(&self, subtask_id: SubtaskId) -> Result<bool> {
        if subtask_id != self.subtask_id {
            tracing::trace!(own = self.subtask_id, target = subtask_id, "ignoring message for another subtask");
            return Ok(false);
        }
        if !self.is_running() {
            return Err(Error::protocol(format!("subtask {subtask_id} is not registered")));
        }
        Ok(true)
    }

    fn deliver(&self, event: ReaderEvent) -> Result<()> {
        self.outbox
            .send(event)
            .map_err(|_| Error::protocol(format!("reader of subtask {} has gone away", self.subtask_id)))
    }
}

/// Receiving end of a subtask's context.
#[derive(Debug)]
pub struct ReaderInbox {
    subtask_id: SubtaskId,
    inbox: mpsc::UnboundedReceiver<ReaderEvent>,
}

impl ReaderInbox {
    pub fn subtask_id(&self) -> SubtaskId {
        self.subtask_id
    }

    /// Waits for the next event; `None` once the context has been dropped.
    pub async fn recv(&mut self) -> Option<ReaderEvent> {
        self.inbox.recv().await
    }

    /// Takes an already delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<ReaderEvent> {
        self.inbox.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tundra_common::KeyRange;

    fn split(id: &str) -> Split {
        Split::new(id, KeyRange::new("id", 0, 1).unwrap())
    }

    #[test]
    fn parallelism_and_readers_hidden_until_registered() {
        let (context, _inbox) = EnumeratorContext::new(4, 2);
        assert_eq!(context.current_parallelism(), 0);
        assert!(context.registered_readers().is_empty());

        context.register();
        context.register();
        assert_eq!(context.current_parallelism(), 4);
        assert_eq!(context.registered_readers(), BTreeSet::from([2]));
    }

    #[test]
    fn delivers_only_to_own_subtask() {
        let (context, mut inbox) = EnumeratorContext::new(3, 1);
        context.register();

        assert!(!context.assign_split(0, vec![split("a")]).unwrap());
        assert!(!context.signal_no_more_splits(2).unwrap());
        assert_eq!(inbox.try_recv(), None);

        assert!(context.assign_split(1, vec![split("b")]).unwrap());
        assert!(context.signal_no_more_splits(1).unwrap());
        assert_eq!(inbox.try_recv(), Some(ReaderEvent::AddSplits(vec![split("b")])));
        assert_eq!(inbox.try_recv(), Some(ReaderEvent::NoMoreSplits));
    }

    #[test]
    fn assignment_before_register_fails() {
        let (context, _inbox) = EnumeratorContext::new(1, 0);
        assert!(matches!(context.assign_split(0, vec![split("a")]), Err(Error::Protocol(_))));
    }

    #[test]
    fn dropped_reader_fails_delivery() {
        let (context, inbox) = EnumeratorContext::new(1, 0);
        context.register();
        drop(inbox);
        assert!(context.assign_split(0, vec![split("a")]).is_err());
    }

    #[test]
    fn source_events_are_not_supported() {
        let (context, _inbox) = EnumeratorContext::new(1, 0);
        context.register();
        let event = SourceEvent { kind: "pause".to_string(), payload: vec![] };
        assert!(matches!(context.send_event_to_source_reader(0, event), Err(Error::NotSupported(_))));
    }
}
