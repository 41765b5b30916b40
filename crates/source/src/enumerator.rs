//! Split ownership and on-demand assignment for one bounded source run.

use crate::boundary::KeyDomain;
use crate::context::{EnumeratorContext, SubtaskId};
use crate::ledger::AssignmentLedger;
use crate::partitioner::RangePartitioner;
use crate::registry::SubtaskRegistry;
use crate::state::EnumeratorState;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tundra_common::{Error, Result, Split};

/// Lifecycle of an enumerator: `Created -> Open -> Draining -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumeratorPhase {
    Created,
    /// Splits are known and handed out on request.
    Open,
    /// Every split is assigned and every registered reader has been told so.
    Draining,
    Closed,
}

impl fmt::Display for EnumeratorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnumeratorPhase::Created => "created",
            EnumeratorPhase::Open => "open",
            EnumeratorPhase::Draining => "draining",
            EnumeratorPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Where the splits of a fresh enumerator come from.
#[derive(Debug, Clone)]
pub struct SplitPlan {
    pub table: String,
    pub domain: KeyDomain,
    pub partitioner: RangePartitioner,
}

#[derive(Debug)]
enum Splits {
    Planned(SplitPlan),
    Ready(AssignmentLedger),
}

#[derive(Debug)]
struct Inner {
    phase: EnumeratorPhase,
    splits: Splits,
    registry: SubtaskRegistry,
}

impl Inner {
    fn ledger(&mut self) -> Result<&mut AssignmentLedger> {
        match &mut self.splits {
            Splits::Ready(ledger) => Ok(ledger),
            Splits::Planned(_) => Err(Error::protocol("enumerator has not been started")),
        }
    }

    fn ensure_assigning(&self, operation: &str) -> Result<()> {
        match self.phase {
            EnumeratorPhase::Open | EnumeratorPhase::Draining => Ok(()),
            phase => Err(Error::protocol(format!("cannot {operation} while enumerator is {phase}"))),
        }
    }

    /// Hands the next split to `subtask`, or tells it there are none left.
    ///
    /// A failed delivery leaves the ledger untouched. Once a subtask has been told there
    /// are no more splits it keeps getting that answer, even if splits are returned later.
    fn serve(&mut self, subtask: SubtaskId) -> Result<()> {
        self.ensure_assigning("assign splits")?;
        let context = self.registry.context(subtask)?;

        if self.registry.is_finished(subtask) {
            if !context.signal_no_more_splits(subtask)? {
                return Err(misrouted(subtask, &context));
            }
            tracing::debug!(subtask, "repeated no more splits to finished subtask");
            return Ok(());
        }

        if let Some(split) = self.ledger()?.peek_unassigned().cloned() {
            let split_id = split.split_id.clone();
            if !context.assign_split(subtask, vec![split])? {
                return Err(misrouted(subtask, &context));
            }
            self.ledger()?.commit_next(subtask);
            tracing::info!(subtask, split = %split_id, "assigned split");
            return Ok(());
        }

        if !context.signal_no_more_splits(subtask)? {
            return Err(misrouted(subtask, &context));
        }
        self.registry.mark_finished(subtask);
        tracing::debug!(subtask, "signalled no more splits");
        self.maybe_drain();
        Ok(())
    }

    fn maybe_drain(&mut self) {
        let exhausted = matches!(&self.splits, Splits::Ready(ledger) if ledger.is_exhausted());
        if self.phase == EnumeratorPhase::Open && exhausted && self.registry.all_finished() {
            self.phase = EnumeratorPhase::Draining;
            tracing::info!(readers = ?self.registry.ids(), "all splits assigned, enumerator draining");
        }
    }
}

fn misrouted(subtask: SubtaskId, context: &EnumeratorContext) -> Error {
    Error::protocol(format!(
        "message for subtask {subtask} routed to the context of subtask {}",
        context.subtask_id()
    ))
}

/// Owns every split of one source run and assigns them to reader subtasks on request.
///
/// All mutation happens under a single lock, so concurrent requests from several subtasks
/// still hand each split out exactly once.
#[derive(Debug)]
pub struct SplitEnumerator {
    inner: Mutex<Inner>,
}

impl SplitEnumerator {
    pub fn new(parallelism: usize, plan: SplitPlan) -> Self {
        Self::with_splits(parallelism, Splits::Planned(plan))
    }

    /// Reopens an enumerator from a checkpoint; [`start`](Self::start) will not recompute splits.
    ///
    /// Splits that were assigned but not read to the end are handed out again.
    pub fn restore(parallelism: usize, state: EnumeratorState) -> Result<Self> {
        let mut ledger = AssignmentLedger::from_state(state)?;
        let requeued = ledger.requeue_unfinished();
        tracing::info!(
            splits = ledger.splits().len(),
            unassigned = ledger.unassigned_len(),
            requeued,
            "restored enumerator state"
        );
        Ok(Self::with_splits(parallelism, Splits::Ready(ledger)))
    }

    fn with_splits(parallelism: usize, splits: Splits) -> Self {
        let inner = Inner { phase: EnumeratorPhase::Created, splits, registry: SubtaskRegistry::new(parallelism) };
        Self { inner: Mutex::new(inner) }
    }

    pub async fn phase(&self) -> EnumeratorPhase {
        self.inner.lock().await.phase
    }

    /// Computes the splits (unless restored) and opens the enumerator for assignment.
    pub async fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.phase != EnumeratorPhase::Created {
            return Err(Error::protocol(format!("cannot start enumerator while it is {}", inner.phase)));
        }
        if let Splits::Planned(plan) = &inner.splits {
            let splits = plan.partitioner.splits(&plan.table, &plan.domain)?;
            tracing::info!(table = %plan.table, splits = splits.len(), "computed splits");
            inner.splits = Splits::Ready(AssignmentLedger::new(splits));
        }
        inner.phase = EnumeratorPhase::Open;
        Ok(())
    }

    /// Registers a reader subtask and immediately serves it one request.
    pub async fn add_reader(&self, context: Arc<EnumeratorContext>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.ensure_assigning("add readers")?;
        let subtask = context.subtask_id();
        inner.registry.register(context)?;
        tracing::info!(subtask, "reader registered");
        inner.serve(subtask)
    }

    /// Assigns the next split to `subtask`, or sends it the no-more-splits signal.
    ///
    /// Requests from a subtask that never registered are protocol errors.
    pub async fn handle_split_request(&self, subtask: SubtaskId) -> Result<()> {
        self.inner.lock().await.serve(subtask)
    }

    /// Records that `subtask` emitted every row of `split_id`. Finished splits survive a restore.
    pub async fn complete_split(&self, subtask: SubtaskId, split_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.ensure_assigning("complete splits")?;
        inner.ledger()?.complete(subtask, split_id)?;
        tracing::debug!(subtask, split = split_id, "split completed");
        Ok(())
    }

    /// Puts back splits a failed reader had received; they are handed out again first.
    pub async fn add_splits_back(&self, subtask: SubtaskId, splits: Vec<Split>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.ensure_assigning("return splits")?;
        inner.ledger()?.return_splits(subtask, &splits)?;
        if !splits.is_empty() && inner.phase == EnumeratorPhase::Draining {
            inner.phase = EnumeratorPhase::Open;
        }
        tracing::warn!(subtask, returned = splits.len(), "splits returned to the enumerator");
        Ok(())
    }

    /// Drops a reader subtask, e.g. after it failed. Its received splits stay recorded.
    pub async fn remove_reader(&self, subtask: SubtaskId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .registry
            .deregister(subtask)
            .ok_or_else(|| Error::protocol(format!("subtask {subtask} is not registered")))?;
        tracing::info!(subtask, "reader removed");
        Ok(())
    }

    pub async fn snapshot_state(&self) -> Result<EnumeratorState> {
        let mut inner = self.inner.lock().await;
        Ok(inner.ledger()?.to_state())
    }

    pub async fn assigned_splits(&self, subtask: SubtaskId) -> Result<Vec<Split>> {
        let mut inner = self.inner.lock().await;
        Ok(inner.ledger()?.assigned_to(subtask).to_vec())
    }

    pub async fn unassigned_count(&self) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        Ok(inner.ledger()?.unassigned_len())
    }

    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if inner.phase == EnumeratorPhase::Closed {
            return;
        }
        if inner.phase == EnumeratorPhase::Open {
            tracing::warn!("closing enumerator before every split was drained");
        }
        inner.registry.clear();
        inner.phase = EnumeratorPhase::Closed;
        tracing::info!("enumerator closed");
    }
}
