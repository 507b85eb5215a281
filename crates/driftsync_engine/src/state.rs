//! Sync engine state machine.

use crate::batcher::{make_batches, Batch};
use crate::config::SyncConfig;
use crate::dead_letter::DeadLetterStore;
use crate::entity::EntityService;
use crate::error::{SyncError, SyncResult};
use crate::prober::{ConnectivityProber, Reachability};
use crate::queue::MutationQueue;
use crate::report::{PassError, PassErrorKind, SyncPassResult, SyncStats, SyncStatusReport};
use crate::resolver::{ConflictResolver, Winner};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::transport::SyncTransport;
use chrono::Utc;
use driftsync_protocol::{
    DeadLetterEntry, EntityRecord, Fields, ItemOutcome, Operation, QueuedMutation, RemoteState,
    SyncStatus, NO_RESPONSE_REASON,
};
use driftsync_store::SyncStore;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The current phase of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No pass is running.
    Idle,
    /// Checking that the remote authority is reachable.
    Probing,
    /// Fetching eligible mutations from the queue.
    Draining,
    /// Partitioning mutations into batches.
    Batching,
    /// Submitting a batch.
    Dispatching,
    /// Applying a batch's outcomes.
    Reconciling,
}

impl SyncState {
    /// Returns true while a pass is running.
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncState::Idle)
    }

    /// Returns the state's name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Probing => "probing",
            SyncState::Draining => "draining",
            SyncState::Batching => "batching",
            SyncState::Dispatching => "dispatching",
            SyncState::Reconciling => "reconciling",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-pass bookkeeping.
#[derive(Default)]
struct PassContext {
    result: SyncPassResult,
    /// Entities with an error outcome earlier in this pass.
    failed_entities: HashSet<String>,
}

/// The sync engine reconciles the local mutation queue with a remote
/// authority.
///
/// A pass runs `probing → draining → batching → dispatching → reconciling`
/// and returns to `idle`. At most one pass runs at a time; enqueueing is
/// always allowed, including during a pass.
pub struct SyncEngine<S: SyncStore, T: SyncTransport, E: EntityService> {
    config: SyncConfig,
    queue: MutationQueue<S>,
    dead_letters: DeadLetterStore<S>,
    prober: ConnectivityProber<T>,
    transport: Arc<T>,
    entities: Arc<E>,
    resolver: ConflictResolver,
    policy: RetryPolicy,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    in_flight: RwLock<HashSet<u64>>,
    pass_lock: Mutex<()>,
}

impl<S: SyncStore, T: SyncTransport, E: EntityService> SyncEngine<S, T, E> {
    /// Creates a new sync engine.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if `config` does not validate.
    pub fn new(
        config: SyncConfig,
        store: Arc<S>,
        transport: Arc<T>,
        entities: Arc<E>,
    ) -> SyncResult<Self> {
        config.validate()?;
        Ok(Self {
            queue: MutationQueue::new(Arc::clone(&store)),
            dead_letters: DeadLetterStore::new(store),
            prober: ConnectivityProber::new(Arc::clone(&transport), config.probe_timeout),
            transport,
            entities,
            resolver: ConflictResolver::new(),
            policy: RetryPolicy::from_config(&config),
            config,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            in_flight: RwLock::new(HashSet::new()),
            pass_lock: Mutex::new(()),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the cumulative stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the mutation queue.
    pub fn queue(&self) -> &MutationQueue<S> {
        &self.queue
    }

    /// Returns the dead-letter store.
    pub fn dead_letter_store(&self) -> &DeadLetterStore<S> {
        &self.dead_letters
    }

    /// Returns the retry policy.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Records a local mutation for later sync.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidEntityId`] for an empty id and storage
    /// errors unchanged.
    pub fn enqueue(
        &self,
        entity_id: &str,
        operation: Operation,
        payload: Fields,
    ) -> SyncResult<QueuedMutation> {
        self.queue.enqueue(entity_id, operation, payload)
    }

    /// Probes the remote authority. Never fails.
    pub fn check_connectivity(&self) -> bool {
        self.prober.is_reachable()
    }

    /// Returns queue, dead-letter and pass status.
    pub fn sync_status(&self) -> SyncResult<SyncStatusReport> {
        Ok(SyncStatusReport {
            pending: self.queue.pending_count()?,
            in_progress: self.in_flight.read().len(),
            dead_letter_count: self.dead_letters.count()?,
            last_sync_at: self.queue.store().last_sync_at()?,
            state: self.state(),
        })
    }

    /// Dead-letter entries, newest failures first.
    pub fn dead_letter_entries(&self) -> SyncResult<Vec<DeadLetterEntry>> {
        self.dead_letters.entries()
    }

    /// Runs one sync pass.
    ///
    /// An unreachable remote is not an error: the result has
    /// `success = false` and one `global` connectivity entry. Per-mutation
    /// failures are reported in the result as well.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::PassInProgress`] if another pass is running, and
    /// storage errors that prevent the pass from recording outcomes.
    pub fn run_sync_pass(&self) -> SyncResult<SyncPassResult> {
        let Some(_guard) = self.pass_lock.try_lock() else {
            debug!("sync pass requested while another is running");
            return Err(SyncError::PassInProgress);
        };

        let start = Instant::now();
        let outcome = self.execute_pass();
        self.in_flight.write().clear();
        self.set_state(SyncState::Idle);

        match outcome {
            Ok(mut result) => {
                result.duration = start.elapsed();
                self.record_stats(&result);
                info!(
                    success = result.success,
                    synced = result.synced_items,
                    failed = result.failed_items,
                    conflicts = result.conflicts_resolved,
                    dead_lettered = result.dead_lettered,
                    held_back = result.held_back_items,
                    batches = result.batches_sent,
                    duration_ms = result.duration.as_millis() as u64,
                    "sync pass finished"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(error = %e, "sync pass aborted");
                let mut stats = self.stats.write();
                stats.passes += 1;
                stats.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn execute_pass(&self) -> SyncResult<SyncPassResult> {
        if self.queue.drain_eligible(self.config.max_retries)?.is_empty() {
            debug!("no eligible mutations; skipping pass");
            return Ok(SyncPassResult::empty());
        }

        self.set_state(SyncState::Probing);
        if let Reachability::Unreachable(reason) = self.prober.probe() {
            info!(reason = %reason, "sync pass skipped: remote unreachable");
            return Ok(SyncPassResult::unreachable(reason));
        }

        self.set_state(SyncState::Draining);
        let eligible = self.queue.drain_eligible(self.config.max_retries)?;
        *self.in_flight.write() = eligible.iter().map(|m| m.id).collect();
        info!(mutations = eligible.len(), "sync pass started");

        self.set_state(SyncState::Batching);
        let batches = make_batches(eligible, self.config.batch_size);

        let mut ctx = PassContext::default();
        for (index, batch) in batches.into_iter().enumerate() {
            let batch = self.hold_back(batch, &mut ctx);
            if batch.is_empty() {
                continue;
            }
            self.dispatch(index, &batch, &mut ctx)?;
            let mut in_flight = self.in_flight.write();
            for m in &batch.mutations {
                in_flight.remove(&m.id);
            }
        }

        self.queue.store().set_last_sync_at(Utc::now())?;

        let mut result = ctx.result;
        result.success = result.failed_items == 0;
        Ok(result)
    }

    /// Drops mutations whose entity already failed in this pass.
    fn hold_back(&self, batch: Batch, ctx: &mut PassContext) -> Batch {
        if !self.config.hold_back_after_failure || ctx.failed_entities.is_empty() {
            return batch;
        }

        let (held, send): (Vec<_>, Vec<_>) = batch
            .mutations
            .into_iter()
            .partition(|m| ctx.failed_entities.contains(&m.entity_id));

        if held.is_empty() {
            return Batch::new(send);
        }

        let mut in_flight = self.in_flight.write();
        for m in &held {
            debug!(
                mutation_id = m.id,
                entity_id = %m.entity_id,
                "held back after earlier failure"
            );
            in_flight.remove(&m.id);
        }
        ctx.result.held_back_items += held.len();
        Batch::new(send)
    }

    fn dispatch(&self, index: usize, batch: &Batch, ctx: &mut PassContext) -> SyncResult<()> {
        self.set_state(SyncState::Dispatching);
        let request = batch.to_request(&self.config.client_id, Utc::now());
        debug!(
            batch = index,
            items = batch.len(),
            checksum = %batch.checksum,
            "dispatching batch"
        );

        let response = self
            .transport
            .submit_batch(&request, self.config.dispatch_timeout);
        ctx.result.batches_sent += 1;

        self.set_state(SyncState::Reconciling);
        match response {
            Ok(response) => {
                if response.outcomes.len() > batch.len() {
                    warn!(
                        batch = index,
                        expected = batch.len(),
                        received = response.outcomes.len(),
                        "ignoring extra outcomes"
                    );
                }
                for (position, m) in batch.mutations.iter().enumerate() {
                    self.reconcile(m, response.outcome_at(position), ctx)?;
                }
            }
            Err(e) => {
                warn!(batch = index, error = %e, "batch dispatch failed");
                let message = e.to_string();
                for m in &batch.mutations {
                    self.apply_failure(m, &message, e.kind(), ctx)?;
                }
            }
        }
        Ok(())
    }

    fn reconcile(
        &self,
        m: &QueuedMutation,
        outcome: ItemOutcome,
        ctx: &mut PassContext,
    ) -> SyncResult<()> {
        match outcome {
            ItemOutcome::Success {
                remote_id,
                resolved,
            } => self.apply_success(m, &remote_id, resolved, ctx),
            ItemOutcome::Conflict { remote } => self.apply_conflict(m, &remote, ctx),
            ItemOutcome::Error { reason } => {
                let kind = if reason == NO_RESPONSE_REASON {
                    PassErrorKind::Protocol
                } else {
                    PassErrorKind::RemoteRejection
                };
                self.apply_failure(m, &reason, kind, ctx)
            }
        }
    }

    fn apply_success(
        &self,
        m: &QueuedMutation,
        remote_id: &str,
        resolved: Option<RemoteState>,
        ctx: &mut PassContext,
    ) -> SyncResult<()> {
        self.queue.remove(m.id)?;
        debug!(mutation_id = m.id, entity_id = %m.entity_id, remote_id, "mutation synced");

        if let Some(state) = resolved {
            let now = Utc::now();
            let record = EntityRecord {
                id: m.entity_id.clone(),
                remote_id: state.remote_id.or_else(|| Some(remote_id.to_string())),
                fields: state.fields,
                sync_status: SyncStatus::Synced,
                updated_at: state.updated_at,
                last_synced_at: Some(now),
            };
            self.notify(m, ctx, || {
                self.entities.apply_resolved_state(&m.entity_id, &record)
            });
        }
        self.notify(m, ctx, || {
            self.entities.mark_synced(&m.entity_id, Some(remote_id))
        });

        ctx.result.synced_items += 1;
        Ok(())
    }

    fn apply_conflict(
        &self,
        m: &QueuedMutation,
        remote: &RemoteState,
        ctx: &mut PassContext,
    ) -> SyncResult<()> {
        let local = match self.entities.get_entity(&m.entity_id) {
            Ok(Some(record)) => record,
            Ok(None) if self.delete_queued_after(m)? => {
                self.queue.remove(m.id)?;
                debug!(
                    mutation_id = m.id,
                    entity_id = %m.entity_id,
                    "conflict superseded by a queued delete"
                );
                ctx.result.errors.push(PassError::for_mutation(
                    m.entity_id.clone(),
                    m.id,
                    PassErrorKind::Conflict,
                    "conflict superseded by a queued local delete",
                ));
                ctx.result.conflicts_resolved += 1;
                ctx.result.synced_items += 1;
                return Ok(());
            }
            Ok(None) => EntityRecord::from_mutation(m),
            Err(e) => {
                self.report_local(m, &e, ctx);
                EntityRecord::from_mutation(m)
            }
        };

        let resolution = self.resolver.resolve(&local, remote);
        let merged = &resolution.merged;
        self.queue.remove(m.id)?;

        let local_delete_won =
            resolution.winner == Winner::Local && m.operation == Operation::Delete;
        if !local_delete_won {
            self.notify(m, ctx, || {
                self.entities.apply_resolved_state(&m.entity_id, merged)
            });
            self.notify(m, ctx, || {
                self.entities
                    .mark_synced(&m.entity_id, merged.remote_id.as_deref())
            });
        }

        if resolution.winner == Winner::Local && self.config.requeue_local_wins {
            let (operation, payload) = if local_delete_won {
                (Operation::Delete, m.payload.clone())
            } else {
                (Operation::Update, merged.fields.clone())
            };
            let follow_up = self.queue.enqueue(&m.entity_id, operation, payload)?;
            debug!(
                mutation_id = m.id,
                follow_up_id = follow_up.id,
                entity_id = %m.entity_id,
                "re-queued local conflict winner"
            );
        }

        debug!(
            mutation_id = m.id,
            entity_id = %m.entity_id,
            winner = %resolution.winner,
            "conflict resolved"
        );
        ctx.result.errors.push(PassError::for_mutation(
            m.entity_id.clone(),
            m.id,
            PassErrorKind::Conflict,
            format!("conflict resolved in favour of {} version", resolution.winner),
        ));
        ctx.result.conflicts_resolved += 1;
        ctx.result.synced_items += 1;
        Ok(())
    }

    /// Whether a delete for the same entity is queued behind `m`.
    fn delete_queued_after(&self, m: &QueuedMutation) -> SyncResult<bool> {
        Ok(self.queue.entries()?.iter().any(|q| {
            q.entity_id == m.entity_id
                && q.operation == Operation::Delete
                && (q.created_at, q.id) > (m.created_at, m.id)
        }))
    }

    fn apply_failure(
        &self,
        m: &QueuedMutation,
        message: &str,
        kind: PassErrorKind,
        ctx: &mut PassContext,
    ) -> SyncResult<()> {
        ctx.result.failed_items += 1;
        ctx.failed_entities.insert(m.entity_id.clone());
        ctx.result.errors.push(PassError::for_mutation(
            m.entity_id.clone(),
            m.id,
            kind,
            message,
        ));

        match self.policy.decide(m.retry_count) {
            RetryDecision::Retry { retry_count } => {
                if !self.queue.record_failure(m.id, retry_count, message)? {
                    debug!(mutation_id = m.id, "failed mutation left the queue mid-pass");
                }
                debug!(
                    mutation_id = m.id,
                    entity_id = %m.entity_id,
                    retry_count,
                    error = message,
                    "mutation will be retried"
                );
                self.notify(m, ctx, || self.entities.mark_sync_error(&m.entity_id));
            }
            RetryDecision::Escalate { retry_count } => {
                if self
                    .dead_letters
                    .escalate(m, retry_count, message, Utc::now())?
                    .is_some()
                {
                    ctx.result.dead_lettered += 1;
                }
                self.notify(m, ctx, || self.entities.mark_sync_failed(&m.entity_id));
            }
        }
        Ok(())
    }

    /// Runs an entity-service callback, reporting failure as a local error.
    fn notify<F>(&self, m: &QueuedMutation, ctx: &mut PassContext, call: F)
    where
        F: FnOnce() -> SyncResult<()>,
    {
        if let Err(e) = call() {
            self.report_local(m, &e, ctx);
        }
    }

    fn report_local(&self, m: &QueuedMutation, error: &SyncError, ctx: &mut PassContext) {
        warn!(
            mutation_id = m.id,
            entity_id = %m.entity_id,
            error = %error,
            "entity service call failed"
        );
        ctx.result.errors.push(PassError::for_mutation(
            m.entity_id.clone(),
            m.id,
            PassErrorKind::Local,
            error.to_string(),
        ));
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    fn record_stats(&self, result: &SyncPassResult) {
        let mut stats = self.stats.write();
        stats.passes += 1;
        stats.synced += result.synced_items as u64;
        stats.failed += result.failed_items as u64;
        stats.conflicts += result.conflicts_resolved as u64;
        stats.dead_lettered += result.dead_lettered as u64;
        stats.batches += result.batches_sent as u64;
        if let Some(first) = result.failures().next() {
            if first.kind == PassErrorKind::Connectivity && first.mutation_id.is_none() {
                stats.passes_unreachable += 1;
            }
            stats.last_error = Some(first.to_string());
        }
    }
}
