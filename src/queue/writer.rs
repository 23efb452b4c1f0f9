use super::options::{QueueOptions, WriteMode};
use super::outcome::{DrainSummary, WriteOutcome, WriteReport};
use crate::connection::Collection;
use crate::core::{DocError, Document, ID_FIELD, Result, normalize_ids};
use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Notify, Semaphore, mpsc};
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{Instrument, Level, event, info_span};

/// Callback invoked once when a writer's queue drains.
pub type DrainCallback = Box<dyn FnOnce(DrainSummary) + Send + 'static>;

const UPDATE_PROGRESS_EVERY: usize = 1000;

/// `$set` payload for one update-mode document.
#[derive(Debug, Clone, PartialEq)]
struct PendingUpdate {
    id: Option<String>,
    set: Map<String, Value>,
}

impl PendingUpdate {
    /// Uses the document's own `$set` object when present, otherwise every
    /// field except `_id`.
    fn from_document(doc: Document) -> Self {
        let id = doc.id_string();
        let mut fields = doc.into_map();
        let set = match fields.remove("$set") {
            Some(Value::Object(set)) => set,
            _ => {
                fields.remove(ID_FIELD);
                fields
            }
        };
        Self { id, set }
    }
}

enum Work {
    Chunk(Vec<Document>),
    Update(PendingUpdate),
    /// Produces no store call; lets a flush with nothing pending still drain.
    Barrier,
}

struct Unit {
    sequence: u64,
    work: Work,
}

/// State shared between a writer and its dispatcher.
struct WriterState {
    collection: Collection,
    mode: WriteMode,
    /// Units enqueued but not yet completed. Only moves to or from zero
    /// while `on_drain` is locked.
    outstanding: AtomicUsize,
    handled: AtomicUsize,
    written: AtomicUsize,
    failed: AtomicUsize,
    outcomes: Mutex<Vec<WriteOutcome>>,
    on_drain: Mutex<Option<DrainCallback>>,
    idle: Notify,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl WriterState {
    fn summary(&self) -> DrainSummary {
        DrainSummary {
            handled: self.handled.load(Ordering::SeqCst),
            written: self.written.load(Ordering::SeqCst),
            failed_units: self.failed.load(Ordering::SeqCst),
        }
    }

    async fn execute(&self, unit: Unit) -> Option<WriteOutcome> {
        match unit.work {
            Work::Chunk(docs) => {
                self.handled.fetch_add(docs.len(), Ordering::SeqCst);
                Some(insert_batch(&self.collection, unit.sequence, docs).await)
            }
            Work::Update(update) => {
                let count = self.handled.fetch_add(1, Ordering::SeqCst);
                if count % UPDATE_PROGRESS_EVERY == 0 {
                    info!("[queue] updating {}... {}", self.collection.name(), count);
                }
                Some(self.apply_update(unit.sequence, update).await)
            }
            Work::Barrier => None,
        }
    }

    async fn apply_update(&self, sequence: u64, update: PendingUpdate) -> WriteOutcome {
        let upsert = matches!(self.mode, WriteMode::Update { upsert: true, .. });
        let Some(id) = update.id else {
            return WriteOutcome::failure(
                sequence,
                1,
                DocError::Write("document has no _id to update".to_string()),
            );
        };

        match self
            .collection
            .find_one_and_update(&id, update.set, upsert)
            .await
        {
            Ok(result) => WriteOutcome::success(sequence, 1, result.affected()),
            Err(err) => {
                warn!("[queue] update of {} in {} failed: {}", id, self.collection.name(), err);
                WriteOutcome::failure(sequence, 1, err)
            }
        }
    }

    fn complete(&self, outcome: Option<WriteOutcome>) {
        if let Some(outcome) = outcome {
            self.written.fetch_add(outcome.written, Ordering::SeqCst);
            if !outcome.ok() {
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
            lock(&self.outcomes).push(outcome);
        }
        self.release(1);
    }

    /// Adds `units` to the outstanding count, registering `on_drain` for the
    /// cycle those units belong to.
    fn reserve(&self, units: usize, on_drain: Option<DrainCallback>) {
        let mut slot = lock(&self.on_drain);
        if let Some(callback) = on_drain {
            *slot = Some(callback);
        }
        self.outstanding.fetch_add(units, Ordering::SeqCst);
    }

    /// Drops `units` from the outstanding count, firing drain on reaching zero.
    fn release(&self, units: usize) {
        let callback = {
            let mut slot = lock(&self.on_drain);
            let before = self.outstanding.fetch_sub(units, Ordering::SeqCst);
            if before != units {
                return;
            }
            slot.take()
        };

        let summary = self.summary();
        event!(
            Level::DEBUG,
            collection = %self.collection.namespace(),
            handled = summary.handled,
            "writer drained"
        );
        self.idle.notify_waiters();
        if let Some(callback) = callback {
            callback(summary);
        }
    }
}

/// Inserts one batch, recording failures instead of returning them.
pub(crate) async fn insert_batch(
    collection: &Collection,
    sequence: u64,
    mut docs: Vec<Document>,
) -> WriteOutcome {
    normalize_ids(&mut docs);
    let attempted = docs.len();
    if attempted == 0 {
        return WriteOutcome::success(sequence, 0, 0);
    }

    match collection.insert_many(docs).await {
        Ok(written) => WriteOutcome::success(sequence, attempted, written),
        Err(err) => {
            warn!("[create] warning: error {}", err);
            WriteOutcome::failure(sequence, attempted, err)
        }
    }
}

/// Splits `docs` into consecutive chunks of at most `size` documents.
pub(crate) fn into_chunks(mut docs: Vec<Document>, size: usize) -> Vec<Vec<Document>> {
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(docs.len().div_ceil(size));
    while !docs.is_empty() {
        let tail = docs.split_off(docs.len().min(size));
        chunks.push(docs);
        docs = tail;
    }
    chunks
}

type Joined = std::result::Result<(Id, Option<WriteOutcome>), JoinError>;

/// Completes a finished update task. A task that panicked or was cancelled
/// still completes its unit, with a failed outcome.
fn reap(state: &WriterState, sequences: &mut HashMap<Id, u64>, joined: Joined) {
    match joined {
        Ok((id, outcome)) => {
            sequences.remove(&id);
            state.complete(outcome);
        }
        Err(err) => {
            let sequence = sequences.remove(&err.id()).unwrap_or_default();
            warn!(
                "[queue] update worker for {} failed: {}",
                state.collection.name(),
                err
            );
            state.complete(Some(WriteOutcome::failure(sequence, 1, DocError::from(err))));
        }
    }
}

async fn dispatch(state: Arc<WriterState>, mut receiver: mpsc::Receiver<Unit>) {
    match state.mode {
        WriteMode::Insert { .. } => {
            while let Some(unit) = receiver.recv().await {
                let outcome = state.execute(unit).await;
                state.complete(outcome);
            }
        }
        WriteMode::Update { concurrency, .. } => {
            let permits = Arc::new(Semaphore::new(concurrency.max(1)));
            let mut workers = JoinSet::new();
            let mut sequences = HashMap::new();

            loop {
                tokio::select! {
                    Some(joined) = workers.join_next_with_id(), if !workers.is_empty() => {
                        reap(&state, &mut sequences, joined);
                    }
                    unit = receiver.recv() => {
                        let Some(unit) = unit else { break };
                        let Ok(permit) = permits.clone().acquire_owned().await else {
                            break;
                        };
                        let sequence = unit.sequence;
                        let worker_state = Arc::clone(&state);
                        let task = workers.spawn(
                            async move {
                                let _keep_permit_until_done = permit;
                                worker_state.execute(unit).await
                            }
                            .in_current_span(),
                        );
                        sequences.insert(task.id(), sequence);
                    }
                }
            }

            while let Some(joined) = workers.join_next_with_id().await {
                reap(&state, &mut sequences, joined);
            }
        }
    }
}

/// Batched writer for one collection
///
/// Documents pushed in insert mode collect in an accumulator; once it
/// reaches the batch size it is cut into batches that a single worker
/// inserts strictly in submission order. In update mode every document is
/// its own unit of work and up to `concurrency` updates run at once.
///
/// A failed unit is recorded in the outcome log and the writer keeps going.
/// Units flow through a bounded queue, so `push` waits when
/// `queue_capacity` units are already waiting.
///
/// Must be created inside a Tokio runtime.
pub struct BatchWriter {
    state: Arc<WriterState>,
    mode: WriteMode,
    pending: Vec<Document>,
    next_sequence: u64,
    sender: mpsc::Sender<Unit>,
}

impl BatchWriter {
    pub fn new(collection: Collection, mode: WriteMode, queue_capacity: usize) -> Result<Self> {
        if let WriteMode::Insert { batch_size: 0 } | WriteMode::Update { concurrency: 0, .. } = mode {
            return Err(DocError::Configuration(format!("invalid write mode {:?}", mode)));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            DocError::Configuration("a batch writer needs a Tokio runtime".to_string())
        })?;

        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let span = info_span!(
            "docbatch.writer",
            collection = %collection.namespace(),
            update = mode.is_update()
        );
        let state = Arc::new(WriterState {
            collection,
            mode,
            outstanding: AtomicUsize::new(0),
            handled: AtomicUsize::new(0),
            written: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            outcomes: Mutex::new(Vec::new()),
            on_drain: Mutex::new(None),
            idle: Notify::new(),
        });

        runtime.spawn(dispatch(Arc::clone(&state), receiver).instrument(span));

        Ok(Self {
            state,
            mode,
            pending: Vec::new(),
            next_sequence: 0,
            sender,
        })
    }

    pub fn with_options(collection: Collection, options: &QueueOptions, update_only: bool) -> Result<Self> {
        options.validate().map_err(DocError::Configuration)?;
        Self::new(
            collection,
            WriteMode::from_options(options, update_only),
            options.queue_capacity,
        )
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    pub fn collection(&self) -> &Collection {
        &self.state.collection
    }

    /// Documents waiting in the accumulator.
    pub fn length(&self) -> usize {
        self.pending.len()
    }

    /// Units enqueued and not yet completed.
    pub fn in_flight(&self) -> usize {
        self.state.outstanding.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight() == 0
    }

    /// Change the batch size used from the next push on.
    ///
    /// Update-mode concurrency and upsert are fixed when the writer starts.
    pub fn options(&mut self, options: &QueueOptions) -> Result<&mut Self> {
        options.validate().map_err(DocError::Configuration)?;
        match &mut self.mode {
            WriteMode::Insert { batch_size } => *batch_size = options.max_batch_size,
            WriteMode::Update { concurrency, upsert } => {
                if *concurrency != options.concurrency || *upsert != options.upsert {
                    debug!(
                        "[queue] {}: update concurrency/upsert are fixed at creation; ignoring change",
                        self.state.collection.name()
                    );
                }
            }
        }
        Ok(self)
    }

    /// Add documents. In insert mode nothing is sent until the accumulator
    /// reaches the batch size; then all of it is cut into batches and queued.
    pub async fn push<I>(&mut self, docs: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = Document>,
    {
        let work = match self.mode {
            WriteMode::Insert { batch_size } => {
                self.pending.extend(docs);
                if self.pending.len() < batch_size {
                    return Ok(self);
                }
                let ready = std::mem::take(&mut self.pending);
                into_chunks(ready, batch_size)
                    .into_iter()
                    .map(Work::Chunk)
                    .collect()
            }
            WriteMode::Update { .. } => docs
                .into_iter()
                .map(|doc| Work::Update(PendingUpdate::from_document(doc)))
                .collect(),
        };
        self.enqueue(work, None).await?;
        Ok(self)
    }

    /// Queue whatever the accumulator holds, however small.
    ///
    /// Always produces exactly one drain transition once all earlier work
    /// completes, even when nothing was pending.
    pub async fn flush(&mut self) -> Result<&mut Self> {
        let work = self.take_remainder();
        self.enqueue(work, None).await?;
        Ok(self)
    }

    /// Register `on_drain` for this flush cycle, then flush.
    ///
    /// The callback is registered together with the flushed units, so it
    /// cannot fire for an earlier cycle that drains in between.
    pub async fn flush_with<F>(&mut self, on_drain: F) -> Result<&mut Self>
    where
        F: FnOnce(DrainSummary) + Send + 'static,
    {
        let work = self.take_remainder();
        self.enqueue(work, Some(Box::new(on_drain))).await?;
        Ok(self)
    }

    fn take_remainder(&mut self) -> Vec<Work> {
        let remainder = std::mem::take(&mut self.pending);
        let mut work: Vec<Work> = match self.mode {
            WriteMode::Insert { batch_size } => into_chunks(remainder, batch_size)
                .into_iter()
                .map(Work::Chunk)
                .collect(),
            WriteMode::Update { .. } => remainder
                .into_iter()
                .map(|doc| Work::Update(PendingUpdate::from_document(doc)))
                .collect(),
        };
        if work.is_empty() {
            work.push(Work::Barrier);
        }
        work
    }

    /// Register a callback for the next time the queue empties.
    ///
    /// Fires once, then must be registered again for a later cycle. A newer
    /// registration replaces one that has not fired yet.
    pub fn drain<F>(&self, on_drain: F) -> &Self
    where
        F: FnOnce(DrainSummary) + Send + 'static,
    {
        *lock(&self.state.on_drain) = Some(Box::new(on_drain));
        self
    }

    /// Wait until every enqueued unit has completed.
    pub async fn drained(&self) -> DrainSummary {
        loop {
            let notified = self.state.idle.notified();
            if self.state.outstanding.load(Ordering::SeqCst) == 0 {
                return self.state.summary();
            }
            notified.await;
        }
    }

    /// Copy of the outcome log so far, in completion order.
    pub fn results(&self) -> Vec<WriteOutcome> {
        lock(&self.state.outcomes).clone()
    }

    pub fn report(&self) -> WriteReport {
        WriteReport::new(self.results())
    }

    /// Flush, wait for the queue to drain and return the full report.
    pub async fn finish(mut self) -> Result<WriteReport> {
        self.flush().await?;
        self.drained().await;
        Ok(self.report())
    }

    async fn enqueue(&mut self, work: Vec<Work>, on_drain: Option<DrainCallback>) -> Result<()> {
        if work.is_empty() {
            return Ok(());
        }

        // Reserve every unit first so a fast worker cannot drain mid-push.
        self.state.reserve(work.len(), on_drain);

        let mut work = work.into_iter();
        while let Some(item) = work.next() {
            let unit = Unit {
                sequence: self.next_sequence,
                work: item,
            };
            self.next_sequence += 1;

            if self.sender.send(unit).await.is_err() {
                let unsent = 1 + work.len();
                self.state.release(unsent);
                return Err(DocError::Write(format!(
                    "writer for {} stopped accepting work",
                    self.state.collection.name()
                )));
            }
        }
        Ok(())
    }
}

impl Drop for BatchWriter {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                "[queue] writer for {} dropped with {} unflushed documents",
                self.state.collection.name(),
                self.pending.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionHandle;
    use crate::doc;
    use crate::core::{FindOptions, Query};
    use crate::storage::{DocumentStore, MemoryStore, Namespace, UpdateResult};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::oneshot;

    /// Memory store whose updates of `_id` "boom" panic.
    struct PanickingStore(MemoryStore);

    #[async_trait]
    impl DocumentStore for PanickingStore {
        async fn insert_many(&self, ns: &Namespace, docs: Vec<Document>) -> Result<usize> {
            self.0.insert_many(ns, docs).await
        }

        async fn find(&self, ns: &Namespace, query: &Query, options: &FindOptions) -> Result<Vec<Document>> {
            self.0.find(ns, query, options).await
        }

        async fn find_one_and_update(
            &self,
            ns: &Namespace,
            id: &str,
            set: Map<String, Value>,
            upsert: bool,
        ) -> Result<UpdateResult> {
            if id == "boom" {
                panic!("store exploded on {}", id);
            }
            self.0.find_one_and_update(ns, id, set, upsert).await
        }

        async fn count_documents(&self, ns: &Namespace, query: &Query) -> Result<usize> {
            self.0.count_documents(ns, query).await
        }

        async fn drop_collection(&self, ns: &Namespace) -> Result<bool> {
            self.0.drop_collection(ns).await
        }

        async fn close(&self) -> Result<()> {
            self.0.close().await
        }
    }

    fn test_collection(name: &str) -> Collection {
        let handle = ConnectionHandle::new("memory://h/app", Arc::new(MemoryStore::isolated())).unwrap();
        handle.collection(name)
    }

    fn numbered(range: std::ops::Range<usize>) -> Vec<Document> {
        range.map(|i| doc! {"_id": i.to_string(), "value": i}).collect()
    }

    #[test]
    fn test_into_chunks() {
        let sizes: Vec<usize> = into_chunks(numbered(0..10), 4).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert!(into_chunks(Vec::new(), 4).is_empty());
    }

    #[test]
    fn test_pending_update_shapes() {
        let plain = PendingUpdate::from_document(doc! {"_id": 3, "a": 1});
        assert_eq!(plain.id.as_deref(), Some("3"));
        assert_eq!(plain.set, doc! {"a": 1}.into_map());

        let explicit = PendingUpdate::from_document(doc! {"_id": "x", "ignored": 1, "$set": {"b": 2}});
        assert_eq!(explicit.set, doc! {"b": 2}.into_map());
    }

    #[tokio::test]
    async fn test_push_below_threshold_does_not_dispatch() {
        let mut writer = BatchWriter::new(test_collection("t"), WriteMode::Insert { batch_size: 10 }, 8).unwrap();
        writer.push(numbered(0..9)).await.unwrap();
        assert_eq!(writer.length(), 9);
        assert!(writer.is_idle());
        assert!(writer.results().is_empty());
    }

    #[tokio::test]
    async fn test_threshold_push_dispatches_everything() {
        let collection = test_collection("t");
        let mut writer = BatchWriter::new(collection.clone(), WriteMode::Insert { batch_size: 4 }, 8).unwrap();
        writer.push(numbered(0..10)).await.unwrap();
        assert_eq!(writer.length(), 0);

        let summary = writer.drained().await;
        assert_eq!(summary.handled, 10);
        let sizes: Vec<usize> = writer.report().in_submission_order().iter().map(|o| o.attempted).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(collection.count_documents(&Query::all()).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_insert_mode_preserves_submission_order() {
        let mut writer = BatchWriter::new(test_collection("t"), WriteMode::Insert { batch_size: 3 }, 2).unwrap();
        for start in (0..30).step_by(3) {
            writer.push(numbered(start..start + 3)).await.unwrap();
        }
        let report = writer.finish().await.unwrap();
        let sequences: Vec<u64> = report.outcomes.iter().map(|o| o.sequence).collect();
        let mut sorted = sequences.clone();
        sorted.sort();
        assert_eq!(sequences, sorted);
        assert_eq!(report.handled, 30);
    }

    #[tokio::test]
    async fn test_drain_fires_once_per_registration() {
        let mut writer = BatchWriter::new(test_collection("t"), WriteMode::Insert { batch_size: 5 }, 8).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        let (tx, rx) = oneshot::channel();
        writer.push(numbered(0..3)).await.unwrap();
        writer
            .flush_with(move |summary| {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(summary);
            })
            .await
            .unwrap();
        let summary = rx.await.unwrap();
        assert_eq!(summary.handled, 3);

        // a second cycle without re-registering does not call the old callback
        writer.push(numbered(3..6)).await.unwrap();
        writer.drained().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        let (tx, rx) = oneshot::channel();
        writer.flush_with(move |summary| {
            let _ = tx.send(summary);
        }).await.unwrap();
        assert_eq!(rx.await.unwrap().handled, 6);
    }

    #[tokio::test]
    async fn test_flush_on_empty_writer_still_drains() {
        let mut writer = BatchWriter::new(test_collection("t"), WriteMode::Insert { batch_size: 5 }, 8).unwrap();
        let (tx, rx) = oneshot::channel();
        writer.flush_with(move |summary| {
            let _ = tx.send(summary);
        }).await.unwrap();
        let summary = rx.await.unwrap();
        assert_eq!(summary.handled, 0);
        assert!(writer.results().is_empty());
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_stop_writer() {
        let collection = test_collection("t");
        collection.insert_many(numbered(0..1)).await.unwrap();

        let mut writer = BatchWriter::new(collection.clone(), WriteMode::Insert { batch_size: 2 }, 8).unwrap();
        writer.push(numbered(0..6)).await.unwrap();
        let report = writer.finish().await.unwrap();

        assert!(!report.all_succeeded());
        assert_eq!(report.failed_units(), 1);
        assert_eq!(report.handled, 6);
        assert_eq!(report.best_effort_count(), 5);
        assert_eq!(collection.count_documents(&Query::all()).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_update_mode_counts_noops() {
        let collection = test_collection("t");
        collection.insert_many(numbered(0..2)).await.unwrap();

        let mut writer = BatchWriter::new(
            collection.clone(),
            WriteMode::Update { concurrency: 4, upsert: false },
            8,
        )
        .unwrap();
        writer
            .push(vec![
                doc! {"_id": 0, "flag": true},
                doc! {"_id": 1, "value": 1},
                doc! {"_id": 99, "flag": true},
                doc! {"flag": true},
            ])
            .await
            .unwrap();
        let report = writer.finish().await.unwrap();

        assert_eq!(report.handled, 4);
        assert_eq!(report.outcomes.len(), 4);
        assert_eq!(report.failed_units(), 1);
        assert_eq!(report.best_effort_count(), 2);

        let updated = collection.find(&Query::eq("_id", "0"), &Default::default()).await.unwrap();
        assert_eq!(updated[0].get("flag"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn test_update_mode_upsert() {
        let collection = test_collection("t");
        let mut writer = BatchWriter::new(
            collection.clone(),
            WriteMode::Update { concurrency: 2, upsert: true },
            8,
        )
        .unwrap();
        writer.push(vec![doc! {"_id": "a", "n": 1}]).await.unwrap();
        let report = writer.finish().await.unwrap();
        assert!(report.all_succeeded());
        assert_eq!(collection.count_documents(&Query::all()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_panicking_update_is_recorded_and_released() {
        let store = Arc::new(PanickingStore(MemoryStore::isolated()));
        let collection = ConnectionHandle::new("memory://h/app", store).unwrap().collection("t");
        collection.insert_many(numbered(0..2)).await.unwrap();

        let mut writer = BatchWriter::new(
            collection.clone(),
            WriteMode::Update { concurrency: 2, upsert: false },
            8,
        )
        .unwrap();
        writer
            .push(vec![
                doc! {"_id": "0", "flag": true},
                doc! {"_id": "boom", "flag": true},
                doc! {"_id": "1", "flag": true},
            ])
            .await
            .unwrap();

        let report = tokio::time::timeout(Duration::from_secs(5), writer.finish())
            .await
            .expect("writer drained despite the panic")
            .unwrap();
        assert_eq!(report.handled, 3);
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.failed_units(), 1);
        assert_eq!(report.best_effort_count(), 2);

        let failed = report.failures().next().unwrap();
        assert_eq!(failed.sequence, 1);
        assert!(matches!(&failed.error, Some(DocError::Write(msg)) if msg.contains("worker task failed")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_flush_callback_waits_for_its_own_units() {
        for _ in 0..200 {
            let mut writer = BatchWriter::new(test_collection("t"), WriteMode::Insert { batch_size: 4 }, 8).unwrap();
            // one full batch already in flight, one document left behind
            writer.push(numbered(0..4)).await.unwrap();
            writer.push(numbered(4..5)).await.unwrap();
            assert_eq!(writer.length(), 1);

            let (tx, rx) = oneshot::channel();
            writer
                .flush_with(move |summary| {
                    let _ = tx.send(summary);
                })
                .await
                .unwrap();
            let summary = rx.await.unwrap();
            assert_eq!(summary.handled, 5);
            assert_eq!(summary.failed_units, 0);
        }
    }

    #[tokio::test]
    async fn test_backpressure_blocks_until_worker_catches_up() {
        let collection = test_collection("t");
        let mut writer = BatchWriter::new(collection.clone(), WriteMode::Insert { batch_size: 1 }, 1).unwrap();
        // one unit per document, capacity one: push only returns once most were consumed
        writer.push(numbered(0..50)).await.unwrap();
        assert!(writer.in_flight() <= 2);
        let report = writer.finish().await.unwrap();
        assert_eq!(report.handled, 50);
    }

    #[tokio::test]
    async fn test_options_changes_batch_size() {
        let mut writer = BatchWriter::new(test_collection("t"), WriteMode::Insert { batch_size: 100 }, 8).unwrap();
        writer.options(&QueueOptions::new().max_batch_size(2)).unwrap();
        assert_eq!(writer.mode(), WriteMode::Insert { batch_size: 2 });
        writer.push(numbered(0..3)).await.unwrap();
        assert_eq!(writer.length(), 0);
        assert!(writer.options(&QueueOptions::new().max_batch_size(0)).is_err());
    }

    #[tokio::test]
    async fn test_generated_ids_for_docs_without_id() {
        let collection = test_collection("t");
        let mut writer = BatchWriter::new(collection.clone(), WriteMode::Insert { batch_size: 10 }, 8).unwrap();
        writer.push(vec![doc! {"v": 1}, doc! {"v": 2}]).await.unwrap();
        writer.finish().await.unwrap();

        let docs = collection.find(&Query::all(), &Default::default()).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| d.id().is_some()));
        assert_ne!(docs[0].id(), docs[1].id());
    }

    #[test]
    fn test_writer_needs_runtime() {
        let result = BatchWriter::new(test_collection("t"), WriteMode::Insert { batch_size: 1 }, 1);
        assert!(matches!(result, Err(DocError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_invalid_mode_rejected() {
        assert!(BatchWriter::new(test_collection("t"), WriteMode::Insert { batch_size: 0 }, 1).is_err());
        let update = WriteMode::Update { concurrency: 0, upsert: false };
        assert!(BatchWriter::new(test_collection("t"), update, 1).is_err());
    }
}
