use crate::connection::Collection;
use crate::core::{DocError, Query, Result};
use crate::queue::{BatchWriter, QueueOptions, WriteMode, WriteReport};
use crate::scan::all_ids;
use log::info;
use tracing::{Instrument, Level, event, info_span};

/// Bulk copy options
#[derive(Debug, Clone, PartialEq)]
pub struct BulkCopyOptions {
    /// Ids fetched and written per page; `None` uses the writer batch size
    pub chunk_size: Option<usize>,

    /// Copy even when source and destination are the same collection
    pub allow_identical: bool,

    /// Restricts the copy to matching documents
    pub query: Query,
}

impl BulkCopyOptions {
    pub fn new() -> Self {
        Self {
            chunk_size: None,
            allow_identical: false,
            query: Query::all(),
        }
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size);
        self
    }

    pub fn allow_identical(mut self, allow: bool) -> Self {
        self.allow_identical = allow;
        self
    }

    pub fn query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }
}

impl Default for BulkCopyOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// What a finished copy did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkCopySummary {
    /// Every write unit succeeded
    pub ok: bool,
    /// Identifiers enumerated in the source
    pub total_count: usize,
    /// Documents the destination reports as written
    pub written: usize,
    pub report: WriteReport,
}

/// Copies documents from one collection into another
///
/// Enumerates source ids, then walks them one page at a time: each page is
/// fetched by `_id` and pushed into an insert-mode writer on the destination.
/// Read failures abort the copy; write failures are recorded in the report.
#[derive(Debug)]
pub struct BulkCopyPipeline {
    source: Collection,
    destination: Collection,
    writer_options: QueueOptions,
    options: BulkCopyOptions,
}

impl BulkCopyPipeline {
    pub fn new(
        source: Collection,
        destination: Collection,
        writer_options: QueueOptions,
        options: BulkCopyOptions,
    ) -> Self {
        Self {
            source,
            destination,
            writer_options,
            options,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.options
            .chunk_size
            .unwrap_or(self.writer_options.max_batch_size)
    }

    /// Fails when the copy would write into the collection it reads from.
    pub fn check(&self) -> Result<()> {
        if !self.options.allow_identical && self.source.same_as(&self.destination) {
            return Err(DocError::Configuration(format!(
                "cannot copy {} onto itself",
                self.source.namespace()
            )));
        }
        if self.chunk_size() == 0 {
            return Err(DocError::Configuration("chunk_size must be > 0".to_string()));
        }
        self.writer_options
            .validate()
            .map_err(DocError::Configuration)
    }

    pub async fn run(self) -> Result<BulkCopySummary> {
        self.check()?;

        let span = info_span!(
            "docbatch.bulk_copy",
            source = %self.source.namespace(),
            destination = %self.destination.namespace()
        );
        self.copy().instrument(span).await
    }

    async fn copy(self) -> Result<BulkCopySummary> {
        let chunk_size = self.chunk_size();
        let mode = WriteMode::Insert {
            batch_size: self.writer_options.max_batch_size,
        };
        let mut writer = BatchWriter::new(
            self.destination.clone(),
            mode,
            self.writer_options.queue_capacity,
        )?;

        let ids = all_ids(&self.source, &self.options.query).await.map_err(|err| {
            event!(Level::ERROR, error = %err, "id enumeration failed");
            err
        })?;
        info!("[bulk_save] info: {} {}", self.destination.name(), ids.len());

        for page in ids.chunks(chunk_size) {
            let docs = self
                .source
                .find(&Query::ids_in(page), &Default::default())
                .await
                .map_err(|err| {
                    let err = err.into_read();
                    event!(Level::ERROR, error = %err, "page fetch failed");
                    err
                })?;
            writer.push(docs).await?;
        }

        let report = writer.finish().await?;
        let summary = BulkCopySummary {
            ok: report.all_succeeded(),
            total_count: ids.len(),
            written: report.best_effort_count(),
            report,
        };
        event!(
            Level::INFO,
            total = summary.total_count,
            written = summary.written,
            ok = summary.ok,
            "bulk copy finished"
        );
        Ok(summary)
    }
}
