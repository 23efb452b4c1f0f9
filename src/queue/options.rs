/// Write queue options
///
/// Shared by a client and the writers it creates. `limit` applies to mapped
/// reads, not to writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueOptions {
    /// Documents per bulk insert
    pub max_batch_size: usize,

    /// Parallel workers in update mode
    pub concurrency: usize,

    /// Insert documents that an update does not match
    pub upsert: bool,

    /// Row limit for mapped reads; 0 means unlimited
    pub limit: usize,

    /// Units of work that may wait in a writer's queue before `push` blocks
    pub queue_capacity: usize,
}

impl QueueOptions {
    pub const DEFAULT_MAX_BATCH_SIZE: usize = 10_000;
    pub const DEFAULT_CONCURRENCY: usize = 4;
    pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

    pub fn new() -> Self {
        Self {
            max_batch_size: Self::DEFAULT_MAX_BATCH_SIZE,
            concurrency: Self::DEFAULT_CONCURRENCY,
            upsert: false,
            limit: 0,
            queue_capacity: Self::DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Set the batch size
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Set update-mode concurrency
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    /// Set the read limit
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Validate options
    pub fn validate(&self) -> Result<(), String> {
        if self.max_batch_size == 0 {
            return Err("max_batch_size must be > 0".to_string());
        }

        if self.concurrency == 0 {
            return Err("concurrency must be > 0".to_string());
        }

        if self.queue_capacity == 0 {
            return Err("queue_capacity must be > 0".to_string());
        }

        Ok(())
    }
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// How a writer turns pushed documents into store calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Chunks of up to `batch_size` documents, inserted one chunk at a time
    /// in submission order.
    Insert { batch_size: usize },
    /// One id-keyed `$set` per document, `concurrency` at a time.
    Update { concurrency: usize, upsert: bool },
}

impl WriteMode {
    pub fn from_options(options: &QueueOptions, update_only: bool) -> Self {
        if update_only {
            Self::Update {
                concurrency: options.concurrency,
                upsert: options.upsert,
            }
        } else {
            Self::Insert {
                batch_size: options.max_batch_size,
            }
        }
    }

    /// Units of work allowed to run at once.
    pub fn workers(&self) -> usize {
        match self {
            Self::Insert { .. } => 1,
            Self::Update { concurrency, .. } => *concurrency,
        }
    }

    pub fn is_update(&self) -> bool {
        matches!(self, Self::Update { .. })
    }
}
