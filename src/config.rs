/// Engine-wide policy, passed explicitly into the graph and every template.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Never advise deallocation of inputs loaded from the shared pool.
    ///
    /// Pool inputs may be reused by nodes that are not known yet, so a
    /// coordinator that keeps adding nodes should turn this on.
    pub retain_inputs: bool,

    /// Replicate count for job entries that do not declare one.
    pub default_nstruct: u64,

    /// Skip indices a restored ledger records as output but not completed.
    /// Completed indices are never handed out again regardless.
    pub skip_output_indices: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retain_inputs: false,
            default_nstruct: 1,
            skip_output_indices: true,
        }
    }
}

impl EngineConfig {
    pub fn with_retain_inputs(mut self, retain_inputs: bool) -> Self {
        self.retain_inputs = retain_inputs;
        self
    }

    pub fn with_default_nstruct(mut self, nstruct: u64) -> Self {
        self.default_nstruct = nstruct;
        self
    }

    pub fn with_skip_output_indices(mut self, skip: bool) -> Self {
        self.skip_output_indices = skip;
        self
    }
}

/// Settings for the coordinator task that serializes access to the engine.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Capacity of the command channel shared by all handles.
    pub channel_capacity: usize,
    /// Batch requests above this size are clamped.
    pub max_batch_size: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 100,
            max_batch_size: 1000,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: u64) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: u64,
    /// Number of jobs requested per round trip to the coordinator.
    pub batch_size: u64,
    /// Back-off when no node is ready but the campaign is not finished.
    pub idle_poll_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: 1,
            batch_size: 10,
            idle_poll_ms: 50,
        }
    }
}

impl WorkerConfig {
    pub fn new(worker_id: u64) -> Self {
        Self {
            worker_id,
            ..Default::default()
        }
    }

    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }
}
