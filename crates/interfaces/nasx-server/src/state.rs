use nasx_pipeline::ExportPipeline;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ExportPipeline>,
    pub chunk_timeout: Duration,
}

impl AppState {
    pub fn new(pipeline: ExportPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            chunk_timeout: Duration::from_secs(nasx_config::STREAM_CHUNK_TIMEOUT_SECS),
        }
    }

    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = timeout;
        self
    }
}
