use std::{path::PathBuf, sync::Arc, time::Duration};

use retrieval_pipeline::SearchEngine;
use tokio_util::sync::CancellationToken;

use crate::idle::IdleTimer;

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<SearchEngine>,
    pub idle: Arc<IdleTimer>,
    pub shutdown: CancellationToken,
    pub state_file: PathBuf,
}

impl ApiState {
    pub fn new(engine: Arc<SearchEngine>, idle_timeout: Duration, state_file: PathBuf) -> Self {
        Self {
            engine,
            idle: Arc::new(IdleTimer::new(idle_timeout)),
            shutdown: CancellationToken::new(),
            state_file,
        }
    }
}
