use std::fmt;
use tracing::debug;
use uuid::Uuid;

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Received,
    Parsed,
    Normalized,
    Located,
    Staged,
    Packed,
    Sent,
    Cleaned,
    Failed(String),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Failed(reason) => write!(f, "Failed({reason})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Traces one request through its stages under a stable id.
#[derive(Debug)]
pub struct RequestFlow {
    id: Uuid,
    route: &'static str,
    stage: Stage,
}

impl RequestFlow {
    pub fn start(route: &'static str) -> Self {
        let id = Uuid::new_v4();
        debug!(request_id = %id, route, "stage: Received");
        Self {
            id,
            route,
            stage: Stage::Received,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn advance(&mut self, next: Stage) {
        debug!(
            request_id = %self.id,
            route = self.route,
            "stage: {} -> {}",
            self.stage,
            next
        );
        self.stage = next;
    }

    pub fn fail(&mut self, reason: impl fmt::Display) {
        self.advance(Stage::Failed(reason.to_string()));
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.stage, Stage::Failed(_))
    }
}
