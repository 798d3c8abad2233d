use std::fmt;
use std::sync::Arc;

use common::Observation;

use crate::{Policy, PolicyKind};

type DecisionFn = dyn Fn(&Observation) -> f64 + Send + Sync;

/// Wraps an externally trained decision function as a policy.
///
/// The decision function is opaque: it only ever sees observations, exactly
/// like the baselines, and must be deterministic for runs to be reproducible.
#[derive(Clone)]
pub struct ExternalAgent {
    name: String,
    decide: Arc<DecisionFn>,
}

impl ExternalAgent {
    pub fn new<F>(name: impl Into<String>, decide: F) -> Self
    where
        F: Fn(&Observation) -> f64 + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            decide: Arc::new(decide),
        }
    }
}

impl fmt::Debug for ExternalAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalAgent")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Policy for ExternalAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::External
    }

    fn act(&self, observation: &Observation) -> f64 {
        (self.decide)(observation)
    }
}
