//! Finite State Machine for the deployment pipeline

use std::fmt;

use serde::{Deserialize, Serialize};

/// Pipeline steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    ParameterCollection,
    SourceAcquisition,
    BuildDetection,
    Reachability,
    Provisioning,
    Launch,
    ProxyConfiguration,
    Validation,
}

impl PipelineStep {
    pub const ALL: [PipelineStep; 8] = [
        PipelineStep::ParameterCollection,
        PipelineStep::SourceAcquisition,
        PipelineStep::BuildDetection,
        PipelineStep::Reachability,
        PipelineStep::Provisioning,
        PipelineStep::Launch,
        PipelineStep::ProxyConfiguration,
        PipelineStep::Validation,
    ];

    /// 1-based position in the pipeline
    pub fn number(self) -> usize {
        self as usize + 1
    }

    pub fn next(self) -> Option<PipelineStep> {
        Self::ALL.get(self.number()).copied()
    }

    pub fn title(self) -> &'static str {
        match self {
            PipelineStep::ParameterCollection => "Parameter collection",
            PipelineStep::SourceAcquisition => "Source acquisition",
            PipelineStep::BuildDetection => "Build-method detection",
            PipelineStep::Reachability => "Remote reachability check",
            PipelineStep::Provisioning => "Remote environment preparation",
            PipelineStep::Launch => "Artifact transfer and container launch",
            PipelineStep::ProxyConfiguration => "Reverse proxy configuration",
            PipelineStep::Validation => "Post-deploy validation",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] {}", self.number(), Self::ALL.len(), self.title())
    }
}

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    /// Nothing has run yet
    Pending,

    /// The step is executing
    Running(PipelineStep),

    /// Every step completed
    Succeeded,

    /// The step failed and the run was aborted
    Failed(PipelineStep),
}

/// Pipeline event
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Begin the given step
    Start(PipelineStep),

    /// The running step completed
    StepSucceeded,

    /// The running step failed
    StepFailed(String),
}

/// Pipeline FSM. Steps run strictly forward, one at a time, and a failure
/// is terminal.
#[derive(Debug, Clone)]
pub struct PipelineFsm {
    state: PipelineState,
    completed: Vec<PipelineStep>,
    error: Option<String>,
}

impl PipelineFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self {
            state: PipelineState::Pending,
            completed: Vec::new(),
            error: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Steps that completed, in order
    pub fn completed(&self) -> &[PipelineStep] {
        &self.completed
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The step expected to start next
    fn expected_next(&self) -> Option<PipelineStep> {
        match self.completed.last() {
            None => Some(PipelineStep::ALL[0]),
            Some(step) => step.next(),
        }
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: PipelineEvent) -> Result<(), String> {
        let new_state = match (self.state, &event) {
            (PipelineState::Pending, PipelineEvent::Start(step))
                if Some(*step) == self.expected_next() =>
            {
                PipelineState::Running(*step)
            }
            (PipelineState::Running(step), PipelineEvent::StepSucceeded) => {
                self.completed.push(step);
                match step.next() {
                    Some(_) => PipelineState::Pending,
                    None => PipelineState::Succeeded,
                }
            }
            (PipelineState::Running(step), PipelineEvent::StepFailed(err)) => {
                self.error = Some(err.clone());
                PipelineState::Failed(step)
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            PipelineState::Succeeded | PipelineState::Failed(_)
        )
    }
}

impl Default for PipelineFsm {
    fn default() -> Self {
        Self::new()
    }
}
