//! FSM unit tests

use dockhand::deploy::fsm::{PipelineEvent, PipelineFsm, PipelineState, PipelineStep};

#[test]
fn test_fsm_initial_state() {
    let fsm = PipelineFsm::new();
    assert_eq!(fsm.state(), PipelineState::Pending);
    assert!(fsm.error().is_none());
    assert!(fsm.completed().is_empty());
    assert!(!fsm.is_finished());
}

#[test]
fn test_fsm_step_success_flow() {
    let mut fsm = PipelineFsm::new();

    // Pending -> Running
    fsm.process(PipelineEvent::Start(PipelineStep::ParameterCollection))
        .unwrap();
    assert_eq!(
        fsm.state(),
        PipelineState::Running(PipelineStep::ParameterCollection)
    );

    // Running -> Pending, waiting for the next step
    fsm.process(PipelineEvent::StepSucceeded).unwrap();
    assert_eq!(fsm.state(), PipelineState::Pending);
    assert_eq!(fsm.completed(), &[PipelineStep::ParameterCollection]);
}

#[test]
fn test_fsm_failure_mid_pipeline() {
    let mut fsm = PipelineFsm::new();
    for step in &PipelineStep::ALL[..3] {
        fsm.process(PipelineEvent::Start(*step)).unwrap();
        fsm.process(PipelineEvent::StepSucceeded).unwrap();
    }

    fsm.process(PipelineEvent::Start(PipelineStep::Reachability))
        .unwrap();
    fsm.process(PipelineEvent::StepFailed("host unreachable".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), PipelineState::Failed(PipelineStep::Reachability));
    assert_eq!(fsm.error(), Some("host unreachable"));
    assert_eq!(fsm.completed().len(), 3);
}

#[test]
fn test_fsm_invalid_transitions() {
    let mut fsm = PipelineFsm::new();

    // Cannot finish a step that never started
    assert!(fsm.process(PipelineEvent::StepSucceeded).is_err());
    assert!(fsm
        .process(PipelineEvent::StepFailed("x".to_string()))
        .is_err());

    // Cannot start a step twice
    fsm.process(PipelineEvent::Start(PipelineStep::ParameterCollection))
        .unwrap();
    assert!(fsm
        .process(PipelineEvent::Start(PipelineStep::ParameterCollection))
        .is_err());

    // Cannot go back
    fsm.process(PipelineEvent::StepSucceeded).unwrap();
    assert!(fsm
        .process(PipelineEvent::Start(PipelineStep::ParameterCollection))
        .is_err());
}

#[test]
fn test_step_order() {
    let numbers: Vec<usize> = PipelineStep::ALL.iter().map(|s| s.number()).collect();
    assert_eq!(numbers, (1..=8).collect::<Vec<_>>());
    assert_eq!(
        PipelineStep::ParameterCollection.next(),
        Some(PipelineStep::SourceAcquisition)
    );
}
