//! Integration tests for dockhand

mod test_fsm;
mod test_git;
mod test_pipeline;
