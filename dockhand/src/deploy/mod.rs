//! Deployment module

pub mod container;
pub mod detect;
pub mod executor;
pub mod fsm;
pub mod git;
pub mod process;
pub mod provision;
pub mod proxy;
pub mod remote;
pub mod validate;
