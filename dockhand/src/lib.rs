//! dockhand library
//!
//! Deploys a containerized application from a Git repository to a Linux
//! host over SSH and publishes it behind an Nginx reverse proxy.

pub mod app;
pub mod config;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod storage;
pub mod utils;
