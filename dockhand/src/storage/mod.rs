//! Local storage layout

pub mod layout;
