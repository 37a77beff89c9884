//! Utility modules: polling, timeout.

pub mod poll;
pub mod timeout;
