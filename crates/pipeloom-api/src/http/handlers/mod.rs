//! REST API request handlers, organized by resource.

pub mod run;
pub mod workflow;
