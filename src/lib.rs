//! profilesnap — periodic profile screenshot automation.
//!
//! One run captures a screenshot of a public profile page, publishes it to
//! a GitHub repository, rewrites the repository's README to reference the
//! newest screenshot, and trims old screenshots down to the retention
//! bound. See `workflow` for the pipeline contract.

pub mod artifact;
pub mod capture;
pub mod config;
pub mod document;
pub mod observability;
pub mod publish;
pub mod retention;
pub mod retry;
pub mod store;
pub mod workflow;
