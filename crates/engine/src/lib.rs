//! The caption job engine.
//!
//! [`controller::JobController`] owns the job lifecycle state machine and
//! spawns one [`worker`] task per running job. The worker drains the job's
//! eligible files through the [`pipeline`], persisting a checkpoint after
//! every file; [`progress`] provides a read-only polling feed over that
//! persisted state.

pub mod controller;
pub mod pipeline;
pub mod progress;
pub mod worker;
