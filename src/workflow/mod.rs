//! Credential validation workflow.
//!
//! Drives the provider's login form or refresh control on an identity's
//! browser session and runs that work on a bounded pool.

mod outcome;
mod pool;
mod validator;

pub use outcome::{Interaction, ProbeReport, ValidationFailure, ValidationOutcome};
pub use pool::{PoolError, WorkerPool};
pub use validator::{Attempt, CredentialValidator, Prepared};
