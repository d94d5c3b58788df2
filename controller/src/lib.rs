pub mod config;
pub mod context;
pub mod diff;
mod error;
pub mod events;
pub mod health;
pub mod reconcile;
pub mod shutdown;
pub mod slurm;
pub mod store;
pub mod supervisor;
pub mod token;
pub mod tracing;

pub use config::{Config, ConfigError};
pub use context::Context;
pub use error::{Error, Result, TokenError};
pub use events::{EventOutcome, SkipReason};
pub use reconcile::{ReconcileOutcome, TickReport};
pub use slurm::SlurmClient;
pub use store::JobStore;
pub use supervisor::Supervisor;
pub use token::TokenManager;
