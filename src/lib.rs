// src/lib.rs
//! Enumerates the CPSO physician register by postal code, refining any
//! query whose result count is censored until every branch is either fully
//! listed or provably irreducible.

#[macro_use]
mod macros;
#[macro_use]
pub mod log;

pub mod classify;
pub mod cli;
pub mod closure;
pub mod config;
pub mod core;
pub mod error;
pub mod fsa;
pub mod input;
pub mod output;
pub mod permute;
pub mod postal;
pub mod progress;
pub mod query;
pub mod record;
pub mod refine;
pub mod registry;
pub mod store;

pub use classify::{classify, Coverage, Limits};
pub use closure::{ClosureDriver, Summary, SummaryEntry};
pub use error::{Error, Result};
pub use postal::{Alphabet, PostalCode, PostalError};
pub use query::{DoctorType, Query};
pub use record::{QueryResult, Record};
pub use refine::{Generation, IrreducibleReason, Refinement, Refiner};
pub use registry::{RegistryService, ServiceError};
pub use store::{FileStore, MemoryStore, RecordStore};
