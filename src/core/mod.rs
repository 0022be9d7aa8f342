//! Core domain abstractions

pub mod catalog;
pub mod config;
pub mod error;
pub mod log;
pub mod market;
pub mod optimize;
pub mod quote;
pub mod strategy;

// Re-export main types for cleaner imports
pub use catalog::{Instrument, InstrumentCatalog};
pub use error::AllocateError;
pub use market::{AllocationResult, ClosePoint, PriceMatrix, PricePoint};
pub use quote::{FetchOutcome, SeriesFetcher};
pub use strategy::Strategy;
