//! Billing domain layer for the Ratecard client core.
//!
//! Pure domain types and the entity-specific cache operations:
//!
//! - [`billing`]: billable-cost settings, form transforms, and the
//!   billable-hours / hourly-rate calculators
//! - [`expenses`]: the rank-ordered fixed-expense collection
//! - [`mutation`]: the pipeline composing optimistic updates, retry, and
//!   the circuit breaker around entity mutations

#![forbid(unsafe_code)]

pub mod billing;
pub mod expenses;
pub mod mutation;

pub use billing::{BillableCostForm, BillableCostSettings};
pub use expenses::FixedExpense;
pub use mutation::MutationPipeline;
