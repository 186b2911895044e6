//! Persistence layer: per-collection traits and the in-memory backend.

pub mod memory;
pub mod traits;

pub use memory::{InMemoryStore, StoreSeed};
pub use traits::{
    BudgetStore, Database, GoldenExampleStore, MailLinkage, MailStore, PlannerStore, QuoteRequestStore,
    QuoteResponseStore, ResponseInsert, VendorStore,
};
