//! Wedding planner entities: supplier budgets, tasks, meetings and expenses.

pub mod model;

pub use model::{
    BudgetKey, BudgetLine, BudgetStatus, BudgetUpsert, Meeting, MeetingKind, SupplierBudget, Task,
    Transaction, WeddingSupplier, amount_tolerance, normalize_description,
};
