//! Quote inbox: matches vendor replies to outstanding quote requests,
//! extracts their pricing and folds it into the wedding planner.

pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod planner;
pub mod quotes;
pub mod replay;
pub mod store;
