//! Crawl state types: persisted records and typed pass outcomes

mod outcome;
mod records;

pub use outcome::{PassOutcome, RunPlan};
pub use records::{Comment, GrowthRecord, VideoRecord};
