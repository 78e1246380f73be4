// measc — Measures compiler
//
// Library root. Stages in pipeline order: scan → raw → process → population
// → resolve. `pipeline` drives them; `cache` backs incremental sessions.

pub mod cache;
pub mod diag;
pub mod pass;
pub mod pipeline;
pub mod population;
pub mod process;
pub mod raw;
pub mod resolve;
pub mod scan;
pub mod types;
pub mod validity;
