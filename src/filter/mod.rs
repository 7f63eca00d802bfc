//! File filters applied during a scan

mod limit;
mod pattern;

pub use limit::{LimitSet, SizeDateLimit};
pub use pattern::{PatternSet, MATCH_ALL};
