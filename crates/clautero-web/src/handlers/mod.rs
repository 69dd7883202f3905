pub mod ping;
pub mod summarize;
pub mod tags;
