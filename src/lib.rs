pub mod algorithm;
pub mod graph;
pub mod mm;
pub mod shortestpath;
pub mod utils;

#[cfg(test)]
mod testutil;
