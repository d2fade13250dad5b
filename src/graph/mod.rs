pub mod network;
pub use network::*;
pub mod graph;
pub use graph::*;
