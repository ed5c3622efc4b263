pub mod annotate;
pub mod engine;
pub mod labels;
pub mod pipeline;
pub mod runner;
