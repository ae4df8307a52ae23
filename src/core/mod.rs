pub mod config;
pub mod lifecycle;
pub mod llm;
pub mod ops;
pub mod store;
pub mod terminal;
