pub mod balance;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod engine;
pub mod errors;
pub mod lexical;
pub mod logging;
pub mod rerank;
pub mod search;
pub mod semantic;
pub mod server;
