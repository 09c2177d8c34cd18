pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod graph;
pub mod jobdef;
pub mod ledger;
pub mod resources;
pub mod scheduler;
pub mod shutdown;
pub mod worker;
