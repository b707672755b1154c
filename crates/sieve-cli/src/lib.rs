pub mod export;
pub mod input;
pub mod output;
pub mod runner;
