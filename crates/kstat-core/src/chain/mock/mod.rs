//! Mock kstat chain for tests and for hosts without libkstat.

mod chain;
mod scenarios;

pub use chain::MockChain;
