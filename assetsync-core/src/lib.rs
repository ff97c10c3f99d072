pub mod audit;
pub mod catalog;
pub mod config;
pub mod deficiency;
pub mod fetch;
pub mod filter;
pub mod hash;
pub mod logical_path;
pub mod manifest;
pub mod path_safety;
pub mod populate;
pub mod progress;
pub mod reconcile;
pub mod remote;
pub mod retry;
pub mod store;
pub mod version;
