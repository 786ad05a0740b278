pub mod batch;
pub mod config;
pub mod fetch;
pub mod observability;
pub mod proxy;
pub mod pubchem;
