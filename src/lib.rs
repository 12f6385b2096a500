// Library exports for BuzzNet
// This allows integration tests and external code to use BuzzNet modules

pub mod config;
pub mod db;
pub mod error;
pub mod posts;
pub mod routes;
pub mod state;
