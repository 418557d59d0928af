// Library exports for mercadito
// This allows integration tests and external code to use mercadito modules

pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod geo;
pub mod inbox;
pub mod routes;
pub mod search;
pub mod source;
pub mod state;
