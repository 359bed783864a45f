pub mod artifacts;
pub mod config;
pub mod db;
pub mod error;
