pub mod config;
pub mod controller;
pub mod humanize;
pub mod observability;
pub mod transport;
