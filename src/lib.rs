// smscost library crate
// Exposes modules for integration testing

pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod models;
pub mod output;
pub mod reconcile;
pub mod segments;
pub mod service;
pub mod storage;
pub mod utils;
