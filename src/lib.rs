//! MozTrap server library.
//!
//! Test case management: products and their versions, a library of test
//! cases and suites, test runs, and the results testers record while
//! executing them.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod forms;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;
