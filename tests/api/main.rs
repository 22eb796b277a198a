//! HTTP API test suite.
//!
//! Every test builds the app over its own in-memory SQLite database, with
//! fake BrowserID and OpenID verifiers and a mailer that records messages.
//!
//! Run with: cargo test --test api

mod helpers;

mod test_accounts;
mod test_manage;
mod test_runs;
mod test_runtests;
