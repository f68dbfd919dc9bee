//! # Mastodoff
//!
//! Which of two Mastodon accounts is more likely to have written a given
//! piece of text?
//!
//! Mastodoff stores the public statuses of Mastodon accounts together with
//! sentence embeddings of their text, and answers that question by fitting a
//! two-class logistic regression on the stored embeddings of both accounts.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────┐
//! │  Mastodon  │──▶│    ingest    │──▶│  SQLite  │
//! │  REST API  │   │ text + embed │   │ accounts │
//! └────────────┘   └──────────────┘   │ statuses │
//!                                     └────┬─────┘
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌──────────┐
//!                 │   CLI    │       │   HTTP   │
//!                 │(mastodoff│       │  (HTML)  │
//!                 └──────────┘       └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error hierarchy |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`context`] | Shared handles for every operation |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation and reset |
//! | [`models`] | Remote and stored data types |
//! | [`store`] | Account and status queries |
//! | [`mastodon`] | Mastodon API client |
//! | [`embedding`] | Embedding providers |
//! | [`text`] | Plain text from status HTML |
//! | [`ingest`] | Adding accounts |
//! | [`lookup`] | Reading stored accounts |
//! | [`classifier`] | Logistic regression |
//! | [`predict`] | Authorship prediction |
//! | [`html`] | Page rendering |
//! | [`server`] | HTTP server |

pub mod classifier;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod html;
pub mod ingest;
pub mod logging;
pub mod lookup;
pub mod mastodon;
pub mod migrate;
pub mod models;
pub mod predict;
pub mod server;
pub mod store;
pub mod text;
