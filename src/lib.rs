//! # Job Alert
//!
//! Watches Melbourne Korean-community job boards for construction and
//! casual-labour postings and sends new ones to a Slack channel.
//!
//! Each run scrapes every configured board, keeps postings that hit a
//! keyword and no blacklist term, drops the ones already notified, and
//! sends one summary message. Boards that keep failing are escalated in
//! the message once their failure streak reaches a threshold, and a quiet
//! week produces a single heartbeat so silence is never ambiguous.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌─────────────┐   ┌────────┐
//! │   Sources    │──▶│  Keyword   │──▶│ State store │──▶│ Slack  │
//! │ woorimel/... │   │ + blacklist│   │  (SQLite)   │   │webhook │
//! └──────────────┘   └────────────┘   └─────────────┘   └────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Settings from environment variables |
//! | [`models`] | Postings, per-source results, run summaries |
//! | [`error`] | Typed errors |
//! | [`traits`] | `Source`, `Sender`, `Clock`, and the source registry |
//! | [`keywords`] | Text normalization and keyword/blacklist matching |
//! | [`scrape`] | Board link extraction shared by the connectors |
//! | [`connector_woorimel`] | woorimel.com board |
//! | [`connector_melbsky`] | melbsky.com board |
//! | [`connector_hojubada`] | hojubada.com board (saved session) |
//! | [`session`] | Captured session file handling |
//! | [`retry`] | Retries and fault isolation per source |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`store`] | Sent ledger, failure streaks, heartbeat, run log |
//! | [`message`] | Slack summary rendering |
//! | [`notify`] | Slack webhook sender |
//! | [`pipeline`] | One end-to-end run |
//! | [`status`] | `job-alert status` report |

pub mod config;
pub mod connector_hojubada;
pub mod connector_melbsky;
pub mod connector_woorimel;
pub mod db;
pub mod error;
pub mod keywords;
pub mod message;
pub mod migrate;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod retry;
pub mod scrape;
pub mod session;
pub mod status;
pub mod store;
pub mod traits;
