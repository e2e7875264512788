//! Connection orchestration for the botwatch operator console.
//!
//! Leaf modules first: [`endpoint`] and [`reconcile`] are pure; [`prober`]
//! and [`session`] own network I/O and publish into the shared
//! [`state::Store`]; [`dispatch`] routes operator actions; [`console`] is the
//! façade the presentation layer calls.

pub mod config;
pub mod console;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod history;
pub mod logfile;
pub mod prober;
pub mod reconcile;
pub mod session;
pub mod state;
pub mod types;
