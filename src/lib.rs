//! Real-time chat-and-poll synchronization backend.
//!
//! A single-writer authority owns the current poll and the bounded message
//! log, serializes every mutation, persists through an abstract store, and
//! fans resulting state changes out to any number of SSE subscribers. All
//! clients converge on the same view because all of them observe the same
//! committed order.

pub mod authority;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod handlers;
pub mod models;
pub mod poll;
pub mod routes;
pub mod store;
