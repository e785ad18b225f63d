// src/config.rs
use std::env;
use std::str::FromStr;

use crate::chat;
use crate::feed;
use crate::models::ActorId;

/// Runtime configuration, read from the environment once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub chat_capacity: usize,
    pub feed_capacity: usize,
    pub admin_actor: Option<ActorId>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            // Default to 3030 for local development
            port: parsed("PORT", 3030),
            database_url: env::var("DATABASE_URL").ok(),
            chat_capacity: parsed("CHAT_CAPACITY", chat::DEFAULT_CAPACITY),
            feed_capacity: parsed("FEED_CAPACITY", feed::DEFAULT_CAPACITY),
            admin_actor: env::var("ADMIN_ACTOR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(ActorId),
        }
    }
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid number")),
        Err(_) => default,
    }
}
