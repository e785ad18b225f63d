// authority.rs
//
// The single owner of the poll and the message log. Every mutation, query,
// and subscription passes through one task, so all observers agree on one
// total order of state changes and concurrent votes can never overwrite
// each other.
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{info, warn};

use crate::chat::{self, MessageLog};
use crate::error::SyncError;
use crate::feed::{self, ChangeFeed, FeedEvent};
use crate::models::{ActorId, Author, LogEntry, Poll};
use crate::poll;
use crate::store::{self, Store};

pub const POLL_KEY: &str = "poll/current";
pub const CHAT_KEY: &str = "chat/log";

const COMMAND_BUFFER: usize = 64;

/// Tunables for a spawned authority.
#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    pub chat_capacity: usize,
    pub feed_capacity: usize,
    pub admin: Option<ActorId>,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            chat_capacity: chat::DEFAULT_CAPACITY,
            feed_capacity: feed::DEFAULT_CAPACITY,
            admin: None,
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, SyncError>>;

enum Command {
    CreatePoll {
        question: String,
        options: Vec<String>,
        actor: ActorId,
        reply: Reply<Poll>,
    },
    Vote {
        poll_id: String,
        option_index: usize,
        actor: ActorId,
        reply: Reply<Poll>,
    },
    Unvote {
        poll_id: String,
        option_index: usize,
        actor: ActorId,
        reply: Reply<Poll>,
    },
    RemovePoll {
        poll_id: String,
        actor: ActorId,
        reply: Reply<()>,
    },
    SendMessage {
        text: String,
        author: Author,
        reply: Reply<LogEntry>,
    },
    CurrentPoll {
        reply: oneshot::Sender<Option<Poll>>,
    },
    Messages {
        reply: oneshot::Sender<Vec<LogEntry>>,
    },
    Subscribe {
        reply: oneshot::Sender<Subscription>,
    },
}

/// Initial snapshot plus the live event stream. Composed inside the
/// authority loop, so no event can fall between the two.
pub struct Subscription {
    pub backlog: Vec<FeedEvent>,
    pub live: broadcast::Receiver<FeedEvent>,
}

/// Cloneable handle to the authority task.
#[derive(Clone)]
pub struct Authority {
    tx: mpsc::Sender<Command>,
}

impl Authority {
    /// Hydrate state from the store and start the command loop.
    pub async fn spawn(store: Arc<dyn Store>, config: AuthorityConfig) -> Result<Self, SyncError> {
        let state = AuthorityState::hydrate(store, config).await?;
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(state.run(rx));
        Ok(Self { tx })
    }

    pub async fn create_poll(
        &self,
        question: String,
        options: Vec<String>,
        actor: ActorId,
    ) -> Result<Poll, SyncError> {
        self.request(|reply| Command::CreatePoll {
            question,
            options,
            actor,
            reply,
        })
        .await
    }

    pub async fn vote(
        &self,
        poll_id: String,
        option_index: usize,
        actor: ActorId,
    ) -> Result<Poll, SyncError> {
        self.request(|reply| Command::Vote {
            poll_id,
            option_index,
            actor,
            reply,
        })
        .await
    }

    pub async fn unvote(
        &self,
        poll_id: String,
        option_index: usize,
        actor: ActorId,
    ) -> Result<Poll, SyncError> {
        self.request(|reply| Command::Unvote {
            poll_id,
            option_index,
            actor,
            reply,
        })
        .await
    }

    pub async fn remove_poll(&self, poll_id: String, actor: ActorId) -> Result<(), SyncError> {
        self.request(|reply| Command::RemovePoll {
            poll_id,
            actor,
            reply,
        })
        .await
    }

    pub async fn send_message(&self, text: String, author: Author) -> Result<LogEntry, SyncError> {
        self.request(|reply| Command::SendMessage {
            text,
            author,
            reply,
        })
        .await
    }

    pub async fn current_poll(&self) -> Result<Option<Poll>, SyncError> {
        self.query(|reply| Command::CurrentPoll { reply }).await
    }

    pub async fn messages(&self) -> Result<Vec<LogEntry>, SyncError> {
        self.query(|reply| Command::Messages { reply }).await
    }

    pub async fn subscribe(&self) -> Result<Subscription, SyncError> {
        self.query(|reply| Command::Subscribe { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, SyncError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| SyncError::Transient("authority is not running".into()))?;
        reply_rx
            .await
            .map_err(|_| SyncError::Transient("authority dropped the request".into()))?
    }

    async fn query<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SyncError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| SyncError::Transient("authority is not running".into()))?;
        reply_rx
            .await
            .map_err(|_| SyncError::Transient("authority dropped the request".into()))
    }
}

struct AuthorityState {
    store: Arc<dyn Store>,
    feed: ChangeFeed,
    poll: Option<Poll>,
    log: MessageLog,
    admin: Option<ActorId>,
}

impl AuthorityState {
    async fn hydrate(store: Arc<dyn Store>, config: AuthorityConfig) -> Result<Self, SyncError> {
        let poll = match store.get(POLL_KEY).await? {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|err| {
                warn!(error = %err, "discarding unreadable persisted poll");
                None
            }),
            None => None,
        };
        let entries: Vec<LogEntry> = match store.get(CHAT_KEY).await? {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|err| {
                warn!(error = %err, "discarding unreadable persisted chat log");
                Vec::new()
            }),
            None => Vec::new(),
        };
        let log = MessageLog::hydrate(config.chat_capacity, entries);
        info!(
            has_poll = poll.is_some(),
            messages = log.len(),
            "authority hydrated"
        );
        Ok(Self {
            store,
            feed: ChangeFeed::new(config.feed_capacity),
            poll,
            log,
            admin: config.admin,
        })
    }

    // One command at a time: this loop is the serialization point for every
    // mutation of the poll and the log.
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            self.handle(command).await;
        }
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::CreatePoll {
                question,
                options,
                actor,
                reply,
            } => {
                let _ = reply.send(self.create_poll(question, options, actor).await);
            }
            Command::Vote {
                poll_id,
                option_index,
                actor,
                reply,
            } => {
                let _ = reply.send(self.vote(poll_id, option_index, actor).await);
            }
            Command::Unvote {
                poll_id,
                option_index,
                actor,
                reply,
            } => {
                let _ = reply.send(self.unvote(poll_id, option_index, actor).await);
            }
            Command::RemovePoll {
                poll_id,
                actor,
                reply,
            } => {
                let _ = reply.send(self.remove_poll(poll_id, actor).await);
            }
            Command::SendMessage {
                text,
                author,
                reply,
            } => {
                let _ = reply.send(self.send_message(text, author).await);
            }
            Command::CurrentPoll { reply } => {
                let _ = reply.send(self.poll.clone());
            }
            Command::Messages { reply } => {
                let _ = reply.send(self.log.snapshot());
            }
            Command::Subscribe { reply } => {
                let _ = reply.send(self.subscribe());
            }
        }
    }

    async fn create_poll(
        &mut self,
        question: String,
        options: Vec<String>,
        actor: ActorId,
    ) -> Result<Poll, SyncError> {
        let poll = poll::create(&question, &options, &actor)?;
        // Creation is persisted exactly once; a transient failure surfaces
        // to the caller, never a blind retry.
        self.store.put(POLL_KEY, encode(&poll)?).await?;
        info!(poll_id = %poll.id, creator = %actor, "poll created");
        self.poll = Some(poll.clone());
        self.feed.publish(FeedEvent::PollUpdated { poll: poll.clone() });
        Ok(poll)
    }

    async fn vote(
        &mut self,
        poll_id: String,
        option_index: usize,
        actor: ActorId,
    ) -> Result<Poll, SyncError> {
        let mut next = self.require_poll(&poll_id)?.clone();
        let changed = poll::vote(&mut next, option_index, &actor)?;
        if changed {
            self.persist_poll_retrying(&next).await?;
            info!(
                poll_id = %next.id,
                option = option_index,
                voter = %actor,
                version = next.version,
                "vote applied"
            );
            self.commit_poll(next.clone());
        }
        Ok(next)
    }

    async fn unvote(
        &mut self,
        poll_id: String,
        option_index: usize,
        actor: ActorId,
    ) -> Result<Poll, SyncError> {
        let mut next = self.require_poll(&poll_id)?.clone();
        let changed = poll::unvote(&mut next, option_index, &actor)?;
        if changed {
            self.persist_poll_retrying(&next).await?;
            info!(
                poll_id = %next.id,
                option = option_index,
                voter = %actor,
                version = next.version,
                "vote withdrawn"
            );
            self.commit_poll(next.clone());
        }
        Ok(next)
    }

    async fn remove_poll(&mut self, poll_id: String, actor: ActorId) -> Result<(), SyncError> {
        let current = self.require_poll(&poll_id)?;
        if !self.is_admin(&actor) {
            poll::authorize_removal(current, &actor)?;
        }
        // Removal, like create, gets a single write.
        self.store.put(POLL_KEY, Value::Null).await?;
        info!(poll_id = %poll_id, requester = %actor, "poll removed");
        self.poll = None;
        self.feed.publish(FeedEvent::PollRemoved { id: poll_id });
        Ok(())
    }

    async fn send_message(&mut self, text: String, author: Author) -> Result<LogEntry, SyncError> {
        // Stage on a scratch copy; a failed store write leaves the log
        // untouched.
        let mut next = MessageLog::hydrate(self.log.capacity(), self.log.snapshot());
        let entry = next.append(author, &text, Utc::now())?;
        let value = encode(&next.snapshot())?;
        let store = self.store.clone();
        store::with_retry("chat write", || {
            let store = store.clone();
            let value = value.clone();
            async move { store.put(CHAT_KEY, value).await }
        })
        .await?;
        info!(seq = entry.seq, author = %entry.author.id, "message appended");
        self.log = next;
        self.feed.publish(FeedEvent::MessageAppended {
            entry: entry.clone(),
        });
        Ok(entry)
    }

    fn subscribe(&self) -> Subscription {
        let mut backlog = Vec::with_capacity(self.log.len() + 1);
        if let Some(poll) = &self.poll {
            backlog.push(FeedEvent::PollUpdated { poll: poll.clone() });
        }
        backlog.extend(
            self.log
                .snapshot()
                .into_iter()
                .map(|entry| FeedEvent::MessageAppended { entry }),
        );
        Subscription {
            backlog,
            live: self.feed.subscribe(),
        }
    }

    fn require_poll(&self, poll_id: &str) -> Result<&Poll, SyncError> {
        match &self.poll {
            Some(poll) if poll.id == poll_id => Ok(poll),
            _ => Err(SyncError::NotFound),
        }
    }

    fn is_admin(&self, actor: &ActorId) -> bool {
        self.admin.as_ref().is_some_and(|admin| admin == actor)
    }

    async fn persist_poll_retrying(&self, poll: &Poll) -> Result<(), SyncError> {
        let value = encode(poll)?;
        let store = self.store.clone();
        store::with_retry("poll write", || {
            let store = store.clone();
            let value = value.clone();
            async move { store.put(POLL_KEY, value).await }
        })
        .await?;
        Ok(())
    }

    fn commit_poll(&mut self, poll: Poll) {
        self.poll = Some(poll.clone());
        self.feed.publish(FeedEvent::PollUpdated { poll });
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value, SyncError> {
    serde_json::to_value(value)
        .map_err(|err| SyncError::Transient(format!("could not encode state: {err}")))
}
