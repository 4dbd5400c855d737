//! Channel membership: which live connections receive which scopes.
//!
//! The registry is the only writer of membership. Join, leave and fan-out
//! enumeration all go through `DashMap` shard locks, so a connection never
//! receives on a channel after its leave has returned, and a join never
//! interleaves with a send on the same channel.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use live_common::Scope;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// An instruction queued for one connection's writer.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A pre-encoded text frame, shared between all recipients.
    Frame(Arc<str>),
    /// Close the connection with the given code and reason.
    Close { code: u16, reason: &'static str },
}

type Members = HashMap<String, mpsc::Sender<Outbound>>;

pub struct ChannelRegistry {
    channels: DashMap<String, Members>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Enroll a connection in every channel of `scopes`.
    ///
    /// Membership lasts until the returned guard is dropped.
    pub fn join(
        self: &Arc<Self>,
        connection_id: &str,
        scopes: &[Scope],
        tx: mpsc::Sender<Outbound>,
    ) -> Membership {
        let mut joined = Vec::with_capacity(scopes.len());
        for scope in scopes {
            let channel = scope.channel();
            self.channels
                .entry(channel.clone())
                .or_default()
                .insert(connection_id.to_string(), tx.clone());
            tracing::debug!(%connection_id, %channel, "joined channel");
            joined.push(channel);
        }

        Membership {
            registry: Arc::clone(self),
            connection_id: connection_id.to_string(),
            channels: joined,
        }
    }

    fn leave(&self, connection_id: &str, channel: &str) {
        {
            if let Some(mut members) = self.channels.get_mut(channel) {
                members.remove(connection_id);
            }
        }
        self.channels.remove_if(channel, |_, members| members.is_empty());
        tracing::debug!(%connection_id, %channel, "left channel");
    }

    /// Queue `out` for every connection in `scope` without waiting.
    ///
    /// Full or closed queues are skipped per recipient. Returns how many
    /// connections accepted the item.
    pub fn send(&self, scope: Scope, out: Outbound) -> usize {
        let channel = scope.channel();
        let Some(members) = self.channels.get(&channel) else {
            return 0;
        };

        let mut delivered = 0;
        for (connection_id, tx) in members.iter() {
            match tx.try_send(out.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(%connection_id, %channel, "outbound queue full, dropping message");
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(%connection_id, %channel, "outbound queue closed, skipping");
                }
            }
        }
        delivered
    }

    /// Number of connections currently joined to `scope`.
    pub fn member_count(&self, scope: Scope) -> usize {
        self.channels
            .get(&scope.channel())
            .map(|members| members.len())
            .unwrap_or(0)
    }

    /// Number of non-empty channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A connection's enrollment. Dropping it leaves every joined channel.
pub struct Membership {
    registry: Arc<ChannelRegistry>,
    connection_id: String,
    channels: Vec<String>,
}

impl Membership {
    pub fn channels(&self) -> &[String] {
        &self.channels
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        for channel in &self.channels {
            self.registry.leave(&self.connection_id, channel);
        }
    }
}
