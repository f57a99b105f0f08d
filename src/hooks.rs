//! Outbound notifications for plugin observers.
//!
//! Group workflows fire an event once their writes are done. Firing never
//! blocks and its outcome never changes the workflow's result.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

/// Payloads fired on the hook bus.
///
/// Serializes as `{"hook": "action:group.join", "groupNames": [...], "uid": "42"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "hook")]
pub enum GroupEvent {
    #[serde(rename = "action:group.join", rename_all = "camelCase")]
    Join { group_names: Vec<String>, uid: String },

    #[serde(rename = "action:group.leave", rename_all = "camelCase")]
    Leave { group_names: Vec<String>, uid: String },

    #[serde(rename = "action:group.create", rename_all = "camelCase")]
    Create { name: String, hidden: bool },
}

impl GroupEvent {
    /// Hook name observers subscribe to.
    pub fn hook(&self) -> &'static str {
        match self {
            GroupEvent::Join { .. } => "action:group.join",
            GroupEvent::Leave { .. } => "action:group.leave",
            GroupEvent::Create { .. } => "action:group.create",
        }
    }
}

#[derive(Debug, Error)]
pub enum HookError {
    #[error("hook backend error: {0}")]
    Backend(String),
}

/// Plugin hook bus.
pub trait HookBus: Send + Sync {
    /// Hand `event` to observers without waiting for them.
    fn fire(&self, event: GroupEvent) -> Result<(), HookError>;
}

/// In-process hook bus on a tokio broadcast channel.
///
/// Subscribers that fall more than `capacity` events behind lose the
/// oldest ones.
pub struct BroadcastHookBus {
    tx: broadcast::Sender<GroupEvent>,
}

impl BroadcastHookBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GroupEvent> {
        self.tx.subscribe()
    }
}

impl HookBus for BroadcastHookBus {
    fn fire(&self, event: GroupEvent) -> Result<(), HookError> {
        // No subscribers is fine.
        let _ = self.tx.send(event);
        Ok(())
    }
}
