use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::events::{TaskEvent, TaskEventKind};

/// Messages sent from client to server
///
/// Anything that does not parse into one of these is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "connection_established")]
    ConnectionEstablished { message: String },
    #[serde(rename = "pong")]
    Pong { message: String },
    #[serde(rename = "task_created")]
    TaskCreated {
        task: serde_json::Value,
        message: String,
    },
    #[serde(rename = "task_updated")]
    TaskUpdated {
        task: serde_json::Value,
        message: String,
    },
}

impl ServerMessage {
    pub fn connection_established(tenant_name: &str) -> Self {
        Self::ConnectionEstablished {
            message: format!("Connected to {} task updates", tenant_name),
        }
    }

    pub fn pong() -> Self {
        Self::Pong {
            message: "Connection alive".to_string(),
        }
    }

    pub fn from_event(event: &TaskEvent) -> Self {
        match event.kind {
            TaskEventKind::Created => Self::TaskCreated {
                task: event.task.clone(),
                message: format!("New task created: {}", event.title()),
            },
            TaskEventKind::Updated => Self::TaskUpdated {
                task: event.task.clone(),
                message: format!("Task updated: {}", event.title()),
            },
        }
    }
}

/// Message handed to a connection's outbound channel.
///
/// Fanning one event out to many connections serializes it once and shares
/// the bytes; one-off messages stay unserialized until the pump writes them.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Raw(ServerMessage),
    Preserialized(Arc<str>),
}

impl OutboundMessage {
    pub fn preserialized(message: &ServerMessage) -> Result<Self, serde_json::Error> {
        Ok(Self::Preserialized(serde_json::to_string(message)?.into()))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Raw(message) => serde_json::to_string(message),
            Self::Preserialized(json) => Ok(json.as_ref().to_string()),
        }
    }
}
