use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ContentData, ContentId, SchemaId, TargetFieldDefinition};

/// Identifier of the app that owns schemas and content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppId(pub String);

impl AppId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client identity commands are attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub client_id: String,
}

impl Actor {
    pub fn client(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
        }
    }

    pub fn principal(&self) -> Principal {
        Principal {
            subject: format!("client:{}", self.client_id),
            client_id: self.client_id.clone(),
        }
    }
}

/// User principal attached to every command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub subject: String,
    pub client_id: String,
}

/// App and actor a handler runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    pub app_id: AppId,
    pub actor: Actor,
}

impl CommandContext {
    pub fn new(app_id: AppId, actor: Actor) -> Self {
        Self { app_id, actor }
    }
}

/// Mutations the projector issues against the content store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    CreateSchema {
        app_id: AppId,
        name: String,
        is_published: bool,
        fields: Vec<TargetFieldDefinition>,
    },
    AddField {
        schema_id: SchemaId,
        field: TargetFieldDefinition,
    },
    CreateContent {
        schema_id: SchemaId,
        data: ContentData,
        publish: bool,
    },
    /// Replaces the whole data of an existing content item.
    UpdateContent {
        content_id: ContentId,
        data: ContentData,
    },
}

impl Command {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::CreateSchema { .. } => "create_schema",
            Command::AddField { .. } => "add_field",
            Command::CreateContent { .. } => "create_content",
            Command::UpdateContent { .. } => "update_content",
        }
    }
}

/// A command together with who issued it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub actor: Actor,
    pub principal: Principal,
    pub command: Command,
}

impl CommandEnvelope {
    pub fn new(ctx: &CommandContext, command: Command) -> Self {
        Self {
            actor: ctx.actor.clone(),
            principal: ctx.actor.principal(),
            command,
        }
    }
}

/// Identifier of the entity a command created or touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Schema(SchemaId),
    Content(ContentId),
}

impl CommandOutcome {
    pub fn schema_id(self) -> Option<SchemaId> {
        match self {
            CommandOutcome::Schema(id) => Some(id),
            CommandOutcome::Content(_) => None,
        }
    }

    pub fn content_id(self) -> Option<ContentId> {
        match self {
            CommandOutcome::Content(id) => Some(id),
            CommandOutcome::Schema(_) => None,
        }
    }
}
