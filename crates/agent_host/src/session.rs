//! Per-session state: role, turns, knowledge base, retained tables, settings
//! and the credential. Nothing here outlives the session.

use crate::assembler::assemble;
use crate::prompts::{default_role, find_role, Role};
use crate::WorkflowError;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use providers::chat::ChatBackend;
use providers::gateway::Gateway;
use providers::router::ChatRouter;
use services::documents::Upload;
use services::knowledge_base::{IngestReport, KnowledgeBase};
use services::spreadsheet::Table;
use shared::agent_api::{ConversationTurn, Speaker};
use shared::credentials::ApiKey;
use shared::error::GatewayError;
use shared::settings::{AppSettings, AuthScheme, Capability, ChatBackendKind};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleChange {
    /// The requested role was already active; nothing was cleared.
    Unchanged,
    Switched { cleared_turns: usize },
}

pub struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
    role: &'static Role,
    turns: Vec<ConversationTurn>,
    knowledge_base: KnowledgeBase,
    tables: Vec<Table>,
    settings: AppSettings,
    credential: Option<ApiKey>,
}

impl Session {
    pub fn new(settings: AppSettings, credential: Option<ApiKey>) -> Self {
        let id = Uuid::new_v4();
        tracing::info!(
            session = %id,
            scheme = %settings.auth_scheme,
            backend = settings.chat_backend.as_str(),
            credential = credential.is_some(),
            "session started"
        );
        Self {
            id,
            started_at: Utc::now(),
            role: default_role(),
            turns: Vec::new(),
            knowledge_base: KnowledgeBase::new(),
            tables: Vec::new(),
            settings,
            credential,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn role(&self) -> &'static Role {
        self.role
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.knowledge_base
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn credential(&self) -> Option<&ApiKey> {
        self.credential.as_ref()
    }

    /// Switch role. A different role clears the turn history; the knowledge
    /// base is kept.
    pub fn select_role(&mut self, query: &str) -> Result<RoleChange, WorkflowError> {
        let role = find_role(query).ok_or_else(|| WorkflowError::invalid(format!("Unknown role '{}'", query.trim())))?;
        if role.name == self.role.name {
            return Ok(RoleChange::Unchanged);
        }
        let cleared_turns = self.turns.len();
        self.turns.clear();
        self.role = role;
        tracing::info!(session = %self.id, role = role.name, cleared_turns, "role changed");
        Ok(RoleChange::Switched { cleared_turns })
    }

    /// Extract the uploads into the knowledge base; spreadsheet sheets are
    /// also retained as tables.
    pub fn ingest(&mut self, uploads: &[Upload]) -> IngestReport {
        let report = self.knowledge_base.ingest(uploads);
        self.tables.extend(report.tables.iter().cloned());
        report
    }

    pub fn clear_knowledge_base(&mut self) {
        self.knowledge_base.clear();
        self.tables.clear();
        tracing::info!(session = %self.id, "knowledge base cleared");
    }

    /// Table by exact name, then case-insensitive name.
    pub fn find_table(&self, name: &str) -> Option<&Table> {
        let name = name.trim();
        self.tables
            .iter()
            .find(|t| t.name == name)
            .or_else(|| self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name)))
    }

    pub fn set_scheme(&mut self, scheme: AuthScheme) {
        self.settings.auth_scheme = scheme;
    }

    pub fn set_chat_backend(&mut self, backend: ChatBackendKind) {
        self.settings.chat_backend = backend;
    }

    pub fn set_endpoint(&mut self, capability: Capability, url: &str) -> Result<(), WorkflowError> {
        self.settings.endpoints.set(capability, url)?;
        Ok(())
    }

    /// Replace the credential for this session. Returns false, leaving the
    /// current key in place, when `raw` is not a plausible key.
    pub fn set_credential(&mut self, raw: &str) -> bool {
        match ApiKey::parse(raw) {
            Some(key) => {
                self.credential = Some(key);
                true
            }
            None => false,
        }
    }

    /// A gateway over the current scheme, endpoints and credential.
    pub fn gateway(&self) -> Arc<Gateway> {
        Arc::new(Gateway::new(
            self.credential.clone(),
            self.settings.auth_scheme,
            self.settings.endpoints.clone(),
        ))
    }

    pub fn chat_router(&self) -> ChatRouter {
        ChatRouter::from_settings(&self.settings, self.credential.clone(), self.gateway())
    }

    /// One chat exchange. Fragments are handed to `on_fragment` as they
    /// arrive. The user turn is always recorded; it is followed by either the
    /// full reply or a single error-marked turn, never by partial text.
    pub async fn chat_turn<F>(
        &mut self,
        backend: &dyn ChatBackend,
        text: &str,
        mut on_fragment: F,
    ) -> Result<String, GatewayError>
    where
        F: FnMut(&str),
    {
        let messages = assemble(self.role, &self.knowledge_base, &self.turns, text);
        self.turns.push(ConversationTurn::user(text));
        tracing::debug!(
            session = %self.id,
            backend = backend.name(),
            messages = messages.len(),
            "chat turn"
        );

        let mut reply = String::new();
        let result = async {
            let mut fragments = backend.generate_stream(messages).await?;
            while let Some(fragment) = fragments.next().await {
                let fragment = fragment?;
                on_fragment(&fragment);
                reply.push_str(&fragment);
            }
            if reply.trim().is_empty() {
                return Err(GatewayError::empty(Capability::Chat, "the model returned an empty reply"));
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.turns.push(ConversationTurn::assistant(reply.clone()));
                Ok(reply)
            }
            Err(e) => {
                tracing::warn!(session = %self.id, error = %e, "chat turn failed");
                self.turns.push(ConversationTurn::error(e.to_string()));
                Err(e)
            }
        }
    }

    /// User/assistant turn counts.
    pub fn turn_counts(&self) -> (usize, usize) {
        let users = self.turns.iter().filter(|t| t.speaker == Speaker::User).count();
        (users, self.turns.len() - users)
    }
}
