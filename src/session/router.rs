//! Session router
//!
//! Classifies each `/mcp` call: forward to a live session, open a new one on a
//! valid handshake, or reject it before any engine sees it.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::domain::registry::ToolRegistry;
use crate::errors::HttpError;
use crate::mcp::engine::{
    is_initialize_request, EngineReply, EngineSettings, IncomingPost, ProtocolEngine,
};
use crate::session::table::{Session, SessionTable};

pub enum Route {
    Existing(Arc<ProtocolEngine>),
    Handshake,
    Reject,
}

#[derive(Clone)]
pub struct SessionRouter {
    sessions: SessionTable,
    tools: Arc<ToolRegistry>,
    settings: EngineSettings,
}

impl SessionRouter {
    pub fn new(sessions: SessionTable, tools: Arc<ToolRegistry>, settings: EngineSettings) -> Self {
        Self {
            sessions,
            tools,
            settings,
        }
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn classify(&self, session_id: Option<&str>, body: &[u8]) -> Route {
        match session_id {
            Some(id) => match self.sessions.get(id) {
                Some(session) => Route::Existing(session.engine),
                None => Route::Reject,
            },
            None => match serde_json::from_slice::<Value>(body) {
                Ok(payload) if is_initialize_request(&payload) => Route::Handshake,
                _ => Route::Reject,
            },
        }
    }

    pub async fn route_post(
        &self,
        session_id: Option<&str>,
        post: IncomingPost<'_>,
    ) -> Result<EngineReply, HttpError> {
        match self.classify(session_id, post.body) {
            Route::Existing(engine) => engine.handle_post(post).await,
            Route::Handshake => self.start_session(post).await,
            Route::Reject => {
                warn!(
                    session_id = session_id.unwrap_or("-"),
                    "rejected request without a valid session"
                );
                Err(HttpError::NoValidSession)
            }
        }
    }

    /// Looks up the session named by a GET or DELETE.
    pub fn session_for(&self, session_id: Option<&str>) -> Result<Session, HttpError> {
        session_id
            .and_then(|id| self.sessions.get(id))
            .ok_or(HttpError::InvalidSessionHeader)
    }

    pub fn terminate(&self, session_id: Option<&str>) -> Result<(), HttpError> {
        let session = self.session_for(session_id)?;
        session.engine.close();
        info!(
            session_id = %session.id,
            reason = "terminated",
            age_ms = session.age().num_milliseconds(),
            "session terminated by client"
        );
        Ok(())
    }

    async fn start_session(&self, post: IncomingPost<'_>) -> Result<EngineReply, HttpError> {
        let engine = Arc::new(ProtocolEngine::new(
            Arc::clone(&self.tools),
            self.settings,
            self.sessions.close_hook(),
        ));

        let reply = engine.handle_post(post).await?;

        if let Some(id) = reply.established.clone() {
            if !self.sessions.register(id.clone(), Arc::clone(&engine)) {
                engine.close();
                warn!(session_id = %id, "session identifier could not be registered");
                return Err(HttpError::NoValidSession);
            }
            info!(session_id = %id, active_sessions = self.sessions.len(), "session created");
        }

        Ok(reply)
    }
}
