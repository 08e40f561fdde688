//! Agent API endpoints
//!
//! CRUD for agent definitions. Definitions are checked by the step compiler
//! before they are stored, so a saved agent always compiles.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use agent_runner::validate;
use chat_core::agent::{AgentDefinition, AgentSummary, StepDefinition, Visibility};

use super::{error, internal, invalid_field, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPayload {
    pub name: String,
    #[serde(default)]
    pub visibility: Visibility,
    pub steps: Vec<StepDefinition>,
}

impl AgentPayload {
    /// Build a definition, rejecting anything that would not compile
    fn into_definition(self) -> Result<AgentDefinition, ApiError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(invalid_field("name", "Name cannot be empty"));
        }

        let mut agent = AgentDefinition::new(name, self.steps);
        agent.visibility = self.visibility;
        validate(&agent).map_err(|e| error(StatusCode::BAD_REQUEST, e.to_string()))?;
        Ok(agent)
    }
}

fn not_found(id: Uuid) -> ApiError {
    error(StatusCode::NOT_FOUND, format!("Agent {} not found", id))
}

/// GET /api/agents - List agents, newest first
async fn list_agents(State(state): State<AppState>) -> Result<Json<Vec<AgentSummary>>, ApiError> {
    let agents = state
        .agent_store()
        .list()
        .await
        .map_err(|e| internal(e, "Could not load agents"))?;
    Ok(Json(agents))
}

/// POST /api/agents - Create an agent
async fn create_agent(
    State(state): State<AppState>,
    Json(payload): Json<AgentPayload>,
) -> Result<(StatusCode, Json<AgentDefinition>), ApiError> {
    let agent = payload.into_definition()?;
    let created = state
        .agent_store()
        .create(agent)
        .await
        .map_err(|e| internal(e, "Could not create agent"))?;

    tracing::info!(agent_id = %created.id, steps = created.steps.len(), "Agent created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/agents/{id} - Get an agent
async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AgentDefinition>, ApiError> {
    state
        .agent_store()
        .get(id)
        .await
        .map_err(|e| internal(e, "Could not load agent"))?
        .map(Json)
        .ok_or_else(|| not_found(id))
}

/// PUT /api/agents/{id} - Replace an agent's name and steps
async fn update_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AgentPayload>,
) -> Result<Json<AgentDefinition>, ApiError> {
    let store = state.agent_store();
    if store
        .get(id)
        .await
        .map_err(|e| internal(e, "Could not load agent"))?
        .is_none()
    {
        return Err(not_found(id));
    }

    let mut agent = payload.into_definition()?;
    agent.id = id;
    let updated = store
        .update(agent)
        .await
        .map_err(|e| internal(e, "Could not update agent"))?;
    Ok(Json(updated))
}

/// DELETE /api/agents/{id} - Delete an agent
async fn delete_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .agent_store()
        .delete(id)
        .await
        .map_err(|e| internal(e, "Could not delete agent"))?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(id))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/agents", get(list_agents).post(create_agent))
        .route(
            "/api/agents/{id}",
            get(get_agent).put(update_agent).delete(delete_agent),
        )
}
