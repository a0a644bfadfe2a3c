//! `GET /v1/models` (§6): the registered providers plus the virtual
//! ensemble model clients actually target.

use crate::state::AppState;
use crate::wire::{ModelObject, ModelsResponse};
use axum::extract::State;
use axum::Json;

pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let mut data: Vec<ModelObject> = state
        .registry
        .list(&[])
        .await
        .into_iter()
        .map(|descriptor| ModelObject {
            id: descriptor.id.to_string(),
            object: "model",
            owned_by: descriptor.label,
        })
        .collect();
    data.push(ModelObject { id: "ensemble".to_string(), object: "model", owned_by: "helixagent".to_string() });

    Json(ModelsResponse { object: "list", data })
}
