use actix_web::{web, Error, HttpResponse};
use log::{error, info};

use crate::models::response::{ErrorResponse, QueryRequest};
use crate::services::{
    AggregationServiceTrait, AnalyticalServiceTrait, GenerationServiceTrait, QueryOrchestrator,
    RetrievalServiceTrait,
};

/// Handle one user query. The orchestrator guarantees a well-formed response
/// for any input, so this endpoint always answers 200.
pub async fn process_query<R, A, C, G>(
    request: web::Json<QueryRequest>,
    orchestrator: web::Data<QueryOrchestrator<R, A, C, G>>,
) -> Result<HttpResponse, Error>
where
    R: RetrievalServiceTrait + Clone,
    A: AggregationServiceTrait + Clone,
    C: AnalyticalServiceTrait + Clone,
    G: GenerationServiceTrait + Clone,
{
    info!("Received query: {}", request.query);
    let request = request.into_inner();
    let response = orchestrator
        .process_user_query(&request.query, &request.options)
        .await;
    Ok(HttpResponse::Ok().json(response))
}

/// Fetch the state of one conversation
pub async fn get_conversation<R, A, C, G>(
    conversation_id: web::Path<String>,
    orchestrator: web::Data<QueryOrchestrator<R, A, C, G>>,
) -> Result<HttpResponse, Error>
where
    R: RetrievalServiceTrait + Clone,
    A: AggregationServiceTrait + Clone,
    C: AnalyticalServiceTrait + Clone,
    G: GenerationServiceTrait + Clone,
{
    let conversation_id = conversation_id.into_inner();
    match orchestrator.store().get_state(&conversation_id) {
        Ok(Some(state)) => Ok(HttpResponse::Ok().json(state)),
        Ok(None) => Ok(HttpResponse::NotFound().json(ErrorResponse {
            error: format!("Conversation {} not found", conversation_id),
            status_code: 404,
        })),
        Err(e) => {
            error!("Failed to read conversation {}: {}", conversation_id, e);
            Ok(HttpResponse::InternalServerError().json(ErrorResponse {
                error: format!("Failed to read conversation: {}", e),
                status_code: 500,
            }))
        }
    }
}

/// Clear one conversation's history
pub async fn clear_conversation<R, A, C, G>(
    conversation_id: web::Path<String>,
    orchestrator: web::Data<QueryOrchestrator<R, A, C, G>>,
) -> Result<HttpResponse, Error>
where
    R: RetrievalServiceTrait + Clone,
    A: AggregationServiceTrait + Clone,
    C: AnalyticalServiceTrait + Clone,
    G: GenerationServiceTrait + Clone,
{
    let conversation_id = conversation_id.into_inner();
    match orchestrator.store().clear_state(&conversation_id) {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(e) => {
            error!("Failed to clear conversation {}: {}", conversation_id, e);
            Ok(HttpResponse::InternalServerError().json(ErrorResponse {
                error: format!("Failed to clear conversation: {}", e),
                status_code: 500,
            }))
        }
    }
}

/// Clear all conversation state
pub async fn clear_all_conversations<R, A, C, G>(
    orchestrator: web::Data<QueryOrchestrator<R, A, C, G>>,
) -> Result<HttpResponse, Error>
where
    R: RetrievalServiceTrait + Clone,
    A: AggregationServiceTrait + Clone,
    C: AnalyticalServiceTrait + Clone,
    G: GenerationServiceTrait + Clone,
{
    match orchestrator.store().clear_all_states() {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(e) => {
            error!("Failed to clear conversation state: {}", e);
            Ok(HttpResponse::InternalServerError().json(ErrorResponse {
                error: format!("Failed to clear conversation state: {}", e),
                status_code: 500,
            }))
        }
    }
}
