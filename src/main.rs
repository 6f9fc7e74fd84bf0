use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpResponse, HttpServer};

use query_orchestrator::config::Config;
use query_orchestrator::handlers::{
    clear_all_conversations, clear_conversation, get_conversation, process_query,
};
use query_orchestrator::services::{
    GenerationBackend, MemoryAggregationService, MemoryAnalyticalService, MemoryRetrievalService,
    QueryOrchestrator,
};

type AppOrchestrator = QueryOrchestrator<
    MemoryRetrievalService,
    MemoryAggregationService,
    MemoryAnalyticalService,
    GenerationBackend,
>;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("🚀 Starting Query Orchestration API");

    // Load configuration from environment variables
    let config = Config::from_env();

    // Initialize in-memory collaborators for local development
    log::info!("💾 Using in-memory collaborator services for local development");
    let retrieval = MemoryRetrievalService::new();
    let aggregation = MemoryAggregationService::new();
    let analytical = MemoryAnalyticalService::new();
    let generation = GenerationBackend::from_config(&config);

    let orchestrator: AppOrchestrator = QueryOrchestrator::new(
        config.clone(),
        retrieval,
        aggregation,
        analytical,
        generation,
    );

    // Start HTTP server
    let server_url = format!("http://127.0.0.1:{}", config.server_port);
    log::info!("🌐 Starting server at {}", server_url);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(Cors::permissive())
            .app_data(web::Data::new(orchestrator.clone()))
            .service(
                web::resource("/query").route(web::post().to(process_query::<
                    MemoryRetrievalService,
                    MemoryAggregationService,
                    MemoryAnalyticalService,
                    GenerationBackend,
                >)),
            )
            .service(
                web::resource("/conversations/{conversation_id}")
                    .route(web::get().to(get_conversation::<
                        MemoryRetrievalService,
                        MemoryAggregationService,
                        MemoryAnalyticalService,
                        GenerationBackend,
                    >))
                    .route(web::delete().to(clear_conversation::<
                        MemoryRetrievalService,
                        MemoryAggregationService,
                        MemoryAnalyticalService,
                        GenerationBackend,
                    >)),
            )
            .service(
                web::resource("/conversations").route(web::delete().to(clear_all_conversations::<
                    MemoryRetrievalService,
                    MemoryAggregationService,
                    MemoryAnalyticalService,
                    GenerationBackend,
                >)),
            )
            .service(web::resource("/health").route(
                web::get().to(|| async { HttpResponse::Ok().json(serde_json::json!({"status": "ok"})) }),
            ))
    })
    .bind(format!("127.0.0.1:{}", config.server_port))
    .map_err(|e| {
        log::error!("❌ Failed to bind to port {}: {}", config.server_port, e);
        e
    })?
    .run()
    .await
}
