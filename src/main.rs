use std::net::SocketAddr;

use actix_cors::Cors;
use actix_web::{
    middleware::{Compress, Logger, NormalizePath},
    web, App, HttpServer,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use wiki_rag::config::Config;
use wiki_rag::retrieval::embeddings::EmbeddingFactory;
use wiki_rag::retrieval::retriever::Retriever;
use wiki_rag::retrieval::vector::factory::VectorStoreFactory;
use wiki_rag::routes::{create_routes, AppState};
use wiki_rag::services::AnswerService;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_level = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .parse()
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting wiki-rag server");

    let config = Config::from_env()?;
    info!("Configuration loaded from environment");

    let store = VectorStoreFactory::from_config(&config).await?;
    info!(
        "Vector store ready: {} chunks indexed",
        store.count().await?
    );

    let embedder = EmbeddingFactory::from_config(&config)?;
    info!("Embedding provider ready: {}", embedder.model_name());

    let retriever = Retriever::new(embedder, store.clone());
    let answerer = AnswerService::new(&config);

    let state = web::Data::new(AppState {
        config: config.clone(),
        store,
        retriever,
        answerer,
    });

    let addr = SocketAddr::from((config.host.parse::<std::net::IpAddr>()?, config.port));
    let store_handle = state.store.clone();
    info!("Server running at http://{}", addr);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(Compress::default())
            .wrap(NormalizePath::trim())
            .configure(create_routes)
    })
    .bind(addr)?
    .run()
    .await?;

    store_handle.close().await;
    info!("Server stopped");
    Ok(())
}
