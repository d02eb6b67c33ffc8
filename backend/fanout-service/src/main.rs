use actix_web::dev::Service;
use actix_web::{web, App, HttpServer};
use event_bus::{EventBus, InMemoryEventBus, RedisEventBus};
use fanout_service::{
    handlers, logging,
    metrics::HttpTimer,
    repository::{InMemoryRepository, PostgresRepository},
    websocket::spawn_bus_bridge,
    AppError, AppState, Config,
};
use std::io;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

fn startup_error(context: &str, err: impl std::fmt::Display) -> io::Error {
    tracing::error!(error = %err, "{}", context);
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let config = Config::from_env().map_err(|e| startup_error("Invalid configuration", e))?;
    tracing::info!(env = %config.app.env, port = config.app.port, "Starting fanout service");

    let bus: Arc<dyn EventBus> = match &config.redis.url {
        Some(url) => Arc::new(
            RedisEventBus::connect(url)
                .await
                .map_err(|e| startup_error("Failed to connect to Redis", e))?,
        ),
        None => {
            tracing::warn!("REDIS_URL not set; using in-process event bus (single instance only)");
            Arc::new(InMemoryEventBus::new())
        }
    };

    let state = match &config.database.url {
        Some(url) => {
            let repo = PostgresRepository::connect(url, config.database.max_connections)
                .await
                .map_err(|e| startup_error("Failed to initialize PostgreSQL", format!("{:#}", e)))?;
            AppState::build(Arc::new(repo), bus, &config, "postgres")
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store (data is not persisted)");
            AppState::build(Arc::new(InMemoryRepository::new()), bus, &config, "memory")
        }
    };

    let (events_tx, events_rx) = state.gateway.dispatch_channel();
    let dispatcher = state.gateway.spawn_dispatcher(events_rx);
    let bridge = spawn_bus_bridge(state.bus.clone(), config.fanout.topic.clone(), events_tx)
        .await
        .map_err(|e| startup_error("Failed to subscribe to fan-out topic", e))?;

    let addr = format!("0.0.0.0:{}", config.app.port);
    tracing::info!("Starting HTTP server on {}", addr);

    let data = web::Data::new(state.clone());
    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .app_data(
                web::JsonConfig::default()
                    .error_handler(|err, _| AppError::BadRequest(err.to_string()).into()),
            )
            .app_data(
                web::PathConfig::default()
                    .error_handler(|err, _| AppError::BadRequest(err.to_string()).into()),
            )
            .wrap_fn(|req, srv| {
                let timer = HttpTimer::start(&req);
                let response = srv.call(req);
                async move {
                    let result = response.await;
                    timer.finish(result.as_ref().map_or(500, |res| res.status().as_u16()));
                    result
                }
            })
            .wrap(TracingLogger::default())
            .configure(handlers::configure)
    })
    .bind(&addr)?
    .run();

    let result = server.await;

    state.gateway.shutdown();
    bridge.abort();
    if let Err(e) = dispatcher.await {
        tracing::warn!(error = %e, "Dispatcher task ended abnormally");
    }
    tracing::info!("Fanout service stopped");
    result
}
