use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use repair_orders::cache::{CacheConfig, CacheStore};
use repair_orders::cache::redis_client::RedisClient;
use repair_orders::config::database::DatabaseConfig;
use repair_orders::config::environment::EnvironmentConfig;
use repair_orders::database::DatabaseConnection;
use repair_orders::repositories::Repositories;
use repair_orders::services::media_store::{FileSystemMediaStore, MediaStore};
use repair_orders::services::openai_gateway::{OpenAiConfig, OpenAiGateway};
use repair_orders::services::vin_decoder::NhtsaVinDecoder;
use repair_orders::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar variables de entorno
    dotenv().ok();

    // Configurar logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🔧 Repair Orders - API de órdenes de trabajo");
    info!("============================================");

    let config = EnvironmentConfig::from_env()?;

    // Base de datos: PostgreSQL si hay DATABASE_URL, memoria si no
    let repos = match &config.database_url {
        Some(url) => {
            let db_connection = match DatabaseConnection::new(&DatabaseConfig::new(url.clone())).await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("❌ Error conectando a la base de datos: {}", e);
                    return Err(anyhow::anyhow!("Error de base de datos: {}", e));
                }
            };
            Repositories::postgres(db_connection.pool().clone())
        }
        None => {
            warn!("⚠️ DATABASE_URL no configurada, usando almacenamiento en memoria");
            Repositories::in_memory()
        }
    };

    // Redis es opcional: solo cachea decodificaciones de VIN
    let cache: Option<Arc<dyn CacheStore>> = match &config.redis_url {
        Some(redis_url) => {
            let cache_config = CacheConfig {
                redis_url: redis_url.clone(),
                ..CacheConfig::default()
            };
            match RedisClient::new(cache_config).await {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    warn!("⚠️ Redis no disponible, se continúa sin cache: {}", e);
                    None
                }
            }
        }
        None => None,
    };

    let media: Arc<dyn MediaStore> = Arc::new(FileSystemMediaStore::new(&config.upload_dir));

    let api_key = config.openai_api_key.clone().unwrap_or_else(|| {
        warn!("⚠️ OPENAI_API_KEY no configurada: la extracción fallará y las órdenes quedarán para carga manual");
        String::new()
    });
    let gateway = Arc::new(OpenAiGateway::new(OpenAiConfig::new(
        api_key,
        config.openai_base_url.clone(),
        config.confidence_threshold,
        config.extraction_timeout,
    ))?);
    let vin_decoder = Arc::new(NhtsaVinDecoder::new(
        config.vin_decoder_url.clone(),
        cache,
        CacheConfig::default().default_ttl,
    )?);

    let addr = config.socket_addr()?;
    let app_state = AppState::start(config, repos, media, gateway, vin_decoder)?;
    let app = create_router(app_state);

    info!("🌐 Servidor iniciando en http://{}", addr);
    info!("🔍 Endpoints disponibles:");
    info!("   GET  /health - Health check");
    info!("   GET  /metrics - Métricas Prometheus");
    info!("🧾 Endpoints - Work Orders:");
    info!("   POST /work-orders - Intake con media (multipart)");
    info!("   GET  /work-orders - Listar órdenes (?customer_id=)");
    info!("   GET  /work-orders/:id - Obtener orden");
    info!("   PUT  /work-orders/:id - Editar orden");
    info!("   DELETE /work-orders/:id - Eliminar orden (?cascade=true)");
    info!("   POST /work-orders/:id/reprocess - Re-disparar extracción");
    info!("📄 Endpoints - Documentos:");
    info!("   POST /work-orders/:id/generate-estimate - Generar presupuesto");
    info!("   POST /work-orders/:id/generate-invoice - Generar factura");
    info!("   GET  /work-orders/:id/documents - Listar documentos");
    info!("   GET  /work-orders/:id/documents/:document_id - Descargar documento");

    // Iniciar servidor en background
    let server_handle = tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| {
                error!("❌ Error del servidor: {}", e);
                e
            })
    });

    // Esperar a que el servidor termine
    if let Err(e) = server_handle.await? {
        error!("❌ Servidor terminó con error: {}", e);
    }

    info!("👋 Servidor terminado");
    Ok(())
}

/// Señal de apagado graceful
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("❌ No se pudo instalar el handler de Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("❌ No se pudo instalar el handler de SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("🛑 Señal Ctrl+C recibida, apagando servidor...");
        },
        _ = terminate => {
            info!("🛑 Señal de terminación recibida, apagando servidor...");
        },
    }
}
