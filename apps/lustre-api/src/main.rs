mod cli;
mod handlers;
mod services;
mod settings;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::routing::{get, post};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lustre_db::db::init_db;
use lustre_db::repositories::coupon_repo::CouponRepository;
use lustre_db::repositories::order_repo::OrderRepository;

use services::checkout_service::CheckoutService;
use services::coupon_service::CouponService;
use services::razorpay::RazorpayClient;
use services::shiprocket::ShiprocketClient;
use services::shipping_service::ShippingService;
use services::tracking_service::TrackingService;
use settings::SettingsService;

#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::SqlitePool,
    pub settings: Arc<SettingsService>,
    pub orders: OrderRepository,
    pub coupon_service: Arc<CouponService>,
    pub shipping_service: Arc<ShippingService>,
    pub checkout_service: Arc<CheckoutService>,
    pub tracking_service: Arc<TrackingService>,
}

#[derive(Parser)]
#[command(name = "lustre")]
#[command(about = "Lustre storefront API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve,
    /// Administrative tools
    Admin {
        #[command(subcommand)]
        subcommand: AdminCommands,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Print all runtime settings
    Settings,
    /// Set a runtime setting
    SetSetting {
        /// Setting key, e.g. pickup_pincode
        key: String,
        /// New value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        println!("Warning: failed to load .env file: {}", e);
    }

    let cli = Cli::parse();

    let file_appender = tracing_appender::rolling::never(".", "lustre.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lustre=debug,axum=info,tower_http=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stdout))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();

    let pool = init_db().await?;

    match cli.command {
        Commands::Serve => run_server(pool).await?,
        Commands::Admin { subcommand } => match subcommand {
            AdminCommands::Settings => cli::show_settings(&pool).await?,
            AdminCommands::SetSetting { key, value } => {
                cli::set_setting(&pool, &key, &value).await?
            }
        },
    }

    Ok(())
}

async fn run_server(pool: sqlx::SqlitePool) -> Result<()> {
    let settings = Arc::new(SettingsService::new(pool.clone()).await?);

    let coupon_repo = CouponRepository::new(pool.clone());
    let order_repo = OrderRepository::new(pool.clone());

    let coupon_service = Arc::new(CouponService::new(coupon_repo));
    let shiprocket = Arc::new(ShiprocketClient::new(settings.clone())?);
    let shipping_service = Arc::new(ShippingService::new(shiprocket, settings.clone()));
    let razorpay = Arc::new(RazorpayClient::new(settings.clone())?);
    let checkout_service = Arc::new(CheckoutService::new(
        pool.clone(),
        order_repo.clone(),
        coupon_service.clone(),
        shipping_service.clone(),
        razorpay,
        settings.clone(),
    ));
    let tracking_service = Arc::new(TrackingService::new(order_repo.clone()));

    let state = AppState {
        pool: pool.clone(),
        settings,
        orders: order_repo,
        coupon_service,
        shipping_service,
        checkout_service,
        tracking_service,
    };

    let app = axum::Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/coupons", get(handlers::coupons::list_public_coupons))
        .route("/api/coupons/apply", post(handlers::coupons::apply_coupon))
        .route(
            "/api/shipping/serviceability/{pincode}",
            get(handlers::shipping::serviceability),
        )
        .route("/api/orders", post(handlers::orders::place_order))
        .route(
            "/api/orders/verify-payment",
            post(handlers::orders::verify_payment),
        )
        .route(
            "/api/orders/{order_number}",
            get(handlers::orders::get_order),
        )
        .route(
            "/api/webhooks/shiprocket",
            post(handlers::webhooks::shiprocket_webhook),
        )
        .route(
            "/api/admin/coupons",
            get(handlers::admin::list_coupons).post(handlers::admin::create_coupon),
        )
        .route(
            "/api/admin/coupons/{id}/deactivate",
            post(handlers::admin::deactivate_coupon),
        )
        .route(
            "/api/admin/coupons/{id}/redemptions",
            get(handlers::admin::coupon_redemptions),
        )
        .route("/api/admin/orders", get(handlers::admin::list_orders))
        .route(
            "/api/admin/settings",
            get(handlers::admin::get_settings).post(handlers::admin::save_settings),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::limit::RequestBodyLimitLayer::new(1024 * 1024));

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
