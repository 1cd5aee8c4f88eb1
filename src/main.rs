use actix_cors::Cors;
use actix_files::Files;
use actix_multipart::form::MultipartFormConfig;
use actix_server::ServerHandle;
use actix_web::{
    App, HttpServer,
    web::{self, Data},
};
use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};
use lifebeep_ui::{
    api::Api,
    config::AppConfig,
    device::{poller::DevicePoller, telemetry_client::HttpTelemetryClient},
    mail_client::EmailJsClient,
};
use log::{debug, error, info};
use std::{io::Write, sync::Arc};
use tokio::signal::unix::{SignalKind, signal};

const UPLOAD_LIMIT_BYTES: usize = 10 * 1024 * 1024;
const MEMORY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

type UiApi = Api<HttpTelemetryClient, EmailJsClient>;

#[actix_web::main]
async fn main() {
    if let Err(e) = run().await {
        error!("application error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    initialize();

    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    let config = AppConfig::get();

    let telemetry_client = HttpTelemetryClient::new(config.poller.fetch_timeout)
        .context("failed to create telemetry client")?;
    let mail_client =
        EmailJsClient::new(config.mail.clone()).context("failed to create mail client")?;

    let poller = Arc::new(DevicePoller::new(telemetry_client, config.poller));
    let api = UiApi::new(Arc::clone(&poller), mail_client);

    // resume polling a previously configured device right away
    match api.address_store.load() {
        Some(addr) => poller.start(addr),
        None => info!("no device address configured yet"),
    }

    let (server_handle, server_task) = run_server(api)?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            debug!("ctrl-c received");
        },
        _ = sigterm.recv() => {
            debug!("SIGTERM received");
        },
        result = server_task => {
            match result {
                Ok(Ok(())) => debug!("server stopped normally"),
                Ok(Err(e)) => error!("server stopped with error: {e}"),
                Err(e) => error!("server task panicked: {e}"),
            }
        },
    }

    info!("shutting down");
    server_handle.stop(true).await;
    poller.stop();
    info!("shutdown complete");

    Ok(())
}

fn initialize() {
    log_panics::init();

    let mut builder = if cfg!(debug_assertions) {
        Builder::from_env(Env::default().default_filter_or("debug"))
    } else {
        Builder::from_env(Env::default().default_filter_or("info"))
    };

    builder.format(|f, record| match record.level() {
        log::Level::Error => {
            eprintln!("{}", record.args());
            Ok(())
        }
        _ => {
            writeln!(f, "{}", record.args())
        }
    });

    builder.target(Target::Stdout).init();

    info!("module version: {}", env!("CARGO_PKG_VERSION"));
}

fn run_server(
    api: UiApi,
) -> Result<(
    ServerHandle,
    tokio::task::JoinHandle<Result<(), std::io::Error>>,
)> {
    info!("starting server");

    let config = &AppConfig::get();
    let ui_port = config.ui.port;
    let static_dir = config.ui.static_dir.clone();

    let server = HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_header()
                    .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
                    .max_age(3600),
            )
            .app_data(
                MultipartFormConfig::default()
                    .total_limit(UPLOAD_LIMIT_BYTES)
                    .memory_limit(MEMORY_LIMIT_BYTES),
            )
            .app_data(Data::new(api.clone()))
            .route("/api/device/status", web::get().to(UiApi::device_status))
            .route(
                "/api/device/address",
                web::put().to(UiApi::set_device_address),
            )
            .route(
                "/api/device/address",
                web::delete().to(UiApi::clear_device_address),
            )
            .route(
                "/api/device/poll/start",
                web::post().to(UiApi::start_polling),
            )
            .route("/api/device/poll/stop", web::post().to(UiApi::stop_polling))
            .route("/api/products", web::get().to(UiApi::list_products))
            .route("/api/products/{id}", web::get().to(UiApi::get_product))
            .route("/api/cart", web::get().to(UiApi::get_cart))
            .route("/api/cart", web::put().to(UiApi::replace_cart))
            .route("/api/cart/items", web::post().to(UiApi::add_cart_item))
            .route(
                "/api/cart/items/{index}",
                web::delete().to(UiApi::remove_cart_item),
            )
            .route("/api/checkout", web::get().to(UiApi::checkout_state))
            .route("/api/checkout/otp/send", web::post().to(UiApi::send_otp))
            .route(
                "/api/checkout/otp/verify",
                web::post().to(UiApi::verify_otp),
            )
            .route("/api/checkout/contact", web::post().to(UiApi::submit_contact))
            .route("/api/checkout/address", web::post().to(UiApi::submit_address))
            .route("/api/checkout/back", web::post().to(UiApi::checkout_back))
            .route("/api/checkout/payment", web::post().to(UiApi::select_payment))
            .route(
                "/api/checkout/payment-proof",
                web::post().to(UiApi::upload_payment_proof),
            )
            .route("/api/checkout/order", web::post().to(UiApi::place_order))
            .route("/version", web::get().to(UiApi::version))
            .service(Files::new("/", static_dir.clone()).index_file("index.html"))
    })
    .bind(format!("0.0.0.0:{ui_port}"))
    .context("failed to bind server")?
    .disable_signals()
    .run();

    Ok((server.handle(), tokio::spawn(server)))
}
