use actix_web::{App, dev::ServiceResponse, http::StatusCode, test, web};
use anyhow::Result;
use lifebeep_ui::api::Api;
use lifebeep_ui::config::PollerConfig;
use lifebeep_ui::device::address_store::AddressStore;
use lifebeep_ui::device::poller::DevicePoller;
use lifebeep_ui::device::telemetry_client::{FetchError, Reading, TelemetryClient};
use lifebeep_ui::mail_client::{MailClient, OrderNotification};
use lifebeep_ui::services::cart::CartService;
use lifebeep_ui::services::checkout::CheckoutService;
use serde_json::json;
use std::{net::Ipv4Addr, sync::Arc, time::Duration};

/// Telemetry fake that answers every fetch with the same healthy reading,
/// so a started session keeps running for the whole test.
#[derive(Clone)]
struct HealthyTelemetryClient;

impl TelemetryClient for HealthyTelemetryClient {
    async fn fetch_readings(&self, _addr: Ipv4Addr) -> Result<Reading, FetchError> {
        Ok(Reading {
            voltage: 3.7,
            alert: false,
            sound_type: None,
            timestamp: None,
        })
    }
}

#[derive(Clone)]
struct NullMailClient;

impl MailClient for NullMailClient {
    async fn send_otp(&self, _recipient: &str, _customer_name: &str, _code: &str) -> Result<()> {
        Ok(())
    }

    async fn send_order(&self, _order: &OrderNotification) -> Result<()> {
        Ok(())
    }
}

type TestApi = Api<HealthyTelemetryClient, NullMailClient>;

fn make_api(dir: &tempfile::TempDir) -> TestApi {
    let config = PollerConfig {
        poll_interval: Duration::from_millis(10),
        ..PollerConfig::default()
    };

    Api {
        poller: Arc::new(DevicePoller::new(HealthyTelemetryClient, config)),
        mail_client: NullMailClient,
        address_store: AddressStore::new(dir.path().join("device_address")),
        cart: CartService::new(dir.path().join("cart.json")),
        checkout: Arc::new(CheckoutService::new()),
    }
}

async fn put_address(api: &TestApi, address: &str) -> ServiceResponse {
    let app = test::init_service(App::new().app_data(web::Data::new(api.clone())).route(
        "/api/device/address",
        web::put().to(TestApi::set_device_address),
    ))
    .await;
    let req = test::TestRequest::put()
        .uri("/api/device/address")
        .set_json(json!({ "address": address }))
        .to_request();
    test::call_service(&app, req).await
}

async fn post_poll_start(api: &TestApi) -> ServiceResponse {
    let app = test::init_service(App::new().app_data(web::Data::new(api.clone())).route(
        "/api/device/poll/start",
        web::post().to(TestApi::start_polling),
    ))
    .await;
    let req = test::TestRequest::post()
        .uri("/api/device/poll/start")
        .to_request();
    test::call_service(&app, req).await
}

async fn get_product(api: &TestApi, id: &str) -> ServiceResponse {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(api.clone()))
            .route("/api/products/{id}", web::get().to(TestApi::get_product)),
    )
    .await;
    let req = test::TestRequest::get()
        .uri(&format!("/api/products/{id}"))
        .to_request();
    test::call_service(&app, req).await
}

async fn delete_cart_item(api: &TestApi, index: usize) -> ServiceResponse {
    let app = test::init_service(App::new().app_data(web::Data::new(api.clone())).route(
        "/api/cart/items/{index}",
        web::delete().to(TestApi::remove_cart_item),
    ))
    .await;
    let req = test::TestRequest::delete()
        .uri(&format!("/api/cart/items/{index}"))
        .to_request();
    test::call_service(&app, req).await
}

#[tokio::test]
async fn invalid_address_answers_400_and_leaves_the_running_session_alone() {
    let dir = tempfile::tempdir().unwrap();
    let api = make_api(&dir);

    let saved = api.address_store.save("192.168.1.50").unwrap();
    api.poller.start(saved);
    assert!(api.poller.is_running());

    let resp = put_address(&api, "999.1.1.1").await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(api.poller.is_running(), "session must keep running");
    assert_eq!(
        api.address_store.load(),
        Some(Ipv4Addr::new(192, 168, 1, 50)),
        "stored address must be unchanged"
    );
}

#[tokio::test]
async fn valid_address_answers_200_and_starts_polling() {
    let dir = tempfile::tempdir().unwrap();
    let api = make_api(&dir);
    assert!(!api.poller.is_running());

    let resp = put_address(&api, "192.168.1.50").await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(api.poller.is_running());
    assert_eq!(
        api.address_store.load(),
        Some(Ipv4Addr::new(192, 168, 1, 50))
    );
}

#[tokio::test]
async fn poll_start_answers_409_without_a_configured_address() {
    let dir = tempfile::tempdir().unwrap();
    let api = make_api(&dir);

    let resp = post_poll_start(&api).await;

    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert!(!api.poller.is_running());
}

#[tokio::test]
async fn poll_start_answers_200_once_an_address_is_saved() {
    let dir = tempfile::tempdir().unwrap();
    let api = make_api(&dir);
    api.address_store.save("10.0.0.1").unwrap();

    let resp = post_poll_start(&api).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(api.poller.is_running());
}

#[tokio::test]
async fn unknown_product_answers_404() {
    let dir = tempfile::tempdir().unwrap();
    let api = make_api(&dir);

    let resp = get_product(&api, "flux-capacitor").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = get_product(&api, "watch").await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn cart_removal_past_the_end_answers_404() {
    let dir = tempfile::tempdir().unwrap();
    let api = make_api(&dir);

    let resp = delete_cart_item(&api, 5).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
