use crate::{
    config::AppConfig,
    device::{
        address_store::{AddressStore, InvalidAddress},
        poller::DevicePoller,
        status::DeviceStatus,
        telemetry_client::TelemetryClient,
    },
    http_client::{handle_json_result, handle_service_result},
    mail_client::MailClient,
    services::{
        cart::{AddCartItem, CartService, NoSuchItem},
        catalog,
        checkout::{AddressInfo, CheckoutService, ContactInfo, PaymentMethod},
    },
};
use actix_multipart::form::{MultipartForm, tempfile::TempFile};
use actix_web::{HttpResponse, Responder, web};
use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAddressPayload {
    address: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpPayload {
    email: String,
    customer_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpPayload {
    email: String,
    code: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectPaymentPayload {
    method: PaymentMethod,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeviceStatusResponse {
    #[serde(flatten)]
    status: DeviceStatus,
    polling: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentProofResponse {
    filename: String,
}

#[derive(MultipartForm)]
pub struct UploadFormSingleFile {
    file: TempFile,
}

#[derive(Clone)]
pub struct Api<Telemetry, Mail>
where
    Telemetry: TelemetryClient + Clone + Send + Sync + 'static,
    Mail: MailClient,
{
    pub poller: Arc<DevicePoller<Telemetry>>,
    pub mail_client: Mail,
    pub address_store: AddressStore,
    pub cart: CartService,
    pub checkout: Arc<CheckoutService>,
}

impl<Telemetry, Mail> Api<Telemetry, Mail>
where
    Telemetry: TelemetryClient + Clone + Send + Sync + 'static,
    Mail: MailClient + Clone + 'static,
{
    pub fn new(poller: Arc<DevicePoller<Telemetry>>, mail_client: Mail) -> Self {
        let paths = &AppConfig::get().paths;

        Api {
            poller,
            mail_client,
            address_store: AddressStore::new(paths.address_file.clone()),
            cart: CartService::new(paths.cart_file.clone()),
            checkout: Arc::new(CheckoutService::new()),
        }
    }

    // ========================================================================
    // Device
    // ========================================================================

    pub async fn device_status(api: web::Data<Self>) -> impl Responder {
        debug!("device_status() called");

        HttpResponse::Ok().json(&DeviceStatusResponse {
            status: api.poller.status(),
            polling: api.poller.is_running(),
        })
    }

    pub async fn set_device_address(
        body: web::Json<SetAddressPayload>,
        api: web::Data<Self>,
    ) -> impl Responder {
        debug!("set_device_address() called");

        match api.address_store.save(&body.address) {
            Ok(addr) => {
                api.poller.restart(addr);
                HttpResponse::Ok().body(addr.to_string())
            }
            Err(e) if e.downcast_ref::<InvalidAddress>().is_some() => {
                HttpResponse::BadRequest().body(e.to_string())
            }
            Err(e) => {
                error!("set_device_address failed: {e:#}");
                HttpResponse::InternalServerError().body(e.to_string())
            }
        }
    }

    pub async fn clear_device_address(api: web::Data<Self>) -> impl Responder {
        debug!("clear_device_address() called");

        let result = api.address_store.clear();
        if result.is_ok() {
            api.poller.set_unconfigured();
        }

        handle_service_result(result, "clear_device_address")
    }

    pub async fn start_polling(api: web::Data<Self>) -> impl Responder {
        debug!("start_polling() called");

        let Some(addr) = api.address_store.load() else {
            return HttpResponse::Conflict().body("no device address configured");
        };

        api.poller.start(addr);
        HttpResponse::Ok().finish()
    }

    pub async fn stop_polling(api: web::Data<Self>) -> impl Responder {
        debug!("stop_polling() called");

        api.poller.stop();
        HttpResponse::Ok().finish()
    }

    // ========================================================================
    // Catalog and cart
    // ========================================================================

    pub async fn list_products() -> impl Responder {
        HttpResponse::Ok().json(catalog::all())
    }

    pub async fn get_product(id: web::Path<String>) -> impl Responder {
        debug!("get_product() called: {id}");

        match catalog::find(&id) {
            Some(product) => HttpResponse::Ok().json(product),
            None => HttpResponse::NotFound().body(format!("no product {:?}", id.as_str())),
        }
    }

    pub async fn get_cart(api: web::Data<Self>) -> impl Responder {
        handle_json_result(api.cart.view(), "get_cart")
    }

    pub async fn add_cart_item(
        body: web::Json<AddCartItem>,
        api: web::Data<Self>,
    ) -> impl Responder {
        debug!("add_cart_item() called");
        handle_json_result(api.cart.add(&body), "add_cart_item")
    }

    pub async fn remove_cart_item(
        index: web::Path<usize>,
        api: web::Data<Self>,
    ) -> impl Responder {
        debug!("remove_cart_item() called: {index}");

        match api.cart.remove(*index) {
            Ok(view) => HttpResponse::Ok().json(&view),
            Err(e) if e.downcast_ref::<NoSuchItem>().is_some() => {
                HttpResponse::NotFound().body(e.to_string())
            }
            Err(e) => {
                error!("remove_cart_item failed: {e:#}");
                HttpResponse::InternalServerError().body(e.to_string())
            }
        }
    }

    pub async fn replace_cart(
        body: web::Json<Vec<AddCartItem>>,
        api: web::Data<Self>,
    ) -> impl Responder {
        debug!("replace_cart() called");
        handle_json_result(api.cart.replace(&body), "replace_cart")
    }

    // ========================================================================
    // Checkout
    // ========================================================================

    pub async fn checkout_state(api: web::Data<Self>) -> impl Responder {
        HttpResponse::Ok().json(&api.checkout.view())
    }

    pub async fn send_otp(body: web::Json<SendOtpPayload>, api: web::Data<Self>) -> impl Responder {
        debug!("send_otp() called");

        if !looks_like_email(&body.email) || body.customer_name.trim().is_empty() {
            return HttpResponse::BadRequest().body("a valid email and a name are required");
        }

        match api
            .checkout
            .send_otp(&api.mail_client, &body.email, &body.customer_name)
            .await
        {
            Ok(()) => HttpResponse::Ok().finish(),
            // the provider is a separate service; its failure is not ours
            Err(e) => {
                error!("send_otp failed: {e:#}");
                HttpResponse::BadGateway().body(e.to_string())
            }
        }
    }

    pub async fn verify_otp(
        body: web::Json<VerifyOtpPayload>,
        api: web::Data<Self>,
    ) -> impl Responder {
        debug!("verify_otp() called");

        match api.checkout.verify_otp(&body.email, &body.code) {
            Ok(()) => HttpResponse::Ok().finish(),
            Err(e) => HttpResponse::BadRequest().body(e.to_string()),
        }
    }

    pub async fn submit_contact(
        body: web::Json<ContactInfo>,
        api: web::Data<Self>,
    ) -> impl Responder {
        debug!("submit_contact() called");

        match api.checkout.submit_contact(body.into_inner()) {
            Ok(()) => HttpResponse::Ok().json(&api.checkout.view()),
            Err(e) => HttpResponse::BadRequest().body(e.to_string()),
        }
    }

    pub async fn submit_address(
        body: web::Json<AddressInfo>,
        api: web::Data<Self>,
    ) -> impl Responder {
        debug!("submit_address() called");

        match api.checkout.submit_address(body.into_inner()) {
            Ok(()) => HttpResponse::Ok().json(&api.checkout.view()),
            Err(e) => HttpResponse::BadRequest().body(e.to_string()),
        }
    }

    pub async fn checkout_back(api: web::Data<Self>) -> impl Responder {
        debug!("checkout_back() called");
        HttpResponse::Ok().json(&api.checkout.step_back())
    }

    pub async fn select_payment(
        body: web::Json<SelectPaymentPayload>,
        api: web::Data<Self>,
    ) -> impl Responder {
        debug!("select_payment() called");

        match api.checkout.select_payment(body.method) {
            Ok(()) => HttpResponse::Ok().finish(),
            Err(e) => HttpResponse::BadRequest().body(e.to_string()),
        }
    }

    pub async fn upload_payment_proof(
        MultipartForm(form): MultipartForm<UploadFormSingleFile>,
        api: web::Data<Self>,
    ) -> impl Responder {
        debug!("upload_payment_proof() called");

        let filename = match Self::persist_payment_proof(form.file) {
            Ok(filename) => filename,
            Err(e) => {
                error!("upload_payment_proof failed: {e:#}");
                return HttpResponse::InternalServerError().body(e.to_string());
            }
        };

        match api.checkout.attach_payment_proof(filename.clone()) {
            Ok(()) => HttpResponse::Ok().json(&PaymentProofResponse { filename }),
            Err(e) => HttpResponse::BadRequest().body(e.to_string()),
        }
    }

    pub async fn place_order(api: web::Data<Self>) -> impl Responder {
        debug!("place_order() called");

        match api.checkout.place_order(&api.mail_client, &api.cart).await {
            Ok(receipt) => HttpResponse::Ok().json(&receipt),
            Err(e) => HttpResponse::BadRequest().body(e.to_string()),
        }
    }

    pub async fn version() -> impl Responder {
        HttpResponse::Ok().body(env!("CARGO_PKG_VERSION"))
    }

    /// Move an uploaded screenshot into the uploads directory under a
    /// collision-free name.
    fn persist_payment_proof(tmp_file: TempFile) -> Result<String> {
        let original = tmp_file.file_name.as_deref().unwrap_or("proof");
        let filename = format!("{}-{original}", uuid::Uuid::new_v4());
        let target = AppConfig::get().paths.uploads_dir.join(&filename);

        // the temp file may live on another filesystem, so copy instead of
        // renaming
        std::fs::copy(tmp_file.file.path(), &target)
            .context("failed to store payment proof")?;

        Ok(filename)
    }
}

/// Cheap shape check for the OTP endpoint; the strict pattern runs when the
/// contact details are submitted.
fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && domain.contains('.')
        && !email.contains(char::is_whitespace)
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
