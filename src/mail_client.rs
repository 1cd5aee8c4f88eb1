#![cfg_attr(feature = "mock", allow(dead_code, unused_imports))]

use crate::config::MailConfig;
use crate::http_client::{handle_http_response, json_client};
use anyhow::{Context, Result};
use log::info;
#[cfg(feature = "mock")]
use mockall::automock;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use trait_variant::make;

/// Parameters for the order notification template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderNotification {
    pub customer_name: String,
    pub customer_email: String,
    pub country_code: String,
    pub phone_number: String,
    pub address_line1: String,
    pub address_line2: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub country: String,
    pub payment_method: String,
    pub payment_proof: String,
    pub order_details: String,
}

/// Opaque transactional mail capability. The provider only ever sees a
/// template id plus template params; everything else about it is out of
/// scope.
#[make(Send)]
#[cfg_attr(feature = "mock", automock)]
pub trait MailClient {
    async fn send_otp(&self, recipient: &str, customer_name: &str, code: &str) -> Result<()>;
    async fn send_order(&self, order: &OrderNotification) -> Result<()>;
}

/// Production mail client for the EmailJS REST API.
#[derive(Clone)]
pub struct EmailJsClient {
    client: Client,
    config: MailConfig,
}

impl EmailJsClient {
    const SEND_ENDPOINT: &str = "https://api.emailjs.com/api/v1.0/email/send";
    const SEND_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(config: MailConfig) -> Result<Self> {
        Ok(Self {
            client: json_client(Self::SEND_TIMEOUT)?,
            config,
        })
    }

    async fn send_template(
        &self,
        template_id: &str,
        template_params: serde_json::Value,
    ) -> Result<()> {
        info!("sending mail with template {template_id}");

        let body = json!({
            "service_id": self.config.service_id,
            "template_id": template_id,
            "user_id": self.config.public_key,
            "template_params": template_params,
        });

        let res = self
            .client
            .post(Self::SEND_ENDPOINT)
            .json(&body)
            .send()
            .await
            .context("failed to send mail request")?;

        handle_http_response(res, "mail request").await?;

        Ok(())
    }
}

impl MailClient for EmailJsClient {
    async fn send_otp(&self, recipient: &str, customer_name: &str, code: &str) -> Result<()> {
        self.send_template(
            &self.config.otp_template_id,
            json!({
                "customer_email": recipient,
                "customer_name": customer_name,
                "otp_code": code,
            }),
        )
        .await
    }

    async fn send_order(&self, order: &OrderNotification) -> Result<()> {
        let template_params =
            serde_json::to_value(order).context("failed to serialize order notification")?;

        self.send_template(&self.config.order_template_id, template_params)
            .await
    }
}
