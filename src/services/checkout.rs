//! Three-step checkout with email OTP verification.
//!
//! The session is server-side state for a single shopper at a time,
//! matching the single-device deployment of the rest of the service.
//! Steps advance contact -> address -> payment; placing an order resets
//! the session and empties the cart.

use crate::mail_client::{MailClient, OrderNotification};
use crate::services::cart::CartService;
use anyhow::{Context, Result, anyhow, bail, ensure};
use log::{info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use serde_valid::Validate;
use std::{
    sync::Mutex,
    time::{SystemTime, UNIX_EPOCH},
};

// ============================================================================
// Structs
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum CheckoutStep {
    #[default]
    Contact = 1,
    Address = 2,
    Payment = 3,
}

#[derive(Clone, Debug, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    #[validate(min_length = 1)]
    pub first_name: String,
    #[validate(min_length = 1)]
    pub last_name: String,
    #[validate(pattern = r"^[^\s@]+@[^\s@]+\.[^\s@]+$")]
    pub email: String,
    #[validate(min_length = 1)]
    pub country_code: String,
    #[validate(pattern = r"^[0-9]{10}$")]
    pub phone: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddressInfo {
    #[validate(min_length = 1)]
    pub address_line1: String,
    #[serde(default)]
    pub address_line2: Option<String>,
    #[validate(min_length = 1)]
    pub city: String,
    #[validate(min_length = 1)]
    pub state: String,
    #[validate(pattern = r"^[0-9]{6}$")]
    pub pincode: String,
    #[validate(min_length = 1)]
    pub country: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PaymentMethod {
    Cod,
    Upi,
}

impl PaymentMethod {
    fn label(self) -> &'static str {
        match self {
            Self::Cod => "Cash on Delivery",
            Self::Upi => "UPI",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutView {
    pub step: CheckoutStep,
    pub email_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    pub order_id: String,
    pub total: u32,
    pub mail_sent: bool,
}

struct PendingOtp {
    email: String,
    code: String,
}

#[derive(Default)]
struct CheckoutSession {
    step: CheckoutStep,
    contact: Option<ContactInfo>,
    verified_email: Option<String>,
    pending_otp: Option<PendingOtp>,
    address: Option<AddressInfo>,
    payment_method: Option<PaymentMethod>,
    payment_proof: Option<String>,
}

// ============================================================================
// Service
// ============================================================================

#[derive(Default)]
pub struct CheckoutService {
    session: Mutex<CheckoutSession>,
}

impl CheckoutService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> CheckoutView {
        let session = self.lock();

        CheckoutView {
            step: session.step,
            email_verified: session.verified_email.is_some(),
            payment_method: session.payment_method,
        }
    }

    /// Send a fresh 6-digit code to `email`. Re-sending replaces any
    /// earlier pending code.
    pub async fn send_otp(
        &self,
        mail: &impl MailClient,
        email: &str,
        customer_name: &str,
    ) -> Result<()> {
        let code = format!("{}", rand::rng().random_range(100_000..1_000_000));

        mail.send_otp(email, customer_name, &code)
            .await
            .context("failed to send verification code")?;

        info!("verification code sent to {email}");

        self.lock().pending_otp = Some(PendingOtp {
            email: email.to_string(),
            code,
        });

        Ok(())
    }

    /// Check a submitted code and mark the email address as verified.
    pub fn verify_otp(&self, email: &str, code: &str) -> Result<()> {
        let mut session = self.lock();

        let Some(pending) = &session.pending_otp else {
            bail!("failed to verify email: no code was requested");
        };
        ensure!(
            pending.email == email && pending.code == code,
            "failed to verify email: incorrect code"
        );

        session.verified_email = Some(email.to_string());
        session.pending_otp = None;

        Ok(())
    }

    /// Accept contact details and advance to the address step. The email
    /// must have been verified first.
    pub fn submit_contact(&self, contact: ContactInfo) -> Result<()> {
        contact
            .validate()
            .map_err(|e| anyhow!("invalid contact details: {e}"))?;

        let mut session = self.lock();

        ensure!(
            session.verified_email.as_deref() == Some(contact.email.as_str()),
            "failed to save contact details: email is not verified"
        );

        session.contact = Some(contact);
        session.step = CheckoutStep::Address;

        Ok(())
    }

    /// Accept shipping details and advance to the payment step.
    pub fn submit_address(&self, address: AddressInfo) -> Result<()> {
        address
            .validate()
            .map_err(|e| anyhow!("invalid shipping details: {e}"))?;

        let mut session = self.lock();

        ensure!(
            session.step >= CheckoutStep::Address,
            "failed to save shipping details: contact details are missing"
        );

        session.address = Some(address);
        session.step = CheckoutStep::Payment;

        Ok(())
    }

    /// Go back one step. Entered data is kept so moving forward again is
    /// cheap.
    pub fn step_back(&self) -> CheckoutView {
        {
            let mut session = self.lock();
            session.step = match session.step {
                CheckoutStep::Contact | CheckoutStep::Address => CheckoutStep::Contact,
                CheckoutStep::Payment => CheckoutStep::Address,
            };
        }

        self.view()
    }

    pub fn select_payment(&self, method: PaymentMethod) -> Result<()> {
        let mut session = self.lock();

        ensure!(
            session.step == CheckoutStep::Payment,
            "failed to select payment method: shipping details are missing"
        );

        session.payment_method = Some(method);

        Ok(())
    }

    /// Record the stored filename of an uploaded payment screenshot.
    pub fn attach_payment_proof(&self, filename: String) -> Result<()> {
        let mut session = self.lock();

        ensure!(
            session.payment_method == Some(PaymentMethod::Upi),
            "failed to attach payment proof: only UPI payments need one"
        );

        session.payment_proof = Some(filename);

        Ok(())
    }

    /// Place the order: empty the cart, reset the session and notify the
    /// shop owner by mail. A mail failure does not fail the order; the
    /// receipt reports it instead.
    pub async fn place_order(
        &self,
        mail: &impl MailClient,
        cart: &CartService,
    ) -> Result<OrderReceipt> {
        let view = cart.view()?;
        ensure!(!view.items.is_empty(), "failed to place order: cart is empty");

        let order = {
            let session = self.lock();

            ensure!(
                session.step == CheckoutStep::Payment,
                "failed to place order: checkout is incomplete"
            );
            let Some(contact) = &session.contact else {
                bail!("failed to place order: contact details are missing");
            };
            let Some(address) = &session.address else {
                bail!("failed to place order: shipping details are missing");
            };
            let Some(method) = session.payment_method else {
                bail!("failed to place order: no payment method selected");
            };
            if method == PaymentMethod::Upi {
                ensure!(
                    session.payment_proof.is_some(),
                    "failed to place order: UPI payments need a payment proof"
                );
            }

            let details = view
                .items
                .iter()
                .map(|item| match &item.variant {
                    Some(variant) => format!("{} ({variant}) - ₹{}", item.name, item.price),
                    None => format!("{} - ₹{}", item.name, item.price),
                })
                .collect::<Vec<_>>()
                .join(", ");

            OrderNotification {
                customer_name: format!("{} {}", contact.first_name, contact.last_name),
                customer_email: contact.email.clone(),
                country_code: contact.country_code.clone(),
                phone_number: contact.phone.clone(),
                address_line1: address.address_line1.clone(),
                address_line2: address.address_line2.clone().unwrap_or_else(|| "N/A".to_string()),
                city: address.city.clone(),
                state: address.state.clone(),
                pincode: address.pincode.clone(),
                country: address.country.clone(),
                payment_method: method.label().to_string(),
                payment_proof: session
                    .payment_proof
                    .clone()
                    .unwrap_or_else(|| "N/A".to_string()),
                order_details: format!("{details} (Total: ₹{})", view.total),
            }
        };

        let order_id = Self::order_id()?;
        info!("placing order {order_id}");

        let mail_sent = match mail.send_order(&order).await {
            Ok(()) => true,
            Err(e) => {
                warn!("order {order_id} placed but mail notification failed: {e:#}");
                false
            }
        };

        cart.clear()?;
        *self.lock() = CheckoutSession::default();

        Ok(OrderReceipt {
            order_id,
            total: view.total,
            mail_sent,
        })
    }

    fn order_id() -> Result<String> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("system clock is before the unix epoch")?
            .as_millis();

        // last 8 digits of the epoch millisecond counter
        Ok(format!("LB{:08}", millis % 100_000_000))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CheckoutSession> {
        // a poisoned session mutex is unrecoverable
        self.session.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact() -> ContactInfo {
        ContactInfo {
            first_name: "Asha".to_string(),
            last_name: "Rao".to_string(),
            email: "asha@example.com".to_string(),
            country_code: "+91".to_string(),
            phone: "9876543210".to_string(),
        }
    }

    fn address() -> AddressInfo {
        AddressInfo {
            address_line1: "12 MG Road".to_string(),
            address_line2: None,
            city: "Bengaluru".to_string(),
            state: "Karnataka".to_string(),
            pincode: "560001".to_string(),
            country: "India".to_string(),
        }
    }

    mod validation {
        use super::*;

        #[test]
        fn accepts_well_formed_contact_details() {
            assert!(contact().validate().is_ok());
        }

        #[test]
        fn rejects_malformed_email() {
            let mut contact = contact();
            contact.email = "not-an-email".to_string();

            assert!(contact.validate().is_err());
        }

        #[test]
        fn rejects_short_phone_number() {
            let mut contact = contact();
            contact.phone = "12345".to_string();

            assert!(contact.validate().is_err());
        }

        #[test]
        fn rejects_malformed_pincode() {
            let mut address = address();
            address.pincode = "56001".to_string();

            assert!(address.validate().is_err());
        }
    }

    mod steps {
        use super::*;

        #[test]
        fn steps_serialize_as_numbers() {
            assert_eq!(
                serde_json::to_value(CheckoutStep::Contact).unwrap(),
                serde_json::json!(1)
            );
            assert_eq!(
                serde_json::to_value(CheckoutStep::Payment).unwrap(),
                serde_json::json!(3)
            );
        }

        #[test]
        fn contact_requires_a_verified_email() {
            let checkout = CheckoutService::new();

            assert!(checkout.submit_contact(contact()).is_err());
        }

        #[test]
        fn address_requires_contact_details_first() {
            let checkout = CheckoutService::new();

            assert!(checkout.submit_address(address()).is_err());
        }

        #[test]
        fn step_back_from_payment_returns_to_address() {
            let checkout = CheckoutService::new();
            checkout.lock().step = CheckoutStep::Payment;

            assert_eq!(checkout.step_back().step, CheckoutStep::Address);
            assert_eq!(checkout.step_back().step, CheckoutStep::Contact);
            assert_eq!(checkout.step_back().step, CheckoutStep::Contact);
        }
    }

    mod otp {
        use super::*;

        #[test]
        fn verify_without_a_pending_code_fails() {
            let checkout = CheckoutService::new();

            assert!(checkout.verify_otp("asha@example.com", "123456").is_err());
        }

        #[test]
        fn wrong_code_is_rejected_and_right_code_verifies() {
            let checkout = CheckoutService::new();
            checkout.lock().pending_otp = Some(PendingOtp {
                email: "asha@example.com".to_string(),
                code: "123456".to_string(),
            });

            assert!(checkout.verify_otp("asha@example.com", "654321").is_err());
            assert!(checkout.verify_otp("asha@example.com", "123456").is_ok());
            assert!(checkout.view().email_verified);
        }

        #[test]
        fn code_must_match_the_requesting_email() {
            let checkout = CheckoutService::new();
            checkout.lock().pending_otp = Some(PendingOtp {
                email: "asha@example.com".to_string(),
                code: "123456".to_string(),
            });

            assert!(checkout.verify_otp("other@example.com", "123456").is_err());
        }
    }

    mod payment {
        use super::*;

        #[test]
        fn payment_proof_is_only_for_upi() {
            let checkout = CheckoutService::new();
            checkout.lock().step = CheckoutStep::Payment;

            checkout.select_payment(PaymentMethod::Cod).unwrap();
            assert!(checkout.attach_payment_proof("shot.png".to_string()).is_err());

            checkout.select_payment(PaymentMethod::Upi).unwrap();
            assert!(checkout.attach_payment_proof("shot.png".to_string()).is_ok());
        }

        #[test]
        fn payment_method_requires_the_payment_step() {
            let checkout = CheckoutService::new();

            assert!(checkout.select_payment(PaymentMethod::Cod).is_err());
        }
    }
}
