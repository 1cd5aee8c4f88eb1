pub mod address_store;
pub mod poller;
pub mod status;
pub mod telemetry_client;
