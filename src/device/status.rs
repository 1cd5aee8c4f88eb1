//! Reconciled device state exposed to the rendering front end.
//!
//! The status is a pure function of poll outcomes: the poller feeds
//! [`StatusEvent`]s through [`DeviceStatus::apply`] and publishes the result
//! on a watch channel. Nothing in here touches presentation or the network.

use crate::config::PollerConfig;
use crate::device::telemetry_client::Reading;
use serde::{Deserialize, Serialize};

/// Message published when the stop threshold is crossed.
pub const POLLING_STOPPED_REASON: &str = "device unreachable, polling stopped";

/// The reconciled device state. Exactly one variant is active at a time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum DeviceStatus {
    /// No device address has been configured; supersedes any poll activity.
    Unconfigured,
    /// Recent fetches failed but the retry window has not been exhausted.
    Connecting,
    Offline { reason: String },
    Online { reading: Reading },
}

/// One poll outcome, as observed by the failure accumulator.
#[derive(Clone, Debug, PartialEq)]
pub enum StatusEvent {
    FetchSucceeded(Reading),
    FetchFailed {
        error: String,
        consecutive_failures: u32,
    },
    Unconfigured,
}

impl DeviceStatus {
    /// Pure reducer: fold one poll event into the next status.
    ///
    /// Below the offline threshold a failure only yields `Connecting`, so a
    /// single dropped packet never flaps the UI. From the offline threshold
    /// on, the last error message becomes the user-visible reason. At the
    /// stop threshold the reason switches to [`POLLING_STOPPED_REASON`]; the
    /// poller stops itself on the same tick.
    pub fn apply(&self, event: &StatusEvent, config: &PollerConfig) -> DeviceStatus {
        match event {
            StatusEvent::FetchSucceeded(reading) => DeviceStatus::Online {
                reading: reading.clone(),
            },
            StatusEvent::FetchFailed {
                error,
                consecutive_failures,
            } => {
                if *consecutive_failures >= config.max_failures_before_stop {
                    DeviceStatus::Offline {
                        reason: POLLING_STOPPED_REASON.to_string(),
                    }
                } else if *consecutive_failures >= config.max_failures_before_offline {
                    DeviceStatus::Offline {
                        reason: error.clone(),
                    }
                } else {
                    DeviceStatus::Connecting
                }
            }
            StatusEvent::Unconfigured => DeviceStatus::Unconfigured,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(voltage: f64) -> Reading {
        Reading {
            voltage,
            alert: false,
            sound_type: None,
            timestamp: None,
        }
    }

    fn failed(error: &str, consecutive_failures: u32) -> StatusEvent {
        StatusEvent::FetchFailed {
            error: error.to_string(),
            consecutive_failures,
        }
    }

    mod apply {
        use super::*;

        #[test]
        fn success_yields_online_with_the_reading() {
            let config = PollerConfig::default();
            let next = DeviceStatus::Connecting
                .apply(&StatusEvent::FetchSucceeded(reading(3.7)), &config);

            assert_eq!(
                next,
                DeviceStatus::Online {
                    reading: reading(3.7)
                }
            );
        }

        #[test]
        fn failures_below_offline_threshold_yield_connecting() {
            let config = PollerConfig::default();

            for failures in 1..config.max_failures_before_offline {
                let next = DeviceStatus::Unconfigured.apply(&failed("timeout", failures), &config);
                assert_eq!(next, DeviceStatus::Connecting, "at {failures} failures");
            }
        }

        #[test]
        fn exactly_three_failures_yield_offline_with_last_error() {
            let config = PollerConfig::default();
            let next = DeviceStatus::Connecting.apply(&failed("timeout", 3), &config);

            assert_eq!(
                next,
                DeviceStatus::Offline {
                    reason: "timeout".to_string()
                }
            );
        }

        #[test]
        fn failures_between_thresholds_keep_last_error_as_reason() {
            let config = PollerConfig::default();
            let next = DeviceStatus::Connecting.apply(&failed("HTTP 503", 8), &config);

            assert_eq!(
                next,
                DeviceStatus::Offline {
                    reason: "HTTP 503".to_string()
                }
            );
        }

        #[test]
        fn ninth_failure_switches_reason_to_polling_stopped() {
            let config = PollerConfig::default();
            let next = DeviceStatus::Connecting.apply(&failed("timeout", 9), &config);

            assert_eq!(
                next,
                DeviceStatus::Offline {
                    reason: POLLING_STOPPED_REASON.to_string()
                }
            );
        }

        #[test]
        fn unconfigured_supersedes_any_status() {
            let config = PollerConfig::default();
            let current = DeviceStatus::Online {
                reading: reading(3.7),
            };

            assert_eq!(
                current.apply(&StatusEvent::Unconfigured, &config),
                DeviceStatus::Unconfigured
            );
        }

        #[test]
        fn success_after_failures_recovers_immediately() {
            let config = PollerConfig::default();
            let offline = DeviceStatus::Offline {
                reason: "timeout".to_string(),
            };

            let next = offline.apply(&StatusEvent::FetchSucceeded(reading(3.2)), &config);

            assert!(matches!(next, DeviceStatus::Online { .. }));
        }
    }

    mod wire_format {
        use super::*;

        #[test]
        fn status_serializes_with_state_tag() {
            let json = serde_json::to_value(DeviceStatus::Offline {
                reason: "timeout".to_string(),
            })
            .unwrap();

            assert_eq!(json["state"], "offline");
            assert_eq!(json["reason"], "timeout");
        }

        #[test]
        fn online_status_embeds_the_reading() {
            let json = serde_json::to_value(DeviceStatus::Online {
                reading: reading(3.7),
            })
            .unwrap();

            assert_eq!(json["state"], "online");
            assert_eq!(json["reading"]["voltage"], 3.7);
        }
    }
}
