use anyhow::{Context, Result};
use std::{env, path::PathBuf, sync::OnceLock, time::Duration};

/// Application configuration loaded and validated at startup
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// UI server configuration
    pub ui: UiConfig,

    /// Device status poller configuration
    pub poller: PollerConfig,

    /// Transactional mail provider configuration
    pub mail: MailConfig,

    /// Path configuration
    pub paths: PathConfig,
}

#[derive(Clone, Debug)]
pub struct UiConfig {
    pub port: u16,
    pub static_dir: PathBuf,
}

/// Polling intervals and failure thresholds.
///
/// All values are overridable via environment variables, and the poller
/// accepts an explicit instance at construction, so tests never depend on
/// process environment.
#[derive(Clone, Copy, Debug)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub max_failures_before_offline: u32,
    pub max_failures_before_stop: u32,
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub service_id: String,
    pub otp_template_id: String,
    pub order_template_id: String,
    pub public_key: String,
}

#[derive(Clone, Debug)]
pub struct PathConfig {
    pub data_dir: PathBuf,
    pub address_file: PathBuf,
    pub cart_file: PathBuf,
    pub uploads_dir: PathBuf,
}

impl AppConfig {
    /// Get or load the application configuration
    ///
    /// Returns a reference to the cached configuration. On first call, it loads
    /// and validates all configuration from environment variables. Subsequent
    /// calls return the cached instance.
    ///
    /// # Panics
    /// Panics if configuration loading fails. This is intentional as the
    /// application cannot function without valid configuration.
    pub fn get() -> &'static Self {
        static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();
        APP_CONFIG.get_or_init(|| {
            Self::load_internal().expect("failed to load application configuration")
        })
    }

    fn load_internal() -> Result<Self> {
        let ui = UiConfig::load()?;
        let poller = PollerConfig::load()?;
        let mail = MailConfig::load();
        let paths = PathConfig::load()?;

        Ok(Self {
            ui,
            poller,
            mail,
            paths,
        })
    }
}

impl UiConfig {
    fn load() -> Result<Self> {
        let port = env::var("UI_PORT")
            .unwrap_or_else(|_| "1977".to_string())
            .parse::<u16>()
            .context("failed to parse UI_PORT: invalid format")?;

        let static_dir = env::var("STATIC_DIR")
            .unwrap_or_else(|_| "static".to_string())
            .into();

        Ok(Self { port, static_dir })
    }
}

impl PollerConfig {
    const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;
    const DEFAULT_FETCH_TIMEOUT_MS: u64 = 5000;
    const DEFAULT_MAX_FAILURES_BEFORE_OFFLINE: u32 = 3;
    const DEFAULT_MAX_FAILURES_BEFORE_STOP: u32 = 9;

    fn load() -> Result<Self> {
        let poll_interval = Duration::from_millis(parse_env_or(
            "POLL_INTERVAL_MS",
            Self::DEFAULT_POLL_INTERVAL_MS,
        )?);
        let fetch_timeout = Duration::from_millis(parse_env_or(
            "FETCH_TIMEOUT_MS",
            Self::DEFAULT_FETCH_TIMEOUT_MS,
        )?);
        let max_failures_before_offline = parse_env_or(
            "MAX_FAILURES_BEFORE_OFFLINE",
            Self::DEFAULT_MAX_FAILURES_BEFORE_OFFLINE,
        )?;
        let max_failures_before_stop = parse_env_or(
            "MAX_FAILURES_BEFORE_STOP",
            Self::DEFAULT_MAX_FAILURES_BEFORE_STOP,
        )?;

        anyhow::ensure!(
            max_failures_before_offline <= max_failures_before_stop,
            "failed to load poller config: offline threshold exceeds stop threshold"
        );

        Ok(Self {
            poll_interval,
            fetch_timeout,
            max_failures_before_offline,
            max_failures_before_stop,
        })
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(Self::DEFAULT_POLL_INTERVAL_MS),
            fetch_timeout: Duration::from_millis(Self::DEFAULT_FETCH_TIMEOUT_MS),
            max_failures_before_offline: Self::DEFAULT_MAX_FAILURES_BEFORE_OFFLINE,
            max_failures_before_stop: Self::DEFAULT_MAX_FAILURES_BEFORE_STOP,
        }
    }
}

impl MailConfig {
    fn load() -> Self {
        // Placeholders keep local development working without a mail account;
        // the provider rejects them with a 4xx which the mail client surfaces.
        let service_id = env::var("EMAILJS_SERVICE_ID").unwrap_or_else(|_| "service_dev".into());
        let otp_template_id =
            env::var("EMAILJS_OTP_TEMPLATE_ID").unwrap_or_else(|_| "template_otp_dev".into());
        let order_template_id =
            env::var("EMAILJS_ORDER_TEMPLATE_ID").unwrap_or_else(|_| "template_order_dev".into());
        let public_key = env::var("EMAILJS_PUBLIC_KEY").unwrap_or_else(|_| "public_key_dev".into());

        Self {
            service_id,
            otp_template_id,
            order_template_id,
            public_key,
        }
    }
}

impl PathConfig {
    fn load() -> Result<Self> {
        let data_dir = Self::data_dir();
        let uploads_dir = data_dir.join("uploads");

        std::fs::create_dir_all(&uploads_dir).context("failed to create uploads directory")?;

        let address_file = data_dir.join("device_address");
        let cart_file = data_dir.join("cart.json");

        Ok(Self {
            data_dir,
            address_file,
            cart_file,
            uploads_dir,
        })
    }

    #[cfg(not(any(test, feature = "mock")))]
    fn data_dir() -> PathBuf {
        env::var("DATA_DIR")
            .unwrap_or_else(|_| "/data".to_string())
            .into()
    }

    // In test mode, use temp directory as default to avoid /data requirement
    #[cfg(any(test, feature = "mock"))]
    fn data_dir() -> PathBuf {
        std::env::temp_dir().join("lifebeep-ui-test")
    }
}

fn parse_env_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .context(format!("failed to parse {name}: invalid format")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod poller_config {
        use super::*;

        #[test]
        fn defaults_match_documented_values() {
            let config = PollerConfig::default();

            assert_eq!(config.poll_interval, Duration::from_millis(3000));
            assert_eq!(config.fetch_timeout, Duration::from_millis(5000));
            assert_eq!(config.max_failures_before_offline, 3);
            assert_eq!(config.max_failures_before_stop, 9);
        }

        #[test]
        fn stop_threshold_is_triple_the_offline_threshold() {
            let config = PollerConfig::default();

            assert_eq!(
                config.max_failures_before_stop,
                3 * config.max_failures_before_offline
            );
        }
    }

    mod parse_env {
        use super::*;

        #[test]
        fn missing_variable_falls_back_to_default() {
            let value: u64 = parse_env_or("LIFEBEEP_TEST_UNSET_VARIABLE", 42).unwrap();
            assert_eq!(value, 42);
        }
    }
}
