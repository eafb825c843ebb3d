use anyhow::{Context, Result, bail};

#[derive(Clone, Debug)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub pricing: PricingConfig,
    pub notify: NotifyConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Bearer token expected by the authenticated payment routes.
    pub api_token: String,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    /// Replaces real gateway calls with deterministic synthetic responses.
    pub mock_mode: bool,
    /// Allows the `x-test-mode` webhook header to skip signature verification.
    /// Must stay off in production.
    pub allow_test_bypass: bool,
}

#[derive(Clone, Debug)]
pub struct PricingConfig {
    pub meal_unit_cents: i64,
    pub delivery_unit_cents: i64,
    pub margin_fraction: f64,
    pub currency: String,
}

/// Unset URLs disable the corresponding notification.
#[derive(Clone, Debug)]
pub struct NotifyConfig {
    pub email_url: Option<String>,
    pub stats_url: Option<String>,
}

pub fn load() -> Result<Config> {
    let gateway = load_gateway()?;

    Ok(Config {
        database: DatabaseConfig {
            url: required("DATABASE_URL")?,
        },
        server: ServerConfig {
            bind_addr: optional("BIND_ADDR", "0.0.0.0:3000"),
            api_token: required("API_TOKEN")?,
        },
        gateway,
        pricing: PricingConfig {
            meal_unit_cents: parsed("PRICING_MEAL_UNIT_CENTS", 600)?,
            delivery_unit_cents: parsed("PRICING_DELIVERY_UNIT_CENTS", 250)?,
            margin_fraction: parsed("PRICING_MARGIN_FRACTION", 0.17)?,
            currency: optional("PRICING_CURRENCY", "EUR"),
        },
        notify: NotifyConfig {
            email_url: std::env::var("NOTIFY_EMAIL_URL").ok(),
            stats_url: std::env::var("NOTIFY_STATS_URL").ok(),
        },
    })
}

fn load_gateway() -> Result<GatewayConfig> {
    let mock_mode = flag("GATEWAY_MOCK_MODE");
    let client_id = std::env::var("GATEWAY_CLIENT_ID").unwrap_or_default();
    let client_secret = std::env::var("GATEWAY_CLIENT_SECRET").unwrap_or_default();

    // Fail closed at startup: a real gateway without credentials could never
    // verify a webhook, so refuse to boot instead.
    if !mock_mode && (client_id.is_empty() || client_secret.is_empty()) {
        bail!("GATEWAY_CLIENT_ID and GATEWAY_CLIENT_SECRET are required unless GATEWAY_MOCK_MODE is set");
    }

    Ok(GatewayConfig {
        client_id,
        client_secret,
        base_url: optional("GATEWAY_BASE_URL", "https://gateway.example.com/api/v1"),
        mock_mode,
        allow_test_bypass: flag("GATEWAY_ALLOW_TEST_BYPASS"),
    })
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required env var {key}"))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("invalid value for env var {key}")),
        Err(_) => Ok(default),
    }
}
