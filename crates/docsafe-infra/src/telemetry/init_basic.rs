use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "docsafe=info";

/// Settings for the global subscriber.
#[derive(Debug, Clone)]
pub struct TelemetryOptions {
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
    /// Emit one JSON object per event instead of human-readable lines.
    pub json: bool,
}

impl TelemetryOptions {
    /// Options for `service_name`, with the output format taken from `LOG_FORMAT`.
    pub fn from_env(service_name: &str, service_version: &str, environment: &str) -> Self {
        let json = std::env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        Self {
            service_name: service_name.to_string(),
            service_version: service_version.to_string(),
            environment: environment.to_string(),
            json,
        }
    }
}

/// Initialize tracing
///
/// The filter comes from `RUST_LOG` and defaults to `docsafe=info`.
pub fn init_telemetry(
    options: &TelemetryOptions,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    let json_layer = options
        .json
        .then(|| tracing_subscriber::fmt::layer().json().with_current_span(true));
    let text_layer = (!options.json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()?;

    tracing::info!(
        service = %options.service_name,
        version = %options.service_version,
        environment = %options.environment,
        json = options.json,
        "Tracing initialized"
    );
    Ok(())
}

pub async fn shutdown_telemetry() {
    tracing::debug!("Telemetry shutdown");
}
