use anyhow::Result;
use forward_policy::config::Settings;
use forward_policy::infrastructure::log_messages::{application, configuration};
use forward_policy::Application;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let settings = Settings::new()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    if settings.logging.is_json() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("{}", application::STARTING);
    info!(
        environment = std::env::var("ENVIRONMENT").as_deref().unwrap_or("development"),
        "{}",
        configuration::CONFIG_LOADED
    );

    let app = Application::new(settings)?;
    app.run()?;

    Ok(())
}
