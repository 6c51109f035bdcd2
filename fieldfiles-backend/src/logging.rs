//! Logging things
//!

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter, `RUST_LOG` overrides it.
pub fn default_filter(debug: bool) -> &'static str {
    match debug {
        true => "fieldfiles=debug,fieldfiles_backend=debug,sea_orm_migration=info",
        false => "fieldfiles=info,fieldfiles_backend=info,sea_orm_migration=warn",
    }
}

pub fn init(debug: bool) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(debug).into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
