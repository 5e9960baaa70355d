//! ckt-daemon entry point.
//!
//! Thin: resolves flags and config, builds the asset cache and shared state,
//! starts the background tasks and serves the router. Handlers live in
//! `routes.rs`, page assembly in `pages.rs`.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};

use ckt_assets::{spawn_refresher, AssetCache, CommandBuilder, DiskFs, Toolchain};
use ckt_config::flags::{env_file_path, FlagKind, FlagSpec, ServerFlags, SERVER_FLAGS};
use ckt_config::keys::resolve_payment_keys;
use ckt_config::{
    load_layered_yaml, report_unused_keys, LoadedConfig, ServerSettings, UnusedKeyPolicy,
    WritePolicySetting,
};
use ckt_daemon::{pages, routes, state};
use ckt_orders::{OrderStore, WritePolicy};
use ckt_provider::{PaymentProvider, StripeProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = command().get_matches();
    let cli = |spec: &FlagSpec| cli_value(&matches, spec);
    let env = |name: &str| std::env::var(name).ok();

    // The env file must be in place before any other flag is resolved.
    let env_file = env_file_path(cli, env).map(|path| {
        let loaded = dotenvy::from_filename(&path).is_ok();
        (path, loaded)
    });

    init_tracing();
    if let Some((path, loaded)) = &env_file {
        info!(%path, loaded, "environment file");
    }

    let flags = ServerFlags::resolve(cli, env).context("resolving flags")?;
    info!(?flags, "flags resolved");

    let layers: Vec<&str> = flags.config_paths.iter().map(String::as_str).collect();
    let loaded = if layers.is_empty() {
        LoadedConfig::empty()?
    } else {
        load_layered_yaml(&layers)?
    };
    info!(config_hash = %loaded.config_hash, layers = layers.len(), "config loaded");

    let unused = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for ptr in &unused.unused_leaf_pointers {
        warn!(leaf = %ptr, "config key is not used by the server");
    }

    let settings = ServerSettings::from_config_json(&loaded.config_json)?;
    let keys = resolve_payment_keys(&flags)?;
    info!(mode = keys.mode.as_str(), "payment keys resolved");

    let provider: Arc<dyn PaymentProvider> = Arc::new(StripeProvider::new_with_base_url(
        keys.secret_key.clone(),
        settings.payment_api_base.clone(),
    ));

    let builder = CommandBuilder::new(
        Toolchain::new(settings.toolchain_standard.clone(), settings.toolchain_env.clone()),
        Toolchain::new(settings.toolchain_alt.clone(), settings.toolchain_env.clone()),
    );
    let mut cache = AssetCache::new(Arc::new(builder), Arc::new(DiskFs), keys.publishable_key.clone());
    let page_ids = pages::seed(&mut cache, &settings);
    let cache = Arc::new(cache);

    let orders = OrderStore::new(settings.orders_dir.clone(), write_policy(settings.orders_write_policy));
    let shared = Arc::new(state::AppState::new(
        Arc::clone(&cache),
        page_ids,
        orders,
        provider,
        settings.payment_currency.clone(),
    ));

    spawn_refresher(
        cache,
        settings.refresh_interval,
        state::refresh_reporter(shared.bus.clone()),
    );
    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(15));

    let app = routes::build_router(Arc::clone(&shared)).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let addr = format!("{}:{}", settings.bind, flags.web_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("ckt-daemon listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

/// clap command generated from the flag table.
fn command() -> Command {
    let base = Command::new("ckt-daemon")
        .version(env!("CARGO_PKG_VERSION"))
        .about("checkout server: pages, payment intents and verified orders");

    SERVER_FLAGS.iter().fold(base, |cmd, spec| {
        let arg = Arg::new(spec.name)
            .long(spec.name)
            .short(spec.short)
            .help(spec.help())
            .value_parser(value_parser!(String))
            .action(ArgAction::Set);
        let arg = match spec.kind {
            // `--teststripekey` alone means true.
            FlagKind::Bool => arg.num_args(0..=1).default_missing_value("true"),
            FlagKind::Str | FlagKind::Int => arg.num_args(1),
        };
        cmd.arg(arg)
    })
}

fn cli_value(matches: &ArgMatches, spec: &FlagSpec) -> Option<String> {
    matches.get_one::<String>(spec.name).cloned()
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn write_policy(s: WritePolicySetting) -> WritePolicy {
    match s {
        WritePolicySetting::Overwrite => WritePolicy::Overwrite,
        WritePolicySetting::RejectExisting => WritePolicy::RejectExisting,
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler failed; serving until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
