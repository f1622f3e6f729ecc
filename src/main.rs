use std::io::Write;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::Parser;
use tokio::signal;
use tokio::signal::unix::SignalKind;
use tokio_util::sync::CancellationToken;

use emuhue::backend::hass::client::HassClient;
use emuhue::backend::hass::{HassBackend, HassService};
use emuhue::config;
use emuhue::error::ApiResult;
use emuhue::server;
use emuhue::server::appstate::{AppState, LINK_BUTTON_DURATION};
use emuhue::server::http::HttpServer;
use emuhue::server::mdns::MdnsService;
use emuhue::server::service::ServiceRunner;
use emuhue::server::ssdp::{SsdpInfo, SsdpService};

/// Virtual Philips Hue bridge, backed by Home Assistant
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Configuration file (yaml)
    #[arg(short, long, default_value = "config.yaml")]
    config: Utf8PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/*
 * Formatter function to output in syslog format. This makes sense when running
 * as a service (where output might go to a log file, or the system journal)
 */
#[allow(clippy::match_same_arms)]
fn syslog_format(
    buf: &mut pretty_env_logger::env_logger::fmt::Formatter,
    record: &log::Record,
) -> std::io::Result<()> {
    writeln!(
        buf,
        "<{}>{}: {}",
        match record.level() {
            log::Level::Error => 3,
            log::Level::Warn => 4,
            log::Level::Info => 6,
            log::Level::Debug => 7,
            log::Level::Trace => 7,
        },
        record.target(),
        record.args()
    )
}

fn init_logging(verbose: bool) -> ApiResult<()> {
    /* Try to provide reasonable default filters, when RUST_LOG is not specified */
    const DEFAULT_LOG_FILTERS: &[&str] = &[
        "mdns_sd=off",
        "tower_http::trace::on_request=info",
        "h2=info",
        "hyper_util=info",
        "tungstenite=info",
        "axum::rejection=trace",
    ];

    let log_filters = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        format!("{level},{}", DEFAULT_LOG_FILTERS.join(","))
    });

    /* Detect if we need syslog or human-readable formatting */
    if std::env::var("SYSTEMD_EXEC_PID").is_ok_and(|pid| pid == std::process::id().to_string()) {
        Ok(pretty_env_logger::env_logger::builder()
            .format(syslog_format)
            .parse_filters(&log_filters)
            .try_init()?)
    } else {
        Ok(pretty_env_logger::formatted_timed_builder()
            .parse_filters(&log_filters)
            .try_init()?)
    }
}

async fn build_tasks(
    runner: &mut ServiceRunner,
    appstate: &AppState,
    client: Arc<HassClient>,
) -> ApiResult<()> {
    let conf = appstate.config();
    let bconf = &conf.bridge;
    let ip = bconf.ipaddress();

    log::info!(
        "Serving mac [{}], bridge id [{}]",
        bconf.mac(),
        hue::bridge_id(bconf.mac())
    );

    // initial entity fetch happens here, before any client can connect
    runner
        .register("hass", HassService::new(appstate.clone(), client))
        .await?;

    let http_service = HttpServer::http(
        ip,
        bconf.http_port,
        server::build_service(appstate.clone()),
    );
    runner.register("http", http_service).await?;

    if bconf.cert_file.exists() {
        let https_service = HttpServer::https_openssl(
            ip,
            bconf.https_port,
            server::build_service(appstate.clone()),
            &bconf.cert_file,
        )?;
        runner.register("https", https_service).await?;
    } else {
        log::warn!(
            "Certificate file [{}] not found, https is disabled",
            bconf.cert_file
        );
    }

    let info = SsdpInfo::new(ip, bconf.discovery_http_port(), bconf.mac());
    runner.register("ssdp", SsdpService::new(ip, info)).await?;

    let mdns = MdnsService::new(ip, bconf.discovery_https_port(), bconf.mac());
    runner.register("mdns", mdns).await?;

    Ok(())
}

fn install_signal_handlers(token: &CancellationToken) -> ApiResult<()> {
    fn shutdown(msg: &str, token: &CancellationToken) {
        log::warn!("{msg}");
        let _ = std::io::stderr().flush();
        token.cancel();
    }

    let tok = token.clone();
    tokio::spawn(async move {
        if matches!(signal::ctrl_c().await, Ok(())) {
            shutdown("Ctrl-C pressed, exiting..", &tok);
        }
    });

    let tok = token.clone();
    let mut signal = signal::unix::signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        if matches!(signal.recv().await, Some(())) {
            shutdown("SIGTERM received, exiting..", &tok);
        }
    });

    Ok(())
}

async fn run() -> ApiResult<()> {
    let args = Args::parse();

    let config = config::parse(&args.config);
    init_logging(args.verbose || config.as_ref().is_ok_and(|cfg| cfg.verbose))?;

    let mut config = config?;
    config.bridge.detect_network();
    log::debug!("Configuration loaded from [{}]", args.config);
    config.log_port_warnings();

    let backend = HassBackend::new(&config.hass)?;
    let client = backend.client();

    let appstate = AppState::from_config(config, Arc::new(backend))?;

    log::info!(
        "Link button pressed for {} seconds",
        LINK_BUTTON_DURATION.as_secs()
    );
    appstate.press_linkbutton(LINK_BUTTON_DURATION).await;

    let mut runner = ServiceRunner::new();

    install_signal_handlers(&runner.token())?;

    build_tasks(&mut runner, &appstate, client).await?;

    runner.run().await
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        log::error!("Emuhue error: {err}");
        log::error!("Fatal error encountered, cannot continue.");
        std::process::exit(1);
    }
}
