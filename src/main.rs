//! `careerchat-widget`: runs the widget-config endpoint, or boots the widget
//! runtime against a headless page.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN};

use careerchat_widget_lib::{
    control::WIDGET_MARKER_ATTR,
    host::{HostEvent, ListenerTarget},
    init_logging,
    placement::COMPANY_ID_ATTR,
    server::{self, CompanyDirectory},
    style::ENHANCED_CLASS,
    EmbedMode, HostPage, HttpConfigFetcher, MemoryPage, WidgetRuntime, WidgetSettings,
};

#[derive(Parser, Debug)]
#[command(name = "careerchat-widget", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve GET /api/widget-config from a company directory file.
    Serve {
        /// JSON array of company records.
        #[arg(long)]
        companies: PathBuf,
        #[arg(long, default_value = "127.0.0.1:8787")]
        bind: String,
    },
    /// Boot the widget on a headless page and print what it rendered.
    Simulate {
        #[arg(long)]
        company_id: String,
        /// Enhance a pre-rendered anchor instead of injecting after a script tag.
        #[arg(long)]
        enhanced: bool,
        /// Widget settings JSON; defaults apply when absent.
        #[arg(long)]
        settings: Option<PathBuf>,
        /// Address of the simulated host page, sent as the request origin.
        #[arg(long, default_value = "https://careers.example.com/jobs/42")]
        page_url: String,
        /// Give up waiting after this many seconds.
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { companies, bind } => {
            let directory = CompanyDirectory::load(&companies)?;
            server::serve(&bind, directory).await
        }
        Commands::Simulate {
            company_id,
            enhanced,
            settings,
            page_url,
            timeout_secs,
        } => {
            let settings = match settings {
                Some(path) => WidgetSettings::load(&path)?,
                None => WidgetSettings::default(),
            }
            .with_env_overrides()?;
            let mode = if enhanced {
                EmbedMode::Enhanced
            } else {
                EmbedMode::Script
            };
            simulate(settings, &company_id, mode, &page_url, Duration::from_secs(timeout_secs)).await
        }
    }
}

async fn simulate(
    settings: WidgetSettings,
    company_id: &str,
    mode: EmbedMode,
    page_url: &str,
    timeout: Duration,
) -> Result<()> {
    let origin = reqwest::Url::parse(page_url)
        .with_context(|| format!("Invalid page URL {page_url}"))?
        .origin()
        .ascii_serialization();
    let mut headers = HeaderMap::new();
    headers.insert(
        ORIGIN,
        HeaderValue::from_str(&origin).context("Page origin is not a valid header value")?,
    );
    let client = reqwest::Client::builder()
        .default_headers(headers)
        .build()
        .context("Failed to build HTTP client")?;

    let page = Arc::new(MemoryPage::new());
    page.set_location_href(page_url);
    match mode {
        EmbedMode::Script => {
            let src = format!("{}/widget.js", settings.api_origin.trim_end_matches('/'));
            page.append_element(
                page.body(),
                "script",
                &[("src", src.as_str()), (COMPANY_ID_ATTR, company_id)],
                "",
            )?;
        }
        EmbedMode::Enhanced => {
            page.append_element(
                page.body(),
                "a",
                &[("class", ENHANCED_CLASS), (COMPANY_ID_ATTR, company_id)],
                "",
            )?;
        }
    }

    let fetcher = Arc::new(HttpConfigFetcher::with_client(client, settings.clone()));
    let runtime = WidgetRuntime::new(page.clone(), fetcher, settings);
    runtime.boot(mode).await;
    page.dispatch(ListenerTarget::Window, HostEvent::Load);

    if tokio::time::timeout(timeout, runtime.settled()).await.is_err() {
        log::warn!("placements still pending after {:?}", timeout);
    }
    runtime.shutdown().await;

    for snapshot in runtime.snapshots().await {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }
    let controls = match mode {
        EmbedMode::Script => page.elements_with_attribute(WIDGET_MARKER_ATTR),
        EmbedMode::Enhanced => page.elements_with_class(ENHANCED_CLASS),
    };
    for control in controls {
        println!(
            "control {:?}: text={:?} background={:?} color={:?} radius={:?}",
            control,
            page.text(control),
            page.style(control, "background-color"),
            page.style(control, "color"),
            page.style(control, "border-radius"),
        );
    }
    Ok(())
}
