//! # Paper Agenda Application Entry Point
//!
//! Runs the dashboard pipeline once: fetch calendar and weather, group the
//! agenda, skip the refresh if the agenda is unchanged, render, then write
//! PBM files (`--output`) or drive the 7.5" HD panel.
//!
//! Intended to be run from a timer (cron or a systemd timer). A skipped
//! refresh is a successful run.

// Test modules
#[cfg(test)]
mod tests;

#[cfg(all(target_os = "linux", feature = "hardware"))]
mod gpio_cdev;
#[cfg(all(target_os = "linux", feature = "hardware"))]
mod hw_spi_spidev;

use anyhow::{bail, Context};
use chrono::{Duration, Local, NaiveDateTime, Utc};
use clap::Parser;
use paper_agenda_lib::{
    agenda::EventAggregator,
    cache::ChangeCache,
    config::{Config, HardwareConfig, WeatherConfig, CONFIG_FILE},
    epd7in5b_hd::{EPD_HEIGHT, EPD_WIDTH},
    forecast::{Forecast, ForecastSelector},
    frame::{check_dimensions, Frame},
    renderer::{FrameRenderer, RenderContext},
    sources::{DataHub, GoogleCalendar},
    Day, Event,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Command line interface. Unset options fall back to agenda-config.toml.
#[derive(Parser, Debug)]
#[command(name = "paper-agenda", version, about = "Calendar and weather dashboard for a B/W/Red e-paper panel")]
struct Cli {
    /// Don't clear the panel before drawing
    #[arg(long)]
    noclear: bool,

    /// Don't fetch or show the weather forecast
    #[arg(long)]
    noweather: bool,

    /// Write PREFIX-b.pbm and PREFIX-r.pbm instead of driving the panel
    #[arg(short, long, value_name = "PREFIX")]
    output: Option<String>,

    /// Black plane PBM to show instead of rendering (needs --redinput)
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Red plane PBM to show instead of rendering (needs --input)
    #[arg(short, long, value_name = "FILE")]
    redinput: Option<PathBuf>,

    /// Comma-separated calendar names
    #[arg(short, long)]
    calendars: Option<String>,

    /// Log pipeline detail, including the aggregated days
    #[arg(short, long)]
    verbose: bool,

    /// Frame width for file output
    #[arg(long)]
    width: Option<u32>,

    /// Frame height for file output
    #[arg(long)]
    height: Option<u32>,

    /// Days ahead to show events for
    #[arg(short, long)]
    days: Option<u32>,

    /// Change-detection cache file; enables skipping unchanged refreshes
    #[arg(long, value_name = "FILE")]
    cache: Option<PathBuf>,

    /// Hours before an unchanged agenda is redrawn anyway
    #[arg(long)]
    cachehours: Option<u32>,

    /// Application config file
    #[arg(long, value_name = "FILE", default_value = CONFIG_FILE)]
    config: PathBuf,
}

/// Effective run settings: CLI over config file over defaults.
#[derive(Debug, Clone, PartialEq)]
struct Settings {
    width: u32,
    height: u32,
    calendars: String,
    lookahead_days: u32,
    cache_path: Option<PathBuf>,
    cache_ttl_hours: u32,
    weather: bool,
    output: Option<String>,
}

impl Settings {
    fn resolve(cli: &Cli, config: &Config) -> Self {
        let (width, height) = if cli.output.is_some() {
            (
                cli.width.unwrap_or(config.display.width),
                cli.height.unwrap_or(config.display.height),
            )
        } else {
            // The panel fixes the frame size
            (EPD_WIDTH, EPD_HEIGHT)
        };

        Self {
            width,
            height,
            calendars: cli
                .calendars
                .clone()
                .unwrap_or_else(|| config.agenda.calendars.clone()),
            lookahead_days: cli.days.unwrap_or(config.agenda.lookahead_days),
            cache_path: cli.cache.clone().or_else(|| config.cache.path.clone()),
            cache_ttl_hours: cli.cachehours.unwrap_or(config.cache.ttl_hours),
            weather: !cli.noweather,
            output: cli.output.clone(),
        }
    }
}

/// Pre-rendered planes given on the command line, if any.
fn input_planes(cli: &Cli) -> anyhow::Result<Option<(PathBuf, PathBuf)>> {
    match (&cli.input, &cli.redinput) {
        (Some(black), Some(red)) => Ok(Some((black.clone(), red.clone()))),
        (None, None) => Ok(None),
        _ => bail!("--input and --redinput must be used together"),
    }
}

/// A rendered frame and the agenda it shows.
#[derive(Debug)]
struct Refresh {
    frame: Frame,
    days: Vec<Day>,
    now: NaiveDateTime,
}

/// Aggregate, select slots, consult the cache and render. `None` means the
/// refresh is skipped.
///
/// Nothing is stored for a new agenda here; see [`remember_shown`].
fn compose(
    settings: &Settings,
    events: Vec<Event>,
    forecast: Option<&Forecast>,
    now: NaiveDateTime,
) -> anyhow::Result<Option<Refresh>> {
    let today = now.date();
    let days = EventAggregator::new(settings.lookahead_days).aggregate(events, today);
    tracing::debug!("aggregated days: {:#?}", days);

    let context = RenderContext::default();
    let slots = ForecastSelector::new(&context.glyphs)
        .select(forecast, now)
        .context("selecting forecast slots")?;

    if let Some(path) = &settings.cache_path {
        let cache = ChangeCache::new(path);
        let ttl = Duration::hours(i64::from(settings.cache_ttl_hours));
        if !cache.needs_redraw(&days, ttl, now) {
            tracing::info!("agenda unchanged since last refresh, nothing to do");
            cache.record_shown(&days, now);
            return Ok(None);
        }
    }

    let renderer = FrameRenderer::new(settings.width, settings.height, context);
    let frame = renderer.render(&days, slots.as_ref(), today);
    Ok(Some(Refresh { frame, days, now }))
}

/// Record `days` as on screen once its frame was written or displayed.
fn remember_shown(settings: &Settings, days: &[Day], now: NaiveDateTime) {
    if let Some(path) = &settings.cache_path {
        ChangeCache::new(path).record_shown(days, now);
    }
}

/// Fetch everything the frame needs and compose it.
fn fetch_and_compose(settings: &Settings, config: &Config) -> anyhow::Result<Option<Refresh>> {
    let weather = if settings.weather {
        Some(WeatherConfig::load_or_create(&config.paths.weather_file)?)
    } else {
        None
    };

    let now = Local::now();
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let (events, forecast) = rt.block_on(async {
        let calendar = GoogleCalendar::from_token_file(&config.paths.token_file)?;
        let events = calendar
            .fetch(&settings.calendars, now.with_timezone(&Utc))
            .await
            .context("fetching calendar events")?;

        let forecast = match &weather {
            Some(weather) => Some(
                DataHub::new(weather)
                    .forecast()
                    .await
                    .context("fetching weather forecast")?,
            ),
            None => None,
        };

        anyhow::Ok((events, forecast))
    })?;

    compose(settings, events, forecast.as_ref(), now.naive_local())
}

/// Send a frame to the panel: init, clear, display, sleep.
#[cfg(all(target_os = "linux", feature = "hardware"))]
fn show_on_panel(frame: &Frame, hw: &HardwareConfig, noclear: bool) -> anyhow::Result<()> {
    use crate::gpio_cdev::{KernelChipSelect, PanelLines};
    use crate::hw_spi_spidev::SpidevHwSpi;
    use paper_agenda_lib::epd7in5b_hd::Epd7in5bHd;

    tracing::debug!(
        "panel wiring: DC GPIO {}, RST GPIO {}, BUSY GPIO {}, SPI {}",
        hw.dc_pin,
        hw.rst_pin,
        hw.busy_pin,
        hw.spi_device
    );

    let PanelLines { dc, rst, busy } = PanelLines::open(hw)?;
    let spi = SpidevHwSpi::new(&hw.spi_device, hw.spi_speed_hz)?;

    let mut epd = Epd7in5bHd::new(spi, KernelChipSelect, dc, rst, busy);
    epd.init()?;
    if !noclear {
        epd.clear()?;
    }
    epd.display(frame.black.as_bytes(), frame.red.as_bytes())?;
    epd.sleep()?;
    Ok(())
}

#[cfg(not(all(target_os = "linux", feature = "hardware")))]
fn show_on_panel(_frame: &Frame, _hw: &HardwareConfig, _noclear: bool) -> anyhow::Result<()> {
    hardware_available()
}

/// Whether this build can drive the panel at all.
fn hardware_available() -> anyhow::Result<()> {
    if cfg!(not(target_os = "linux")) {
        bail!("The e-paper panel can only be driven on Linux. Use --output to write image files.");
    }
    if cfg!(not(feature = "hardware")) {
        bail!("E-ink display support not enabled. Rebuild with --features hardware, or use --output.");
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load_from_path(&cli.config);
    let settings = Settings::resolve(&cli, &config);
    let planes = input_planes(&cli)?;
    check_dimensions(settings.width, settings.height).context("invalid --width/--height")?;

    if settings.output.is_none() {
        hardware_available()?;
    }

    let (frame, shown) = match planes {
        Some((black, red)) => (Frame::load(&black, &red).context("loading input planes")?, None),
        None => match fetch_and_compose(&settings, &config)? {
            Some(Refresh { frame, days, now }) => (frame, Some((days, now))),
            None => return Ok(()),
        },
    };

    match &settings.output {
        Some(prefix) => {
            let (black, red) = frame.save(prefix).context("writing output images")?;
            tracing::info!("wrote {} and {}", black.display(), red.display());
        }
        None => show_on_panel(&frame, &config.display.hardware, cli.noclear)?,
    }

    if let Some((days, now)) = shown {
        remember_shown(&settings, &days, now);
    }

    Ok(())
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run(cli)
}
