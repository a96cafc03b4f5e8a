use clap::Parser;
use log::info;
use pgfkit::online::SessionConfig;
use pgfkit::types::{Dialect, EngineProfile, ProfileOverride, RenderOptions, Size};
use pgfkit::{PipelineError, SceneDescription, driver};
use std::path::PathBuf;
use std::time::Duration;

/// Render a JSON scene description to PGF markup or PDF.
#[derive(Parser, Debug)]
#[command(name = "pgfkit", version, about)]
struct Cli {
    /// Scene description (JSON).
    input: PathBuf,

    /// Output file; a `.pdf` extension runs the engine, anything else writes markup.
    #[arg(short, long)]
    output: PathBuf,

    /// Dialect: l(atex), c(ontext), p(lain) or t(ex).
    #[arg(short, long)]
    dialect: Option<Dialect>,

    /// JSON file overriding fields of the built-in engine profile.
    #[arg(long)]
    profile: Option<PathBuf>,

    /// One command per line, indented.
    #[arg(long)]
    readable: bool,

    /// Wrap the picture in a complete document.
    #[arg(long)]
    standalone: bool,

    /// Seconds to wait for each engine round trip.
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

fn load_profile(cli: &Cli) -> Result<EngineProfile, PipelineError> {
    let dialect = cli.dialect.unwrap_or(Dialect::LaTeX);
    match &cli.profile {
        Some(path) => {
            let overrides: ProfileOverride = serde_json::from_str(&std::fs::read_to_string(path)?)?;
            // An explicit --dialect wins over the file.
            let overrides = ProfileOverride { dialect: cli.dialect.or(overrides.dialect), ..overrides };
            Ok(overrides.apply(dialect)?)
        }
        None => Ok(EngineProfile::for_dialect(dialect)),
    }
}

async fn run(cli: Cli) -> Result<(), PipelineError> {
    let description = SceneDescription::from_json(&tokio::fs::read_to_string(&cli.input).await?)?;
    let profile = load_profile(&cli)?;
    let options = RenderOptions::new(profile, Size::zero())
        .with_readable(cli.readable)
        .with_standalone(cli.standalone);
    let config = SessionConfig::default().with_read_timeout(Duration::from_secs(cli.timeout));

    if description.needs_measurement() {
        info!("{} measurement point(s); starting an engine session", description.measurement_points());
        let outcome =
            driver::render_online(&options, &config, move |m| description.build(m), &cli.output).await?;
        info!("Done after {} measurement(s)", outcome.measurements);
    } else {
        let scene = description.static_scene()?;
        driver::render_to_file(&options, &config, &scene, &cli.output).await?;
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("pgfkit: cannot start async runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(run(cli)) {
        eprintln!("pgfkit: {err}");
        if let Some(log) = err.log().filter(|l| !l.is_empty()) {
            eprintln!("--- engine log ---");
            eprintln!("{log}");
        }
        std::process::exit(1);
    }
}
