extern crate thermcast;

use clap::{Args, Parser};
use std::ffi::OsStr;
use std::fs;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thermcast::core::weather::{HourlySample, Provenance};
use thermcast::output::FileOutput;
use thermcast::read_weather_file::weather_data_to_samples;
use thermcast::sources::http_client;
use thermcast::{run_project, ForecastService};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct ThermcastArgs {
    input_file: String,
    #[command(flatten)]
    weather: WeatherChoice,
    #[arg(
        long,
        default_value_t = false,
        help = "Seed synthetic weather from the system's entropy instead of the input's seed"
    )]
    random_seed: bool,
    #[arg(long, default_value_t = Level::INFO, help = "Most verbose log level to print")]
    log_level: Level,
}

#[derive(Args, Clone, Default, Debug)]
#[group(required = false, multiple = true)]
struct WeatherChoice {
    #[arg(long, help = "Path to an hourly CSV of observed weather")]
    historical_file: Option<String>,
    #[arg(long, help = "Path to an hourly CSV of forecast weather")]
    forecast_file: Option<String>,
    #[arg(
        long,
        default_value_t = false,
        conflicts_with_all = ["historical_file", "forecast_file"],
        help = "Fetch weather and electricity rates from online providers"
    )]
    online: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ThermcastArgs::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let input_file = args.input_file.as_str();
    let input_file_ext = Path::new(input_file).extension().and_then(OsStr::to_str);
    let input_file_stem = match input_file_ext {
        Some(ext) => &input_file[..(input_file.len() - ext.len() - 1)],
        None => input_file,
    };
    let input_file_stem = PathBuf::from(input_file_stem);
    let input_file_name = input_file_stem
        .file_name()
        .and_then(OsStr::to_str)
        .unwrap_or("forecast")
        .to_string();

    let mut output_path = PathBuf::new();
    output_path.push(format!("{}__results", input_file_stem.display()));
    fs::create_dir_all(&output_path)?;
    let file_output = FileOutput::new(output_path, format!("{input_file_name}__{{}}.{{}}"));

    let service = if args.weather.online {
        ForecastService::online(http_client())
    } else {
        let read = |path: &Option<String>,
                    provenance: Provenance|
         -> anyhow::Result<Vec<HourlySample>> {
            match path {
                Some(path) => weather_data_to_samples(File::open(path)?, provenance),
                None => Ok(vec![]),
            }
        };
        ForecastService::offline(
            read(&args.weather.historical_file, Provenance::Actual)?,
            read(&args.weather.forecast_file, Provenance::Forecast)?,
        )
    };

    let seed = args.random_seed.then(rand::random::<u64>);
    if let Some(seed) = seed {
        info!(seed, "using random synthetic weather seed");
    }

    let report = run_project(
        BufReader::new(File::open(Path::new(input_file))?),
        &file_output,
        &service,
        chrono::Local::now().naive_local(),
        seed,
    )
    .await?;

    let summary = report.bridge_summary();
    info!(
        total_cost = %summary.total_cost,
        total_kwh = summary.total_kwh,
        low_confidence = report.low_confidence,
        "forecast written"
    );

    Ok(())
}
