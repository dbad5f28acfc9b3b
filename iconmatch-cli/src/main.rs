use clap::Parser;
use iconmatch::image::codec;
use iconmatch::{DirectorySink, RasterImage, SolveResult, Solver, SolverConfig};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const SCHEMA_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.schema.json"));
const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "IconMatch CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print the JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for each pipeline stage.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Config {
    /// Target (hint) image file.
    target_path: Option<String>,
    /// Search (scene) image file.
    search_path: Option<String>,
    /// Text file holding the target as a base64 payload.
    target_base64_path: Option<String>,
    /// Text file holding the search image as a base64 payload.
    search_base64_path: Option<String>,
    output_path: Option<String>,
    /// Directory for debug images; disabled when absent.
    debug_dir: Option<String>,
    solver: SolverConfig,
}

enum Input {
    Image(RasterImage),
    Payload(String),
}

fn load_input(
    name: &str,
    image_path: Option<&str>,
    payload_path: Option<&str>,
) -> Result<Input, Box<dyn std::error::Error>> {
    match (image_path, payload_path) {
        (_, Some(path)) => Ok(Input::Payload(fs::read_to_string(path)?)),
        (Some(path), None) => Ok(Input::Image(RasterImage::from_path(path)?)),
        (None, None) => {
            Err(format!("{name}_path or {name}_base64_path must be set in the config").into())
        }
    }
}

fn solve(solver: &Solver, target: Input, search: Input) -> SolveResult {
    match (target, search) {
        (Input::Payload(target), Input::Payload(search)) => solver.crack_captcha(&target, &search),
        (Input::Image(target), Input::Image(search)) => solver.locate(&target, &search),
        (target, search) => {
            // Mixed inputs: re-encode the file side so both go through the codec.
            let encode = |input: Input| match input {
                Input::Payload(text) => Ok(text),
                Input::Image(img) => codec::encode_png_base64(&img),
            };
            match (encode(target), encode(search)) {
                (Ok(target), Ok(search)) => solver.crack_captcha(&target, &search),
                _ => SolveResult {
                    success: false,
                    points: Vec::new(),
                    message: "failed to re-encode input image".to_string(),
                    debug_image: None,
                    icons: Vec::new(),
                },
            }
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("iconmatch=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_schema {
        println!("{SCHEMA_JSON}");
        return Ok(());
    }
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;

    let target = load_input(
        "target",
        config.target_path.as_deref(),
        config.target_base64_path.as_deref(),
    )?;
    let search = load_input(
        "search",
        config.search_path.as_deref(),
        config.search_base64_path.as_deref(),
    )?;

    let mut solver = Solver::new(config.solver);
    if let Some(dir) = config.debug_dir.as_deref() {
        solver = solver.with_debug_sink(Box::new(DirectorySink::new(dir)?));
    }

    let result = solve(&solver, target, search);
    tracing::info!(
        success = result.success,
        points = result.points.len(),
        "solve finished"
    );
    let json = serde_json::to_string_pretty(&result)?;

    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}
