use std::fs;
use std::fs::File;
use std::io::{self, Write};
use std::panic;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use navic_track::{
    author_scene, build_plan, GeneratorInfo, Params, Rgba, SceneDocument, SegmentThresholds,
    TrackPlan,
};
use plotters::prelude::*;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "NavIC trajectory authoring CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the downsampled track and write it as CSV with per-point jamming state
    Track(TrackArgs),
    /// Build the coloured segments, guide curve and drone binding into a scene document
    Author(AuthorArgs),
    /// Print the effective parameters as JSON
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
struct ParamArgs {
    /// JSON parameter file; flags below override its values
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Trajectory sampling rate (samples/sec)
    #[arg(long)]
    fs: Option<f64>,

    /// Seconds for one revolution
    #[arg(long)]
    total_time: Option<f64>,

    /// Circle radius (scene units)
    #[arg(long)]
    radius: Option<f64>,

    /// Position noise standard deviation
    #[arg(long)]
    noise_std: Option<f64>,

    /// RNG seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Downsampling stride (defaults to fs/2)
    #[arg(long)]
    stride: Option<usize>,

    /// Segment thresholds in seconds: ramp_up_start,ramp_up_end,full_jam_end,ramp_down_end
    #[arg(long)]
    thresholds: Option<String>,

    /// Frames for one traversal of the guide curve
    #[arg(long)]
    path_duration: Option<u32>,

    /// Preferred proxy object name
    #[arg(long)]
    drone_name: Option<String>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct TrackArgs {
    #[command(flatten)]
    params: ParamArgs,

    /// Output CSV path (`-` for stdout)
    #[arg(short, long, default_value = "track.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

#[derive(Parser, Debug)]
struct AuthorArgs {
    #[command(flatten)]
    params: ParamArgs,

    /// Existing scene JSON (objects, active object) to author into
    #[arg(long, value_hint = ValueHint::FilePath)]
    scene: Option<PathBuf>,

    /// Output scene document path (`-` for stdout)
    #[arg(short, long, default_value = "scene.json", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Output PNG preview path (defaults next to the scene document)
    #[arg(long, value_hint = ValueHint::FilePath)]
    png: Option<PathBuf>,

    /// Output SVG preview path
    #[arg(long, value_hint = ValueHint::FilePath)]
    svg: Option<PathBuf>,

    /// Disable preview generation
    #[arg(long, action = ArgAction::SetTrue)]
    no_plot: bool,

    /// Treat the host as lacking automatic path animation (keyframe eval_time instead)
    #[arg(long, action = ArgAction::SetTrue)]
    manual_keyframes: bool,
}

#[derive(Parser, Debug)]
struct ConfigArgs {
    #[command(flatten)]
    params: ParamArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Track(args) => args.params.verbose,
        Command::Author(args) => args.params.verbose,
        Command::Config(args) => args.params.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Track(args) => handle_track(args),
        Command::Author(args) => handle_author(args),
        Command::Config(args) => handle_config(args),
    }
}

fn load_params(args: &ParamArgs) -> Result<Params> {
    let mut params = match args.config.as_ref() {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str::<Params>(&text)
                .with_context(|| format!("{} is not a valid parameter file", path.display()))?
        }
        None => Params::default(),
    };

    if let Some(fs) = args.fs {
        params.fs_trajectory = fs;
    }
    if let Some(total_time) = args.total_time {
        params.total_time = total_time;
    }
    if let Some(radius) = args.radius {
        params.radius = radius;
    }
    if let Some(noise_std) = args.noise_std {
        params.noise_std = noise_std;
    }
    if let Some(seed) = args.seed {
        params.seed = Some(seed);
    }
    if let Some(stride) = args.stride {
        params.downsample_stride = Some(stride);
    }
    if let Some(thresholds) = args.thresholds.as_ref() {
        params.thresholds = parse_thresholds(thresholds)?;
    }
    if let Some(frames) = args.path_duration {
        params.path_duration = frames;
    }
    if let Some(name) = args.drone_name.as_ref() {
        params.drone_name_preference = name.clone();
    }

    params.validate()?;
    if params.jam_window_mismatch() {
        warn!(
            "Segment thresholds {:?} do not span the jamming window {:?}",
            params.thresholds.as_array(),
            params.jam_window
        );
    }
    Ok(params)
}

fn parse_thresholds(input: &str) -> Result<SegmentThresholds> {
    let values = input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|token| {
            token
                .parse::<f64>()
                .with_context(|| format!("invalid threshold '{}': expected seconds", token))
        })
        .collect::<Result<Vec<_>>>()?;
    match values.as_slice() {
        &[ramp_up_start, ramp_up_end, full_jam_end, ramp_down_end] => Ok(SegmentThresholds {
            ramp_up_start,
            ramp_up_end,
            full_jam_end,
            ramp_down_end,
        }),
        _ => Err(anyhow!(
            "--thresholds needs exactly 4 values, got {}",
            values.len()
        )),
    }
}

fn plan_from(params: &Params) -> Result<TrackPlan> {
    let t_plan = Instant::now();
    let plan = build_plan(params, &mut params.rng())?;
    debug!(
        "Plan stage: {:.1} ms ({} track points)",
        t_plan.elapsed().as_secs_f64() * 1000.0,
        plan.track.len()
    );
    Ok(plan)
}

fn handle_track(args: TrackArgs) -> Result<()> {
    let params = load_params(&args.params)?;
    let plan = plan_from(&params)?;

    if args.output.as_os_str() == "-" {
        let stdout = io::stdout();
        let mut writer = csv::Writer::from_writer(stdout.lock());
        write_track_rows(&plan, &mut writer)?;
    } else {
        let file = File::create(&args.output)
            .with_context(|| format!("failed to create {}", args.output.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        write_track_rows(&plan, &mut writer)?;
        info!(
            "Wrote track CSV: {} ({} rows)",
            args.output.display(),
            plan.track.len()
        );
    }
    Ok(())
}

fn write_track_rows<W: Write>(plan: &TrackPlan, writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record(["t_s", "x", "y", "z", "state"])?;
    for i in 0..plan.track.len() {
        let Some(sample) = plan.track.sample(i) else {
            continue;
        };
        let state = plan.state_at(i).map(|s| s.label()).unwrap_or("");
        writer.write_record([
            format!("{:.3}", sample.t),
            format!("{:.6}", sample.x),
            format!("{:.6}", sample.y),
            "0".to_string(),
            state.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn handle_author(args: AuthorArgs) -> Result<()> {
    let params = load_params(&args.params)?;
    let plan = plan_from(&params)?;

    let mut document = match args.scene.as_ref() {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read scene {}", path.display()))?;
            serde_json::from_str::<SceneDocument>(&text)
                .with_context(|| format!("{} is not a valid scene document", path.display()))?
        }
        None => SceneDocument::default(),
    };
    if args.manual_keyframes {
        document.supports_path_animate = false;
    }

    let report = author_scene(&mut document, &plan, &params)?;
    let mut generator = GeneratorInfo::for_params(&params)?;
    generator.generated_at = Some(Utc::now().to_rfc3339());
    document.generator = Some(generator);

    let text = serde_json::to_string_pretty(&document)?;
    if args.output.as_os_str() == "-" {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle.write_all(text.as_bytes())?;
        handle.write_all(b"\n")?;
    } else {
        fs::write(&args.output, text)
            .with_context(|| format!("failed to write {}", args.output.display()))?;
        info!(
            "Wrote scene document: {} ({} objects, {} materials)",
            args.output.display(),
            document.objects.len(),
            report.materials.len()
        );
    }

    if !args.no_plot {
        let png = args.png.clone().or_else(|| {
            (args.output.as_os_str() != "-").then(|| args.output.with_extension("png"))
        });
        if let Some(path) = png.as_ref() {
            write_preview(&plan, path, PreviewKind::Png);
        }
        if let Some(path) = args.svg.as_ref() {
            write_preview(&plan, path, PreviewKind::Svg);
        }
    }

    Ok(())
}

fn handle_config(args: ConfigArgs) -> Result<()> {
    let params = load_params(&args.params)?;
    println!("{}", serde_json::to_string_pretty(&params)?);
    Ok(())
}

enum PreviewKind {
    Png,
    Svg,
}

fn write_preview(plan: &TrackPlan, path: &Path, kind: PreviewKind) {
    if let Err(err) = render_preview_guard(plan, path, kind) {
        warn!("Skipping preview render ({}): {}", path.display(), err);
    } else {
        info!("Wrote preview: {}", path.display());
    }
}

fn render_preview_guard(plan: &TrackPlan, path: &Path, kind: PreviewKind) -> Result<(), String> {
    let render = || -> Result<(), String> {
        let drawn = match kind {
            PreviewKind::Png => {
                let root = BitMapBackend::new(path, PREVIEW_SIZE).into_drawing_area();
                draw_preview(root, plan)
            }
            PreviewKind::Svg => {
                let root = SVGBackend::new(path, PREVIEW_SIZE).into_drawing_area();
                draw_preview(root, plan)
            }
        };
        drawn.map_err(|e| format!("plotting error: {}", e))
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

const PREVIEW_SIZE: (u32, u32) = (900, 900);

/// Square plot extent covering every track point plus a small margin.
fn preview_extent(plan: &TrackPlan) -> (f64, f64, f64) {
    let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
    for (&x, &y) in plan.track.x.iter().zip(plan.track.y.iter()) {
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }
    if !min_x.is_finite() || !min_y.is_finite() {
        return (0.0, 0.0, 1.0);
    }
    let half = ((max_x - min_x).max(max_y - min_y) / 2.0).max(1e-6) * 1.05;
    ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0, half)
}

fn rgb(color: &Rgba) -> RGBColor {
    let (r, g, b) = color.to_rgb8();
    RGBColor(r, g, b)
}

fn draw_preview<DB>(root: DrawingArea<DB, plotters::coord::Shift>, plan: &TrackPlan) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let (cx, cy, half) = preview_extent(plan);
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .build_cartesian_2d((cx - half)..(cx + half), (cy - half)..(cy + half))?;

    // Guide path underneath, thin and light.
    chart.draw_series(LineSeries::new(
        plan.guide_points().into_iter().map(|[x, y, _]| (x, y)),
        RGBColor(200, 200, 200).stroke_width(1),
    ))?;

    for emission in plan.emissions() {
        let color = rgb(&emission.color);
        chart.draw_series(LineSeries::new(
            emission.points.into_iter().map(|[x, y, _]| (x, y)),
            color.stroke_width(3),
        ))?;
    }

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use navic_track::{Segment, Track};

    #[test]
    fn parses_threshold_list() {
        let t = parse_thresholds("20, 24,36,40").unwrap();
        assert_eq!(t, SegmentThresholds::default());
        assert!(parse_thresholds("20,24,36").is_err());
        assert!(parse_thresholds("20,24,x,40").is_err());
    }

    #[test]
    fn flags_override_defaults() {
        let args = ParamArgs {
            config: None,
            fs: Some(20.0),
            total_time: None,
            radius: Some(10.0),
            noise_std: Some(0.0),
            seed: Some(4),
            stride: Some(3),
            thresholds: None,
            path_duration: Some(240),
            drone_name: Some("Quad".into()),
            verbose: false,
        };
        let params = load_params(&args).unwrap();
        assert_eq!(params.fs_trajectory, 20.0);
        assert_eq!(params.radius, 10.0);
        assert_eq!(params.stride().unwrap(), 3);
        assert_eq!(params.path_duration, 240);
        assert_eq!(params.drone_name_preference, "Quad");
        assert_eq!(params.total_time, 60.0);
    }

    #[test]
    fn invalid_flags_are_rejected() {
        let args = ParamArgs {
            config: None,
            fs: Some(-1.0),
            total_time: None,
            radius: None,
            noise_std: None,
            seed: None,
            stride: None,
            thresholds: None,
            path_duration: None,
            drone_name: None,
            verbose: false,
        };
        assert!(load_params(&args).is_err());
    }

    #[test]
    fn track_csv_labels_each_row() {
        let track = Track {
            times: vec![0.0, 0.5, 1.0],
            x: vec![1.0, 2.0, 3.0],
            y: vec![0.0, 0.0, 0.0],
        };
        let color = Rgba::new(0.0, 0.6, 0.0, 1.0);
        let plan = TrackPlan {
            track,
            segments: vec![
                Segment {
                    state: navic_track::JamState::NonJamA,
                    start: 0,
                    end: 2,
                    color,
                },
                Segment {
                    state: navic_track::JamState::RampUp,
                    start: 2,
                    end: 3,
                    color,
                },
            ],
        };
        let mut buf = Vec::new();
        {
            let mut writer = csv::Writer::from_writer(&mut buf);
            write_track_rows(&plan, &mut writer).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "t_s,x,y,z,state");
        assert_eq!(lines[1], "0.000,1.000000,0.000000,0,NonJam_A");
        assert_eq!(lines[3], "1.000,3.000000,0.000000,0,RampUp");
    }

    #[test]
    fn preview_extent_is_square_and_centered() {
        let plan = TrackPlan {
            track: Track {
                times: vec![0.0, 1.0],
                x: vec![-10.0, 10.0],
                y: vec![0.0, 4.0],
            },
            segments: Vec::new(),
        };
        let (cx, cy, half) = preview_extent(&plan);
        assert_eq!(cx, 0.0);
        assert_eq!(cy, 2.0);
        assert!((half - 10.5).abs() < 1e-9);
    }
}
