extern crate clap;
extern crate env_logger;
extern crate log;
extern crate mandelzoom;
extern crate num_cpus;

use clap::{App, Arg, ArgMatches};
use log::error;
use mandelzoom::{Compression, FramePipeline, ImageWriter, OutputFormat, RenderConfig};
use std::path::PathBuf;
use std::str::FromStr;

fn validate_number<T: FromStr>(s: &str, err: &str) -> Result<(), String> {
    match T::from_str(s) {
        Ok(_) => Ok(()),
        Err(_) => Err(err.to_string()),
    }
}

fn validate_range<T: FromStr + PartialOrd>(
    s: &str,
    low: T,
    high: T,
    isnotanumber_err: &str,
    isnotinrange_err: &str,
) -> Result<(), String> {
    match T::from_str(s) {
        Ok(i) => {
            if i >= low && i <= high {
                Ok(())
            } else {
                Err(isnotinrange_err.to_string())
            }
        }
        Err(_) => Err(isnotanumber_err.to_string()),
    }
}

const WIDTH: &str = "width";
const HEIGHT: &str = "height";
const SUPER: &str = "super";
const WORK_BLOCK: &str = "work-block";
const ITERATIONS: &str = "iters";
const PRE_ITERATIONS: &str = "pre-iters";
const ESCAPE: &str = "escape";
const OFFX: &str = "offx";
const OFFY: &str = "offy";
const ZOOM_POW: &str = "zoom-pow";
const ZOOM_DIV: &str = "zoom-div";
const ZOOM_START: &str = "zoom-start";
const ZOOM_SPEED: &str = "zoom-speed";
const ZOOM_ADD: &str = "zoom-add";
const GAMMA_LUMA: &str = "gamma-luma";
const GAMMA_CHROMA: &str = "gamma-chroma";
const COLOR_DEG: &str = "color-deg-per-iter";
const COLOR_SATURATION: &str = "color-saturation";
const COLOR_BRIGHTNESS: &str = "color-brightness";
const THREADS: &str = "threads";
const START: &str = "start-frame";
const END: &str = "end";
const OUT_DIR: &str = "out-dir";
const NO_LUMA: &str = "no-luma";
const NO_CHROMA: &str = "no-chroma";
const FORMAT: &str = "format";
const COMPRESSION: &str = "compression";

/// Flag defaults, printed from `RenderConfig::default()` so the binary
/// renders exactly what the library would.
struct Defaults {
    width: String,
    height: String,
    super_sample: String,
    work_block: String,
    iterations: String,
    pre_iterations: String,
    escape: String,
    offset_x: String,
    offset_y: String,
    zoom_pow: String,
    zoom_div: String,
    zoom_start: String,
    zoom_add: String,
    gamma_luma: String,
    gamma_chroma: String,
    color_deg: String,
    color_saturation: String,
    color_brightness: String,
    start: String,
    end: String,
    out_dir: String,
    format: &'static str,
    compression: &'static str,
}

impl Defaults {
    fn new() -> Self {
        let d = RenderConfig::default();
        let (format, compression) = match d.format {
            OutputFormat::Tiff(level) => ("tiff", compression_name(level)),
            OutputFormat::Png(level) => ("png", compression_name(level)),
        };
        Defaults {
            width: d.width.to_string(),
            height: d.height.to_string(),
            super_sample: d.super_sample.to_string(),
            work_block: d.work_block.to_string(),
            iterations: d.max_iterations.to_string(),
            pre_iterations: d.pre_iterations.to_string(),
            escape: d.escape_radius_sq.to_string(),
            offset_x: d.offset_x.to_string(),
            offset_y: d.offset_y.to_string(),
            zoom_pow: d.zoom_pow.to_string(),
            zoom_div: d.zoom_div.to_string(),
            zoom_start: d.zoom_start.to_string(),
            zoom_add: d.zoom_add.to_string(),
            gamma_luma: d.gamma_luma.to_string(),
            gamma_chroma: d.gamma_chroma.to_string(),
            color_deg: d.hue_degrees_per_iteration.to_string(),
            color_saturation: d.color_saturation.to_string(),
            color_brightness: d.color_brightness.to_string(),
            start: d.start_frame.to_string(),
            end: d.end_frame.to_string(),
            out_dir: d.output_dir.display().to_string(),
            format,
            compression,
        }
    }
}

fn compression_name(level: Compression) -> &'static str {
    match level {
        Compression::Fast => "fast",
        Compression::Default => "default",
        Compression::Best => "best",
    }
}

/// A float-valued option with a default.
fn float_arg<'a>(name: &'a str, default: &'a str, help: &'a str) -> Arg<'a, 'a> {
    Arg::with_name(name)
        .long(name)
        .takes_value(true)
        .default_value(default)
        .allow_hyphen_values(true)
        .validator(|s| validate_number::<f64>(&s, "Could not parse number"))
        .help(help)
}

fn app<'a>(defaults: &'a Defaults) -> App<'a, 'a> {
    let max_threads = num_cpus::get();

    App::new("mandelzoom")
        .version("0.1.0")
        .about("Renders a resumable zoom animation into the Mandelbrot set")
        .arg(
            Arg::with_name(WIDTH)
                .long(WIDTH)
                .takes_value(true)
                .default_value(&defaults.width)
                .validator(|s| {
                    validate_range::<u32>(
                        &s,
                        1,
                        65_535,
                        "Could not parse width",
                        "Width must be between 1 and 65535",
                    )
                })
                .help("Width of output image"),
        )
        .arg(
            Arg::with_name(HEIGHT)
                .long(HEIGHT)
                .takes_value(true)
                .default_value(&defaults.height)
                .validator(|s| {
                    validate_range::<u32>(
                        &s,
                        1,
                        65_535,
                        "Could not parse height",
                        "Height must be between 1 and 65535",
                    )
                })
                .help("Height of output image"),
        )
        .arg(
            Arg::with_name(SUPER)
                .long(SUPER)
                .short("s")
                .takes_value(true)
                .default_value(&defaults.super_sample)
                .validator(|s| {
                    validate_range::<u32>(
                        &s,
                        1,
                        255,
                        "Could not parse super sampling factor",
                        "Super sampling must be between 1 and 255",
                    )
                })
                .help("Super sampling factor; each pixel averages super*super samples"),
        )
        .arg(
            Arg::with_name(WORK_BLOCK)
                .long(WORK_BLOCK)
                .takes_value(true)
                .default_value(&defaults.work_block)
                .validator(|s| {
                    validate_range::<u32>(
                        &s,
                        1,
                        65_535,
                        "Could not parse work block",
                        "Work block must be between 1 and 65535",
                    )
                })
                .help("Edge length of the square pixel block handed to each worker"),
        )
        .arg(
            Arg::with_name(ITERATIONS)
                .long(ITERATIONS)
                .short("i")
                .takes_value(true)
                .default_value(&defaults.iterations)
                .validator(|s| validate_number::<u32>(&s, "Could not parse iteration count"))
                .help("Maximum number of iterations, pre-iterations included"),
        )
        .arg(
            Arg::with_name(PRE_ITERATIONS)
                .long(PRE_ITERATIONS)
                .takes_value(true)
                .default_value(&defaults.pre_iterations)
                .validator(|s| validate_number::<u32>(&s, "Could not parse pre-iteration count"))
                .help("Iterations run before escapes are drawn; early escapes become background"),
        )
        .arg(float_arg(ESCAPE, &defaults.escape, "Squared escape radius"))
        .arg(float_arg(OFFX, &defaults.offset_x, "X offset of the zoom target"))
        .arg(float_arg(OFFY, &defaults.offset_y, "Y offset of the zoom target"))
        .arg(float_arg(
            ZOOM_POW,
            &defaults.zoom_pow,
            "Zoom power; 100 reads as constant speed",
        ))
        .arg(float_arg(
            ZOOM_DIV,
            &defaults.zoom_div,
            "Divisor applied to the zoom counter",
        ))
        .arg(float_arg(ZOOM_START, &defaults.zoom_start, "Initial zoom counter"))
        .arg(
            Arg::with_name(ZOOM_SPEED)
                .long(ZOOM_SPEED)
                .takes_value(true)
                .validator(|s| validate_number::<f64>(&s, "Could not parse zoom speed"))
                .help("Zoom speed; sets zoom-div to 10000/speed and zoom-start to 9800/speed"),
        )
        .arg(float_arg(ZOOM_ADD, &defaults.zoom_add, "Zoom counter step per frame"))
        .arg(float_arg(GAMMA_LUMA, &defaults.gamma_luma, "Luma gamma"))
        .arg(float_arg(GAMMA_CHROMA, &defaults.gamma_chroma, "Chroma gamma"))
        .arg(
            Arg::with_name(COLOR_DEG)
                .long(COLOR_DEG)
                .takes_value(true)
                .default_value(&defaults.color_deg)
                .validator(|s| validate_number::<u32>(&s, "Could not parse colour rotation"))
                .help("Colour rotation, in degrees, per iteration"),
        )
        .arg(float_arg(
            COLOR_SATURATION,
            &defaults.color_saturation,
            "HSV saturation of the chroma",
        ))
        .arg(float_arg(
            COLOR_BRIGHTNESS,
            &defaults.color_brightness,
            "HSV brightness of the chroma",
        ))
        .arg(
            Arg::with_name(THREADS)
                .long(THREADS)
                .short("t")
                .takes_value(true)
                .validator(move |s| {
                    validate_range(
                        &s,
                        1,
                        max_threads,
                        "Could not parse thread count",
                        &format!("Thread count must be between 1 and {}", max_threads),
                    )
                })
                .help("Number of threads to use in solver (default: all cores)"),
        )
        .arg(
            Arg::with_name(START)
                .long(START)
                .takes_value(true)
                .default_value(&defaults.start)
                .validator(|s| validate_number::<u64>(&s, "Could not parse start frame"))
                .help("First frame to consider"),
        )
        .arg(
            Arg::with_name(END)
                .long(END)
                .short("e")
                .takes_value(true)
                .default_value(&defaults.end)
                .validator(|s| validate_number::<u64>(&s, "Could not parse end frame"))
                .help("Last frame to render"),
        )
        .arg(
            Arg::with_name(OUT_DIR)
                .long(OUT_DIR)
                .short("o")
                .takes_value(true)
                .default_value(&defaults.out_dir)
                .help("Output directory"),
        )
        .arg(
            Arg::with_name(NO_LUMA)
                .long(NO_LUMA)
                .help("Do not write the luma/brightness image"),
        )
        .arg(
            Arg::with_name(NO_CHROMA)
                .long(NO_CHROMA)
                .help("Do not write the chroma/colour image"),
        )
        .arg(
            Arg::with_name(FORMAT)
                .long(FORMAT)
                .takes_value(true)
                .possible_values(&["tiff", "png"])
                .default_value(defaults.format)
                .help("Container for each frame"),
        )
        .arg(
            Arg::with_name(COMPRESSION)
                .long(COMPRESSION)
                .takes_value(true)
                .possible_values(&["fast", "default", "best"])
                .default_value(defaults.compression)
                .help("Compression preference for TIFF and PNG alike"),
        )
}

/// Every value has passed its validator by now, so parsing only fails
/// on a validator/parser mismatch.
fn value<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<T, String> {
    let raw = matches
        .value_of(name)
        .ok_or_else(|| format!("missing value for --{}", name))?;
    T::from_str(raw).map_err(|_| format!("could not parse --{} value {:?}", name, raw))
}

fn config(matches: &ArgMatches) -> Result<RenderConfig, String> {
    let level = match matches.value_of(COMPRESSION) {
        Some("fast") => Compression::Fast,
        Some("best") => Compression::Best,
        _ => Compression::Default,
    };
    let format = match matches.value_of(FORMAT) {
        Some("png") => OutputFormat::Png(level),
        _ => OutputFormat::Tiff(level),
    };

    let config = RenderConfig {
        width: value(matches, WIDTH)?,
        height: value(matches, HEIGHT)?,
        super_sample: value(matches, SUPER)?,
        work_block: value(matches, WORK_BLOCK)?,
        max_iterations: value(matches, ITERATIONS)?,
        pre_iterations: value(matches, PRE_ITERATIONS)?,
        escape_radius_sq: value(matches, ESCAPE)?,
        offset_x: value(matches, OFFX)?,
        offset_y: value(matches, OFFY)?,
        zoom_pow: value(matches, ZOOM_POW)?,
        zoom_div: value(matches, ZOOM_DIV)?,
        zoom_start: value(matches, ZOOM_START)?,
        zoom_add: value(matches, ZOOM_ADD)?,
        gamma_luma: value(matches, GAMMA_LUMA)?,
        gamma_chroma: value(matches, GAMMA_CHROMA)?,
        hue_degrees_per_iteration: value(matches, COLOR_DEG)?,
        color_saturation: value(matches, COLOR_SATURATION)?,
        color_brightness: value(matches, COLOR_BRIGHTNESS)?,
        workers: match matches.value_of(THREADS) {
            Some(_) => value(matches, THREADS)?,
            None => num_cpus::get(),
        },
        start_frame: value(matches, START)?,
        end_frame: value(matches, END)?,
        output_dir: PathBuf::from(value::<String>(matches, OUT_DIR)?),
        enable_luma: !matches.is_present(NO_LUMA),
        enable_chroma: !matches.is_present(NO_CHROMA),
        format,
    };

    Ok(match matches.value_of(ZOOM_SPEED) {
        Some(_) => config.with_zoom_speed(value(matches, ZOOM_SPEED)?),
        None => config,
    })
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let defaults = Defaults::new();
    let matches = app(&defaults).get_matches();
    let config = match config(&matches) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    };

    let writer = ImageWriter::new(config.format);
    let result = FramePipeline::new(config, writer).and_then(|mut pipeline| pipeline.run());
    if let Err(e) = result {
        error!("Render failure: {}", e);
        std::process::exit(1);
    }
}
