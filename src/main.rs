use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, CommandFactory, ErrorKind, Parser, Subcommand};
use serde::Serialize;

use clipseek::clip;
use clipseek::evaluate::{self, Evaluation};
use clipseek::util;
use clipseek::{audio, video, Localization};

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Audio,
    Video,
}

#[derive(Args, Debug)]
struct CorrelationArgs {
    #[clap(short, long, value_enum, default_value_t = Mode::Audio, help = "Correlation mode. The default mode is audio, which cross-correlates the audio tracks and is accurate to a single sample. Video mode compares sampled grayscale frames; it is much slower and only accurate to the frame sampling step, but works for videos without audio.")]
    mode: Mode,

    #[clap(
        long,
        default_value_t = audio::DEFAULT_SAMPLE_RATE,
        value_parser = clap::value_parser!(u32),
        help = "Audio sample rate (Hz) used for correlation. Both videos are resampled to this rate."
    )]
    sample_rate: u32,

    #[clap(
        long,
        default_value_t = video::DEFAULT_SAMPLE_STEP,
        value_parser = clap::value_parser!(usize),
        help = "Video mode only. Sample every Nth frame of each video."
    )]
    sample_step: usize,

    #[clap(
        long,
        default_value_t = video::DEFAULT_FRAME_WIDTH,
        value_parser = clap::value_parser!(u32),
        help = "Video mode only. Width that sampled frames are resized to."
    )]
    frame_width: u32,

    #[clap(
        long,
        default_value_t = video::DEFAULT_FRAME_HEIGHT,
        value_parser = clap::value_parser!(u32),
        help = "Video mode only. Height that sampled frames are resized to."
    )]
    frame_height: u32,

    #[clap(
        long,
        default_value = "false",
        action(ArgAction::SetTrue),
        help = "Enable multi-threaded decoding in FFmpeg."
    )]
    threaded_decoding: bool,

    #[clap(
        long,
        default_value = "false",
        action(ArgAction::SetTrue),
        help = "Print results as JSON instead of plain text."
    )]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[clap(after_help = "Displays info about clipseek and its dependencies.")]
    Info,

    #[clap(
        arg_required_else_help = true,
        after_help = "Find where a clip starts and ends inside a full video."
    )]
    Locate {
        #[clap(value_parser = clap::value_parser!(PathBuf), help = "The full video.")]
        full: PathBuf,

        #[clap(value_parser = clap::value_parser!(PathBuf), help = "The clip to locate.")]
        clip: PathBuf,

        #[clap(flatten)]
        args: CorrelationArgs,
    },

    #[clap(
        arg_required_else_help = true,
        after_help = "Locate one or more clips inside a full video and compare the result against the ground truth embedded in each clip's file name (<name>_<start>_<end>.mp4). Reports the Euclidean distance between the (start, end) pairs and the fraction of the ground truth covered by the estimate."
    )]
    Evaluate {
        #[clap(value_parser = clap::value_parser!(PathBuf), help = "The full video.")]
        full: PathBuf,

        #[clap(
            required = true,
            value_parser = clap::value_parser!(PathBuf),
            help = "Clips cut from the full video."
        )]
        clips: Vec<PathBuf>,

        #[clap(flatten)]
        args: CorrelationArgs,
    },

    #[clap(
        arg_required_else_help = true,
        after_help = "Cut a clip out of a video without re-encoding. Copying starts on the keyframe at or before the start time, and the clip is named <video>_clip_<start>_<end>.mp4 after the range actually copied so that it can be used with the 'evaluate' command."
    )]
    Cut {
        #[clap(value_parser = clap::value_parser!(PathBuf), help = "The video to cut from.")]
        video: PathBuf,

        #[clap(long, value_parser = clap::value_parser!(f64), help = "Start time, in seconds.")]
        start: f64,

        #[clap(long, value_parser = clap::value_parser!(f64), help = "End time, in seconds.")]
        end: f64,

        #[clap(
            long,
            value_parser = clap::value_parser!(PathBuf),
            help = "Directory to write the clip to. Defaults to the video's directory."
        )]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(
        long,
        global = true,
        default_value = "false",
        action(ArgAction::SetTrue),
        help = "By default, video files are validated using FFmpeg, which is extremely accurate. Setting this flag will switch to just checking file headers."
    )]
    file_headers_only: bool,

    #[clap(
        short,
        long,
        global = true,
        default_value = "false",
        action(ArgAction::SetTrue),
        help = "Enable debug logging."
    )]
    verbose: bool,
}

impl Cli {
    fn validate_args(args: &CorrelationArgs) {
        let mut cmd = Cli::command();
        if args.sample_rate == 0 {
            cmd.error(ErrorKind::InvalidValue, "sample_rate must be a positive number")
                .exit();
        }
        if args.sample_step == 0 {
            cmd.error(ErrorKind::InvalidValue, "sample_step must be a positive number")
                .exit();
        }
        if args.frame_width == 0 || args.frame_height == 0 {
            cmd.error(
                ErrorKind::InvalidValue,
                "frame_width and frame_height must be positive numbers",
            )
            .exit();
        }
    }

    fn validate(&self) {
        let mut cmd = Cli::command();
        match &self.command {
            Commands::Info => (),
            Commands::Locate {
                full, clip, args, ..
            } => {
                Self::validate_args(args);
                self.validate_video(full, args.mode);
                self.validate_video(clip, args.mode);
            }
            Commands::Evaluate {
                full, clips, args, ..
            } => {
                Self::validate_args(args);
                self.validate_video(full, args.mode);
                for clip in clips {
                    self.validate_video(clip, args.mode);
                }
            }
            Commands::Cut {
                video, start, end, ..
            } => {
                if *start < 0.0 || end <= start {
                    cmd.error(
                        ErrorKind::InvalidValue,
                        "start must be non-negative and less than end",
                    )
                    .exit();
                }
                self.validate_video(video, Mode::Video);
            }
        }
    }

    fn validate_video(&self, path: &Path, mode: Mode) {
        if !util::is_valid_video_file(path, !self.file_headers_only, mode == Mode::Audio) {
            let mut cmd = Cli::command();
            cmd.error(
                ErrorKind::InvalidValue,
                format!("not a valid video file: {}", path.display()),
            )
            .exit();
        }
    }
}

#[derive(Serialize)]
struct ClipReport<'a> {
    clip: &'a Path,
    localization: Option<Localization>,
    evaluation: Option<Evaluation>,
}

fn locate(full: &Path, clip: &Path, args: &CorrelationArgs) -> clipseek::Result<Option<Localization>> {
    match args.mode {
        Mode::Audio => audio::Correlator::default()
            .with_sample_rate(args.sample_rate)
            .with_threaded_decoding(args.threaded_decoding)
            .run(full, clip)
            .map(Some),
        Mode::Video => video::Correlator::default()
            .with_sample_step(args.sample_step)
            .with_frame_size(args.frame_width, args.frame_height)
            .with_threaded_decoding(args.threaded_decoding)
            .run(full, clip),
    }
}

fn display_localization(localization: &Option<Localization>) {
    match localization {
        Some(l) => {
            println!(
                "Start time: {} ({}), End time: {} ({})",
                l.interval.start,
                util::format_seconds(l.interval.start),
                l.interval.end,
                util::format_seconds(l.interval.end),
            );
            println!("Score: {}", l.result.score);
        }
        None => println!("No match found."),
    }
}

fn main() -> clipseek::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    ffmpeg_next::init()?;

    cli.validate();

    match cli.command {
        Commands::Info => {
            println!("FFmpeg version: {}", util::ffmpeg_version_string());
        }
        Commands::Locate {
            ref full,
            ref clip,
            ref args,
        } => {
            let localization = locate(full, clip, args)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&localization)?);
            } else {
                display_localization(&localization);
            }
        }
        Commands::Evaluate {
            ref full,
            ref clips,
            ref args,
        } => {
            let mut reports = Vec::new();
            for (i, clip) in clips.iter().enumerate() {
                if !args.json {
                    println!("\nTesting clip {}: {}", i + 1, clip.display());
                }
                let ground_truth = evaluate::ground_truth_from_path(clip)?;
                let localization = locate(full, clip, args)?;
                let evaluation = localization
                    .map(|l| Evaluation::new(l.interval, ground_truth))
                    .transpose()?;

                if !args.json {
                    display_localization(&localization);
                    if let Some(e) = &evaluation {
                        println!("Euclidean distance: {}", e.distance);
                        println!("Overlap: {}", e.overlap);
                    }
                }
                reports.push(ClipReport {
                    clip,
                    localization,
                    evaluation,
                });
            }
            if args.json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            }
        }
        Commands::Cut {
            ref video,
            start,
            end,
            ref output_dir,
        } => {
            let (output, range) = clip::cut(video, start, end, output_dir.as_deref())?;
            println!(
                "Wrote {} (copied {} to {})",
                output.display(),
                util::format_seconds(range.start),
                util::format_seconds(range.end),
            );
        }
    }

    Ok(())
}
