// Lucas-Kanade point tracker.
// • The video (or the live camera) plays in a window.
// • T finds good corners to track, a left click adds one more point.
// • Tracked points follow the motion from frame to frame as green dots.
// • Files start paused: S steps a frame per key, R runs, the bar below seeks.

mod camera;
mod draw;
mod error;
mod features;
mod flow;
mod player;
mod source;
mod track;
mod types;
mod video;
mod vision;

use argh::FromArgs;
use draw::Drawer;
use error::Error;
use features::ShiTomasi;
use flow::PyramidalLk;
use log::info;
use player::Player;
use source::{SourceArg, SourceOptions, open_source};
use std::process::ExitCode;
use track::{MAX_TRACKED_POINTS, TrackState};

const KEYS_HELP: &str = "\
Hot keys:
\tq - quit the program
\tt - find good features to track
\tc - clear all tracked points
\tn - toggle night mode (hide the video, keep the points)
\tr - run the video
\ts - step one frame at a time (any key advances)
\tleft click - add a tracking point near the cursor
\tclick or drag the bar below the frame - seek";

#[derive(FromArgs)]
/// Track points across video frames with pyramidal Lucas-Kanade optical flow.
#[argh(
    example = "{command_name} clip.gif",
    example = "{command_name} frames/ --fps 25",
    example = "{command_name} - --camera-index 1",
    note = "A directory is played as an image sequence in file-name order."
)]
struct Args {
    /// video file, frame directory, or `-` for the camera
    #[argh(positional)]
    video: String,

    /// most points tracked at once
    #[argh(option, default = "MAX_TRACKED_POINTS")]
    max_points: usize,

    /// playback rate for sources that carry none
    #[argh(option, default = "source::DEFAULT_FPS")]
    fps: f64,

    /// camera device index used with `-`
    #[argh(option, default = "0")]
    camera_index: u32,

    /// requested camera width
    #[argh(option, default = "640")]
    width: u32,

    /// requested camera height
    #[argh(option, default = "480")]
    height: u32,
}

fn run(args: Args) -> Result<(), Error> {
    let opts = SourceOptions {
        camera_index: args.camera_index,
        width: args.width,
        height: args.height,
        fallback_fps: args.fps,
    };
    let arg = SourceArg::parse(&args.video);
    let source = open_source(&arg, &opts)?;

    let tracker = TrackState::new(ShiTomasi::default(), PyramidalLk::default(), args.max_points);
    let mut player = Player::new(source, tracker);
    let info = player.info().clone();
    info!("{info}");

    let title = arg.title(args.camera_index);
    let mut drawer = Drawer::new(&title, info.width, info.height, !info.is_live())?;
    info!("window \"{title}\" open, tracking up to {} points", player.tracker().max_points());

    player.run(&mut drawer)?;
    info!("quit");
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Args = argh::from_env();
    println!("{KEYS_HELP}");

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            if matches!(e, Error::SourceOpen { .. } | Error::CameraInit(_)) {
                eprintln!("usage: lucas-kanade <video-file | frame-dir | -> (see --help)");
            }
            ExitCode::FAILURE
        }
    }
}
