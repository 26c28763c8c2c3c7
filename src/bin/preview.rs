use std::sync::Arc;

use birthday_cam::cli::CaptureArgs;
use birthday_cam::{init_tracing, AppContext, CharacterSprite, FramePipeline};
use clap::Parser;
use opencv::highgui;

/// Show the decorated camera feed in a local window.
#[derive(Parser, Debug)]
#[command()]
struct Args {
    #[clap(flatten)]
    capture: CaptureArgs,
}

const ESCAPE: i32 = 27;

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args: Args = Args::parse();

    let window = "birthday cam";
    highgui::named_window_def(window)?;

    let context = AppContext::new(
        CharacterSprite::load(&args.capture.sprite)?,
        args.capture.camera_config(),
        args.capture.pipeline_config(),
    );
    let mut pipeline = FramePipeline::start(Arc::new(context))?;

    while let Some(frame) = pipeline.next_frame() {
        highgui::imshow(window, &frame)?;
        if highgui::poll_key()? == ESCAPE {
            break;
        }
    }
    pipeline.close();
    Ok(())
}
