use std::sync::Arc;

use birthday_cam::cli::CaptureArgs;
use birthday_cam::{init_tracing, server, AppContext, CharacterSprite};
use clap::Parser;

#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// Address to listen on.
    #[clap(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[clap(long, env = "PORT", default_value_t = birthday_cam::config::DEFAULT_PORT)]
    port: u16,

    #[clap(flatten)]
    capture: CaptureArgs,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args: Args = Args::parse();

    let sprite = CharacterSprite::load(&args.capture.sprite)?;
    let context = AppContext::new(
        sprite,
        args.capture.camera_config(),
        args.capture.pipeline_config(),
    );

    server::serve(Arc::new(context), &args.host, args.port).await
}
