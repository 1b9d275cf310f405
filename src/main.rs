// nanoview - A small image inspector
// Shows picked or dropped images and reports which pixels of small ones are filled

use anyhow::Result;
use log::info;
use nanoview::app::App;
use nanoview::cli;
use std::io;

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse command line arguments
    let args = cli::parse_args()?;

    info!(
        "Starting nanoview with {} image source(s), threshold: {}",
        args.sources.len(),
        args.config.nanogram_threshold
    );

    let mut app = App::new(args.config);
    for source in args.sources {
        app.spawn_load(source);
    }

    // Nanogram checks go to stdout, logs to stderr
    let stdout = io::stdout();
    app.run(&mut stdout.lock())?;
    app.finish()
}
