//! Entry point for the obs-prep application.
//! Handles CLI parsing, opens the requested source and runs the preparation steps.

use clap::Parser;
use obs_prep::cli::Args;
use obs_prep::metadata::describe_dataset;
use obs_prep::pipeline::{fetch, prepare};
use obs_prep::sources::SourceConfig;
use obs_prep::logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command-line arguments
    let args = Args::parse();
    logging::init(args.verbose);

    println!(
        r#"
------------------------------------------------------------------
                     ___  _
                    / _ \| |__  ___   _ __  _ __ ___ _ __
                   | | | | '_ \/ __| | '_ \| '__/ _ \ '_ \
                   | |_| | |_) \__ \ | |_) | | |  __/ |_) |
                    \___/|_.__/|___/ | .__/|_|  \___| .__/
                                     |_|            |_|
                 ERA5 / IMERG observation preparation
------------------------------------------------------------------
                        "#
    );

    let config = SourceConfig {
        subscription_key: args.subscription_key.clone(),
        ..SourceConfig::default()
    };

    let source = fetch(args.dataset, &config).await?;
    println!("Successfully opened {} dataset", args.dataset);

    if args.describe {
        describe_dataset(&source);
        return Ok(());
    }

    let request = args.to_request();
    println!(
        "🔄 Preparing '{}' for years {:?}, months {:?}",
        request.variable, request.years, request.months
    );
    let path = prepare(&source, &request).await?;
    println!("✅ Saved result to {}", path.display());

    Ok(())
}
