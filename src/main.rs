//! Kodegen Bundler macOS - dylib bundling, codesigning and notarization.
//!
//! Exit code 0 means every requested stage completed.

use kodegen_bundler_macos::cli::{self, Args, OutputManager};
use std::process;

#[tokio::main]
async fn main() {
    let args = Args::parse_args();

    // Initialize logging: RUST_LOG wins over --verbose
    let level = if args.verbose { "debug" } else { "info" };
    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    if args.no_color {
        logger.write_style(env_logger::WriteStyle::Never);
    }
    logger.init();

    let output = OutputManager::new(args.verbose, !args.no_color);
    let exit_code = match cli::run(args).await {
        Ok(()) => 0,
        Err(e) => {
            output.error(&format!("Error: {}", e));
            if let Some(diagnostic) = e.diagnostic() {
                eprintln!("{}", diagnostic.trim_end());
            }
            if let Some(log_ref) = e.notarization_log() {
                eprintln!("Notarization log: {}", log_ref);
            }
            1
        }
    };

    process::exit(exit_code);
}
