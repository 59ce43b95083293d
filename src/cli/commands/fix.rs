//! `fix`: bundle the libraries of existing binaries.

use super::report_relocation;
use crate::{
    bundler::{DylibBundler, DylibSettingsBuilder, SystemToolchain},
    cli::{RuntimeConfig, args::FixArgs},
    error::Result,
};

pub async fn execute_fix(args: FixArgs, config: &RuntimeConfig) -> Result<()> {
    let mut builder = DylibSettingsBuilder::new()
        .files_to_fix(&args.files)
        .dest_dir(&args.dest_dir)
        .overwrite_files(args.force)
        .create_dir(true)
        .codesign(!args.no_sign)
        .strict(args.strict)
        .dry_run(args.dry_run);
    if let Some(prefix) = args.install_path {
        builder = builder.inside_lib_path(prefix);
    }
    for prefix in &args.ignore {
        builder = builder.ignore_prefix(prefix);
    }
    for path in args.search_paths {
        builder = builder.search_path(path);
    }
    if args.env_search_paths {
        builder = builder.with_env_search_paths();
    }
    let settings = builder.build()?;

    let output = config.output();
    output.section("Bundle libraries")?;
    output.verbose(&format!(
        "Destination {} (install names {})",
        settings.dest_dir().display(),
        settings.inside_lib_path()
    ))?;

    let toolchain = SystemToolchain::new(settings.dry_run());
    let report = DylibBundler::new(settings, &toolchain).fix().await?;
    report_relocation(config, &report)?;

    if report.copied.is_empty() && report.planned.is_empty() {
        output.success("Nothing to bundle")?;
    }
    Ok(())
}
