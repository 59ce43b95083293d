//! `create`: wrap an executable in a .app bundle.

use super::report_relocation;
use crate::{
    bundler::{AppSettings, SystemToolchain, create_bundle},
    cli::{RuntimeConfig, args::CreateArgs},
    error::Result,
};

pub async fn execute_create(args: CreateArgs, config: &RuntimeConfig) -> Result<()> {
    let file = &config.file().create;
    let mut settings = AppSettings::new(&args.executable);
    settings.output_dir = args.output_dir;
    settings.resources = args.resources;
    settings.icon = args.icon.or_else(|| file.icon.clone());
    settings.codesign = !args.no_sign;
    settings.dry_run = args.dry_run;
    if let Some(version) = args.version.or_else(|| file.version.clone()) {
        settings.version = version;
    }
    if let Some(id) = args.id.or_else(|| file.id.clone()) {
        settings.bundle_id_prefix = id;
    }
    if let Some(extension) = args.extension.or_else(|| file.extension.clone()) {
        settings.extension = extension;
    }
    if let Some(min) = args
        .min_system_version
        .or_else(|| file.min_system_version.clone())
    {
        settings.min_system_version = min;
    }

    let output = config.output();
    output.section("Create bundle")?;

    let toolchain = SystemToolchain::new(settings.dry_run);
    let created = create_bundle(&settings, &toolchain).await?;
    report_relocation(config, &created.report)?;

    if settings.dry_run {
        output.success(&format!("Planned {}", created.path.display()))?;
    } else {
        output.success(&format!("Created {}", created.path.display()))?;
    }
    Ok(())
}
