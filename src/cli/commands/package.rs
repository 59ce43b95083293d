//! `package`: disk image creation, signing and notarization.

use crate::{
    bundler::{PackageSettings, Packager, SigningIdentity, SystemToolchain},
    cli::{RuntimeConfig, args::PackageArgs},
    config::{DEV_ID_ENV, KEYCHAIN_PROFILE_ENV, env_value, layered},
    error::Result,
};

pub async fn execute_package(args: PackageArgs, config: &RuntimeConfig) -> Result<()> {
    let file = &config.file().package;
    let fallback = file
        .dev_id
        .clone()
        .or_else(|| config.file().sign.dev_id.clone())
        .or_else(|| env_value(DEV_ID_ENV));
    let identity = SigningIdentity::resolve(args.dev_id.as_deref(), fallback.as_deref())?;

    let mut settings = PackageSettings::new(&args.source);
    settings.output = args.output;
    settings.volume_name = args.volume_name;
    settings.identity = identity;
    settings.keychain_profile = layered(
        args.keychain_profile,
        file.keychain_profile.clone(),
        KEYCHAIN_PROFILE_ENV,
    );
    settings.entitlements = args
        .entitlements
        .or_else(|| file.entitlements.clone())
        .or_else(|| config.file().sign.entitlements.clone());
    settings.sign_contents = !args.no_sign;
    settings.dry_run = args.dry_run;

    let output = config.output();
    output.section("Package")?;

    let toolchain = SystemToolchain::new(settings.dry_run);
    let mut packager = Packager::new(settings, &toolchain)?;
    let job = packager.process(!args.no_notarize, !args.no_staple).await?;

    for stage in &job.completed {
        output.verbose(&format!("done: {}", stage.name()))?;
    }
    for stage in &job.skipped {
        output.warn(&format!("skipped: {}", stage.name()))?;
    }
    if let Some(id) = &job.submission_id {
        output.indent(&format!("submission: {id}"))?;
    }
    if let Some(checksum) = &job.checksum {
        output.indent(&format!("sha256: {checksum}"))?;
    }
    output.success(&format!("Disk image {}", job.output.display()))?;
    Ok(())
}
