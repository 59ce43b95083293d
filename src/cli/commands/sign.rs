//! `sign`: sign a bundle tree in containment order.

use crate::{
    bundler::{Codesigner, SignSettings, SignState, SigningIdentity, SystemToolchain},
    cli::{RuntimeConfig, args::SignArgs},
    config::{DEV_ID_ENV, env_value},
    error::{CliError, Result},
};

pub async fn execute_sign(args: SignArgs, config: &RuntimeConfig) -> Result<()> {
    let file = &config.file().sign;
    let fallback = file.dev_id.clone().or_else(|| env_value(DEV_ID_ENV));
    let identity = SigningIdentity::resolve(args.dev_id.as_deref(), fallback.as_deref())?;

    let mut settings = SignSettings::new(&args.bundle, identity);
    settings.entitlements = args.entitlements.or_else(|| file.entitlements.clone());
    settings.verify = !args.no_verify;
    settings.strict = args.strict;
    settings.dry_run = args.dry_run;

    let output = config.output();
    let toolchain = SystemToolchain::new(settings.dry_run);
    let mut signer = Codesigner::new(settings, &toolchain)?;

    if args.dry_run {
        output.section("Signing plan")?;
        for (i, unit) in signer.process_dry_run()?.iter().enumerate() {
            let runtime = if unit.kind.is_runtime() {
                " [hardened runtime]"
            } else {
                ""
            };
            output.indent(&format!(
                "{:>3}. {:<12} {}{}",
                i + 1,
                unit.kind.label(),
                unit.path.display(),
                runtime
            ))?;
        }
        return Ok(());
    }

    output.section("Sign")?;
    let report = signer.process().await?;
    for path in &report.signed {
        output.verbose(&format!("signed {}", path.display()))?;
    }
    for failure in &report.failures {
        output.warn(&format!("{}: {}", failure.unit.display(), failure.error))?;
    }

    match report.state {
        SignState::Verified => {
            output.success(&format!("Signed and verified {} units", report.signed.len()))?;
            Ok(())
        }
        SignState::Failed if report.failures.is_empty() => {
            Err(crate::bundler::Error::Validation(format!(
                "signature verification failed: {}",
                args.bundle.display()
            ))
            .into())
        }
        SignState::Failed => Err(CliError::UnitsFailed {
            failed: report.failures.len(),
            total: report.signed.len() + report.failures.len(),
        }
        .into()),
        _ => {
            output.success(&format!("Signed {} units", report.signed.len()))?;
            Ok(())
        }
    }
}
