//! Host toolchain backed by the macOS command line tools.

use super::{
    LoadCommands, NotarizationState, NotarizationStatus, SignRequest, Toolchain,
    tool_detection::{self, CODESIGN, HDIUTIL, INSTALL_NAME_TOOL, LIPO, OTOOL, XCRUN},
};
use crate::bundler::{
    error::{Error, ErrorExt, Result},
    platform::macos::inspector,
};
use serde::Deserialize;
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};
use tokio::process::Command;

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct InfoResponse {
    status: NotarizationState,
}

/// Runs the real OS tools.
///
/// In dry-run mode every command that would modify a file (link editing,
/// signing, image creation, notarization) is logged as `[DRY RUN]` and
/// skipped; read-only inspection still runs.
#[derive(Debug, Clone, Default)]
pub struct SystemToolchain {
    dry_run: bool,
}

impl SystemToolchain {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    async fn run(&self, program: PathBuf, args: Vec<OsString>, mutating: bool) -> Result<String> {
        let display = std::iter::once(program.as_os_str())
            .chain(args.iter().map(OsString::as_os_str))
            .map(|s| s.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");

        if mutating && self.dry_run {
            log::info!("[DRY RUN] {}", display);
            return Ok(String::new());
        }

        log::debug!("Running: {}", display);
        let output = Command::new(&program)
            .args(&args)
            .output()
            .await
            .map_err(|error| Error::CommandFailed {
                command: display.clone(),
                error,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let diagnostic = if stderr.is_empty() {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            } else {
                stderr
            };
            return Err(Error::ToolExecution {
                command: display,
                code: output.status.code(),
                diagnostic,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn os_args<I, S>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    args.into_iter().map(Into::into).collect()
}

fn log_command(submission_id: &str, profile: &str) -> String {
    format!("xcrun notarytool log {submission_id} --keychain-profile {profile}")
}

impl Toolchain for SystemToolchain {
    async fn inspect_binary(&self, path: &Path) -> Result<LoadCommands> {
        if tool_detection::has_otool() {
            let output = self
                .run(
                    tool_detection::program(&OTOOL, "otool"),
                    os_args([OsString::from("-l"), path.into()]),
                    false,
                )
                .await?;
            return Ok(inspector::parse_otool_load_commands(&output));
        }

        let bytes = tokio::fs::read(path)
            .await
            .fs_context("reading binary", path)?;
        Ok(inspector::parse_macho(&bytes)?.0)
    }

    async fn architectures(&self, path: &Path) -> Result<Vec<String>> {
        if tool_detection::has_lipo() {
            let output = self
                .run(
                    tool_detection::program(&LIPO, "lipo"),
                    os_args([OsString::from("-info"), path.into()]),
                    false,
                )
                .await?;
            return Ok(inspector::parse_lipo_info(&output));
        }

        let bytes = tokio::fs::read(path)
            .await
            .fs_context("reading binary", path)?;
        Ok(inspector::parse_macho(&bytes)?.1)
    }

    async fn rewrite_reference(&self, binary: &Path, old: &str, new: &str) -> Result<()> {
        self.run(
            tool_detection::program(&INSTALL_NAME_TOOL, "install_name_tool"),
            os_args([
                OsString::from("-change"),
                old.into(),
                new.into(),
                binary.into(),
            ]),
            true,
        )
        .await?;
        Ok(())
    }

    async fn set_identity(&self, binary: &Path, id: &str) -> Result<()> {
        self.run(
            tool_detection::program(&INSTALL_NAME_TOOL, "install_name_tool"),
            os_args([OsString::from("-id"), id.into(), binary.into()]),
            true,
        )
        .await?;
        Ok(())
    }

    async fn delete_rpath(&self, binary: &Path, rpath: &str) -> Result<()> {
        self.run(
            tool_detection::program(&INSTALL_NAME_TOOL, "install_name_tool"),
            os_args([OsString::from("-delete_rpath"), rpath.into(), binary.into()]),
            true,
        )
        .await?;
        Ok(())
    }

    async fn change_rpath(&self, binary: &Path, old: &str, new: &str) -> Result<()> {
        self.run(
            tool_detection::program(&INSTALL_NAME_TOOL, "install_name_tool"),
            os_args([
                OsString::from("-rpath"),
                old.into(),
                new.into(),
                binary.into(),
            ]),
            true,
        )
        .await?;
        Ok(())
    }

    async fn sign(&self, request: &SignRequest<'_>) -> Result<()> {
        let mut args = os_args(["--force", "--sign"]);
        args.push(request.identity.authority().into());
        if !request.identity.is_ad_hoc() {
            args.push("--timestamp".into());
        }
        if request.hardened_runtime {
            args.extend(os_args(["--options", "runtime"]));
        }
        if let Some(entitlements) = request.entitlements {
            args.push("--entitlements".into());
            args.push(entitlements.into());
        }
        if request.preserve_metadata {
            args.push("--preserve-metadata=identifier,entitlements,flags".into());
        }
        args.push(request.path.into());

        self.run(tool_detection::program(&CODESIGN, "codesign"), args, true)
            .await?;
        log::debug!("✓ Signed {}", request.path.display());
        Ok(())
    }

    async fn verify_signature(&self, path: &Path) -> Result<bool> {
        if self.dry_run {
            log::info!("[DRY RUN] codesign --verify --verbose {}", path.display());
            return Ok(true);
        }
        let result = self
            .run(
                tool_detection::program(&CODESIGN, "codesign"),
                os_args([
                    OsString::from("--verify"),
                    "--verbose".into(),
                    path.into(),
                ]),
                false,
            )
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(Error::ToolExecution { diagnostic, .. }) => {
                log::warn!("Signature check failed for {}: {}", path.display(), diagnostic);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn create_disk_image(
        &self,
        source: &Path,
        output: &Path,
        volume_name: &str,
    ) -> Result<PathBuf> {
        self.run(
            tool_detection::program(&HDIUTIL, "hdiutil"),
            os_args([
                OsString::from("create"),
                "-volname".into(),
                volume_name.into(),
                "-srcfolder".into(),
                source.into(),
                "-ov".into(),
                "-format".into(),
                "UDZO".into(),
                output.into(),
            ]),
            true,
        )
        .await?;
        Ok(output.to_path_buf())
    }

    async fn submit_for_notarization(&self, path: &Path, profile: &str) -> Result<String> {
        let output = self
            .run(
                tool_detection::program(&XCRUN, "xcrun"),
                os_args([
                    OsString::from("notarytool"),
                    "submit".into(),
                    path.into(),
                    "--keychain-profile".into(),
                    profile.into(),
                    "--output-format".into(),
                    "json".into(),
                ]),
                true,
            )
            .await?;

        if self.dry_run {
            return Ok("dry-run".to_string());
        }
        let response: SubmitResponse = serde_json::from_str(output.trim())?;
        Ok(response.id)
    }

    async fn poll_notarization(
        &self,
        submission_id: &str,
        profile: &str,
    ) -> Result<NotarizationStatus> {
        if self.dry_run {
            log::info!(
                "[DRY RUN] xcrun notarytool info {} --keychain-profile {}",
                submission_id,
                profile
            );
            return Ok(NotarizationStatus {
                state: NotarizationState::Accepted,
                log_ref: None,
            });
        }

        let output = self
            .run(
                tool_detection::program(&XCRUN, "xcrun"),
                os_args([
                    "notarytool",
                    "info",
                    submission_id,
                    "--keychain-profile",
                    profile,
                    "--output-format",
                    "json",
                ]),
                false,
            )
            .await?;
        let response: InfoResponse = serde_json::from_str(output.trim())?;
        let log_ref = response
            .status
            .is_terminal()
            .then(|| log_command(submission_id, profile));

        Ok(NotarizationStatus {
            state: response.status,
            log_ref,
        })
    }

    async fn staple(&self, path: &Path) -> Result<()> {
        self.run(
            tool_detection::program(&XCRUN, "xcrun"),
            os_args([OsString::from("stapler"), "staple".into(), path.into()]),
            true,
        )
        .await?;
        Ok(())
    }
}
