//! macOS disk image packaging and notarization.
//!
//! [`Packager`] runs the release pipeline over a bundle or folder:
//!
//! 1. sign bundle contents with the Developer ID
//! 2. build a compressed read-only image with hdiutil
//! 3. sign the image
//! 4. submit it to the notary service and poll until a verdict
//! 5. staple the ticket
//!
//! Every stage can be skipped and is recorded on the [`PackageJob`]. A
//! failing stage is reported as [`Error::Stage`] with the stage name; a
//! notarization rejection is reported as [`Error::NotarizationRejected`]
//! and the image is kept.

mod creation;
mod notarize;

pub use creation::{bundles_to_sign, default_output, default_volume_name, prepare_output};
pub use notarize::wait_for_notarization;

use crate::bundler::{
    error::{Error, Result},
    platform::macos::sign::{Codesigner, SignState, check_entitlements},
    settings::{PackageSettings, SignSettings},
    toolchain::{SignRequest, Toolchain},
    utils::checksum,
};
use std::path::PathBuf;

/// Packaging workflow stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStage {
    Start,
    ContentsSigned,
    ImageCreated,
    ImageSigned,
    Notarizing,
    Notarized,
    NotarizationFailed,
    Stapled,
}

impl PackageStage {
    pub fn name(self) -> &'static str {
        match self {
            PackageStage::Start => "start",
            PackageStage::ContentsSigned => "sign contents",
            PackageStage::ImageCreated => "create image",
            PackageStage::ImageSigned => "sign image",
            PackageStage::Notarizing => "notarize",
            PackageStage::Notarized => "notarized",
            PackageStage::NotarizationFailed => "notarization failed",
            PackageStage::Stapled => "staple",
        }
    }
}

/// State of one packaging run.
#[derive(Debug, Clone)]
pub struct PackageJob {
    pub source: PathBuf,
    pub output: PathBuf,
    pub volume_name: String,
    /// Last stage reached.
    pub stage: PackageStage,
    /// Stages completed, in order.
    pub completed: Vec<PackageStage>,
    /// Stages skipped by configuration.
    pub skipped: Vec<PackageStage>,
    pub submission_id: Option<String>,
    pub log_ref: Option<String>,
    /// SHA-256 of the image, once created.
    pub checksum: Option<String>,
}

impl PackageJob {
    fn advance(&mut self, stage: PackageStage) {
        log::debug!("package stage: {}", stage.name());
        self.stage = stage;
        self.completed.push(stage);
    }

    fn skip(&mut self, stage: PackageStage, reason: &str) {
        log::warn!("Skipping {}: {}", stage.name(), reason);
        self.skipped.push(stage);
    }
}

pub struct Packager<'a, T: Toolchain> {
    settings: PackageSettings,
    toolchain: &'a T,
    job: PackageJob,
}

impl<'a, T: Toolchain> Packager<'a, T> {
    /// Resolves the output path and volume name and validates inputs.
    pub fn new(settings: PackageSettings, toolchain: &'a T) -> Result<Self> {
        if !settings.source.exists() {
            return Err(Error::Validation(format!(
                "{} does not exist",
                settings.source.display()
            )));
        }
        if let Some(entitlements) = &settings.entitlements {
            check_entitlements(entitlements)?;
        }

        let output = match &settings.output {
            Some(output) => output.clone(),
            None => default_output(&settings.source)?,
        };
        let volume_name = match &settings.volume_name {
            Some(name) => name.clone(),
            None => default_volume_name(&settings.source)?,
        };

        let job = PackageJob {
            source: settings.source.clone(),
            output,
            volume_name,
            stage: PackageStage::Start,
            completed: Vec::new(),
            skipped: Vec::new(),
            submission_id: None,
            log_ref: None,
            checksum: None,
        };
        Ok(Self {
            settings,
            toolchain,
            job,
        })
    }

    pub fn job(&self) -> &PackageJob {
        &self.job
    }

    /// Runs the pipeline.
    ///
    /// On error the job still reflects the last stage reached; a rejected
    /// notarization leaves the job in [`PackageStage::NotarizationFailed`]
    /// with the image on disk.
    pub async fn process(&mut self, notarize: bool, staple: bool) -> Result<&PackageJob> {
        log::info!(
            "Packaging {} -> {}",
            self.job.source.display(),
            self.job.output.display()
        );

        self.sign_contents()
            .await
            .map_err(|e| e.in_stage(PackageStage::ContentsSigned.name()))?;
        self.create_image()
            .await
            .map_err(|e| e.in_stage(PackageStage::ImageCreated.name()))?;
        self.sign_image()
            .await
            .map_err(|e| e.in_stage(PackageStage::ImageSigned.name()))?;

        let notarized = if notarize {
            self.notarize().await?
        } else {
            self.job.skip(PackageStage::Notarizing, "disabled");
            false
        };

        if staple && notarized {
            self.toolchain
                .staple(&self.job.output)
                .await
                .map_err(|e| e.in_stage(PackageStage::Stapled.name()))?;
            self.job.advance(PackageStage::Stapled);
        } else {
            let reason = if staple { "not notarized" } else { "disabled" };
            self.job.skip(PackageStage::Stapled, reason);
        }

        log::info!("✓ Created {}", self.job.output.display());
        Ok(&self.job)
    }

    async fn sign_contents(&mut self) -> Result<()> {
        if !self.settings.sign_contents {
            self.job.skip(PackageStage::ContentsSigned, "disabled");
            return Ok(());
        }
        if self.settings.identity.is_ad_hoc() {
            self.job
                .skip(PackageStage::ContentsSigned, "no Developer ID configured");
            return Ok(());
        }

        for bundle in bundles_to_sign(&self.settings.source)? {
            let mut settings = SignSettings::new(&bundle, self.settings.identity.clone());
            settings.entitlements = self.settings.entitlements.clone();
            settings.strict = true;
            settings.dry_run = self.settings.dry_run;

            let report = Codesigner::new(settings, self.toolchain)?.process().await?;
            if report.state == SignState::Failed {
                return Err(Error::Validation(format!(
                    "signature verification failed: {}",
                    bundle.display()
                )));
            }
        }
        self.job.advance(PackageStage::ContentsSigned);
        Ok(())
    }

    async fn create_image(&mut self) -> Result<()> {
        if !self.settings.dry_run {
            prepare_output(&self.job.output).await?;
        }
        log::info!("Creating disk image {}", self.job.output.display());
        let image = self
            .toolchain
            .create_disk_image(&self.job.source, &self.job.output, &self.job.volume_name)
            .await?;

        if !self.settings.dry_run {
            self.job.checksum = Some(checksum::calculate_sha256(&image).await?);
        }
        self.job.output = image;
        self.job.advance(PackageStage::ImageCreated);
        Ok(())
    }

    async fn sign_image(&mut self) -> Result<()> {
        if self.settings.identity.is_ad_hoc() {
            self.job
                .skip(PackageStage::ImageSigned, "no Developer ID configured");
            return Ok(());
        }
        let request = SignRequest::new(&self.job.output, &self.settings.identity);
        self.toolchain.sign(&request).await?;
        self.job.advance(PackageStage::ImageSigned);
        Ok(())
    }

    /// Returns whether the image was accepted.
    async fn notarize(&mut self) -> Result<bool> {
        let Some(profile) = self.settings.keychain_profile.clone() else {
            self.job
                .skip(PackageStage::Notarizing, "no keychain profile configured");
            return Ok(false);
        };
        if self.settings.identity.is_ad_hoc() {
            self.job
                .skip(PackageStage::Notarizing, "image is not Developer ID signed");
            return Ok(false);
        }

        log::info!("Submitting {} for notarization", self.job.output.display());
        let submission_id = self
            .toolchain
            .submit_for_notarization(&self.job.output, &profile)
            .await
            .map_err(|e| e.in_stage(PackageStage::Notarizing.name()))?;
        self.job.submission_id = Some(submission_id.clone());
        self.job.advance(PackageStage::Notarizing);

        match wait_for_notarization(
            self.toolchain,
            &submission_id,
            &profile,
            &self.job.output,
            &self.settings.poll,
        )
        .await
        {
            Ok(status) => {
                self.job.log_ref = status.log_ref;
                self.job.advance(PackageStage::Notarized);
                log::info!("✓ Notarization accepted ({})", submission_id);
                Ok(true)
            }
            Err(Error::NotarizationRejected {
                submission_id,
                status,
                log_ref,
                image,
            }) => {
                self.job.log_ref = log_ref.clone();
                self.job.stage = PackageStage::NotarizationFailed;
                Err(Error::NotarizationRejected {
                    submission_id,
                    status,
                    log_ref,
                    image,
                })
            }
            Err(e) => Err(e.in_stage(PackageStage::Notarizing.name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{
        platform::macos::sign::SigningIdentity,
        settings::PollPolicy,
        toolchain::{
            NotarizationState, NotarizationStatus,
            fake::{Call, FakeBinary, FakeToolchain, write_binary},
        },
    };
    use std::path::Path;

    fn sample_app(root: &Path) -> PathBuf {
        let app = root.join("Main.app");
        write_binary(&app.join("Contents/MacOS/Main"), &FakeBinary::new(&[]));
        app
    }

    fn release_settings(source: &Path) -> PackageSettings {
        let mut settings = PackageSettings::new(source);
        settings.identity = SigningIdentity::parse("John Doe (ABCDE12345)").unwrap();
        settings.keychain_profile = Some("notary".into());
        settings.poll = PollPolicy::immediate(5);
        settings
    }

    #[tokio::test]
    async fn test_full_release_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let app = sample_app(dir.path());
        let image = dir.path().join("Main.dmg");

        let toolchain = FakeToolchain::new().with_polls(vec![
            Ok(NotarizationStatus {
                state: NotarizationState::InProgress,
                log_ref: None,
            }),
            Ok(NotarizationStatus {
                state: NotarizationState::Accepted,
                log_ref: Some("log".into()),
            }),
        ]);
        let mut packager = Packager::new(release_settings(&app), &toolchain).unwrap();
        let job = packager.process(true, true).await.unwrap();

        assert_eq!(job.stage, PackageStage::Stapled);
        assert_eq!(job.output, image);
        assert_eq!(job.volume_name, "Main");
        assert_eq!(job.submission_id.as_deref(), Some("submission-1"));
        assert!(job.checksum.is_some());
        assert!(job.skipped.is_empty());

        let calls = toolchain.calls();
        let index = |wanted: &Call| calls.iter().position(|c| c == wanted).unwrap();
        let create = calls
            .iter()
            .position(|c| matches!(c, Call::CreateImage { .. }))
            .unwrap();
        let app_signed = calls
            .iter()
            .position(|c| matches!(c, Call::Sign { path, .. } if path == &app))
            .unwrap();
        let image_signed = calls
            .iter()
            .position(|c| matches!(c, Call::Sign { path, .. } if path == &image))
            .unwrap();

        assert!(app_signed < create);
        assert!(create < image_signed);
        assert!(image_signed < index(&Call::Submit(image.clone())));
        assert_eq!(calls.last(), Some(&Call::Staple(image)));
    }

    #[tokio::test]
    async fn test_rejection_keeps_image_and_never_staples() {
        let dir = tempfile::tempdir().unwrap();
        let app = sample_app(dir.path());

        let toolchain = FakeToolchain::new().with_polls(vec![Ok(NotarizationStatus {
            state: NotarizationState::Rejected,
            log_ref: Some("xcrun notarytool log submission-1 --keychain-profile notary".into()),
        })]);
        let mut packager = Packager::new(release_settings(&app), &toolchain).unwrap();
        let err = packager.process(true, true).await.unwrap_err();

        match &err {
            Error::NotarizationRejected { log_ref, image, .. } => {
                assert!(log_ref.is_some());
                assert!(image.exists());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(packager.job().stage, PackageStage::NotarizationFailed);
        assert!(packager.job().output.exists());
        assert!(!packager.job().completed.contains(&PackageStage::Stapled));
        assert!(!toolchain.calls().iter().any(|c| matches!(c, Call::Staple(_))));
    }

    #[tokio::test]
    async fn test_ad_hoc_skips_signing_and_notarization() {
        let dir = tempfile::tempdir().unwrap();
        let app = sample_app(dir.path());

        let toolchain = FakeToolchain::new();
        let mut settings = PackageSettings::new(&app);
        settings.keychain_profile = Some("notary".into());
        let mut packager = Packager::new(settings, &toolchain).unwrap();
        let job = packager.process(true, true).await.unwrap();

        assert_eq!(job.stage, PackageStage::ImageCreated);
        assert_eq!(
            job.skipped,
            vec![
                PackageStage::ContentsSigned,
                PackageStage::ImageSigned,
                PackageStage::Notarizing,
                PackageStage::Stapled
            ]
        );
        assert!(toolchain.signed_paths().is_empty());
    }

    #[tokio::test]
    async fn test_image_failure_names_stage() {
        let dir = tempfile::tempdir().unwrap();
        let app = sample_app(dir.path());

        let toolchain = FakeToolchain::new().failing_image();
        let mut packager = Packager::new(release_settings(&app), &toolchain).unwrap();
        let err = packager.process(true, true).await.unwrap_err();

        assert_eq!(err.stage(), Some("create image"));
        assert!(err.diagnostic().unwrap().contains("simulated failure"));
        assert_eq!(packager.job().stage, PackageStage::ContentsSigned);
    }

    #[tokio::test]
    async fn test_existing_output_replaced_and_staple_optional() {
        let dir = tempfile::tempdir().unwrap();
        let app = sample_app(dir.path());
        let output = dir.path().join("out/Release.dmg");
        std::fs::create_dir_all(output.parent().unwrap()).unwrap();
        std::fs::write(&output, "old").unwrap();

        let toolchain = FakeToolchain::new();
        let mut settings = release_settings(&app);
        settings.output = Some(output.clone());
        settings.volume_name = Some("Release".into());
        let mut packager = Packager::new(settings, &toolchain).unwrap();
        let job = packager.process(true, false).await.unwrap();

        assert_eq!(job.stage, PackageStage::Notarized);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "fake disk image");
        assert!(toolchain.calls().contains(&Call::CreateImage {
            source: app,
            output,
            volume_name: "Release".into(),
        }));
    }

    #[tokio::test]
    async fn test_plain_folder_signs_each_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("Release");
        write_binary(&folder.join("One.app/Contents/MacOS/One"), &FakeBinary::new(&[]));
        write_binary(&folder.join("Two.app/Contents/MacOS/Two"), &FakeBinary::new(&[]));
        std::fs::write(folder.join("README.txt"), "read me").unwrap();

        let toolchain = FakeToolchain::new();
        let mut packager = Packager::new(release_settings(&folder), &toolchain).unwrap();
        packager.process(false, false).await.unwrap();

        let signed = toolchain.signed_paths();
        assert!(signed.contains(&folder.join("One.app")));
        assert!(signed.contains(&folder.join("Two.app")));
        assert!(!signed.contains(&folder));
    }
}
