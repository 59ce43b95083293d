//! Notarization status polling.
//!
//! Submission happens once. Only the status check is retried, with the
//! bounded backoff of a [`PollPolicy`].

use crate::bundler::{
    error::{Error, Result},
    settings::PollPolicy,
    toolchain::{NotarizationState, NotarizationStatus, Toolchain},
};
use std::path::Path;

/// Polls `submission_id` until the service reports a terminal state.
///
/// Returns the accepted status. A rejected or invalid submission becomes
/// [`Error::NotarizationRejected`] naming `image`, which is left on disk.
/// Running out of attempts is [`Error::NotarizationTimedOut`].
pub async fn wait_for_notarization<T: Toolchain>(
    toolchain: &T,
    submission_id: &str,
    profile: &str,
    image: &Path,
    policy: &PollPolicy,
) -> Result<NotarizationStatus> {
    for attempt in 1..=policy.max_attempts {
        let status = toolchain.poll_notarization(submission_id, profile).await?;
        log::debug!(
            "notarization {} check {}/{}: {}",
            submission_id,
            attempt,
            policy.max_attempts,
            status.state.as_str()
        );

        match status.state {
            NotarizationState::Accepted => return Ok(status),
            NotarizationState::Invalid | NotarizationState::Rejected => {
                return Err(Error::NotarizationRejected {
                    submission_id: submission_id.to_string(),
                    status: status.state.as_str().to_string(),
                    log_ref: status.log_ref,
                    image: image.to_path_buf(),
                });
            }
            NotarizationState::InProgress => {}
        }

        if attempt < policy.max_attempts {
            let delay = policy.delay_after(attempt);
            log::info!(
                "Notarization in progress, checking again in {}s",
                delay.as_secs()
            );
            tokio::time::sleep(delay).await;
        }
    }

    Err(Error::NotarizationTimedOut {
        submission_id: submission_id.to_string(),
        attempts: policy.max_attempts,
    })
}
