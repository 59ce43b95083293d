//! Recording toolchain over synthetic Mach-O files.
//!
//! A fake binary is the 64-bit Mach-O magic followed by JSON describing its
//! load commands, so it passes magic checks and link edits travel with the
//! file when it is copied.

use super::{LoadCommands, NotarizationState, NotarizationStatus, SignRequest, Toolchain};
use crate::bundler::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashSet, VecDeque},
    path::{Path, PathBuf},
    sync::Mutex,
};

const MAGIC: [u8; 4] = [0xcf, 0xfa, 0xed, 0xfe];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FakeBinary {
    pub id: Option<String>,
    pub references: Vec<String>,
    pub rpaths: Vec<String>,
    /// Reported by `architectures`; `arm64` when empty.
    #[serde(default)]
    pub architectures: Vec<String>,
}

impl FakeBinary {
    pub fn new(references: &[&str]) -> Self {
        Self {
            references: references.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_rpaths(mut self, rpaths: &[&str]) -> Self {
        self.rpaths = rpaths.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_architectures(mut self, architectures: &[&str]) -> Self {
        self.architectures = architectures.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// Writes a fake binary (mode 0755), creating parent directories.
pub fn write_binary(path: &Path, binary: &FakeBinary) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let mut bytes = MAGIC.to_vec();
    bytes.extend(serde_json::to_vec(binary).unwrap());
    std::fs::write(path, bytes).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
}

pub fn read_binary(path: &Path) -> Result<FakeBinary> {
    let bytes = std::fs::read(path)?;
    if bytes.get(..4) != Some(&MAGIC[..]) {
        return Err(Error::GenericError(format!(
            "{} is not a fake binary",
            path.display()
        )));
    }
    Ok(serde_json::from_slice(&bytes[4..])?)
}

fn store_binary(path: &Path, binary: &FakeBinary) -> Result<()> {
    let mut bytes = MAGIC.to_vec();
    bytes.extend(serde_json::to_vec(binary)?);
    std::fs::write(path, bytes)?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Rewrite {
        binary: PathBuf,
        old: String,
        new: String,
    },
    SetId {
        binary: PathBuf,
        id: String,
    },
    DeleteRpath {
        binary: PathBuf,
        rpath: String,
    },
    ChangeRpath {
        binary: PathBuf,
        old: String,
        new: String,
    },
    Sign {
        path: PathBuf,
        authority: String,
        hardened_runtime: bool,
        entitlements: Option<PathBuf>,
    },
    Verify(PathBuf),
    CreateImage {
        source: PathBuf,
        output: PathBuf,
        volume_name: String,
    },
    Submit(PathBuf),
    Poll(String),
    Staple(PathBuf),
}

fn tool_error(command: &str) -> Error {
    Error::ToolExecution {
        command: command.to_string(),
        code: Some(1),
        diagnostic: format!("{command}: simulated failure"),
    }
}

#[derive(Debug, Default)]
pub struct FakeToolchain {
    calls: Mutex<Vec<Call>>,
    polls: Mutex<VecDeque<Result<NotarizationStatus>>>,
    failing_sign: Mutex<HashSet<PathBuf>>,
    /// Paths whose next `sign` fails; removed on use.
    failing_sign_once: Mutex<HashSet<PathBuf>>,
    /// Paths on which every link edit fails.
    failing_edit: Mutex<HashSet<PathBuf>>,
    failing_verify: Mutex<HashSet<PathBuf>>,
    fail_image: bool,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Poll responses returned in order; `Accepted` once exhausted.
    pub fn with_polls(self, polls: Vec<Result<NotarizationStatus>>) -> Self {
        *self.polls.lock().unwrap() = polls.into();
        self
    }

    pub fn failing_sign(self, path: &Path) -> Self {
        self.failing_sign.lock().unwrap().insert(path.to_path_buf());
        self
    }

    pub fn failing_sign_once(self, path: &Path) -> Self {
        self.failing_sign_once.lock().unwrap().insert(path.to_path_buf());
        self
    }

    /// Makes `rewrite_reference`, `set_identity` and the rpath edits fail
    /// for `path`.
    pub fn failing_edit(self, path: &Path) -> Self {
        self.failing_edit.lock().unwrap().insert(path.to_path_buf());
        self
    }

    pub fn failing_verify(self, path: &Path) -> Self {
        self.failing_verify.lock().unwrap().insert(path.to_path_buf());
        self
    }

    pub fn failing_image(mut self) -> Self {
        self.fail_image = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Paths passed to `sign`, in order.
    pub fn signed_paths(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Sign { path, .. } => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn mutating_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| !matches!(call, Call::Verify(_) | Call::Poll(_)))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_edit(&self, binary: &Path) -> Result<()> {
        if self.failing_edit.lock().unwrap().contains(binary) {
            return Err(tool_error("install_name_tool"));
        }
        Ok(())
    }
}

impl Toolchain for FakeToolchain {
    async fn inspect_binary(&self, path: &Path) -> Result<LoadCommands> {
        let binary = read_binary(path)?;
        Ok(LoadCommands {
            install_id: binary.id,
            references: binary.references,
            rpaths: binary.rpaths,
        })
    }

    async fn architectures(&self, path: &Path) -> Result<Vec<String>> {
        let binary = read_binary(path)?;
        if binary.architectures.is_empty() {
            return Ok(vec!["arm64".to_string()]);
        }
        Ok(binary.architectures)
    }

    async fn rewrite_reference(&self, binary: &Path, old: &str, new: &str) -> Result<()> {
        self.record(Call::Rewrite {
            binary: binary.to_path_buf(),
            old: old.to_string(),
            new: new.to_string(),
        });
        self.check_edit(binary)?;
        let mut contents = read_binary(binary)?;
        for reference in contents.references.iter_mut().filter(|r| *r == old) {
            *reference = new.to_string();
        }
        store_binary(binary, &contents)
    }

    async fn set_identity(&self, binary: &Path, id: &str) -> Result<()> {
        self.record(Call::SetId {
            binary: binary.to_path_buf(),
            id: id.to_string(),
        });
        self.check_edit(binary)?;
        let mut contents = read_binary(binary)?;
        contents.id = Some(id.to_string());
        store_binary(binary, &contents)
    }

    async fn delete_rpath(&self, binary: &Path, rpath: &str) -> Result<()> {
        self.record(Call::DeleteRpath {
            binary: binary.to_path_buf(),
            rpath: rpath.to_string(),
        });
        self.check_edit(binary)?;
        let mut contents = read_binary(binary)?;
        contents.rpaths.retain(|r| r != rpath);
        store_binary(binary, &contents)
    }

    async fn change_rpath(&self, binary: &Path, old: &str, new: &str) -> Result<()> {
        self.record(Call::ChangeRpath {
            binary: binary.to_path_buf(),
            old: old.to_string(),
            new: new.to_string(),
        });
        self.check_edit(binary)?;
        let mut contents = read_binary(binary)?;
        if contents.rpaths.iter().any(|r| r == new) {
            return Err(tool_error("install_name_tool -rpath"));
        }
        for rpath in contents.rpaths.iter_mut().filter(|r| *r == old) {
            *rpath = new.to_string();
        }
        store_binary(binary, &contents)
    }

    async fn sign(&self, request: &SignRequest<'_>) -> Result<()> {
        self.record(Call::Sign {
            path: request.path.to_path_buf(),
            authority: request.identity.authority(),
            hardened_runtime: request.hardened_runtime,
            entitlements: request.entitlements.map(Path::to_path_buf),
        });
        if self.failing_sign.lock().unwrap().contains(request.path)
            || self.failing_sign_once.lock().unwrap().remove(request.path)
        {
            return Err(tool_error("codesign"));
        }
        Ok(())
    }

    async fn verify_signature(&self, path: &Path) -> Result<bool> {
        self.record(Call::Verify(path.to_path_buf()));
        Ok(!self.failing_verify.lock().unwrap().contains(path))
    }

    async fn create_disk_image(
        &self,
        source: &Path,
        output: &Path,
        volume_name: &str,
    ) -> Result<PathBuf> {
        self.record(Call::CreateImage {
            source: source.to_path_buf(),
            output: output.to_path_buf(),
            volume_name: volume_name.to_string(),
        });
        if self.fail_image {
            return Err(tool_error("hdiutil"));
        }
        std::fs::write(output, b"fake disk image")?;
        Ok(output.to_path_buf())
    }

    async fn submit_for_notarization(&self, path: &Path, _profile: &str) -> Result<String> {
        self.record(Call::Submit(path.to_path_buf()));
        Ok("submission-1".to_string())
    }

    async fn poll_notarization(
        &self,
        submission_id: &str,
        _profile: &str,
    ) -> Result<NotarizationStatus> {
        self.record(Call::Poll(submission_id.to_string()));
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(NotarizationStatus {
                state: NotarizationState::Accepted,
                log_ref: None,
            }))
    }

    async fn staple(&self, path: &Path) -> Result<()> {
        self.record(Call::Staple(path.to_path_buf()));
        Ok(())
    }
}
