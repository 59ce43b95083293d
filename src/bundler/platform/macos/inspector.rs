//! Mach-O binary inspection.
//!
//! Identification is a byte-level check of the leading magic number. Load
//! commands come from the toolchain (`otool -l` text, or a native goblin
//! parse when `otool` is unavailable). Nothing in this module writes.

use crate::bundler::{
    error::{Error, Result},
    toolchain::{LoadCommands, Toolchain},
};
use goblin::mach::{Mach, MachO, SingleArch, cputype::get_arch_name_from_types};
use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

/// Largest file accepted for relocation or bundling (1 GiB).
pub const MAX_BINARY_SIZE: u64 = 1024 * 1024 * 1024;

/// Thin 32/64-bit Mach-O in both byte orders, and the fat wrapper.
pub const MACHO_MAGIC_NUMBERS: [[u8; 4]; 6] = [
    [0xfe, 0xed, 0xfa, 0xce],
    [0xce, 0xfa, 0xed, 0xfe],
    [0xfe, 0xed, 0xfa, 0xcf],
    [0xcf, 0xfa, 0xed, 0xfe],
    [0xca, 0xfe, 0xba, 0xbe],
    [0xbe, 0xba, 0xfe, 0xca],
];

/// Load commands whose `name` field is a library reference.
const DYLIB_LOAD_COMMANDS: &[&str] = &[
    "LC_LOAD_DYLIB",
    "LC_LOAD_WEAK_DYLIB",
    "LC_REEXPORT_DYLIB",
    "LC_LAZY_LOAD_DYLIB",
    "LC_LOAD_UPWARD_DYLIB",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagicKind {
    MachO32,
    MachO64,
    Fat,
}

/// Classifies the first four bytes of a file.
pub fn magic_kind(bytes: &[u8]) -> Option<MagicKind> {
    let head: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    match MACHO_MAGIC_NUMBERS.iter().position(|m| *m == head)? {
        0 | 1 => Some(MagicKind::MachO32),
        2 | 3 => Some(MagicKind::MachO64),
        _ => Some(MagicKind::Fat),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    ValidMachO,
    NotMachO,
    Unreadable,
}

fn read_magic(path: &Path) -> std::io::Result<[u8; 4]> {
    let mut head = [0u8; 4];
    File::open(path)?.read_exact(&mut head)?;
    Ok(head)
}

/// Byte-level Mach-O check. Files shorter than four bytes are `NotMachO`.
pub fn check_validity(path: &Path) -> Validity {
    match read_magic(path) {
        Ok(head) if magic_kind(&head).is_some() => Validity::ValidMachO,
        Ok(_) => Validity::NotMachO,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Validity::NotMachO,
        Err(_) => Validity::Unreadable,
    }
}

pub fn is_macho(path: &Path) -> bool {
    check_validity(path) == Validity::ValidMachO
}

/// An inspected binary, identified by its canonical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryFile {
    pub path: PathBuf,
    pub architectures: Vec<String>,
    pub universal: bool,
    pub validity: Validity,
}

impl BinaryFile {
    /// Classifies `path` and, for Mach-O files, lists its architectures.
    pub async fn inspect<T: Toolchain>(path: &Path, toolchain: &T) -> Result<Self> {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let validity = check_validity(&path);
        let (architectures, universal) = if validity == Validity::ValidMachO {
            let universal = read_magic(&path)
                .map(|head| magic_kind(&head) == Some(MagicKind::Fat))
                .unwrap_or(false);
            (toolchain.architectures(&path).await?, universal)
        } else {
            (Vec::new(), false)
        };

        Ok(Self {
            path,
            architectures,
            universal,
            validity,
        })
    }
}

/// Extracts a `name <value> (offset N)` / `path <value> (offset N)` field.
fn field_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(key)?.strip_prefix(' ')?;
    let end = rest.rfind(" (offset ")?;
    let value = rest[..end].trim();
    (!value.is_empty()).then_some(value)
}

/// Parses `otool -l` output.
///
/// Best effort: lines that do not match an expected record are ignored.
/// Duplicate references (one listing per architecture) are collapsed.
pub fn parse_otool_load_commands(output: &str) -> LoadCommands {
    #[derive(Clone, Copy)]
    enum Pending {
        Reference,
        Rpath,
        Id,
    }

    let mut commands = LoadCommands::default();
    let mut pending = None;

    for line in output.lines().map(str::trim) {
        if let Some(cmd) = line.strip_prefix("cmd ") {
            let cmd = cmd.trim();
            pending = if DYLIB_LOAD_COMMANDS.contains(&cmd) {
                Some(Pending::Reference)
            } else if cmd == "LC_RPATH" {
                Some(Pending::Rpath)
            } else if cmd == "LC_ID_DYLIB" {
                Some(Pending::Id)
            } else {
                None
            };
            continue;
        }

        match pending {
            Some(Pending::Reference) => {
                if let Some(name) = field_value(line, "name") {
                    if !commands.references.iter().any(|r| r == name) {
                        commands.references.push(name.to_string());
                    }
                    pending = None;
                }
            }
            Some(Pending::Rpath) => {
                if let Some(path) = field_value(line, "path") {
                    if !commands.rpaths.iter().any(|r| r == path) {
                        commands.rpaths.push(path.to_string());
                    }
                    pending = None;
                }
            }
            Some(Pending::Id) => {
                if let Some(name) = field_value(line, "name") {
                    commands.install_id.get_or_insert_with(|| name.to_string());
                    pending = None;
                }
            }
            None => {}
        }
    }

    commands
}

/// Parses `lipo -info` output into architecture names.
pub fn parse_lipo_info(output: &str) -> Vec<String> {
    for line in output.lines() {
        if line.starts_with("Architectures in the fat file:") {
            if let Some((_, archs)) = line.rsplit_once(" are: ") {
                return archs.split_whitespace().map(str::to_string).collect();
            }
        } else if line.starts_with("Non-fat file:") {
            if let Some((_, arch)) = line.rsplit_once(" is architecture: ") {
                return vec![arch.trim().to_string()];
            }
        }
    }
    Vec::new()
}

fn arch_name(cputype: u32, cpusubtype: u32) -> String {
    get_arch_name_from_types(cputype, cpusubtype)
        .map(str::to_string)
        .unwrap_or_else(|| format!("cputype-{cputype}"))
}

fn load_commands_of(macho: &MachO<'_>) -> LoadCommands {
    LoadCommands {
        install_id: macho.name.map(str::to_string),
        // libs[0] is the "self" placeholder
        references: macho.libs.iter().skip(1).map(|s| s.to_string()).collect(),
        rpaths: macho.rpaths.iter().map(|s| s.to_string()).collect(),
    }
}

/// Native Mach-O parse: load commands of the first slice, plus all
/// architectures.
pub fn parse_macho(bytes: &[u8]) -> Result<(LoadCommands, Vec<String>)> {
    match Mach::parse(bytes)? {
        Mach::Binary(macho) => {
            let arch = arch_name(macho.header.cputype, macho.header.cpusubtype);
            Ok((load_commands_of(&macho), vec![arch]))
        }
        Mach::Fat(multi) => {
            let mut arches = Vec::new();
            for arch in multi.iter_arches() {
                let arch = arch?;
                arches.push(arch_name(arch.cputype, arch.cpusubtype));
            }
            match multi.get(0)? {
                SingleArch::MachO(macho) => Ok((load_commands_of(&macho), arches)),
                SingleArch::Archive(_) => Err(Error::Validation(
                    "fat binary slice is a static archive".into(),
                )),
            }
        }
    }
}

/// Pre-copy checks applied to executables and libraries.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileChecks {
    pub executable: bool,
    pub macho: bool,
}

impl FileChecks {
    pub fn library() -> Self {
        Self {
            executable: false,
            macho: true,
        }
    }

    pub fn executable() -> Self {
        Self {
            executable: true,
            macho: true,
        }
    }
}

/// Rejects missing, symlinked, non-regular, empty, oversized, and
/// (optionally) non-executable or non-Mach-O files.
pub fn validate_binary_file(path: &Path, checks: FileChecks) -> Result<()> {
    let metadata = std::fs::symlink_metadata(path)
        .map_err(|e| Error::Validation(format!("{}: {}", path.display(), e)))?;

    if metadata.file_type().is_symlink() {
        return Err(Error::Validation(format!(
            "{} is a symbolic link",
            path.display()
        )));
    }
    if !metadata.is_file() {
        return Err(Error::Validation(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    if metadata.len() == 0 {
        return Err(Error::Validation(format!("{} is empty", path.display())));
    }
    if metadata.len() > MAX_BINARY_SIZE {
        return Err(Error::Validation(format!(
            "{} is larger than {} bytes",
            path.display(),
            MAX_BINARY_SIZE
        )));
    }

    #[cfg(unix)]
    if checks.executable {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(Error::Validation(format!(
                "{} is not executable",
                path.display()
            )));
        }
    }

    if checks.macho {
        match check_validity(path) {
            Validity::ValidMachO => {}
            Validity::NotMachO => {
                return Err(Error::Validation(format!(
                    "{} is not a Mach-O binary",
                    path.display()
                )));
            }
            Validity::Unreadable => {
                return Err(Error::Validation(format!(
                    "{} cannot be read",
                    path.display()
                )));
            }
        }
    }

    Ok(())
}
