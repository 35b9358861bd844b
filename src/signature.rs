//! Removal of detachable code signatures before comparison.
//!
//! Official Windows executables are Authenticode-signed after the build, so
//! a faithful rebuild can never match them byte for byte. Stripping the
//! certificate table from both sides brings them back to the bytes the
//! compiler and linker produced.
//!
//! Stripping is best-effort. When it fails, [`normalize`] hands back the
//! file unchanged together with a warning; the comparison then runs on the
//! raw bytes and fails on its own merits.

use anyhow::{anyhow, bail, Context, Result};
use std::{fs, path::Path, process::Command};
use tracing::warn;

use crate::{hasher::MAX_HASH_BYTES, profile::ToolCommand, toolcheck};

pub trait SignatureStripper {
    /// Returns the bytes of `path` with any embedded signature removed.
    /// Unsigned input is returned unchanged.
    fn strip(&self, path: &Path) -> Result<Vec<u8>>;

    fn describe(&self) -> String;
}

/// Result of [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub bytes: Vec<u8>,
    /// Set when stripping failed and `bytes` are the original file.
    pub warning: Option<String>,
}

/// Strips the signature from `path`, falling back to the unmodified bytes.
///
/// Errors only when the file itself cannot be read.
pub fn normalize(stripper: &dyn SignatureStripper, path: &Path) -> Result<Normalized> {
    match stripper.strip(path) {
        Ok(bytes) => Ok(Normalized {
            bytes,
            warning: None,
        }),
        Err(e) => {
            let warning = format!(
                "signature strip of {} via {} failed, comparing raw bytes: {e:#}",
                path.display(),
                stripper.describe()
            );
            warn!("{warning}");
            let bytes = crate::fs_guard::read_validated(path, MAX_HASH_BYTES)?;
            Ok(Normalized {
                bytes,
                warning: Some(warning),
            })
        }
    }
}

// PE/COFF layout offsets.
const DOS_MAGIC: &[u8; 2] = b"MZ";
const PE_MAGIC: &[u8; 4] = b"PE\0\0";
const E_LFANEW_OFFSET: usize = 0x3c;
const COFF_HEADER_LEN: usize = 20;
const OPT_MAGIC_PE32: u16 = 0x10b;
const OPT_MAGIC_PE32_PLUS: u16 = 0x20b;
const CHECKSUM_OFFSET: usize = 64;
const SECURITY_DIR_INDEX: usize = 4;

/// Native Authenticode remover for PE32 and PE32+ images.
#[derive(Debug, Default, Clone, Copy)]
pub struct PeSignatureStripper;

impl PeSignatureStripper {
    pub fn strip_bytes(mut bytes: Vec<u8>) -> Result<Vec<u8>> {
        if bytes.get(..2) != Some(DOS_MAGIC.as_slice()) {
            bail!("not a PE image (missing MZ header)");
        }
        let pe = read_u32(&bytes, E_LFANEW_OFFSET)? as usize;
        if bytes.get(pe..pe + 4) != Some(PE_MAGIC.as_slice()) {
            bail!("not a PE image (missing PE signature at {pe:#x})");
        }
        let coff = pe + 4;
        let opt_len = usize::from(read_u16(&bytes, coff + 16)?);
        let opt = coff + COFF_HEADER_LEN;

        let (rva_count_offset, dirs_offset) = match read_u16(&bytes, opt)? {
            OPT_MAGIC_PE32 => (92, 96),
            OPT_MAGIC_PE32_PLUS => (108, 112),
            other => bail!("unknown optional header magic {other:#x}"),
        };
        // The linker checksum differs between a signed and unsigned image
        // of the same code, so it is cleared on every image.
        write_zeroes(&mut bytes, opt + CHECKSUM_OFFSET, 4)?;

        let rva_count = read_u32(&bytes, opt + rva_count_offset)? as usize;
        let dir = opt + dirs_offset + SECURITY_DIR_INDEX * 8;
        if rva_count <= SECURITY_DIR_INDEX || dir + 8 > opt + opt_len {
            return Ok(bytes);
        }

        let cert_offset = read_u32(&bytes, dir)? as usize;
        let cert_len = read_u32(&bytes, dir + 4)? as usize;
        if cert_offset == 0 && cert_len == 0 {
            return Ok(bytes);
        }
        if cert_offset < opt + opt_len {
            bail!("certificate table at {cert_offset:#x} overlaps the PE headers");
        }
        if cert_offset + cert_len != bytes.len() {
            bail!(
                "certificate table at {cert_offset:#x}+{cert_len:#x} is not at end of file ({:#x})",
                bytes.len()
            );
        }

        bytes.truncate(cert_offset);
        write_zeroes(&mut bytes, dir, 8)?;
        Ok(bytes)
    }
}

impl SignatureStripper for PeSignatureStripper {
    fn strip(&self, path: &Path) -> Result<Vec<u8>> {
        let bytes = crate::fs_guard::read_validated(path, MAX_HASH_BYTES)?;
        Self::strip_bytes(bytes).with_context(|| format!("stripping {}", path.display()))
    }

    fn describe(&self) -> String {
        "native PE stripper".to_string()
    }
}

fn read_u16(b: &[u8], at: usize) -> Result<u16> {
    b.get(at..at + 2)
        .and_then(|s| s.try_into().ok())
        .map(u16::from_le_bytes)
        .ok_or_else(|| anyhow!("truncated PE header at {at:#x}"))
}

fn read_u32(b: &[u8], at: usize) -> Result<u32> {
    b.get(at..at + 4)
        .and_then(|s| s.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| anyhow!("truncated PE header at {at:#x}"))
}

fn write_zeroes(b: &mut [u8], at: usize, len: usize) -> Result<()> {
    b.get_mut(at..at + len)
        .ok_or_else(|| anyhow!("header field at {at:#x} lies inside the stripped region"))?
        .fill(0);
    Ok(())
}

/// Delegates to an external program that writes the stripped file to
/// `{output}`.
#[derive(Debug, Clone)]
pub struct CommandStripper {
    tool: ToolCommand,
}

impl CommandStripper {
    pub fn new(tool: ToolCommand) -> Self {
        Self { tool }
    }
}

impl SignatureStripper for CommandStripper {
    fn strip(&self, path: &Path) -> Result<Vec<u8>> {
        let scratch = tempfile::tempdir().context("creating scratch dir for signature strip")?;
        let output = scratch.path().join("stripped");
        let input = path.to_string_lossy();
        let output_arg = output.to_string_lossy();
        let args = toolcheck::expand_args(
            &self.tool.args,
            &[("input", &*input), ("output", &*output_arg)],
        );
        toolcheck::run_checked(Command::new(&self.tool.program).args(&args), &self.tool.program)?;
        fs::read(&output).with_context(|| format!("{} produced no output", self.tool.program))
    }

    fn describe(&self) -> String {
        self.tool.program.clone()
    }
}

/// Picks the stripper a profile asks for.
pub fn from_profile(tool: Option<&ToolCommand>) -> Box<dyn SignatureStripper> {
    match tool {
        Some(t) => Box::new(CommandStripper::new(t.clone())),
        None => Box::new(PeSignatureStripper),
    }
}
