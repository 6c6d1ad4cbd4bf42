//! Extraction helpers for the downloaded table archive.
//!
//! The archive contains one file per requested state, named
//! `<prefix><STATE><version>.csv`; the command layer hands a single
//! state's file out on demand.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;
use zip::ZipArchive;

/// File-name prefix shared by every per-state member.
pub const MEMBER_PREFIX: &str = "TabelaIBPTax";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to open archive {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("archive {path} is not a readable zip: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("archive {path} has no member for state `{state}`")]
    MemberMissing { path: PathBuf, state: String },
    #[error("failed to write extracted member {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Extract the single per-state member into `dest_dir`, returning the
/// extracted file's path.
pub fn extract_state_member(
    archive_path: &Path,
    state: &str,
    dest_dir: &Path,
) -> Result<PathBuf, ArchiveError> {
    let file = File::open(archive_path).map_err(|source| ArchiveError::Open {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let mut archive = ZipArchive::new(file).map_err(|source| ArchiveError::Zip {
        path: archive_path.to_path_buf(),
        source,
    })?;

    let wanted = format!("{MEMBER_PREFIX}{}", state.to_uppercase());
    let mut member_name = None;
    for idx in 0..archive.len() {
        let name = archive
            .by_index(idx)
            .map_err(|source| ArchiveError::Zip {
                path: archive_path.to_path_buf(),
                source,
            })?
            .name()
            .to_string();
        if member_file_name(&name).starts_with(&wanted) {
            member_name = Some(name);
            break;
        }
    }
    let member_name = member_name.ok_or_else(|| ArchiveError::MemberMissing {
        path: archive_path.to_path_buf(),
        state: state.to_string(),
    })?;

    let mut member = archive
        .by_name(&member_name)
        .map_err(|source| ArchiveError::Zip {
            path: archive_path.to_path_buf(),
            source,
        })?;

    let out_path = dest_dir.join(member_file_name(&member_name));
    std::fs::create_dir_all(dest_dir).map_err(|source| ArchiveError::Write {
        path: dest_dir.to_path_buf(),
        source,
    })?;
    let mut out = File::create(&out_path).map_err(|source| ArchiveError::Write {
        path: out_path.clone(),
        source,
    })?;
    io::copy(&mut member, &mut out).map_err(|source| ArchiveError::Write {
        path: out_path.clone(),
        source,
    })?;

    info!(
        state,
        member = %member_name,
        path = %out_path.display(),
        "state member extracted"
    );
    Ok(out_path)
}

fn member_file_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
