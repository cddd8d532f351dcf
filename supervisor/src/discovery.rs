//! Backend discovery.
//!
//! Both the native executable and the script fallback are found the same way:
//! join a file name onto an ordered list of roots and take the first candidate
//! that exists.

use crate::config::SupervisorConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A script entry point and the directory it must run from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptLocation {
    pub dir: PathBuf,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Executable,
    Script,
}

impl std::fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CandidateKind::Executable => write!(f, "executable"),
            CandidateKind::Script => write!(f, "script"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub kind: CandidateKind,
    pub path: PathBuf,
    pub exists: bool,
}

/// `roots` joined with `file_name`, order preserved.
pub fn candidates(roots: &[PathBuf], file_name: &str) -> Vec<PathBuf> {
    roots.iter().map(|root| root.join(file_name)).collect()
}

/// First candidate that exists as a file, in list order.
pub fn locate_first(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates
        .iter()
        .inspect(|path| debug!("Checking {}", path.display()))
        .find(|path| path.is_file())
        .cloned()
}

pub fn locate_executable(config: &SupervisorConfig) -> Option<PathBuf> {
    let roots = config.search_paths().executable_roots;
    locate_first(&candidates(&roots, &config.executable_name))
}

pub fn locate_script(config: &SupervisorConfig) -> Option<ScriptLocation> {
    let roots = config.search_paths().script_roots;
    let path = locate_first(&candidates(&roots, &config.script_name))?;
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    Some(ScriptLocation { dir, path })
}

/// Every candidate location in search order, executables first.
pub fn list_candidates(config: &SupervisorConfig) -> Vec<Candidate> {
    let paths = config.search_paths();
    let executables = candidates(&paths.executable_roots, &config.executable_name)
        .into_iter()
        .map(|path| (CandidateKind::Executable, path));
    let scripts = candidates(&paths.script_roots, &config.script_name)
        .into_iter()
        .map(|path| (CandidateKind::Script, path));

    executables
        .chain(scripts)
        .map(|(kind, path)| Candidate {
            kind,
            exists: path.is_file(),
            path,
        })
        .collect()
}
