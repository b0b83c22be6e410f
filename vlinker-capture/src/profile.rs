//! Named ECU profiles: a small registry pairing a profile name with an
//! optional seed→key [`Transform`], so `security_access_with_profile` can
//! be driven by name from the CLI instead of requiring a transform literal
//! on every call.

use std::path::{Path, PathBuf};

use facet::Facet;
use thiserror::Error;
use vlinker_uds::Transform;

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Profile {
    pub name: String,
    pub transform: Option<Transform>,
    pub notes: String,
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("unrecognised algo {0:?} (expected identity, reverse, rotate:N, xor:HH, or repeating_xor:HEX)")]
    UnknownAlgo(String),
    #[error("rotate amount must be 1..=7, got {0}")]
    RotateOutOfRange(u8),
    #[error("algo argument was not valid hex: {0}")]
    InvalidHex(String),
    #[error("{path} already exists; pass force to overwrite")]
    AlreadyExists { path: String },
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialise profile: {0}")]
    Serialize(String),
}

/// Parse a CLI `--algo` string into a [`Transform`]. `"none"` means a
/// manual profile with no automatic key computation.
fn parse_algo(algo: &str) -> Result<Option<Transform>, ProfileError> {
    if algo.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    if algo.eq_ignore_ascii_case("identity") {
        return Ok(Some(Transform::Identity));
    }
    if algo.eq_ignore_ascii_case("reverse") {
        return Ok(Some(Transform::Reverse));
    }
    if let Some(n) = algo.strip_prefix("rotate:") {
        let n: u8 = n.parse().map_err(|_| ProfileError::UnknownAlgo(algo.to_string()))?;
        if !(1..=7).contains(&n) {
            return Err(ProfileError::RotateOutOfRange(n));
        }
        return Ok(Some(Transform::RotateLeft(n)));
    }
    if let Some(h) = algo.strip_prefix("xor:") {
        let bytes = hex::decode(h).map_err(|_| ProfileError::InvalidHex(h.to_string()))?;
        let &[c] = bytes.as_slice() else {
            return Err(ProfileError::InvalidHex(h.to_string()));
        };
        return Ok(Some(Transform::XorConstant(c)));
    }
    if let Some(h) = algo.strip_prefix("repeating_xor:") {
        let bytes = hex::decode(h).map_err(|_| ProfileError::InvalidHex(h.to_string()))?;
        return Ok(Some(Transform::RepeatingXor(bytes)));
    }
    Err(ProfileError::UnknownAlgo(algo.to_string()))
}

pub struct ProfileBuildRequest {
    pub path: PathBuf,
    pub name: String,
    pub algo: String,
    pub dry_run: bool,
    pub force: bool,
}

#[derive(Debug, Clone, Facet)]
pub struct ProfileBuildResult {
    pub preview: String,
    pub profile_path: String,
    pub written: bool,
}

/// Build a [`Profile`] from a name and `--algo` string, preview its JSON
/// rendering, and (unless `dry_run`) write it to `path` — refusing to
/// overwrite an existing file unless `force` is set. Mirrors the
/// dedicated-writer-thread pattern of [`crate::journal`]'s audit sink only
/// in spirit: this is a one-shot write, not a channel, since `profile
/// build` is a single CLI invocation rather than a long-running service.
pub fn build_profile(req: &ProfileBuildRequest) -> Result<ProfileBuildResult, ProfileError> {
    let transform = parse_algo(&req.algo)?;
    let profile = Profile {
        name: req.name.clone(),
        transform,
        notes: format!("built via `profile build` (algo={})", req.algo),
    };
    let preview = facet_json::to_string(&profile).map_err(|e| ProfileError::Serialize(e.to_string()))?;
    let profile_path = req.path.to_string_lossy().into_owned();

    if req.dry_run {
        return Ok(ProfileBuildResult {
            preview,
            profile_path,
            written: false,
        });
    }

    if !req.force && Path::new(&req.path).exists() {
        return Err(ProfileError::AlreadyExists { path: profile_path });
    }

    std::fs::write(&req.path, &preview).map_err(|source| ProfileError::Io {
        path: profile_path.clone(),
        source,
    })?;

    Ok(ProfileBuildResult {
        preview,
        profile_path,
        written: true,
    })
}

pub fn builtin_profiles() -> Vec<Profile> {
    vec![
        Profile {
            name: "vw_generic".to_string(),
            transform: Some(Transform::Reverse),
            notes: "demo profile: reverses the seed bytes".to_string(),
        },
        Profile {
            name: "manual".to_string(),
            transform: None,
            notes: "no automatic key computation; seed is returned for manual entry".to_string(),
        },
        Profile {
            name: "bosch_demo".to_string(),
            transform: Some(Transform::XorConstant(0x5A)),
            notes: "demo profile: XORs the seed with 0x5A".to_string(),
        },
        Profile {
            name: "siemens_demo".to_string(),
            transform: Some(Transform::Reverse),
            notes: "demo profile: reverses the seed bytes".to_string(),
        },
    ]
}

pub fn get_profile(name: &str) -> Option<Profile> {
    builtin_profiles().into_iter().find(|p| p.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_builtin_profile_by_name() {
        let profile = get_profile("bosch_demo").unwrap();
        assert_eq!(profile.transform, Some(Transform::XorConstant(0x5A)));
    }

    #[test]
    fn unknown_profile_is_none() {
        assert!(get_profile("does_not_exist").is_none());
    }

    #[test]
    fn every_builtin_profile_name_is_unique() {
        let names: std::collections::HashSet<_> =
            builtin_profiles().into_iter().map(|p| p.name).collect();
        assert_eq!(names.len(), builtin_profiles().len());
    }

    #[test]
    fn dry_run_never_touches_disk() {
        let dir = std::env::temp_dir().join("vlinker-profile-dry-run-test");
        let result = build_profile(&ProfileBuildRequest {
            path: dir.clone(),
            name: "test_profile".to_string(),
            algo: "xor:5A".to_string(),
            dry_run: true,
            force: false,
        })
        .unwrap();
        assert!(!result.written);
        assert!(!dir.exists());
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let path = std::env::temp_dir().join("vlinker-profile-overwrite-test.json");
        std::fs::write(&path, "existing").unwrap();
        let err = build_profile(&ProfileBuildRequest {
            path: path.clone(),
            name: "test_profile".to_string(),
            algo: "reverse".to_string(),
            dry_run: false,
            force: false,
        })
        .unwrap_err();
        assert!(matches!(err, ProfileError::AlreadyExists { .. }));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn unknown_algo_is_rejected() {
        assert!(matches!(parse_algo("not_a_real_algo"), Err(ProfileError::UnknownAlgo(_))));
    }

    #[test]
    fn rotate_out_of_range_is_rejected() {
        assert!(matches!(parse_algo("rotate:9"), Err(ProfileError::RotateOutOfRange(9))));
    }
}
