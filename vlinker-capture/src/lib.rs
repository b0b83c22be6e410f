pub mod analysis;
pub mod journal;
pub mod profile;
pub mod time;

pub use crate::analysis::{Candidate, analyze_capture, propose_from_seed};
pub use crate::journal::{
    CancellationToken, CaptureRecord, Direction, find_seed_requests, parse_capture_file, run_capture,
    write_header,
};
pub use crate::profile::{
    Profile, ProfileBuildRequest, ProfileBuildResult, ProfileError, build_profile, builtin_profiles,
    get_profile,
};
