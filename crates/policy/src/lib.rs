pub mod approval;
pub mod artifacts;
pub mod boundary;
pub mod error;
pub mod risk;
pub mod shell;

pub use approval::StaticApprovalGate;
pub use artifacts::{detect_artifact_candidates, final_artifact_operation, ArtifactCandidate};
pub use boundary::{
    canonical_root, check_command_boundary, is_within_workspace, normalize_lexically,
    resolve_within_workspace, BoundaryCheck,
};
pub use error::SandboxError;
pub use risk::{assess_command_risk, classify_command_risk, RiskAssessment};
pub use shell::{
    has_shell_expansion, split_segments, split_words, tokenize, ShellOperator, ShellToken,
};
