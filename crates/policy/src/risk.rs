//! Command risk classification.
//!
//! Pattern based and deliberately conservative: anything that looks
//! destructive is high, anything that mutates the filesystem or reaches the
//! network is medium.

use crate::shell::{tokenize, ShellToken};
use capflow_core::RiskLevel;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

const HIGH_RISK_PATTERNS: &[(&str, &str)] = &[
    (r"\brm\s+(-[a-z]*r[a-z]*\b|.*\s-[a-z]*r[a-z]*\b|.*--recursive\b|--recursive\b)", "recursive delete"),
    (r"\b(mkfs(\.\w+)?|fdisk|sfdisk|parted|wipefs)\b", "disk format"),
    (r"\bdiskutil\s+(erase\w*|partition\w*)\b", "disk format"),
    (r"\bformat\s+[a-z]:", "disk format"),
    (r"\bdd\b.*\bof=", "device write"),
    (r">\s*/dev/(sd|hd|nvme|disk|mmcblk)", "device write"),
    (r"\b(shutdown|reboot|halt|poweroff)\b", "shutdown or reboot"),
    (r"\binit\s+[06]\b", "shutdown or reboot"),
    (r"\bchown\b", "ownership change"),
    (r"\bsudo\b", "privilege escalation"),
    (r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:", "fork bomb"),
];

const MEDIUM_RISK_PATTERNS: &[(&str, &str)] = &[
    (r"\b(rm|rmdir|unlink)\b", "delete"),
    (r"\b(mv|rename)\b", "move"),
    (r"\b(cp|rsync|scp)\b", "copy"),
    (r"\b(touch|mkdir|tee)\b", "create"),
    (r"\bln\b", "link creation"),
    (r"\bchmod\b", "permission change"),
    (r"\b(curl|wget)\b", "network fetch"),
    (r"\bgit\s+push\b", "remote push"),
    (r"\bsed\s+(.*\s)?-i", "in-place edit"),
    (r"\b(npm|pnpm|yarn|pip3?|cargo|apt(-get)?|brew|gem)\s+(install|add|remove|uninstall)\b", "package install"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub reason: String,
}

struct RiskClassifier {
    high: Vec<(Regex, &'static str)>,
    medium: Vec<(Regex, &'static str)>,
}

impl RiskClassifier {
    fn compile(patterns: &[(&str, &'static str)]) -> Vec<(Regex, &'static str)> {
        patterns
            .iter()
            .filter_map(|(pattern, label)| match Regex::new(&format!("(?i){}", pattern)) {
                Ok(re) => Some((re, *label)),
                Err(e) => {
                    tracing::error!(pattern, error = %e, "Invalid risk pattern");
                    None
                }
            })
            .collect()
    }

    fn get() -> &'static RiskClassifier {
        static CLASSIFIER: OnceLock<RiskClassifier> = OnceLock::new();
        CLASSIFIER.get_or_init(|| RiskClassifier {
            high: Self::compile(HIGH_RISK_PATTERNS),
            medium: Self::compile(MEDIUM_RISK_PATTERNS),
        })
    }
}

pub fn classify_command_risk(command: &str) -> RiskLevel {
    assess_command_risk(command).level
}

pub fn assess_command_risk(command: &str) -> RiskAssessment {
    let classifier = RiskClassifier::get();

    if let Some((_, label)) = classifier.high.iter().find(|(re, _)| re.is_match(command)) {
        return RiskAssessment {
            level: RiskLevel::High,
            reason: format!("High-risk command ({})", label),
        };
    }
    if let Some((_, label)) = classifier.medium.iter().find(|(re, _)| re.is_match(command)) {
        return RiskAssessment {
            level: RiskLevel::Medium,
            reason: format!("Command may modify files or state ({})", label),
        };
    }
    if writes_redirect(command) {
        return RiskAssessment {
            level: RiskLevel::Medium,
            reason: "Command may modify files or state (output redirection)".to_string(),
        };
    }

    RiskAssessment {
        level: RiskLevel::Low,
        reason: "Read-only command".to_string(),
    }
}

/// True when some `>`/`>>` redirection targets a real file.
fn writes_redirect(command: &str) -> bool {
    let tokens = tokenize(command);
    tokens.windows(2).any(|pair| match pair {
        [ShellToken::Op(op), ShellToken::Word(target)] => op.writes_target() && target != "/dev/null",
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_examples() {
        assert_eq!(classify_command_risk("rm -rf /tmp/x"), RiskLevel::High);
        assert_eq!(classify_command_risk("rm draft.txt"), RiskLevel::Medium);
        assert_eq!(classify_command_risk("ls"), RiskLevel::Low);
    }

    #[test]
    fn test_high_risk() {
        for cmd in [
            "rm -r build",
            "rm -fR build",
            "rm build --recursive",
            "mkfs.ext4 /dev/sdb1",
            "dd if=/dev/zero of=/dev/sda bs=1M",
            "echo x > /dev/sda",
            "sudo apt update",
            "chown -R me:me .",
            "shutdown -h now",
            "init 0",
            ":(){ :|:& };:",
        ] {
            assert_eq!(classify_command_risk(cmd), RiskLevel::High, "{}", cmd);
        }
    }

    #[test]
    fn test_medium_risk() {
        for cmd in [
            "mv a.txt b.txt",
            "cp a.txt b.txt",
            "touch new.txt",
            "mkdir -p out",
            "chmod +x run.sh",
            "curl -O https://example.com/file",
            "git push origin main",
            "sed -i 's/a/b/' file.txt",
            "npm install left-pad",
            "printf 'hello' > hello.txt",
            "echo more >> log.txt",
        ] {
            assert_eq!(classify_command_risk(cmd), RiskLevel::Medium, "{}", cmd);
        }
    }

    #[test]
    fn test_low_risk() {
        for cmd in [
            "ls -la",
            "cat README.md",
            "grep -rn TODO src",
            "find . -name '*.rs' 2>/dev/null",
            "echo 'a > b'",
            "git status",
            "wc -l notes.txt",
        ] {
            assert_eq!(classify_command_risk(cmd), RiskLevel::Low, "{}", cmd);
        }
    }

    #[test]
    fn test_assessment_reason() {
        let assessment = assess_command_risk("rm -rf dist");
        assert!(assessment.reason.contains("recursive delete"));
    }
}
