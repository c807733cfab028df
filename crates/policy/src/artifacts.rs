//! Heuristic detection of files a command is likely to create or modify.

use crate::shell::{split_segments, tokenize, ShellOperator, ShellToken};
use capflow_core::ArtifactOperation;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCandidate {
    /// Path exactly as written in the command.
    pub raw_path: String,
    /// Operation implied by the command itself, if any.
    pub operation: Option<ArtifactOperation>,
}

impl ArtifactCandidate {
    fn new(raw_path: impl Into<String>, operation: Option<ArtifactOperation>) -> Self {
        Self {
            raw_path: raw_path.into(),
            operation,
        }
    }
}

pub fn detect_artifact_candidates(command: &str) -> Vec<ArtifactCandidate> {
    let tokens = tokenize(command);
    let mut found: Vec<ArtifactCandidate> = Vec::new();

    for segment in split_segments(&tokens) {
        let (words, redirects) = split_redirections(segment);
        found.extend(redirects);
        found.extend(program_targets(&words));
    }

    let mut unique: Vec<ArtifactCandidate> = Vec::with_capacity(found.len());
    for candidate in found {
        if candidate.raw_path.is_empty() || candidate.raw_path == "/dev/null" {
            continue;
        }
        if !unique.iter().any(|c| c.raw_path == candidate.raw_path) {
            unique.push(candidate);
        }
    }
    unique
}

/// Decide the reported operation once the command has run. `existed_before`
/// is whether the path was present before execution.
pub fn final_artifact_operation(
    candidate: &ArtifactCandidate,
    existed_before: bool,
) -> Option<ArtifactOperation> {
    if !existed_before {
        return Some(ArtifactOperation::Created);
    }
    match candidate.operation {
        Some(ArtifactOperation::Created) => None,
        Some(op) => Some(op),
        None => Some(ArtifactOperation::Updated),
    }
}

/// Separate plain argument words from redirection targets.
fn split_redirections(segment: &[ShellToken]) -> (Vec<String>, Vec<ArtifactCandidate>) {
    let mut words = Vec::new();
    let mut redirects = Vec::new();
    let mut iter = segment.iter().peekable();

    while let Some(token) = iter.next() {
        match token {
            ShellToken::Word(w) => words.push(w.clone()),
            ShellToken::Op(op) => {
                let target = match iter.peek() {
                    Some(ShellToken::Word(w)) => {
                        let w = w.clone();
                        iter.next();
                        w
                    }
                    _ => continue,
                };
                match op {
                    ShellOperator::RedirectOut => redirects.push(ArtifactCandidate::new(target, None)),
                    ShellOperator::RedirectAppend => redirects.push(ArtifactCandidate::new(
                        target,
                        Some(ArtifactOperation::Updated),
                    )),
                    _ => {}
                }
            }
        }
    }
    (words, redirects)
}

fn program_targets(words: &[String]) -> Vec<ArtifactCandidate> {
    let mut rest = words;
    while let Some(first) = rest.first() {
        if first == "sudo" || is_env_assignment(first) {
            rest = &rest[1..];
        } else {
            break;
        }
    }
    let Some((program, args)) = rest.split_first() else {
        return Vec::new();
    };
    let program = Path::new(program)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(program.as_str());

    match program {
        "touch" => positional(args, &[])
            .into_iter()
            .map(|p| ArtifactCandidate::new(p, None))
            .collect(),
        "mkdir" => positional(args, &["-m", "--mode"])
            .into_iter()
            .map(|p| ArtifactCandidate::new(p, Some(ArtifactOperation::Created)))
            .collect(),
        "tee" => {
            let append = args.iter().any(|a| a == "-a" || a == "--append");
            let op = append.then_some(ArtifactOperation::Updated);
            positional(args, &[])
                .into_iter()
                .map(|p| ArtifactCandidate::new(p, op))
                .collect()
        }
        "cp" | "mv" => copy_destinations(args),
        _ => Vec::new(),
    }
}

fn copy_destinations(args: &[String]) -> Vec<ArtifactCandidate> {
    let mut target_dir: Option<String> = None;
    let mut iter = args.iter();
    let mut operands = Vec::new();
    while let Some(arg) = iter.next() {
        if arg == "-t" || arg == "--target-directory" {
            target_dir = iter.next().cloned();
        } else if let Some(dir) = arg.strip_prefix("--target-directory=") {
            target_dir = Some(dir.to_string());
        } else if !arg.starts_with('-') || arg == "-" {
            operands.push(arg.clone());
        }
    }

    let (dest, sources, into_dir) = match target_dir {
        Some(dir) => (dir, operands, true),
        None => {
            let Some(dest) = operands.pop() else {
                return Vec::new();
            };
            let into_dir = operands.len() > 1 || dest.ends_with('/');
            (dest, operands, into_dir)
        }
    };

    if !into_dir {
        return vec![ArtifactCandidate::new(dest, None)];
    }
    sources
        .iter()
        .filter_map(|src| Path::new(src).file_name().and_then(|n| n.to_str()))
        .map(|name| {
            let joined = format!("{}/{}", dest.trim_end_matches('/'), name);
            ArtifactCandidate::new(joined, None)
        })
        .collect()
}

/// Non-flag arguments, skipping the values of the listed flags.
fn positional(args: &[String], flags_with_value: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if flags_with_value.contains(&arg.as_str()) {
            iter.next();
        } else if !arg.starts_with('-') {
            out.push(arg.clone());
        }
    }
    out
}

fn is_env_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !name.starts_with(|c: char| c.is_ascii_digit())
        }
        None => false,
    }
}
