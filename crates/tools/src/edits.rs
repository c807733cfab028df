//! Deterministic edit language applied to a document's flattened text.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DocumentEdit {
    ReplaceText {
        find: String,
        replace: String,
        #[serde(default)]
        all: bool,
    },
    AppendParagraph {
        text: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditFailure {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditReport {
    pub applied_count: usize,
    pub replacements: usize,
    pub failures: Vec<EditFailure>,
}

/// Apply raw edit objects in order. Malformed or non-matching edits are
/// reported and skipped; the rest still apply.
pub fn apply_edits(text: &mut String, edits: &[Value]) -> EditReport {
    let mut report = EditReport::default();

    for (index, raw) in edits.iter().enumerate() {
        let edit: DocumentEdit = match serde_json::from_value(raw.clone()) {
            Ok(edit) => edit,
            Err(e) => {
                report.failures.push(EditFailure {
                    index,
                    reason: format!("Malformed edit: {}", e),
                });
                continue;
            }
        };
        match apply_one(text, &edit) {
            Ok(replaced) => {
                report.applied_count += 1;
                report.replacements += replaced;
            }
            Err(reason) => report.failures.push(EditFailure { index, reason }),
        }
    }
    report
}

fn apply_one(text: &mut String, edit: &DocumentEdit) -> Result<usize, String> {
    match edit {
        DocumentEdit::ReplaceText { find, replace, all } => {
            if find.is_empty() {
                return Err("replace_text requires a non-empty 'find'".to_string());
            }
            let found = text.matches(find.as_str()).count();
            if found == 0 {
                return Err(format!("Text not found: {:?}", find));
            }
            if *all {
                *text = text.replace(find.as_str(), replace);
                Ok(found)
            } else {
                *text = text.replacen(find.as_str(), replace, 1);
                Ok(1)
            }
        }
        DocumentEdit::AppendParagraph { text: paragraph } => {
            let paragraph = paragraph.trim_end_matches('\n');
            if paragraph.trim().is_empty() {
                return Err("append_paragraph requires non-empty 'text'".to_string());
            }
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(paragraph);
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_replace_first_and_all() {
        let mut text = "cat cat cat".to_string();
        let report = apply_edits(
            &mut text,
            &[json!({"op": "replace_text", "find": "cat", "replace": "dog"})],
        );
        assert_eq!(text, "dog cat cat");
        assert_eq!(report.applied_count, 1);
        assert_eq!(report.replacements, 1);

        let report = apply_edits(
            &mut text,
            &[json!({"op": "replace_text", "find": "cat", "replace": "dog", "all": true})],
        );
        assert_eq!(text, "dog dog dog");
        assert_eq!(report.replacements, 2);
    }

    #[test]
    fn test_failures_do_not_block_later_edits() {
        let mut text = "Intro".to_string();
        let report = apply_edits(
            &mut text,
            &[
                json!({"op": "replace_text", "find": "missing", "replace": "x"}),
                json!({"op": "rotate_page"}),
                json!({"op": "append_paragraph", "text": "Closing words"}),
            ],
        );
        assert_eq!(text, "Intro\nClosing words");
        assert_eq!(report.applied_count, 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].index, 0);
        assert_eq!(report.failures[1].index, 1);
    }

    #[test]
    fn test_report_wire_shape() {
        let report = EditReport {
            applied_count: 1,
            replacements: 3,
            failures: vec![],
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["appliedCount"], json!(1));
        assert_eq!(value["replacements"], json!(3));
    }
}
