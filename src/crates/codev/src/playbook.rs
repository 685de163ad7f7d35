//! Category-keyed repair playbook
//!
//! On an ITERATE verdict the next planning prompt receives, alongside the
//! raw verdict block, a fixed repair instruction keyed by the verdict
//! category. The table is stateless and consulted identically on every
//! iteration.

use crate::contracts::VerdictCategory;

/// Repair instruction injected into the next plan prompt.
pub fn playbook_entry(category: VerdictCategory) -> &'static str {
    match category {
        VerdictCategory::Credential => {
            "Verify the credential is bound at BOTH data.credential and \
             data.inputs.credential on the affected node, and re-resolve the \
             credential id by its credential type before binding."
        }
        VerdictCategory::Structure => {
            "Run the pre-flight graph validator before any write. Enforce the \
             minimum payload shape {nodes: [], edges: []} and confirm every \
             node carries its required data sections."
        }
        VerdictCategory::Logic => {
            "Scope the change to the specific failing node or parameter named \
             in the test output; do not rebuild unrelated parts of the graph."
        }
        VerdictCategory::Incomplete => {
            "Verify the target graph has deployed=true and that the edit is \
             applied to the correct target graph id."
        }
    }
}

/// The verdict block plus playbook entry, formatted for prompt injection.
pub fn iterate_guidance(
    category: VerdictCategory,
    reason: Option<&str>,
    fix: Option<&str>,
) -> String {
    format!(
        "Previous iteration verdict:\nCategory: {}\nReason: {}\nFix: {}\n\nRepair playbook: {}",
        category.as_str(),
        reason.unwrap_or("unspecified"),
        fix.unwrap_or("unspecified"),
        playbook_entry(category),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_category_has_an_entry() {
        for category in [
            VerdictCategory::Credential,
            VerdictCategory::Structure,
            VerdictCategory::Logic,
            VerdictCategory::Incomplete,
        ] {
            assert!(!playbook_entry(category).is_empty());
        }
    }

    #[test]
    fn guidance_includes_verdict_and_playbook() {
        let guidance = iterate_guidance(
            VerdictCategory::Credential,
            Some("only one slot bound"),
            Some("bind both slots"),
        );
        assert!(guidance.contains("Category: CREDENTIAL"));
        assert!(guidance.contains("only one slot bound"));
        assert!(guidance.contains("data.inputs.credential"));
    }
}
