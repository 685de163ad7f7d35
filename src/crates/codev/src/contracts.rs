//! Structured contracts parsed from LLM output
//!
//! Planning, testing and evaluation all exchange structured blocks with the
//! reasoning model: the model is instructed to end its answer with a
//! keyword block, and these parsers lift the block into typed values. The
//! parsers are forgiving about surrounding prose but strict about the
//! fields themselves; unparseable output surfaces as
//! [`CodevError::MalformedLlmOutput`].

use crate::error::{CodevError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Parsed, structured form of the plan markdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanContract {
    pub goal: String,
    pub domain_targets: Vec<String>,
    pub credential_requirements: Vec<String>,
    pub data_fields: Vec<String>,
    pub pii_fields: Vec<String>,
    pub success_criteria: Vec<String>,
    /// CREATE or UPDATE, echoed from the classified intent
    pub action: String,
    /// Full plan markdown as produced by the model
    pub raw_plan: String,
}

/// How a test case picks its chat session id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionIdStrategy {
    /// New session per trial; no memory carry-over
    #[default]
    Fresh,
    /// One session shared across the suite, exercising memory
    Shared,
}

/// Expected outcome of a prediction call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpectedPredicate {
    /// Response text is non-empty
    NonEmpty,
    /// Response contains the given substring (case-insensitive)
    Contains { needle: String },
    /// Response matches the given regex
    Matches { pattern: String },
}

impl ExpectedPredicate {
    pub fn evaluate(&self, response: &str) -> bool {
        match self {
            Self::NonEmpty => !response.trim().is_empty(),
            Self::Contains { needle } => response
                .to_ascii_lowercase()
                .contains(&needle.to_ascii_lowercase()),
            Self::Matches { pattern } => Regex::new(pattern)
                .map(|re| re.is_match(response))
                .unwrap_or(false),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::NonEmpty => "response length > 0".to_string(),
            Self::Contains { needle } => format!("response contains '{}'", needle),
            Self::Matches { pattern } => format!("response matches /{}/", pattern),
        }
    }
}

/// A single prediction scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub prompt: String,
    pub expected: ExpectedPredicate,
    #[serde(default)]
    pub session_id_strategy: SessionIdStrategy,
}

/// Scenarios executed against the live graph after apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSuite {
    pub cases: Vec<TestCase>,
    #[serde(default)]
    pub integration_tests: Vec<String>,
    #[serde(default)]
    pub domain_scopes: Vec<String>,
    /// Trials per case; a case passes only if all k trials pass
    #[serde(default = "default_trials")]
    pub trials_k: u32,
}

fn default_trials() -> u32 {
    1
}

/// Observed outcome of one trial of one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub case_prompt: String,
    pub trial: u32,
    pub passed: bool,
    /// First 300 chars of the raw response
    pub response_excerpt: String,
    pub latency_ms: u64,
}

/// Evaluator decision status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerdictStatus {
    Done,
    Iterate,
}

/// Failure category attached to ITERATE verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerdictCategory {
    Credential,
    Structure,
    Logic,
    Incomplete,
}

impl VerdictCategory {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CREDENTIAL" => Some(Self::Credential),
            "STRUCTURE" => Some(Self::Structure),
            "LOGIC" => Some(Self::Logic),
            "INCOMPLETE" => Some(Self::Incomplete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credential => "CREDENTIAL",
            Self::Structure => "STRUCTURE",
            Self::Logic => "LOGIC",
            Self::Incomplete => "INCOMPLETE",
        }
    }
}

/// Structured DONE/ITERATE decision from the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergeVerdict {
    pub status: VerdictStatus,
    pub category: Option<VerdictCategory>,
    pub reason: Option<String>,
    pub fix: Option<String>,
    /// One entry per plan success criterion
    pub criteria_pass_map: Vec<(String, bool)>,
}

impl ConvergeVerdict {
    pub fn done(criteria_pass_map: Vec<(String, bool)>) -> Self {
        Self {
            status: VerdictStatus::Done,
            category: None,
            reason: None,
            fix: None,
            criteria_pass_map,
        }
    }

    pub fn iterate(
        category: VerdictCategory,
        reason: impl Into<String>,
        fix: impl Into<String>,
        criteria_pass_map: Vec<(String, bool)>,
    ) -> Self {
        Self {
            status: VerdictStatus::Iterate,
            category: Some(category),
            reason: Some(reason.into()),
            fix: Some(fix.into()),
            criteria_pass_map,
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == VerdictStatus::Done
    }
}

/// Clarify-node self assessment.
#[derive(Debug, Clone, PartialEq)]
pub struct AmbiguityAssessment {
    /// 0..10; 5 and above triggers the clarification interrupt
    pub score: u8,
    pub questions: Vec<String>,
}

/// Credential status block embedded in the discovery summary.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialsStatus {
    pub missing: bool,
    pub missing_types: Vec<String>,
}

fn keyword_line<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    text.lines().find_map(|line| {
        let trimmed = line.trim();
        trimmed
            .strip_prefix(keyword)
            .and_then(|rest| rest.strip_prefix(':'))
            .map(str::trim)
    })
}

fn keyword_list(text: &str, keyword: &str) -> Vec<String> {
    keyword_line(text, keyword)
        .map(|value| {
            value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty() && s != "-" && s.to_ascii_lowercase() != "none")
                .collect()
        })
        .unwrap_or_default()
}

/// Bullet items following a `KEYWORD:` line, until the next keyword line.
fn keyword_bullets(text: &str, keyword: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut in_section = false;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with(keyword) && trimmed[keyword.len()..].trim_start().starts_with(':') {
            in_section = true;
            continue;
        }
        if in_section {
            if let Some(item) = trimmed.strip_prefix('-') {
                items.push(item.trim().to_string());
            } else if !trimmed.is_empty() {
                break;
            }
        }
    }
    items
}

/// Parse the structured contract block out of the plan markdown.
pub fn parse_plan_contract(plan_text: &str, action: &str) -> Result<PlanContract> {
    let goal = keyword_line(plan_text, "GOAL")
        .ok_or_else(|| CodevError::MalformedLlmOutput("plan missing GOAL line".to_string()))?
        .to_string();

    let success_criteria = keyword_bullets(plan_text, "SUCCESS_CRITERIA");
    if success_criteria.is_empty() {
        return Err(CodevError::MalformedLlmOutput(
            "plan missing SUCCESS_CRITERIA bullets".to_string(),
        ));
    }

    Ok(PlanContract {
        goal,
        domain_targets: {
            let targets = keyword_list(plan_text, "DOMAIN_TARGETS");
            if targets.is_empty() {
                vec!["flowise".to_string()]
            } else {
                targets
            }
        },
        credential_requirements: keyword_list(plan_text, "CREDENTIAL_REQUIREMENTS"),
        data_fields: keyword_list(plan_text, "DATA_FIELDS"),
        pii_fields: keyword_list(plan_text, "PII_FIELDS"),
        success_criteria,
        action: keyword_line(plan_text, "ACTION")
            .unwrap_or(action)
            .to_string(),
        raw_plan: plan_text.to_string(),
    })
}

/// Parse the evaluator's verdict block.
pub fn parse_verdict(text: &str, criteria: &[String]) -> Result<ConvergeVerdict> {
    let status_raw = keyword_line(text, "VERDICT")
        .ok_or_else(|| CodevError::MalformedLlmOutput("verdict missing VERDICT line".to_string()))?;
    let status = match status_raw.to_ascii_uppercase().as_str() {
        "DONE" => VerdictStatus::Done,
        "ITERATE" => VerdictStatus::Iterate,
        other => {
            return Err(CodevError::MalformedLlmOutput(format!(
                "VERDICT must be DONE or ITERATE, got '{}'",
                other
            )))
        }
    };

    let category = keyword_line(text, "CATEGORY").and_then(VerdictCategory::parse);
    if status == VerdictStatus::Iterate && category.is_none() {
        return Err(CodevError::MalformedLlmOutput(
            "ITERATE verdict missing CATEGORY".to_string(),
        ));
    }

    // criteria marks: "- [pass] criterion" / "- [fail] criterion"
    let mut criteria_pass_map = Vec::new();
    for item in keyword_bullets(text, "CRITERIA") {
        let (mark, rest) = if let Some(rest) = item.strip_prefix("[pass]") {
            (true, rest)
        } else if let Some(rest) = item.strip_prefix("[fail]") {
            (false, rest)
        } else {
            continue;
        };
        criteria_pass_map.push((rest.trim().to_string(), mark));
    }

    // every plan criterion must appear in the map; absent ones count failed
    for criterion in criteria {
        if !criteria_pass_map.iter().any(|(c, _)| c == criterion) {
            criteria_pass_map.push((criterion.clone(), false));
        }
    }

    Ok(ConvergeVerdict {
        status,
        category,
        reason: keyword_line(text, "REASON").map(str::to_string),
        fix: keyword_line(text, "FIX").map(str::to_string),
        criteria_pass_map,
    })
}

/// Parse the clarify node's ambiguity assessment.
pub fn parse_ambiguity(text: &str) -> Result<AmbiguityAssessment> {
    let score_raw = keyword_line(text, "SCORE").ok_or_else(|| {
        CodevError::MalformedLlmOutput("clarify output missing SCORE line".to_string())
    })?;
    let score: u8 = score_raw.parse().map_err(|_| {
        CodevError::MalformedLlmOutput(format!("SCORE must be an integer 0..10, got '{}'", score_raw))
    })?;
    if score > 10 {
        return Err(CodevError::MalformedLlmOutput(format!(
            "SCORE must be 0..10, got {}",
            score
        )));
    }

    Ok(AmbiguityAssessment {
        score,
        questions: keyword_bullets(text, "QUESTIONS"),
    })
}

/// Parse the `CREDENTIALS_STATUS` block out of the discovery summary.
pub fn parse_credentials_status(summary: &str) -> CredentialsStatus {
    let missing = keyword_line(summary, "CREDENTIALS_STATUS")
        .map(|v| v.eq_ignore_ascii_case("missing"))
        .unwrap_or(false);
    CredentialsStatus {
        missing,
        missing_types: keyword_list(summary, "MISSING_TYPES"),
    }
}

/// Extract a JSON value from LLM output that may wrap it in prose or a
/// code fence.
pub fn extract_json(text: &str) -> Result<serde_json::Value> {
    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Ok(value);
    }

    // fenced block first
    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            if let Ok(value) = serde_json::from_str(after[..end].trim()) {
                return Ok(value);
            }
        }
    }

    // widest bracketed span
    for (open, close) in [('[', ']'), ('{', '}')] {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
            if end > start {
                if let Ok(value) = serde_json::from_str(text[start..=end].trim()) {
                    return Ok(value);
                }
            }
        }
    }

    Err(CodevError::MalformedLlmOutput(
        "no parseable JSON in model output".to_string(),
    ))
}

/// Parse the intent classification block.
pub fn parse_intent(text: &str) -> Result<(String, Option<String>)> {
    let intent = keyword_line(text, "INTENT")
        .ok_or_else(|| CodevError::MalformedLlmOutput("missing INTENT line".to_string()))?
        .to_ascii_uppercase();
    if intent != "CREATE" && intent != "UPDATE" {
        return Err(CodevError::MalformedLlmOutput(format!(
            "INTENT must be CREATE or UPDATE, got '{}'",
            intent
        )));
    }
    let target = keyword_line(text, "TARGET")
        .map(str::to_string)
        .filter(|t| !t.is_empty() && t.to_ascii_lowercase() != "none");
    Ok((intent, target))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = "\
Here is the plan.

GOAL: Build an echo chat graph
ACTION: CREATE
DOMAIN_TARGETS: flowise
CREDENTIAL_REQUIREMENTS: openAIApi
DATA_FIELDS: message
PII_FIELDS: none
SUCCESS_CRITERIA:
- response length > 0
- graph validates
";

    #[test]
    fn plan_contract_parses_block() {
        let contract = parse_plan_contract(PLAN, "CREATE").unwrap();
        assert_eq!(contract.goal, "Build an echo chat graph");
        assert_eq!(contract.action, "CREATE");
        assert_eq!(contract.credential_requirements, vec!["openAIApi"]);
        assert!(contract.pii_fields.is_empty());
        assert_eq!(contract.success_criteria.len(), 2);
        assert_eq!(contract.raw_plan, PLAN);
    }

    #[test]
    fn plan_without_criteria_is_malformed() {
        assert!(matches!(
            parse_plan_contract("GOAL: x\n", "CREATE"),
            Err(CodevError::MalformedLlmOutput(_))
        ));
    }

    #[test]
    fn verdict_parses_with_criteria_marks() {
        let text = "\
VERDICT: ITERATE
CATEGORY: CREDENTIAL
REASON: credential only bound on one slot
FIX: bind data.credential as well
CRITERIA:
- [pass] response length > 0
- [fail] graph validates
";
        let criteria = vec![
            "response length > 0".to_string(),
            "graph validates".to_string(),
        ];
        let verdict = parse_verdict(text, &criteria).unwrap();
        assert_eq!(verdict.status, VerdictStatus::Iterate);
        assert_eq!(verdict.category, Some(VerdictCategory::Credential));
        assert_eq!(
            verdict.criteria_pass_map,
            vec![
                ("response length > 0".to_string(), true),
                ("graph validates".to_string(), false),
            ]
        );
    }

    #[test]
    fn verdict_fills_missing_criteria_as_failed() {
        let text = "VERDICT: DONE\nCRITERIA:\n- [pass] a\n";
        let criteria = vec!["a".to_string(), "b".to_string()];
        let verdict = parse_verdict(text, &criteria).unwrap();
        assert!(verdict.is_done());
        assert_eq!(
            verdict.criteria_pass_map,
            vec![("a".to_string(), true), ("b".to_string(), false)]
        );
    }

    #[test]
    fn iterate_without_category_is_malformed() {
        assert!(parse_verdict("VERDICT: ITERATE\n", &[]).is_err());
    }

    #[test]
    fn ambiguity_score_bounds() {
        let ok = parse_ambiguity("SCORE: 7\nQUESTIONS:\n- Which provider?\n").unwrap();
        assert_eq!(ok.score, 7);
        assert_eq!(ok.questions, vec!["Which provider?"]);
        assert!(parse_ambiguity("SCORE: 11\n").is_err());
        assert!(parse_ambiguity("no score here").is_err());
    }

    #[test]
    fn credentials_status_missing_list() {
        let summary = "Discovered 80 node types.\nCREDENTIALS_STATUS: MISSING\nMISSING_TYPES: openAIApi, pineconeApi\n";
        let status = parse_credentials_status(summary);
        assert!(status.missing);
        assert_eq!(status.missing_types, vec!["openAIApi", "pineconeApi"]);

        let ok = parse_credentials_status("CREDENTIALS_STATUS: OK\n");
        assert!(!ok.missing);
        assert!(ok.missing_types.is_empty());
    }

    #[test]
    fn intent_parsing() {
        let (intent, target) = parse_intent("INTENT: UPDATE\nTARGET: support bot\n").unwrap();
        assert_eq!(intent, "UPDATE");
        assert_eq!(target.as_deref(), Some("support bot"));

        let (intent, target) = parse_intent("INTENT: CREATE\nTARGET: none\n").unwrap();
        assert_eq!(intent, "CREATE");
        assert!(target.is_none());
    }

    #[test]
    fn extract_json_handles_fences_and_prose() {
        let fenced = "Here are the ops:\n```json\n[{\"op\": \"add_node\"}]\n```\nDone.";
        assert_eq!(extract_json(fenced).unwrap()[0]["op"], "add_node");

        let bare = "thinking... [1, 2, 3] trailing";
        assert_eq!(extract_json(bare).unwrap(), serde_json::json!([1, 2, 3]));

        assert!(extract_json("no json at all").is_err());
    }

    #[test]
    fn predicates_evaluate() {
        assert!(ExpectedPredicate::NonEmpty.evaluate("hi"));
        assert!(!ExpectedPredicate::NonEmpty.evaluate("   "));
        assert!(ExpectedPredicate::Contains {
            needle: "Hello".to_string()
        }
        .evaluate("well hello there"));
        assert!(ExpectedPredicate::Matches {
            pattern: r"\d{3}".to_string()
        }
        .evaluate("code 404"));
    }
}
