//! Planner output types
//!
//! Stage A selects candidate plugins, stage B derives an ordered function
//! execution plan from their catalogs. Both stages parse loosely-structured
//! completion output through a strict schema check: a missing field or
//! malformed JSON is a typed parse error, never a panic.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::plugin::FunctionDescriptor;

/// Parse failure for structured completion output.
#[derive(Debug, Error)]
pub enum PlanParseError {
    #[error("no JSON object found in completion output")]
    NoJsonObject,

    #[error("invalid JSON in completion output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing required fields: {0:?}")]
    MissingFields(Vec<String>),
}

/// Extract the outermost JSON object from free-form completion output.
///
/// Providers routinely wrap JSON in prose or markdown fences; everything
/// from the first `{` to the last `}` is taken as the candidate object.
pub fn extract_json(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(text[start..=end].to_string())
}

fn parse_with_required_fields(content: &str, required: &[&str]) -> Result<Value, PlanParseError> {
    let json = extract_json(content).ok_or(PlanParseError::NoJsonObject)?;
    let value: Value = serde_json::from_str(&json)?;
    let missing: Vec<String> = required
        .iter()
        .filter(|field| value.get(**field).is_none())
        .map(|field| field.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PlanParseError::MissingFields(missing));
    }
    Ok(value)
}

/// One plugin chosen by stage A.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedPlugin {
    pub plugin_name: String,
    #[serde(default)]
    pub plugin_id: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub confidence: f64,
}

/// Stage A result: which plugins are relevant to the user request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSelection {
    pub analysis: String,
    pub selected_plugins: Vec<SelectedPlugin>,
    #[serde(default)]
    pub overall_confidence: f64,
}

impl PluginSelection {
    const REQUIRED_FIELDS: [&'static str; 3] =
        ["analysis", "selected_plugins", "overall_confidence"];

    /// Parse completion output into a selection, validating required fields.
    pub fn from_content(content: &str) -> Result<Self, PlanParseError> {
        let value = parse_with_required_fields(content, &Self::REQUIRED_FIELDS)?;
        Ok(serde_json::from_value(value)?)
    }

    /// True when stage A selected nothing.
    pub fn is_empty(&self) -> bool {
        self.selected_plugins.is_empty()
    }
}

/// One function invocation chosen by stage B.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedFunction {
    #[serde(default)]
    pub plugin_id: String,
    pub plugin_name: String,
    pub function_name: String,
    /// Fully-qualified `plugin.function` name
    #[serde(default)]
    pub full_method_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub confidence: f64,
    /// Parameter names the function cannot run without
    #[serde(default)]
    pub required_params: Vec<String>,
    /// Concrete keyword arguments proposed for this invocation
    #[serde(default)]
    pub suggested_params: Map<String, Value>,
}

/// Stage B result: ordered function invocations satisfying the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub analysis: String,
    pub selected_functions: Vec<SelectedFunction>,
    /// 1-based indices into `selected_functions`
    pub execution_order: Vec<usize>,
    #[serde(default)]
    pub overall_confidence: f64,
}

impl ExecutionPlan {
    const REQUIRED_FIELDS: [&'static str; 4] = [
        "analysis",
        "selected_functions",
        "execution_order",
        "overall_confidence",
    ];

    /// Parse completion output into a plan, validating required fields.
    pub fn from_content(content: &str) -> Result<Self, PlanParseError> {
        let value = parse_with_required_fields(content, &Self::REQUIRED_FIELDS)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Resolve `execution_order` against `selected_functions`.
    ///
    /// Indices are 1-based; out-of-range indices are skipped without error.
    pub fn get_ordered_functions(&self) -> Vec<&SelectedFunction> {
        let mut ordered = Vec::with_capacity(self.execution_order.len());
        for &index in &self.execution_order {
            match index
                .checked_sub(1)
                .and_then(|i| self.selected_functions.get(i))
            {
                Some(function) => ordered.push(function),
                None => tracing::warn!(
                    index,
                    selected = self.selected_functions.len(),
                    "execution order index out of range, skipped"
                ),
            }
        }
        ordered
    }
}

/// Candidate function catalog of one selected plugin, fed into stage B.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginFunctions {
    pub plugin_id: String,
    pub plugin_name: String,
    pub functions: Vec<FunctionDescriptor>,
}

/// Transient planner outcome handed to the task service and then discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResult {
    pub success: bool,
    pub user_input: String,
    /// Stage A output, when that stage completed
    #[serde(default)]
    pub selection: Option<PluginSelection>,
    /// Candidate functions per selected plugin
    #[serde(default)]
    pub candidate_functions: Vec<PluginFunctions>,
    /// Stage B output, when planning succeeded
    #[serde(default)]
    pub plan: Option<ExecutionPlan>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub suggestion: Option<String>,
}

impl PlanResult {
    /// Successful outcome carrying both stage results.
    pub fn planned(
        user_input: impl Into<String>,
        selection: PluginSelection,
        candidate_functions: Vec<PluginFunctions>,
        plan: ExecutionPlan,
    ) -> Self {
        Self {
            success: true,
            user_input: user_input.into(),
            selection: Some(selection),
            candidate_functions,
            plan: Some(plan),
            error: None,
            suggestion: None,
        }
    }

    /// Failed outcome with a message and a user-facing suggestion.
    pub fn failure(
        user_input: impl Into<String>,
        error: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            user_input: user_input.into(),
            selection: None,
            candidate_functions: Vec::new(),
            plan: None,
            error: Some(error.into()),
            suggestion: Some(suggestion.into()),
        }
    }

    /// Ordered function invocations, empty when planning failed.
    pub fn ordered_functions(&self) -> Vec<&SelectedFunction> {
        self.plan
            .as_ref()
            .map(|plan| plan.get_ordered_functions())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan_with_functions(names: &[&str], order: Vec<usize>) -> ExecutionPlan {
        ExecutionPlan {
            analysis: "test".to_string(),
            selected_functions: names
                .iter()
                .map(|name| SelectedFunction {
                    plugin_id: "pid".to_string(),
                    plugin_name: "camera".to_string(),
                    function_name: name.to_string(),
                    full_method_name: format!("camera.{name}"),
                    description: String::new(),
                    reason: String::new(),
                    confidence: 0.9,
                    required_params: Vec::new(),
                    suggested_params: Map::new(),
                })
                .collect(),
            execution_order: order,
            overall_confidence: 0.9,
        }
    }

    #[test]
    fn test_extract_json_from_prose() {
        let content = "Sure, here is the plan:\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(extract_json(content).as_deref(), Some("{\"a\": 1}"));
        assert!(extract_json("no braces here").is_none());
        assert!(extract_json("} reversed {").is_none());
    }

    #[test]
    fn test_ordered_functions_follow_execution_order() {
        let plan = plan_with_functions(&["f1", "f2", "f3"], vec![2, 1, 3]);
        let ordered: Vec<&str> = plan
            .get_ordered_functions()
            .iter()
            .map(|f| f.function_name.as_str())
            .collect();
        assert_eq!(ordered, vec!["f2", "f1", "f3"]);
    }

    #[test]
    fn test_ordered_functions_skip_out_of_range_index() {
        let plan = plan_with_functions(&["f1", "f2", "f3"], vec![2, 5, 1]);
        let ordered: Vec<&str> = plan
            .get_ordered_functions()
            .iter()
            .map(|f| f.function_name.as_str())
            .collect();
        assert_eq!(ordered, vec!["f2", "f1"]);

        // 0 is out of range too: indices are 1-based
        let plan = plan_with_functions(&["f1"], vec![0, 1]);
        assert_eq!(plan.get_ordered_functions().len(), 1);
    }

    #[test]
    fn test_execution_plan_reports_missing_fields() {
        let content = json!({
            "analysis": "only analysis",
            "selected_functions": []
        })
        .to_string();
        match ExecutionPlan::from_content(&content) {
            Err(PlanParseError::MissingFields(missing)) => {
                assert_eq!(missing, vec!["execution_order", "overall_confidence"]);
            }
            other => panic!("expected missing fields, got {other:?}"),
        }
    }

    #[test]
    fn test_plugin_selection_from_fenced_content() {
        let content = r#"Here you go:
```json
{"analysis": "camera request", "selected_plugins": [{"plugin_name": "camera-sim", "plugin_id": "abc", "reason": "takes photos", "confidence": 0.95}], "overall_confidence": 0.95}
```"#;
        let selection = PluginSelection::from_content(content).unwrap();
        assert_eq!(selection.selected_plugins.len(), 1);
        assert_eq!(selection.selected_plugins[0].plugin_name, "camera-sim");
        assert!(!selection.is_empty());
    }

    #[test]
    fn test_plan_result_failure_has_no_functions() {
        let result = PlanResult::failure("do something", "no plugins available", "install one");
        assert!(!result.success);
        assert!(result.ordered_functions().is_empty());
        assert_eq!(result.error.as_deref(), Some("no plugins available"));
    }
}
