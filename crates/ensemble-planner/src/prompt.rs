//! Prompt construction for the two planning stages.
//!
//! Every prompt demands a bare JSON object so the structural check in the
//! completion manager has something to hold providers to.

use std::fmt::Write;

use ensemble_core::types::PluginFunctions;

use crate::router::PluginSummary;

/// System and user prompt for one completion call.
#[derive(Debug, Clone)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

/// Stage A: pick the plugins relevant to the request.
pub fn plugin_selection_prompt(user_input: &str, plugins: &[PluginSummary]) -> PromptPair {
    let system = "\
You are a plugin selection assistant. Given a user request and a catalog of \
available plugins, select the plugins needed to fulfill the request.

Respond with ONLY a JSON object, no prose and no markdown fences, shaped as:
{
  \"analysis\": \"<one sentence on what the user wants>\",
  \"selected_plugins\": [
    {\"plugin_name\": \"<name>\", \"plugin_id\": \"<id>\", \"reason\": \"<why>\", \"confidence\": <0.0-1.0>}
  ],
  \"overall_confidence\": <0.0-1.0>
}

Select only plugins that are genuinely relevant. When nothing fits, return an \
empty selected_plugins array."
        .to_string();

    let mut user = String::new();
    let _ = writeln!(user, "User request: {user_input}");
    let _ = writeln!(user);
    let _ = writeln!(user, "Available plugins:");
    for plugin in plugins {
        let _ = writeln!(
            user,
            "- name: {} (id: {})\n  description: {}\n  tags: {}",
            plugin.plugin_name,
            plugin.plugin_id,
            plugin.description,
            plugin.tags.join(", ")
        );
    }
    PromptPair { system, user }
}

/// Stage B: derive an ordered function plan from the selected plugins'
/// catalogs.
pub fn function_matching_prompt(user_input: &str, catalogs: &[PluginFunctions]) -> PromptPair {
    let system = "\
You are an execution planning assistant. Given a user request and the \
function catalogs of the selected plugins, produce an ordered plan of \
function invocations that fulfills the request.

Respond with ONLY a JSON object, no prose and no markdown fences, shaped as:
{
  \"analysis\": \"<one sentence on the plan>\",
  \"selected_functions\": [
    {
      \"plugin_id\": \"<id>\",
      \"plugin_name\": \"<name>\",
      \"function_name\": \"<function>\",
      \"full_method_name\": \"<plugin.function>\",
      \"description\": \"<what this call does>\",
      \"reason\": \"<why this call is needed>\",
      \"confidence\": <0.0-1.0>,
      \"required_params\": [\"<param>\"],
      \"suggested_params\": {\"<param>\": <value>}
    }
  ],
  \"execution_order\": [<1-based indices into selected_functions>],
  \"overall_confidence\": <0.0-1.0>
}

Only use functions that appear in the catalogs below. Fill suggested_params \
with concrete values derived from the user request where possible."
        .to_string();

    let mut user = String::new();
    let _ = writeln!(user, "User request: {user_input}");
    let _ = writeln!(user);
    let _ = writeln!(user, "Function catalogs:");
    for catalog in catalogs {
        let _ = writeln!(
            user,
            "Plugin: {} (id: {})",
            catalog.plugin_name, catalog.plugin_id
        );
        for function in &catalog.functions {
            let _ = writeln!(
                user,
                "  - {} ({}): {}",
                function.name, function.full_method_name, function.description
            );
            if !function.input_schema.is_null() {
                let _ = writeln!(user, "    input schema: {}", function.input_schema);
            }
        }
    }
    PromptPair { system, user }
}

/// Repair round-trip: ask the provider to re-emit its own output as bare JSON.
pub fn json_repair_prompt(raw: &str) -> PromptPair {
    let system = "\
The previous response was supposed to be a single JSON object but was not \
parseable. Re-emit the same content as ONLY a valid JSON object, with no \
prose and no markdown fences."
        .to_string();
    let user = format!("Previous response:\n{raw}");
    PromptPair { system, user }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ensemble_core::types::FunctionDescriptor;
    use serde_json::json;

    #[test]
    fn test_selection_prompt_lists_every_plugin() {
        let plugins = vec![
            PluginSummary {
                plugin_name: "camera-sim".to_string(),
                plugin_id: "id-1".to_string(),
                description: "Simulated camera".to_string(),
                tags: vec!["camera".to_string(), "photo".to_string()],
            },
            PluginSummary {
                plugin_name: "echo-tool".to_string(),
                plugin_id: "id-2".to_string(),
                description: "Echoes input".to_string(),
                tags: Vec::new(),
            },
        ];
        let pair = plugin_selection_prompt("take a photo", &plugins);
        assert!(pair.user.contains("take a photo"));
        assert!(pair.user.contains("camera-sim"));
        assert!(pair.user.contains("echo-tool"));
        assert!(pair.system.contains("selected_plugins"));
    }

    #[test]
    fn test_function_prompt_embeds_catalogs_and_schemas() {
        let catalogs = vec![PluginFunctions {
            plugin_id: "id-1".to_string(),
            plugin_name: "camera-sim".to_string(),
            functions: vec![FunctionDescriptor {
                name: "take_photo".to_string(),
                description: "Capture a still image".to_string(),
                input_schema: json!({"resolution": "string"}),
                full_method_name: "camera-sim.take_photo".to_string(),
            }],
        }];
        let pair = function_matching_prompt("take a photo", &catalogs);
        assert!(pair.user.contains("camera-sim.take_photo"));
        assert!(pair.user.contains("resolution"));
        assert!(pair.system.contains("execution_order"));
    }

    #[test]
    fn test_repair_prompt_carries_the_raw_output() {
        let pair = json_repair_prompt("here is the JSON you asked for: nope");
        assert!(pair.user.contains("nope"));
        assert!(pair.system.contains("valid JSON object"));
    }
}
