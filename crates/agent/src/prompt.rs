//! Prompt templates for the two round phases.

use serde_json::Value;
use std::collections::BTreeMap;

/// Appended to the context when the round budget runs out.
pub const MAX_ROUNDS_WARNING: &str =
    "\n### Max rounds reached, You must change your skill to \"response\" to finish this question";

const STAGE_BLOCK: &str = "\
Here are the stages:
1. Thinking: If you are still working towards the solution, use this stage to think and plan your next step.
2. Response: If you have found the solution, use this stage to respond to the user.
";

const TOOL_USAGE: &str = "\
Please select the tools that best suit the last memory.
Tool usage:
1. Each tool lists the params it accepts; only those params are used.
2. Request tools through the tool_list of the response format.
3. The first level of the catalog is the category, the second level is the name, below that are function and params.
4. generate_image may be requested any number of times by adding one tool_list entry per image, each with a different prompt based on the last memory.
";

const RESPONSE_FORMAT: &str = r#"
You are a math assistant.
What you need to do is to respond to the user based on the last memory.
Generate a tool_list whenever the input would benefit from a visualization.
The Message is a short restatement of the last memory's message.
Reply with a single JSON object in this format:
{
    "SkillSelection": "skill_name",
    "Stage": "stage_name",
    "Message": "message",
    "tool_list": [
        {
            "category": "category",
            "name": "name",
            "params": {}
        }
    ]
}
"#;

/// Phase 1 prompt: stages, current context, tool catalog, skill catalog,
/// and the response format.
pub fn selection_prompt(
    context_message: &str,
    tool_catalog: &Value,
    skills: &BTreeMap<String, String>,
) -> String {
    let tools = serde_json::to_string_pretty(tool_catalog).unwrap_or_else(|_| "{}".into());
    let skills = serde_json::to_string_pretty(skills).unwrap_or_else(|_| "{}".into());

    format!(
        "{STAGE_BLOCK}\nCURRENT CONTEXT:\n{context_message}\n\
         Here are the available tools:\n{tools}\n{TOOL_USAGE}\n\
         Here are the available skills: {skills}\n\
         Please select the skill that best suits the last memory.\n\
         {RESPONSE_FORMAT}"
    )
}

/// Phase 2 prompt: the selected skill's instructions followed by the
/// round's context message.
pub fn execution_prompt(skill_text: &str, context_message: &str) -> String {
    format!("SKILL INSTRUCTIONS:\n{skill_text}\n{context_message}")
}
