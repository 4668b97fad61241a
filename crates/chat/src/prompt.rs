//! Prompt text and the inline notices substituted into replies.

use serde_json::Value;

/// Append the tool list and invocation syntax to a system prompt.
pub fn with_tools(system_prompt: &str, tools: &[String]) -> String {
    if tools.is_empty() {
        return system_prompt.to_string();
    }
    let listing: Vec<String> = tools.iter().map(|t| format!("- {t}")).collect();
    format!(
        "{system_prompt}\n\nAvailable tools:\n{}\n\n\
         To call a tool, reply with a block in exactly this format:\n\
         ```mcp\n{{\"tool\": \"<tool name>\", \"params\": {{<parameters>}}}}\n```",
        listing.join("\n")
    )
}

pub fn unknown_tool(tool: &str, available: &[String]) -> String {
    format!("⚠️ Tool '{tool}' is unavailable. Available tools: {}", available.join(", "))
}

pub fn tool_result(tool: &str, output: &str) -> String {
    format!("✅ Tool '{tool}' result:\n```\n{output}\n```")
}

pub fn tool_failed(tool: &str, reason: &str) -> String {
    format!("❌ Tool '{tool}' failed: {reason}")
}

/// Opens a streamed tool output block; closed by `OUTPUT_END`.
pub fn tool_calling(tool: &str) -> String {
    format!("✅ Tool '{tool}' calling...\n```\n")
}

pub const OUTPUT_END: &str = "\n```\n";

pub fn retry_notice(tool: &str, reason: &str, next_attempt: u32, max_attempts: u32) -> String {
    format!("\n🔄 Tool '{tool}' failed ({reason}). Asking for corrected parameters, attempt {next_attempt}/{max_attempts}...\n")
}

pub fn non_convergent(tool: &str) -> String {
    format!("\n⚠️ Corrected parameters for '{tool}' were already tried; retrying anyway.\n")
}

pub fn exhausted(tool: &str, attempts: u32, reason: &str) -> String {
    format!("❌ Tool '{tool}' failed after {attempts} attempts: {reason}")
}

pub fn error_chunk(error: &impl std::fmt::Display) -> String {
    format!("\n❌ Error: {error}")
}

/// Follow-up request asking the model to fix a failed call.
pub fn correction_request(tool: &str, params: &Value, reason: &str) -> String {
    format!(
        "The call to tool '{tool}' with parameters {params} failed: {reason}\n\
         Reply with corrected parameters as a single JSON object, for example \
         {{\"tool\": \"{tool}\", \"params\": {{...}}}}."
    )
}

/// Instructions for rewriting recommended items into a digest.
pub fn digest_system_prompt(date: &str) -> String {
    format!(
        "You receive a list of RSS items. Filter out noise, order the rest by importance \
         and group them by topic. Output only the HTML body of a digest email: a heading \
         that includes the date {date}, then for every item its title and a link to it. \
         Use HTML tags only, no markdown."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_tools_and_syntax() {
        let prompt = with_tools("Be brief.", &["search_feeds".into(), "recommend_feeds".into()]);
        assert!(prompt.starts_with("Be brief."));
        assert!(prompt.contains("- search_feeds\n- recommend_feeds"));
        assert!(prompt.contains("```mcp\n{\"tool\": \"<tool name>\", \"params\": {<parameters>}}\n```"));
    }

    #[test]
    fn prompt_unchanged_without_tools() {
        assert_eq!(with_tools("Be brief.", &[]), "Be brief.");
    }

    #[test]
    fn unknown_tool_names_tool_and_alternatives() {
        let text = unknown_tool("weather", &["a".into(), "b".into()]);
        assert!(text.contains("'weather'"));
        assert!(text.ends_with("a, b"));
    }

    #[test]
    fn correction_request_embeds_failure() {
        let text = correction_request("search_feeds", &serde_json::json!({"q": 1}), "Error: query is required");
        assert!(text.contains(r#"{"q":1}"#));
        assert!(text.contains("query is required"));
    }
}
