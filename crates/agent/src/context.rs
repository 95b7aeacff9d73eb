//! Prompt assembly for workers and managers

use chrono::Local;

use carescope_provider::{Message, ToolCallDef};

/// Builds system prompts and keeps the message transcript well formed
pub struct ContextBuilder {
    name: String,
    description: String,
}

impl ContextBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    fn identity(&self) -> String {
        let today = Local::now().format("%Y-%m-%d (%A)");
        format!(
            "# {}\n\n{}\n\n## Current Date\n{}",
            self.name, self.description, today
        )
    }

    /// System prompt for an agent that owns exactly one tool
    pub fn worker_system_prompt(&self, tool_name: &str) -> String {
        format!(
            r#"{}

## Instructions
You are a specialist agent with a single tool, `{}`.
Call the tool when the task needs its data, then answer with a concise,
factual summary of what the data shows. Quote concrete figures and years.
If the tool reports an error, say so plainly and summarize what is still known.
Do not invent numbers."#,
            self.identity(),
            tool_name
        )
    }

    /// System prompt for a manager writing report sections
    pub fn manager_system_prompt(&self) -> String {
        format!(
            r#"{}

## Instructions
You coordinate specialist agents and write report sections in markdown.
Use only the findings you are given. Where a finding is marked as degraded,
work with what is available and say where data was missing."#,
            self.identity()
        )
    }

    pub fn build_messages(&self, system_prompt: String, task: &str) -> Vec<Message> {
        vec![Message::system(system_prompt), Message::user(task)]
    }

    pub fn add_tool_result(
        messages: &mut Vec<Message>,
        tool_call_id: &str,
        name: &str,
        result: &str,
    ) {
        messages.push(Message::tool(tool_call_id, name, result));
    }

    pub fn add_assistant_message(
        messages: &mut Vec<Message>,
        content: Option<&str>,
        tool_calls: Option<Vec<ToolCallDef>>,
    ) {
        let mut msg = Message::assistant(content.unwrap_or(""));
        if let Some(calls) = tool_calls {
            msg.tool_calls = Some(calls);
        }
        messages.push(msg);
    }
}
