//! Prompt assembly

pub mod embedded;

use eyre::Result;
use handlebars::Handlebars;
use serde::Serialize;

/// Context for rendering the initial user message of a phase
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptContext {
    /// User-supplied task description
    pub description: String,

    /// Rendered summary of prior phase results relevant to this persona
    pub prior_results: Option<String>,

    /// Retry feedback preamble on attempt >= 2
    pub retry_feedback: Option<String>,

    /// Learnings preamble (re-read at every assembly)
    pub learnings: Option<String>,

    /// Where the agent operates
    pub working_directory: String,
}

/// Renders prompt templates
pub struct PromptLoader {
    handlebars: Handlebars<'static>,
}

impl PromptLoader {
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        // Prompts are plain text, not HTML
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars
            .register_template_string("phase-user-prompt", embedded::PHASE_USER_PROMPT)
            .map_err(|e| eyre::eyre!("Failed to register prompt template: {}", e))?;

        Ok(Self { handlebars })
    }

    /// Render the initial user message for a phase attempt
    pub fn render_user_prompt(&self, context: &PromptContext) -> Result<String> {
        self.handlebars
            .render("phase-user-prompt", context)
            .map_err(|e| eyre::eyre!("Failed to render prompt: {}", e))
    }
}
