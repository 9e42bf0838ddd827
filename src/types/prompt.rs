/// A single-turn prompt plus its generation options. Built once per
/// invocation and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub prompt: String,
    pub options: PromptOptions,
}

/// Per-invocation generation options.
#[derive(Debug, Clone)]
pub struct PromptOptions {
    /// Registry alias of the backend to use; `"auto"` picks the default.
    pub provider: String,
    /// Explicit model name. When set, the registry validates it against
    /// the backend's live model list before any generation call.
    pub model: Option<String>,
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub max_tokens: Option<u32>,
    pub stream: bool,
    pub output_format: OutputFormat,
}

/// How buffered response content is post-processed before delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text: markdown formatting is stripped.
    Text,
    /// Vendor output passed through untouched.
    Markdown,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            provider: "auto".to_string(),
            model: None,
            temperature: 0.7,
            top_p: None,
            top_k: None,
            max_tokens: None,
            stream: false,
            output_format: OutputFormat::Text,
        }
    }
}

impl PromptContext {
    /// Create a prompt with default options.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            options: PromptOptions::default(),
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.options.provider = provider.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.options.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.options.top_p = Some(top_p);
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.options.top_k = Some(top_k);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.options.max_tokens = Some(max_tokens);
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.options.stream = stream;
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.options.output_format = format;
        self
    }
}

impl From<&str> for PromptContext {
    fn from(prompt: &str) -> Self {
        PromptContext::new(prompt)
    }
}

impl From<String> for PromptContext {
    fn from(prompt: String) -> Self {
        PromptContext::new(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_builder() {
        let ctx = PromptContext::new("Why is the sky blue?")
            .with_provider("gemini")
            .with_model("gemini-2.5-flash")
            .with_temperature(0.2)
            .with_max_tokens(256)
            .streaming(true);

        assert_eq!(ctx.prompt, "Why is the sky blue?");
        assert_eq!(ctx.options.provider, "gemini");
        assert_eq!(ctx.options.model.as_deref(), Some("gemini-2.5-flash"));
        assert_eq!(ctx.options.temperature, 0.2);
        assert_eq!(ctx.options.max_tokens, Some(256));
        assert!(ctx.options.stream);
    }

    #[test]
    fn test_defaults() {
        let ctx: PromptContext = "hello".into();
        assert_eq!(ctx.options.provider, "auto");
        assert_eq!(ctx.options.model, None);
        assert!(!ctx.options.stream);
        assert_eq!(ctx.options.output_format, OutputFormat::Text);
    }
}
