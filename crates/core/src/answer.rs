use crate::error::{PipelineError, TemplateError};
use crate::models::{GenerationConfig, QueryResult};
use crate::traits::CompletionClient;
use tracing::info;

pub const CONTEXT_PLACEHOLDER: &str = "{context}";
pub const QUESTION_PLACEHOLDER: &str = "{question}";

/// Sentence the default template asks the model to emit when the context
/// holds nothing relevant. Nothing checks that the model complies.
pub const NO_RESULTS_SENTENCE: &str = "No relevant studies or clinical trials found in the context.";

pub const DEFAULT_QA_TEMPLATE: &str = "\
You are tasked with retrieving relevant research studies or clinical trials based on the context provided. \
You will generate a Boolean query to retrieve the most relevant studies or trials that are related to the topic mentioned. \
If no related studies or trials are found in the context, respond with \"No relevant studies or clinical trials found in the context.\"

Context:
{context}

Boolean Query for Relevant Studies or Clinical Trials:
{question}

Answer (with relevant data, if available):
";

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self, TemplateError> {
        let template = template.into();
        for placeholder in [CONTEXT_PLACEHOLDER, QUESTION_PLACEHOLDER] {
            if !template.contains(placeholder) {
                return Err(TemplateError::MissingPlaceholder(placeholder));
            }
        }
        Ok(Self { template })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitutes both placeholders in one pass, so braces inside the
    /// context or question are never expanded.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut rendered = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();

        loop {
            let next = [(CONTEXT_PLACEHOLDER, context), (QUESTION_PLACEHOLDER, question)]
                .into_iter()
                .filter_map(|(placeholder, value)| {
                    rest.find(placeholder).map(|position| (position, placeholder, value))
                })
                .min_by_key(|(position, _, _)| *position);

            match next {
                Some((position, placeholder, value)) => {
                    rendered.push_str(&rest[..position]);
                    rendered.push_str(value);
                    rest = &rest[position + placeholder.len()..];
                }
                None => {
                    rendered.push_str(rest);
                    return rendered;
                }
            }
        }
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_QA_TEMPLATE.to_string(),
        }
    }
}

/// "Stuff" strategy: every retrieved chunk, separated by a blank line.
pub fn stuff_context(result: &QueryResult) -> String {
    result.texts().join("\n\n")
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: QueryResult,
}

pub struct Answerer<'a, C: ?Sized> {
    client: &'a C,
    template: PromptTemplate,
    generation: GenerationConfig,
}

impl<'a, C> Answerer<'a, C>
where
    C: CompletionClient + ?Sized,
{
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            template: PromptTemplate::default(),
            generation: GenerationConfig::default(),
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    /// Returns the model output verbatim.
    pub async fn answer(&self, retrieved: QueryResult, question: &str) -> Result<Answer, PipelineError> {
        let prompt = self.template.render(&stuff_context(&retrieved), question);
        let text = self.client.complete(&prompt, &self.generation).await?;

        info!(
            backend = self.client.backend(),
            context_chunks = retrieved.hits.len(),
            answer_chars = text.len(),
            "answer generated"
        );

        Ok(Answer {
            text,
            sources: retrieved,
        })
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use crate::models::GenerationConfig;
    use crate::traits::CompletionClient;
    use crate::ServiceError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every prompt and replies with a fixed answer.
    #[derive(Default)]
    pub(crate) struct RecordingClient {
        pub(crate) reply: String,
        pub(crate) prompts: Mutex<Vec<String>>,
        pub(crate) temperatures: Mutex<Vec<f32>>,
    }

    impl RecordingClient {
        pub(crate) fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                ..Self::default()
            }
        }

        pub(crate) fn prompts(&self) -> Vec<String> {
            self.prompts.lock().map(|prompts| prompts.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl CompletionClient for RecordingClient {
        fn backend(&self) -> &str {
            "recording"
        }

        async fn complete(
            &self,
            prompt: &str,
            generation: &GenerationConfig,
        ) -> Result<String, ServiceError> {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt.to_string());
            }
            if let Ok(mut temperatures) = self.temperatures.lock() {
                temperatures.push(generation.temperature);
            }
            Ok(self.reply.clone())
        }
    }
}
