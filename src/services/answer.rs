use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::retrieval::retriever::RetrievedContext;

/// System persona for the generation backend.
const SYSTEM_PROMPT: &str = "You are a helpful wiki assistant. You answer questions using only \
the retrieved wiki context you are given. Provide concise, natural language responses and do \
not repeat the context verbatim.";

/// Prompt template for injecting retrieved context into the user message.
const RAG_TEMPLATE: &str = r#"Answer the question using only the context below. Each context entry
is tagged with the source it was retrieved from.

- If the context does not contain the answer, say "I don't know" and nothing else.
- For every piece of information you provide, also cite its source.

Return text as follows:

<Answer to the question>
Source: source_url

<context>
{{CONTEXT}}
</context>

<question>
{{QUERY}}
</question>
"#;

/// Reply used when retrieval produced the explicit no-context signal; the
/// model is never called in that case.
pub const NO_CONTEXT_REPLY: &str =
    "I couldn't find anything relevant in the wiki index for that question.";

/// One prior turn of the conversation, supplied by the caller. No session
/// state lives on this side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// Thin answering layer: formats a prompt from (context, query, history) and
/// forwards it to an OpenAI-compatible chat backend. Returns raw text.
pub struct AnswerService {
    client: Client<OpenAIConfig>,
    model: String,
}

impl AnswerService {
    pub fn new(config: &Config) -> Self {
        let api_key = config.openai_api_key.as_deref().unwrap_or("not-needed");
        let openai_config = OpenAIConfig::new()
            .with_api_base(&config.chat_api_base)
            .with_api_key(api_key);

        info!(
            "Initialized answer service: model={}, api_base={}",
            config.chat_model, config.chat_api_base
        );

        Self {
            client: Client::with_config(openai_config),
            model: config.chat_model.clone(),
        }
    }

    pub async fn answer(
        &self,
        question: &str,
        history: &[ChatTurn],
        context: &RetrievedContext,
    ) -> AppResult<String> {
        let block = match context {
            RetrievedContext::NoMatches => return Ok(NO_CONTEXT_REPLY.to_string()),
            RetrievedContext::Found { block, .. } => block,
        };

        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(history.len() + 2);
        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_PROMPT)
                .build()
                .map_err(|e| AppError::Chat(e.to_string()))?
                .into(),
        );
        for turn in history {
            let message = match turn.role.as_str() {
                "assistant" => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(turn.content.clone())
                    .build()
                    .map_err(|e| AppError::Chat(e.to_string()))?
                    .into(),
                _ => ChatCompletionRequestUserMessageArgs::default()
                    .content(turn.content.clone())
                    .build()
                    .map_err(|e| AppError::Chat(e.to_string()))?
                    .into(),
            };
            messages.push(message);
        }
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(render_prompt(block, question))
                .build()
                .map_err(|e| AppError::Chat(e.to_string()))?
                .into(),
        );

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.0)
            .build()
            .map_err(|e| AppError::Chat(e.to_string()))?;

        debug!("Forwarding prompt to chat backend: model={}", self.model);
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AppError::Chat(format!("chat completion failed: {}", e)))?;

        let answer = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::Chat("backend returned no message content".to_string()))?;

        Ok(answer)
    }
}

fn render_prompt(context_block: &str, question: &str) -> String {
    RAG_TEMPLATE
        .replace("{{CONTEXT}}", context_block)
        .replace("{{QUERY}}", question)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database_url: "sqlite://test.db".to_string(),
            vector_store: "sqlite".to_string(),
            articles_dir: "clean_articles".to_string(),
            chunk_size: 1000,
            chunk_overlap: 150,
            embedding_engine: "ollama".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dimension: None,
            embed_timeout_secs: 60,
            ollama_base_url: "http://localhost:11434".to_string(),
            openai_api_base: None,
            openai_api_key: None,
            chat_model: "llama3".to_string(),
            chat_api_base: "http://localhost:11434/v1".to_string(),
            retrieval_top_k: 5,
            ingest_workers: 4,
            ingest_retries: 2,
            source_url_base: None,
        }
    }

    #[test]
    fn prompt_contains_context_and_question() {
        let prompt = render_prompt(
            "Source: https://wiki.example/w/X\nContent: facts\n\n",
            "what is X?",
        );
        assert!(prompt.contains("Content: facts"));
        assert!(prompt.contains("<question>\nwhat is X?"));
        assert!(!prompt.contains("{{CONTEXT}}"));
        assert!(!prompt.contains("{{QUERY}}"));
    }

    #[tokio::test]
    async fn no_context_short_circuits_without_calling_the_backend() {
        // api_base points nowhere; the call must still succeed because the
        // no-matches branch never reaches the network.
        let mut config = test_config();
        config.chat_api_base = "http://127.0.0.1:1/v1".to_string();
        let service = AnswerService::new(&config);

        let answer = service
            .answer("dragon slayer quest", &[], &RetrievedContext::NoMatches)
            .await
            .unwrap();
        assert_eq!(answer, NO_CONTEXT_REPLY);
    }
}
