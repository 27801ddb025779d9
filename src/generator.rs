//! Answer generation over an assembled code context

use crate::config::LlmConfig;
use anyhow::{Context, Result};
use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const SYSTEM_PROMPT: &str = "You are a code analysis assistant. You are given relevant code \
fragments from a source repository.

Rules:
- Always refer to file names and function or class names in your answers
- Mention line numbers when talking about specific code sections
- If the answer is not in the provided context, say so clearly
- Be concise but thorough
- Format code examples as markdown code blocks in the right language
- When several files are involved, explain how they interact
- Answer in the language of the question";

/// Answer text fragments in arrival order
pub type AnswerStream = BoxStream<'static, Result<String>>;

/// Produces a natural-language answer from a question and a context block
#[async_trait::async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, question: &str, context: &str) -> Result<String>;

    /// Answer delivered piece by piece. Defaults to one piece holding the full answer.
    async fn generate_stream(&self, question: &str, context: &str) -> Result<AnswerStream> {
        let answer = self.generate(question, context).await?;
        Ok(stream::once(async move { Ok(answer) }).boxed())
    }
}

/// User message sent to the model; an empty context sends the question alone
pub fn build_message(question: &str, context: &str) -> String {
    if context.is_empty() {
        format!("## Question\n\n{}", question)
    } else {
        format!("## Code Context\n\n{}\n\n## Question\n\n{}", context, question)
    }
}

/// Ollama chat-completion generator
pub struct OllamaGenerator {
    client: Client,
    host: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: usize,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// One NDJSON line of a streamed chat
#[derive(Debug, Deserialize)]
struct StreamLine {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaGenerator {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            client: Client::new(),
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    async fn send_chat(
        &self,
        question: &str,
        context: &str,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let user_message = build_message(question, context);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user_message,
                },
            ],
            stream,
            options: ChatOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        tracing::info!("Requesting answer from {} (stream: {})", self.model, stream);
        let response = self
            .client
            .post(format!("{}/api/chat", self.host))
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error ({}): {}", status, body);
        }
        Ok(response)
    }
}

/// Content of one streamed line; `None` for blank lines and empty deltas
fn parse_stream_line(line: &[u8]) -> Result<Option<String>> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let parsed: StreamLine =
        serde_json::from_str(line).context("Failed to parse Ollama stream line")?;
    if let Some(error) = parsed.error {
        anyhow::bail!("Ollama stream error: {}", error);
    }
    Ok(parsed
        .message
        .map(|m| m.content)
        .filter(|content| !content.is_empty()))
}

/// Splits a byte stream into newline-delimited JSON lines and yields their content.
///
/// Lines may straddle chunk boundaries; a final line without a newline is still read.
fn ndjson_content<S, B>(bytes: S) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    stream::try_unfold(
        (bytes, Vec::<u8>::new(), false),
        |(mut bytes, mut buffer, mut finished)| async move {
            loop {
                if let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=newline).collect();
                    if let Some(content) = parse_stream_line(&line)? {
                        return Ok(Some((content, (bytes, buffer, finished))));
                    }
                    continue;
                }
                if finished {
                    let rest = std::mem::take(&mut buffer);
                    return Ok(parse_stream_line(&rest)?
                        .map(|content| (content, (bytes, buffer, finished))));
                }
                match bytes.next().await {
                    Some(chunk) => buffer.extend_from_slice(chunk?.as_ref()),
                    None => finished = true,
                }
            }
        },
    )
}

#[async_trait::async_trait]
impl AnswerGenerator for OllamaGenerator {
    async fn generate_stream(&self, question: &str, context: &str) -> Result<AnswerStream> {
        let response = self.send_chat(question, context, true).await?;
        let bytes = response.bytes_stream().map_err(anyhow::Error::from).boxed();
        Ok(ndjson_content(bytes).boxed())
    }

    async fn generate(&self, question: &str, context: &str) -> Result<String> {
        let response = self.send_chat(question, context, false).await?;
        let chat: ChatResponse = response
            .json()
            .await
            .context("Failed to parse Ollama chat response")?;
        tracing::info!("Generated answer: {} characters", chat.message.content.len());
        Ok(chat.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_message() {
        assert_eq!(
            build_message("What does add do?", "### [1] calc.py"),
            "## Code Context\n\n### [1] calc.py\n\n## Question\n\nWhat does add do?"
        );
        assert_eq!(build_message("Hi?", ""), "## Question\n\nHi?");
    }

    #[test]
    fn test_request_shape() {
        let request = ChatRequest {
            model: "qwen2.5:3b",
            messages: vec![ChatMessage {
                role: "user",
                content: "q",
            }],
            stream: false,
            options: ChatOptions {
                temperature: 0.5,
                num_predict: 2000,
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["stream"], false);
        assert_eq!(value["options"]["num_predict"], 2000);
        assert_eq!(value["messages"][0]["role"], "user");
    }

    fn collect(chunks: &[&str]) -> Result<Vec<String>> {
        let bytes = stream::iter(
            chunks
                .iter()
                .map(|chunk| Ok::<Vec<u8>, anyhow::Error>(chunk.as_bytes().to_vec())),
        );
        futures::executor::block_on(ndjson_content(bytes).try_collect())
    }

    #[test]
    fn test_ndjson_content_across_chunk_boundaries() {
        let pieces = collect(&[
            "{\"message\":{\"role\":\"assistant\",\"content\":\"It \"},\"done\":false}\n{\"mess",
            "age\":{\"role\":\"assistant\",\"content\":\"adds.\"},\"done\":false}\n\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}",
        ])
        .unwrap();
        assert_eq!(pieces, vec!["It ", "adds."]);
    }

    #[test]
    fn test_ndjson_error_line_fails_the_stream() {
        let err = collect(&[
            "{\"message\":{\"content\":\"partial\"}}\n",
            "{\"error\":\"model not found\"}\n",
        ])
        .unwrap_err();
        assert!(err.to_string().contains("model not found"));
    }

    struct CannedGenerator;

    #[async_trait::async_trait]
    impl AnswerGenerator for CannedGenerator {
        async fn generate(&self, question: &str, _context: &str) -> Result<String> {
            Ok(format!("answer to {}", question))
        }
    }

    #[tokio::test]
    async fn test_default_stream_yields_whole_answer() {
        let pieces: Vec<String> = CannedGenerator
            .generate_stream("q", "")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(pieces, vec!["answer to q"]);
    }

    #[test]
    fn test_response_parse() {
        let chat: ChatResponse = serde_json::from_str(
            r#"{"model":"qwen2.5:3b","message":{"role":"assistant","content":"It adds."},"done":true}"#,
        )
        .unwrap();
        assert_eq!(chat.message.content, "It adds.");
    }
}
