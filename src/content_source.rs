//! Content sources: where raw candidate problems come from.
//!
//! The ingestion core only sees [`ContentSource::fetch`]. Concrete providers are
//! looked up by key in [`PROVIDERS`], and credentials are checked before any
//! network call is made.

/// Anything that can answer a generation prompt with raw, untrusted text.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Provider key, used in logs and error messages.
    fn name(&self) -> &str;

    /// Sends one prompt and returns the raw reply text.
    async fn fetch(&self, prompt: &str) -> Result<String, IngestError>;
}

/// How a provider is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// An OpenAI-compatible `/chat/completions` endpoint.
    ChatCompletions {
        base_url: &'static str,
        model: &'static str,
    },
    /// Baidu's API: exchange key + secret for an access token, then call the chat endpoint.
    Baidu,
}

/// Static description of a supported provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderSpec {
    pub key: &'static str,
    pub display_name: &'static str,
    /// Environment variables that must all be set.
    pub credentials: &'static [&'static str],
    pub kind: ProviderKind,
}

pub const PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        key: "openai",
        display_name: "OpenAI (ChatGPT)",
        credentials: &["OPENAI_API_KEY"],
        kind: ProviderKind::ChatCompletions {
            base_url: "https://api.openai.com/v1",
            model: "gpt-4o-mini",
        },
    },
    ProviderSpec {
        key: "zhipu",
        display_name: "Zhipu AI (GLM)",
        credentials: &["ZHIPU_API_KEY"],
        kind: ProviderKind::ChatCompletions {
            base_url: "https://open.bigmodel.cn/api/paas/v4",
            model: "glm-4",
        },
    },
    ProviderSpec {
        key: "qwen",
        display_name: "Tongyi Qianwen (Alibaba Cloud)",
        credentials: &["DASHSCOPE_API_KEY"],
        kind: ProviderKind::ChatCompletions {
            base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1",
            model: "qwen-turbo",
        },
    },
    ProviderSpec {
        key: "baidu",
        display_name: "ERNIE Bot (Baidu)",
        credentials: &["BAIDU_API_KEY", "BAIDU_SECRET_KEY"],
        kind: ProviderKind::Baidu,
    },
    ProviderSpec {
        key: "kimi",
        display_name: "Moonshot AI (Kimi)",
        credentials: &["KIMI_API_KEY"],
        kind: ProviderKind::ChatCompletions {
            base_url: "https://api.moonshot.cn/v1",
            model: "moonshot-v1-8k",
        },
    },
];

pub const DEFAULT_PROVIDER: &str = "zhipu";

const SYSTEM_PROMPT: &str =
    "You are an experienced calculus teacher who writes exam problems and worked solutions.";
const TEMPERATURE: f32 = 0.7;
const BAIDU_TOKEN_URL: &str = "https://aip.baidubce.com/oauth/2.0/token";
const BAIDU_CHAT_URL: &str =
    "https://aip.baidubce.com/rpc/2.0/ai_custom/v1/wenxinworkshop/chat/completions";

pub fn find_provider(key: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|p| p.key == key)
}

/// Builds the source for a provider key.
///
/// `credential` looks up a credential by variable name; pass an environment
/// lookup in production. Every missing variable is reported at once.
///
/// # Errors
/// * [`IngestError::UnknownProvider`] if the key is not in [`PROVIDERS`].
/// * [`IngestError::MissingCredential`] if any required credential is unset or empty.
pub fn build_source(
    key: &str,
    credential: impl Fn(&str) -> Option<String>,
) -> Result<Box<dyn ContentSource>, IngestError> {
    let spec = find_provider(key).ok_or_else(|| IngestError::UnknownProvider {
        requested: key.to_string(),
        supported: PROVIDERS
            .iter()
            .map(|p| p.key)
            .collect::<Vec<_>>()
            .join(", "),
    })?;

    let mut values = Vec::with_capacity(spec.credentials.len());
    let mut missing = Vec::new();
    for variable in spec.credentials {
        match credential(variable).filter(|v| !v.trim().is_empty()) {
            Some(value) => values.push(value),
            None => missing.push(variable.to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(IngestError::MissingCredential {
            provider: spec.key.to_string(),
            variables: missing,
        });
    }

    let client = reqwest::Client::new();
    let source: Box<dyn ContentSource> = match spec.kind {
        ProviderKind::ChatCompletions { base_url, model } => Box::new(ChatCompletionsSource {
            provider: spec.key,
            client,
            base_url,
            model,
            api_key: values.remove(0),
        }),
        ProviderKind::Baidu => Box::new(BaiduSource {
            client,
            api_key: values.remove(0),
            secret_key: values.remove(0),
        }),
    };

    Ok(source)
}

/// Reads credentials from the process environment (after `.env` has been loaded).
pub fn env_credential(variable: &str) -> Option<String> {
    std::env::var(variable).ok()
}

/// The generation request sent to a provider for one batch.
pub fn generation_prompt(topic: &str, difficulty: &str, count: usize) -> String {
    format!(
        r#"Write {count} multiple-choice calculus problems on the topic "{topic}" at difficulty "{difficulty}".

Requirements:
1. Every problem is multiple choice with exactly 4 options (A, B, C, D).
2. Write all math in LaTeX wrapped in $...$, in the question and in the options.
3. Include a detailed worked solution, also in LaTeX.
4. Match the "{difficulty}" difficulty level.

Output a JSON array. Each element has these fields:
- question: the problem text
- options: array of the 4 options, with the correct one first
- answer: the correct letter ("A", "B", "C" or "D")
- solution: the worked solution, using \n for line breaks
- tags: array of short labels

Example:
[
  {{
    "question": "Find the derivative of $f(x) = x^2 + 3x + 2$.",
    "options": ["$2x + 3$", "$x + 3$", "$2x^2 + 3$", "$x^2 + 3$"],
    "answer": "A",
    "solution": "Differentiate term by term:\n$f'(x) = 2x + 3$",
    "tags": ["derivatives", "polynomials"]
  }}
]

Output only the JSON array, with no other text."#
    )
}

/// An OpenAI-compatible chat-completions provider.
pub struct ChatCompletionsSource {
    provider: &'static str,
    client: reqwest::Client,
    base_url: &'static str,
    model: &'static str,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ContentSource for ChatCompletionsSource {
    fn name(&self) -> &str {
        self.provider
    }

    async fn fetch(&self, prompt: &str) -> Result<String, IngestError> {
        let unavailable = |reason: String| IngestError::SourceUnavailable {
            provider: self.provider.to_string(),
            reason,
        };

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ],
            "temperature": TEMPERATURE,
        });

        tracing::debug!("POST {}/chat/completions ({})", self.base_url, self.model);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| unavailable(e.to_string()))?;

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| unavailable(format!("unexpected response body: {}", e)))?;

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| unavailable("response contained no content".to_string()))
    }
}

/// Baidu ERNIE Bot: key + secret are exchanged for an access token on every call.
pub struct BaiduSource {
    client: reqwest::Client,
    api_key: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct BaiduToken {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BaiduReply {
    result: Option<String>,
    error_msg: Option<String>,
}

impl BaiduSource {
    async fn access_token(&self) -> Result<String, IngestError> {
        let token: BaiduToken = self
            .client
            .post(BAIDU_TOKEN_URL)
            .query(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.api_key.as_str()),
                ("client_secret", self.secret_key.as_str()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.unavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| self.unavailable(format!("unexpected token response: {}", e)))?;

        token
            .access_token
            .ok_or_else(|| self.unavailable("no access_token in token response".to_string()))
    }

    fn unavailable(&self, reason: String) -> IngestError {
        IngestError::SourceUnavailable {
            provider: "baidu".to_string(),
            reason,
        }
    }
}

#[async_trait]
impl ContentSource for BaiduSource {
    fn name(&self) -> &str {
        "baidu"
    }

    async fn fetch(&self, prompt: &str) -> Result<String, IngestError> {
        let access_token = self.access_token().await?;

        let body = json!({
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": TEMPERATURE,
        });

        let reply: BaiduReply = self
            .client
            .post(BAIDU_CHAT_URL)
            .query(&[("access_token", access_token.as_str())])
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.unavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| self.unavailable(format!("unexpected response body: {}", e)))?;

        match reply.result {
            Some(result) if !result.trim().is_empty() => Ok(result.trim().to_string()),
            _ => Err(self.unavailable(
                reply
                    .error_msg
                    .unwrap_or_else(|| "response contained no result".to_string()),
            )),
        }
    }
}

/// Serves the contents of a local file, for candidates produced outside this tool.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the whole file as raw candidate text.
    pub async fn read(&self) -> Result<String, IngestError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| IngestError::SourceUnavailable {
                provider: format!("file:{}", self.path.display()),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl ContentSource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    async fn fetch(&self, _prompt: &str) -> Result<String, IngestError> {
        self.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn every_provider_key_is_unique_and_needs_credentials() {
        for (i, provider) in PROVIDERS.iter().enumerate() {
            assert!(!provider.credentials.is_empty());
            assert!(PROVIDERS[i + 1..].iter().all(|p| p.key != provider.key));
        }
        assert!(find_provider(DEFAULT_PROVIDER).is_some());
    }

    #[test]
    fn unknown_provider_lists_supported_keys() {
        match build_source("gemini", lookup(&[])) {
            Err(IngestError::UnknownProvider { requested, supported }) => {
                assert_eq!(requested, "gemini");
                assert!(supported.contains("zhipu"));
                assert!(supported.contains("baidu"));
            }
            other => panic!("expected UnknownProvider, got {:?}", other.err()),
        }
    }

    #[test]
    fn missing_credential_fails_before_any_call() {
        match build_source("zhipu", lookup(&[("OPENAI_API_KEY", "sk")])) {
            Err(IngestError::MissingCredential { provider, variables }) => {
                assert_eq!(provider, "zhipu");
                assert_eq!(variables, vec!["ZHIPU_API_KEY"]);
            }
            other => panic!("expected MissingCredential, got {:?}", other.err()),
        }
    }

    #[test]
    fn empty_credential_counts_as_missing() {
        assert!(matches!(
            build_source("kimi", lookup(&[("KIMI_API_KEY", "  ")])),
            Err(IngestError::MissingCredential { .. })
        ));
    }

    #[test]
    fn baidu_needs_both_key_and_secret() {
        match build_source("baidu", lookup(&[("BAIDU_API_KEY", "k")])) {
            Err(err @ IngestError::MissingCredential { .. }) => {
                assert!(err.to_string().contains("BAIDU_SECRET_KEY"));
                assert!(!err.to_string().contains("BAIDU_API_KEY"));
            }
            other => panic!("expected MissingCredential, got {:?}", other.err()),
        }

        let source = build_source(
            "baidu",
            lookup(&[("BAIDU_API_KEY", "k"), ("BAIDU_SECRET_KEY", "s")]),
        )
        .unwrap();
        assert_eq!(source.name(), "baidu");
    }

    #[test]
    fn configured_provider_builds() {
        let source = build_source("qwen", lookup(&[("DASHSCOPE_API_KEY", "sk")])).unwrap();
        assert_eq!(source.name(), "qwen");
    }

    #[test]
    fn prompt_names_topic_difficulty_and_count() {
        let prompt = generation_prompt("limits", "L2", 7);
        assert!(prompt.starts_with("Write 7 multiple-choice"));
        assert!(prompt.contains("\"limits\""));
        assert!(prompt.contains("\"L2\""));
        assert!(prompt.contains("\"answer\": \"A\""));
    }

    #[tokio::test]
    async fn file_source_returns_file_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("candidates.json");
        std::fs::write(&path, "[]").unwrap();

        let source = FileSource::new(&path);
        assert_eq!(source.fetch("ignored").await.unwrap(), "[]");
    }

    #[tokio::test]
    async fn missing_file_is_source_unavailable() {
        let dir = TempDir::new().unwrap();
        let source = FileSource::new(dir.path().join("absent.json"));
        assert!(matches!(
            source.fetch("ignored").await,
            Err(IngestError::SourceUnavailable { .. })
        ));
    }
}

use crate::errors::IngestError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
