//! Prompt truncation against the CLIP context window.
//!
//! Prompts longer than the window are cut to their first [`CLIP_TOKEN_LIMIT`]
//! tokens and turned back into text before they reach the model.

use std::path::Path;

use anyhow::Context;
use hf_hub::api::tokio::Api;
use tokenizers::models::ModelWrapper;
use tokenizers::Tokenizer;

use crate::{Error, Result};

/// Context length of the CLIP text encoder.
pub const CLIP_TOKEN_LIMIT: usize = 77;

pub trait PromptTokenizer: Send + Sync {
    /// Splits `text` into tokens without adding special tokens.
    fn tokenize(&self, text: &str) -> Result<Vec<String>>;

    /// Inverse of [`PromptTokenizer::tokenize`].
    fn tokens_to_text(&self, tokens: &[String]) -> Result<String>;

    /// Marker the tokenizer emits for out-of-vocabulary input, if it has one.
    fn unknown_token(&self) -> Option<&str>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedPrompt {
    pub text: String,
    pub token_count: usize,
    pub truncated: bool,
    pub has_unknown: bool,
}

pub fn prepare_prompt(
    tokenizer: &dyn PromptTokenizer,
    prompt: &str,
    limit: usize,
) -> Result<PreparedPrompt> {
    let tokens = tokenizer.tokenize(prompt)?;
    let token_count = tokens.len();
    if token_count <= limit {
        return Ok(PreparedPrompt {
            text: prompt.to_string(),
            token_count,
            truncated: false,
            has_unknown: false,
        });
    }

    let text = tokenizer.tokens_to_text(&tokens[..limit])?;
    tracing::warn!(
        token_count,
        limit,
        truncated_prompt = %text,
        "prompt exceeds the token limit and was truncated"
    );

    let has_unknown = tokenizer
        .unknown_token()
        .is_some_and(|unk| text.contains(unk));
    if has_unknown {
        tracing::warn!(
            truncated_prompt = %text,
            "truncated prompt contains unknown tokens"
        );
    }

    Ok(PreparedPrompt {
        text,
        token_count,
        truncated: true,
        has_unknown,
    })
}

/// [`PromptTokenizer`] backed by a Hugging Face `tokenizer.json`.
pub struct ClipPromptTokenizer {
    tokenizer: Tokenizer,
    unknown_token: Option<String>,
    end_of_word_suffix: Option<String>,
}

impl ClipPromptTokenizer {
    pub fn new(mut tokenizer: Tokenizer) -> Result<Self> {
        // The raw token count must be observable, so neither pad nor truncate here.
        tokenizer.with_padding(None);
        tokenizer
            .with_truncation(None)
            .map_err(|e| Error::Tokenizer(e.to_string()))?;

        let (unknown_token, end_of_word_suffix) = match tokenizer.get_model() {
            ModelWrapper::BPE(bpe) => (bpe.unk_token.clone(), bpe.end_of_word_suffix.clone()),
            _ => (None, None),
        };

        Ok(Self {
            tokenizer,
            unknown_token,
            end_of_word_suffix,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let tokenizer =
            Tokenizer::from_file(path).map_err(|e| Error::Tokenizer(e.to_string()))?;
        Self::new(tokenizer)
    }

    /// Downloads `tokenizer.json` from `repo` on the hub.
    pub async fn from_hub(api: &Api, repo: &str) -> anyhow::Result<Self> {
        let filename = api
            .model(repo.to_string())
            .get("tokenizer.json")
            .await
            .with_context(|| format!("failed to get tokenizer from {repo}"))?;
        tracing::info!(repo, "loaded prompt tokenizer");
        Self::from_file(filename).context("failed to load prompt tokenizer")
    }
}

impl PromptTokenizer for ClipPromptTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<String>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| Error::Tokenizer(e.to_string()))?;
        Ok(encoding.get_tokens().to_vec())
    }

    fn tokens_to_text(&self, tokens: &[String]) -> Result<String> {
        let ids = tokens
            .iter()
            .map(|token| {
                self.tokenizer.token_to_id(token).ok_or_else(|| {
                    Error::Tokenizer(format!("token {token:?} is not in the vocabulary"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let text = self
            .tokenizer
            .decode(&ids, false)
            .map_err(|e| Error::Tokenizer(e.to_string()))?;
        // CLIP marks word ends with a suffix (`</w>`) that the byte-level decoder keeps.
        let text = match self.end_of_word_suffix.as_deref() {
            Some(suffix) if !suffix.is_empty() => text.replace(suffix, " "),
            _ => text,
        };
        Ok(text.trim().to_string())
    }

    fn unknown_token(&self) -> Option<&str> {
        self.unknown_token.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::WhitespaceTokenizer;
    use pretty_assertions::assert_eq;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn short_prompt_passes_verbatim() {
        let prompt = "  a cat   sitting on a mat ";
        let prepared = prepare_prompt(&WhitespaceTokenizer, prompt, CLIP_TOKEN_LIMIT).unwrap();
        assert_eq!(prepared.text, prompt);
        assert_eq!(prepared.token_count, 6);
        assert!(!prepared.truncated);
    }

    #[test]
    fn prompt_at_limit_passes_verbatim() {
        let prompt = words(CLIP_TOKEN_LIMIT);
        let prepared = prepare_prompt(&WhitespaceTokenizer, &prompt, CLIP_TOKEN_LIMIT).unwrap();
        assert_eq!(prepared.text, prompt);
        assert!(!prepared.truncated);
    }

    #[test]
    fn long_prompt_is_cut_to_limit() {
        let prompt = words(CLIP_TOKEN_LIMIT + 5);
        let prepared = prepare_prompt(&WhitespaceTokenizer, &prompt, CLIP_TOKEN_LIMIT).unwrap();
        assert_eq!(prepared.text, words(CLIP_TOKEN_LIMIT));
        assert_eq!(prepared.token_count, CLIP_TOKEN_LIMIT + 5);
        assert!(prepared.truncated);
        assert!(!prepared.has_unknown);
    }

    #[test]
    fn flags_unknown_tokens_after_truncation() {
        let prompt = format!("<unk> {}", words(CLIP_TOKEN_LIMIT));
        let prepared = prepare_prompt(&WhitespaceTokenizer, &prompt, CLIP_TOKEN_LIMIT).unwrap();
        assert!(prepared.truncated);
        assert!(prepared.has_unknown);
        assert!(prepared.text.starts_with("<unk> w0"));
    }

    // BPE with CLIP's `</w>` word suffix and a byte-level decoder.
    const CLIP_LIKE_TOKENIZER: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": {"type": "WhitespaceSplit"},
        "post_processor": null,
        "decoder": {"type": "ByteLevel", "add_prefix_space": true, "trim_offsets": true, "use_regex": true},
        "model": {
            "type": "BPE",
            "dropout": null,
            "unk_token": "<|endoftext|>",
            "continuing_subword_prefix": null,
            "end_of_word_suffix": "</w>",
            "fuse_unk": false,
            "byte_fallback": false,
            "ignore_merges": false,
            "vocab": {"a</w>": 0, "b</w>": 1, "<|endoftext|>": 2, "a": 3, "b": 4},
            "merges": []
        }
    }"#;

    fn clip_like() -> ClipPromptTokenizer {
        use std::str::FromStr;
        ClipPromptTokenizer::new(Tokenizer::from_str(CLIP_LIKE_TOKENIZER).unwrap()).unwrap()
    }

    #[test]
    fn clip_tokens_carry_word_suffix() {
        let tokenizer = clip_like();
        assert_eq!(tokenizer.tokenize("a b").unwrap(), vec!["a</w>", "b</w>"]);
        assert_eq!(tokenizer.unknown_token(), Some("<|endoftext|>"));
    }

    #[test]
    fn clip_truncation_rebuilds_spaced_words() {
        let tokenizer = clip_like();
        let prompt = vec!["a"; CLIP_TOKEN_LIMIT + 3].join(" ");

        let prepared = prepare_prompt(&tokenizer, &prompt, CLIP_TOKEN_LIMIT).unwrap();

        assert!(prepared.truncated);
        assert_eq!(prepared.token_count, CLIP_TOKEN_LIMIT + 3);
        assert!(!prepared.text.contains("</w>"));
        assert_eq!(prepared.text, vec!["a"; CLIP_TOKEN_LIMIT].join(" "));
        assert!(!prepared.has_unknown);
    }

    #[test]
    fn clip_truncation_reports_unknown_marker() {
        let tokenizer = clip_like();
        let prompt = format!("z b {}", vec!["a"; CLIP_TOKEN_LIMIT].join(" "));

        let prepared = prepare_prompt(&tokenizer, &prompt, CLIP_TOKEN_LIMIT).unwrap();

        assert!(prepared.truncated);
        assert!(prepared.has_unknown);
        assert!(prepared.text.starts_with("<|endoftext|>b a a"));
        assert!(!prepared.text.contains("</w>"));
    }
}
