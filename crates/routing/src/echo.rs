use async_trait::async_trait;

use crate::{CompletionRequest, CompletionResponse, ProviderClient, ProviderError, Usage};

/// Offline provider that answers with the prompt.
#[derive(Debug, Clone, Default)]
pub struct EchoProvider;

pub const ECHO_PROVIDER_ID: &str = "echo";

#[async_trait]
impl ProviderClient for EchoProvider {
    fn id(&self) -> &str {
        ECHO_PROVIDER_ID
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let words = |s: &str| s.split_whitespace().count() as u32;
        let input: u32 = request.history.iter().map(|m| words(m.content())).sum::<u32>()
            + words(&request.prompt);
        let text = request.prompt.trim().to_string();
        Ok(CompletionResponse {
            usage: Usage {
                input_tokens: input,
                output_tokens: words(&text),
            },
            text,
        })
    }
}
