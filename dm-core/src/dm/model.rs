//! Chat model abstraction.

use async_trait::async_trait;
use llm::{Request, Response};

/// A chat completion backend.
///
/// Implemented for [`llm::Client`]; tests use [`crate::testing::MockModel`].
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: Request) -> Result<Response, llm::Error>;

    /// Stream the response, handing text fragments to `on_text` as they
    /// arrive. The returned response carries the full text and any tool calls.
    async fn stream_complete(
        &self,
        request: Request,
        on_text: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<Response, llm::Error>;
}

#[async_trait]
impl ChatModel for llm::Client {
    async fn complete(&self, request: Request) -> Result<Response, llm::Error> {
        llm::Client::complete(self, request).await
    }

    async fn stream_complete(
        &self,
        request: Request,
        on_text: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<Response, llm::Error> {
        self.stream_collect(request, |text| on_text(text)).await
    }
}
