use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes prepared requests. Implemented by [`super::BasicClient`]; tests and
/// callers needing custom transport behaviour can supply their own.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
