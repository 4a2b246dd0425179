use std::time::Duration;

use serde_json::json;
use smart_fetch::{Backoff, ClientOptions, FetchClient, RequestOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let base_url =
        std::env::var("SMART_FETCH_BASE_URL").unwrap_or_else(|_| "https://httpbin.org".to_owned());

    let client = FetchClient::new()
        .with_base_url(base_url)
        .with_options(ClientOptions {
            timeout: Duration::from_secs(5),
            retries: 3,
            backoff: Backoff::default(),
        });

    let response = client
        .get(
            "/get",
            RequestOptions::new()
                .query("page", 1)
                .query("filter", Option::<&str>::None),
        )
        .await?;
    println!("GET {} -> {:?}", response.status, response.data);

    let response = client
        .post("/post", json!({"name": "Kit"}), RequestOptions::new())
        .await?;
    println!("POST {} -> {:?}", response.status, response.data);

    Ok(())
}
