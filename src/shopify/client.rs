use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, LINK};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::link_header::parse_next_link;
use crate::config::SyncConfig;

const ACCESS_TOKEN_HEADER: &str = "x-shopify-access-token";

pub type Query = [(&'static str, String)];

/// One HTTP response, reduced to what pagination needs.
#[derive(Debug, Clone)]
pub struct Page {
    pub status: u16,
    /// Raw `Link` header, if any.
    pub link: Option<String>,
    /// Decoded JSON body; only read for success statuses.
    pub body: Option<Value>,
}

impl Page {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues a single GET. `query` is `None` for next-page URLs, which already
/// carry their parameters.
#[async_trait::async_trait]
pub trait PageTransport: Send + Sync {
    async fn get(&self, url: &Url, query: Option<&Query>) -> Result<Page>;
}

/// `reqwest` transport authenticated with a static Admin API token.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    pub fn new(cfg: &SyncConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        // A blank token still builds; the API answers 401 and the fetch stops there.
        let mut token = HeaderValue::from_str(cfg.access_token.trim())
            .context("SHOPIFY_TOKEN is not a valid header value")?;
        token.set_sensitive(true);
        headers.insert(ACCESS_TOKEN_HEADER, token);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .user_agent(concat!("shop-sync/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(cfg.timeout())
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait::async_trait]
impl PageTransport for HttpTransport {
    async fn get(&self, url: &Url, query: Option<&Query>) -> Result<Page> {
        let mut req = self.http.get(url.clone());
        if let Some(q) = query {
            req = req.query(q);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("GET {} failed", url.path()))?;

        let status = resp.status().as_u16();
        let link = resp
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = if resp.status().is_success() {
            Some(
                resp.json::<Value>()
                    .await
                    .with_context(|| format!("decoding page body from {}", url.path()))?,
            )
        } else {
            None
        };
        Ok(Page { status, link, body })
    }
}

/// Paginating reader over Admin REST collection endpoints.
pub struct ShopifyClient<T = HttpTransport> {
    transport: T,
    cfg: SyncConfig,
}

impl ShopifyClient<HttpTransport> {
    pub fn new(cfg: &SyncConfig) -> Result<Self> {
        Ok(Self::with_transport(cfg, HttpTransport::new(cfg)?))
    }
}

impl<T: PageTransport> ShopifyClient<T> {
    pub fn with_transport(cfg: &SyncConfig, transport: T) -> Self {
        Self {
            transport,
            cfg: cfg.clone(),
        }
    }

    /// Fetch every page of `collection` (e.g. `"orders"`), following `rel="next"`
    /// links until none is left.
    ///
    /// A non-success status ends pagination and returns what was gathered so
    /// far. Transport failures are returned as errors.
    #[instrument(skip(self), fields(shop = %self.cfg.shop))]
    pub async fn fetch_all(&self, collection: &str) -> Result<Vec<Value>> {
        let mut url = Url::parse(&self.cfg.collection_url(collection))
            .with_context(|| format!("invalid shop host {:?}", self.cfg.shop))?;
        let first_query = self.cfg.first_page_query();
        let mut query: Option<&Query> = Some(first_query.as_slice());

        let mut records: Vec<Value> = Vec::new();
        let mut pages = 0usize;
        loop {
            let page = self.transport.get(&url, query).await?;
            if !page.is_success() {
                warn!(
                    status = page.status,
                    url = %url,
                    fetched = records.len(),
                    "page request failed; stopping pagination"
                );
                break;
            }

            let batch = take_records(page.body, collection);
            pages += 1;
            debug!(page = pages, count = batch.len(), "page fetched");
            records.extend(batch);

            match page.link.as_deref().and_then(parse_next_link) {
                Some(next) => {
                    url = next;
                    query = None;
                }
                None => break,
            }
        }

        info!(collection, pages, records = records.len(), "fetch complete");
        Ok(records)
    }
}

/// Records live under the collection name: `{"orders": [...]}`.
fn take_records(body: Option<Value>, collection: &str) -> Vec<Value> {
    match body {
        Some(Value::Object(mut obj)) => match obj.remove(collection) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct Seen {
        url: String,
        had_query: bool,
    }

    struct Scripted {
        pages: Mutex<VecDeque<Page>>,
        seen: Mutex<Vec<Seen>>,
    }

    impl Scripted {
        fn new(pages: Vec<Page>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<Seen> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl PageTransport for Scripted {
        async fn get(&self, url: &Url, query: Option<&Query>) -> Result<Page> {
            self.seen.lock().unwrap().push(Seen {
                url: url.to_string(),
                had_query: query.is_some(),
            });
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("unexpected request to {url}"))
        }
    }

    fn orders_page(start: u64, count: u64, next: Option<&str>) -> Page {
        let orders: Vec<Value> = (start..start + count)
            .map(|id| json!({"id": id, "created_at": "2024-01-01T00:00:00Z"}))
            .collect();
        Page {
            status: 200,
            link: next.map(|n| format!("<{n}>; rel=\"next\"")),
            body: Some(json!({ "orders": orders })),
        }
    }

    const PAGE2: &str = "https://demo.myshopify.com/admin/api/2023-10/orders.json?limit=250&page_info=p2";
    const PAGE3: &str = "https://demo.myshopify.com/admin/api/2023-10/orders.json?limit=250&page_info=p3";

    #[tokio::test]
    async fn two_pages_accumulate_in_order() {
        let transport = Scripted::new(vec![orders_page(1, 250, Some(PAGE2)), orders_page(251, 10, None)]);
        let client = ShopifyClient::with_transport(&test_config(), transport);
        let orders = client.fetch_all("orders").await.unwrap();

        assert_eq!(orders.len(), 260);
        assert_eq!(orders[0]["id"], json!(1));
        assert_eq!(orders[259]["id"], json!(260));
    }

    #[tokio::test]
    async fn next_page_url_is_used_verbatim_without_query() {
        let transport = Scripted::new(vec![orders_page(1, 2, Some(PAGE2)), orders_page(3, 1, None)]);
        let client = ShopifyClient::with_transport(&test_config(), transport);
        client.fetch_all("orders").await.unwrap();

        let seen = client.transport.seen();
        assert_eq!(
            seen,
            vec![
                Seen {
                    url: "https://demo.myshopify.com/admin/api/2023-10/orders.json".into(),
                    had_query: true
                },
                Seen {
                    url: PAGE2.into(),
                    had_query: false
                },
            ]
        );
    }

    #[tokio::test]
    async fn failing_status_returns_partial_results() {
        let failed = Page {
            status: 429,
            link: None,
            body: None,
        };
        let transport = Scripted::new(vec![
            orders_page(1, 250, Some(PAGE2)),
            orders_page(251, 250, Some(PAGE3)),
            failed,
        ]);
        let client = ShopifyClient::with_transport(&test_config(), transport);
        let orders = client.fetch_all("orders").await.unwrap();

        assert_eq!(orders.len(), 500);
        assert_eq!(client.transport.seen().len(), 3);
    }

    #[tokio::test]
    async fn first_page_failure_yields_empty() {
        let transport = Scripted::new(vec![Page {
            status: 401,
            link: None,
            body: None,
        }]);
        let client = ShopifyClient::with_transport(&test_config(), transport);
        assert!(client.fetch_all("orders").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn previous_only_link_stops() {
        let mut page = orders_page(1, 3, None);
        page.link = Some(format!("<{PAGE2}>; rel=\"previous\""));
        let transport = Scripted::new(vec![page]);
        let client = ShopifyClient::with_transport(&test_config(), transport);

        assert_eq!(client.fetch_all("orders").await.unwrap().len(), 3);
        assert_eq!(client.transport.seen().len(), 1);
    }

    #[tokio::test]
    async fn transport_error_propagates() {
        let transport = Scripted::new(vec![]);
        let client = ShopifyClient::with_transport(&test_config(), transport);
        assert!(client.fetch_all("orders").await.is_err());
    }

    #[test]
    fn missing_collection_key_is_an_empty_page() {
        assert!(take_records(Some(json!({"errors": "nope"})), "orders").is_empty());
        assert!(take_records(None, "orders").is_empty());
        assert_eq!(take_records(Some(json!({"orders": [1, 2]})), "orders").len(), 2);
    }
}
