//! HTTP change feed implementation.
//!
//! This module provides an HTTP-based change feed talking to the
//! repository's web scripts. The actual HTTP client is abstracted via a
//! trait so tests can route requests in-process; [`BlockingHttpClient`] is
//! the default implementation.

use crate::config::RepositoryConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::ChangeFeed;
use alfsync_protocol::{
    parse_metadata, parse_user, parse_users, AlfrescoUser, ChangeBatch, CursorState, FieldMap,
    PageLimits,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::RwLock;
use tracing::{debug, warn};

const PARAM_LAST_TXN_ID: &str = "lastTxnId";
const PARAM_LAST_ACL_CS_ID: &str = "lastAclChangesetId";
const PARAM_MAX_TXNS: &str = "maxTxns";
const PARAM_MAX_ACL_CS: &str = "maxAclChangesets";
const PARAM_REINDEX_FROM: &str = "reindexfrom";
const PARAM_REINDEX_START: &str = "startIndex";
const PARAM_REINDEX_TO: &str = "toIndex";

/// A GET request as issued by [`HttpChangeFeed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Full URL including the query string.
    pub url: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// Returns the value of a header, if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// HTTP client abstraction.
///
/// Implementations must return the complete response body, and report
/// connection failures and non-success statuses as errors.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request and returns the response body.
    fn get(&self, request: &HttpRequest) -> Result<Vec<u8>, String>;
}

/// Blocking HTTP client backed by `reqwest`.
///
/// Every request uses a fresh client that is dropped before returning, and
/// the response body is always read to the end.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockingHttpClient;

impl HttpClient for BlockingHttpClient {
    fn get(&self, request: &HttpRequest) -> Result<Vec<u8>, String> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| e.to_string())?;

        let mut builder = client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().map_err(|e| e.to_string())?;
        let status = response.status();
        let body = response.bytes().map_err(|e| e.to_string())?;

        if !status.is_success() {
            return Err(format!("HTTP {} from {}", status, request.url));
        }
        Ok(body.to_vec())
    }
}

/// HTTP-based change feed.
///
/// Uses JSON response bodies and optional Basic authentication.
pub struct HttpChangeFeed<C: HttpClient> {
    changes_url: String,
    metadata_url: String,
    authorities_url: String,
    authorization: Option<String>,
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpChangeFeed<C> {
    /// Creates a new HTTP change feed.
    pub fn new(config: &RepositoryConfig, client: C) -> Self {
        Self {
            changes_url: config.changes_url(),
            metadata_url: config.metadata_url(),
            authorities_url: config.authorities_url(),
            authorization: config
                .credentials()
                .map(|(user, pass)| basic_authorization(user, pass)),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the changes endpoint URL.
    pub fn changes_url(&self) -> &str {
        &self.changes_url
    }

    /// Returns the underlying HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the last transport error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn request(&self, url: String) -> HttpRequest {
        let mut headers = vec![("Accept".to_string(), "application/json".to_string())];
        if let Some(auth) = &self.authorization {
            headers.push(("Authorization".to_string(), auth.clone()));
        }
        HttpRequest { url, headers }
    }

    fn get(&self, url: String) -> SyncResult<Vec<u8>> {
        debug!("Hitting url: {}", url);
        let request = self.request(url);

        match self.client.get(&request) {
            Ok(body) => {
                *self.last_error.write() = None;
                Ok(body)
            }
            Err(e) => {
                warn!("Request to {} failed: {}", request.url, e);
                *self.last_error.write() = Some(e.clone());
                Err(SyncError::unreachable(e))
            }
        }
    }
}

impl<C: HttpClient> ChangeFeed for HttpChangeFeed<C> {
    fn fetch_incremental(&self, cursor: CursorState, limits: PageLimits) -> SyncResult<ChangeBatch> {
        let url = format!("{}?{}", self.changes_url, incremental_query(cursor, limits));
        let body = self.get(url)?;
        Ok(ChangeBatch::parse(&body)?)
    }

    fn fetch_full_reindex(&self, path: &str, start_index: u64, end_index: u64) -> SyncResult<ChangeBatch> {
        let url = format!(
            "{}?{}",
            self.changes_url,
            reindex_query(path, start_index, end_index)
        );
        let body = self.get(url)?;
        Ok(ChangeBatch::parse(&body)?)
    }

    fn fetch_metadata(&self, node_uuid: &str) -> SyncResult<FieldMap> {
        let body = self.get(format!("{}/{}", self.metadata_url, node_uuid))?;
        Ok(parse_metadata(&body)?)
    }

    fn fetch_user_authorities(&self, username: &str) -> SyncResult<AlfrescoUser> {
        let url = format!("{}{}", self.authorities_url, urlencoding::encode(username));
        let body = self.get(url)?;
        Ok(parse_user(&body)?)
    }

    fn fetch_all_user_authorities(&self) -> SyncResult<Vec<AlfrescoUser>> {
        let body = self.get(self.authorities_url.clone())?;
        Ok(parse_users(&body)?)
    }
}

/// Builds the `Authorization` header value for Basic authentication.
///
/// Credentials may arrive percent-encoded from configuration and are
/// decoded first; undecodable input is used as-is.
pub fn basic_authorization(username: &str, password: &str) -> String {
    let decode = |raw: &str| {
        urlencoding::decode(raw)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| raw.to_string())
    };
    let pair = format!("{}:{}", decode(username), decode(password));
    format!("Basic {}", STANDARD.encode(pair.as_bytes()))
}

fn incremental_query(cursor: CursorState, limits: PageLimits) -> String {
    let mut query = format!(
        "{}={}&{}={}",
        PARAM_LAST_TXN_ID,
        cursor.last_transaction_id,
        PARAM_LAST_ACL_CS_ID,
        cursor.last_acl_changeset_id
    );
    if let Some(max) = limits.max_transactions {
        query.push_str(&format!("&{}={}", PARAM_MAX_TXNS, max));
    }
    if let Some(max) = limits.max_acl_changesets {
        query.push_str(&format!("&{}={}", PARAM_MAX_ACL_CS, max));
    }
    query
}

fn reindex_query(path: &str, start_index: u64, end_index: u64) -> String {
    format!(
        "{}={}&{}={}&{}={}",
        PARAM_REINDEX_FROM,
        urlencoding::encode(path),
        PARAM_REINDEX_START,
        start_index,
        PARAM_REINDEX_TO,
        end_index
    )
}

/// Trait for in-process servers that can answer loopback requests.
pub trait LoopbackServer {
    /// Handles a GET for `path` (everything after the host, including the
    /// query string) and returns the response body.
    fn handle_get(&self, path: &str) -> Result<Vec<u8>, String>;
}

/// A loopback HTTP client that routes requests directly to an in-process
/// server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    fn get(&self, request: &HttpRequest) -> Result<Vec<u8>, String> {
        // Strip scheme and authority
        let url = request.url.as_str();
        let after_scheme = url.find("://").map(|i| &url[i + 3..]).unwrap_or(url);
        let path = after_scheme
            .find('/')
            .map(|i| &after_scheme[i..])
            .unwrap_or("/");

        self.server.handle_get(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryConfig;

    #[derive(Default)]
    struct TestClient {
        response: RwLock<Option<Vec<u8>>>,
        requests: RwLock<Vec<HttpRequest>>,
    }

    impl TestClient {
        fn responding(body: &str) -> Self {
            let client = Self::default();
            *client.response.write() = Some(body.as_bytes().to_vec());
            client
        }
    }

    impl HttpClient for TestClient {
        fn get(&self, request: &HttpRequest) -> Result<Vec<u8>, String> {
            self.requests.write().push(request.clone());
            self.response
                .read()
                .clone()
                .ok_or_else(|| "connection refused".into())
        }
    }

    impl HttpClient for &TestClient {
        fn get(&self, request: &HttpRequest) -> Result<Vec<u8>, String> {
            (*self).get(request)
        }
    }

    fn last_request(client: &TestClient) -> HttpRequest {
        client.requests.read().last().cloned().unwrap()
    }

    #[test]
    fn incremental_request_without_limits() {
        let client = TestClient::responding(r#"{"last_txn_id":"5","last_acl_changeset_id":"2","docs":[]}"#);
        let feed = HttpChangeFeed::new(&RepositoryConfig::default(), &client);

        let batch = feed
            .fetch_incremental(CursorState::new(3, 1), PageLimits::unset())
            .unwrap();
        assert_eq!(batch.cursor(), CursorState::new(5, 2));

        let request = last_request(&client);
        assert_eq!(
            request.url,
            "http://localhost/alfresco/service/node/changes/workspace/SpacesStore?lastTxnId=3&lastAclChangesetId=1"
        );
        assert_eq!(request.header("Accept"), Some("application/json"));
        assert_eq!(request.header("Authorization"), None);
    }

    #[test]
    fn incremental_request_with_limits() {
        let client = TestClient::responding("{}");
        let feed = HttpChangeFeed::new(&RepositoryConfig::default(), &client);

        let limits = PageLimits::unset()
            .with_max_transactions(100)
            .with_max_acl_changesets(10);
        feed.fetch_incremental(CursorState::default(), limits).unwrap();

        assert!(last_request(&client)
            .url
            .ends_with("?lastTxnId=0&lastAclChangesetId=0&maxTxns=100&maxAclChangesets=10"));
    }

    #[test]
    fn reindex_request_encodes_path() {
        let client = TestClient::responding(r#"{"docs":[]}"#);
        let feed = HttpChangeFeed::new(&RepositoryConfig::default(), &client);

        feed.fetch_full_reindex("/app:company_home/cm:Sites", 0, 500)
            .unwrap();

        assert!(last_request(&client).url.ends_with(
            "?reindexfrom=%2Fapp%3Acompany_home%2Fcm%3ASites&startIndex=0&toIndex=500"
        ));
    }

    #[test]
    fn basic_auth_header() {
        let client = TestClient::responding("{}");
        let config = RepositoryConfig::default().with_credentials("admin", "admin");
        let feed = HttpChangeFeed::new(&config, &client);

        feed.fetch_incremental(CursorState::default(), PageLimits::unset())
            .unwrap();
        assert_eq!(
            last_request(&client).header("Authorization"),
            Some("Basic YWRtaW46YWRtaW4=")
        );
    }

    #[test]
    fn basic_auth_decodes_credentials() {
        assert_eq!(
            basic_authorization("ad%40min", "p%3Ass"),
            basic_authorization("ad@min", "p:ss")
        );
        assert_eq!(basic_authorization("a", "b"), "Basic YTpi");
    }

    #[test]
    fn metadata_request() {
        let client = TestClient::responding(
            r#"{"type":"cm:content","properties":[{"name":"cm:title","value":"Budget"}]}"#,
        );
        let feed = HttpChangeFeed::new(&RepositoryConfig::default(), &client);

        let metadata = feed.fetch_metadata("B").unwrap();
        assert_eq!(metadata.get("cm:title").and_then(|v| v.as_str()), Some("Budget"));
        assert_eq!(
            last_request(&client).url,
            "http://localhost/alfresco/service/node/details/workspace/SpacesStore/B"
        );
    }

    #[test]
    fn metadata_properties_not_a_list() {
        let client = TestClient::responding(r#"{"properties":"cm:title"}"#);
        let feed = HttpChangeFeed::new(&RepositoryConfig::default(), &client);

        let result = feed.fetch_metadata("B");
        assert!(matches!(result, Err(SyncError::MalformedResponse { .. })));
    }

    #[test]
    fn authorities_requests() {
        let client = TestClient::responding(r#"{"username":"admin","authorities":["GROUP_EVERYONE"]}"#);
        let feed = HttpChangeFeed::new(&RepositoryConfig::default(), &client);

        let user = feed.fetch_user_authorities("admin").unwrap();
        assert_eq!(user.authorities, vec!["GROUP_EVERYONE"]);
        assert_eq!(
            last_request(&client).url,
            "http://localhost/alfresco/service/api/node/auth/resolve/admin"
        );

        // A single object is not a user listing
        let result = feed.fetch_all_user_authorities();
        assert!(matches!(result, Err(SyncError::MalformedResponse { .. })));
        assert!(last_request(&client).url.ends_with("/api/node/auth/resolve/"));
    }

    #[test]
    fn transport_failure_is_unreachable() {
        let client = TestClient::default();
        let feed = HttpChangeFeed::new(&RepositoryConfig::default(), &client);

        let result = feed.fetch_incremental(CursorState::default(), PageLimits::unset());
        assert!(matches!(result, Err(SyncError::Unreachable { .. })));
        assert_eq!(feed.last_error().as_deref(), Some("connection refused"));
    }

    #[test]
    fn non_json_body_is_unreachable() {
        let client = TestClient::responding("<html>Service Unavailable</html>");
        let feed = HttpChangeFeed::new(&RepositoryConfig::default(), &client);

        let result = feed.fetch_incremental(CursorState::default(), PageLimits::unset());
        assert!(matches!(result, Err(SyncError::Unreachable { .. })));
    }

    /// Answers a single request on an ephemeral port with `status` and
    /// `body`, returning the `host:port` to connect to.
    fn serve_once(status: &'static str, body: &'static str) -> String {
        use std::io::{BufRead, BufReader, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
                line.clear();
            }

            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            )
            .unwrap();
            stream.flush().unwrap();
        });

        addr
    }

    #[test]
    fn blocking_client_error_status_is_unreachable() {
        let addr = serve_once(
            "500 Internal Server Error",
            r#"{"last_txn_id":"5","last_acl_changeset_id":"1","docs":[]}"#,
        );
        let feed = HttpChangeFeed::new(&RepositoryConfig::new(addr), BlockingHttpClient);

        let result = feed.fetch_incremental(CursorState::default(), PageLimits::unset());
        match result {
            Err(SyncError::Unreachable { message }) => assert!(message.contains("HTTP 500")),
            other => panic!("expected unreachable, got {other:?}"),
        }
        assert!(feed.last_error().is_some());
    }

    #[test]
    fn blocking_client_reads_success_body() {
        let addr = serve_once(
            "200 OK",
            r#"{"last_txn_id":"5","last_acl_changeset_id":"1","docs":[{"uuid":"A","deleted":false}]}"#,
        );
        let feed = HttpChangeFeed::new(&RepositoryConfig::new(addr), BlockingHttpClient);

        let batch = feed
            .fetch_incremental(CursorState::default(), PageLimits::unset())
            .unwrap();
        assert_eq!(batch.cursor(), CursorState::new(5, 1));
        assert_eq!(batch.documents.len(), 1);
        assert_eq!(feed.last_error(), None);
    }

    struct EchoServer;

    impl LoopbackServer for EchoServer {
        fn handle_get(&self, path: &str) -> Result<Vec<u8>, String> {
            Ok(path.as_bytes().to_vec())
        }
    }

    #[test]
    fn loopback_strips_authority() {
        let client = LoopbackClient::new(EchoServer);
        let request = HttpRequest {
            url: "http://localhost:8080/alfresco/service/node/changes?lastTxnId=1".into(),
            headers: Vec::new(),
        };
        assert_eq!(
            client.get(&request).unwrap(),
            b"/alfresco/service/node/changes?lastTxnId=1".to_vec()
        );
    }
}
