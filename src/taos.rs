//! TDengine sessions over the REST interface of `taosAdapter`.
//!
//! Each session owns an HTTP client limited to one idle keep-alive
//! connection, so a pooled session maps onto one TCP connection to the
//! adapter, the way a JDBC connection would.

use crate::conn::{Connector, Session};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const PING_SQL: &str = "select server_version()";

/// Opens [`RestSession`]s against one adapter.
#[derive(Debug, Clone)]
pub struct RestConnector {
    endpoint: String,
    user: String,
    password: String,
}

impl RestConnector {
    /// `endpoint` is the adapter base URL, e.g. `http://localhost:6041`.
    pub fn new(
        endpoint: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            user: user.into(),
            password: password.into(),
        }
    }
}

#[async_trait]
impl Connector for RestConnector {
    type Session = RestSession;

    async fn connect(&self) -> Result<RestSession> {
        let client = Client::builder()
            .pool_max_idle_per_host(1)
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .build()?;
        let mut session = RestSession {
            client,
            endpoint: self.endpoint.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            database: None,
            broken: false,
        };
        session.ping().await?;
        tracing::debug!("opened REST session to {}", self.endpoint);
        Ok(session)
    }
}

/// A TDengine session backed by the REST endpoint.
#[derive(Debug)]
pub struct RestSession {
    client: Client,
    endpoint: String,
    user: String,
    password: String,
    database: Option<String>,
    broken: bool,
}

impl RestSession {
    fn url(&self) -> String {
        match &self.database {
            Some(db) => format!("{}/rest/sql/{}", self.endpoint, db),
            None => format!("{}/rest/sql", self.endpoint),
        }
    }

    async fn post(&mut self, sql: &str) -> Result<RestResponse> {
        let sent = self
            .client
            .post(self.url())
            .basic_auth(&self.user, Some(&self.password))
            .body(sql.to_string())
            .send()
            .await;
        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                self.broken = true;
                return Err(e.into());
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                self.broken = true;
                return Err(e.into());
            }
        };
        decode_response(status.as_u16(), &body)
    }
}

#[async_trait]
impl Session for RestSession {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        let response = self.post(sql).await?;
        Ok(response.affected_rows())
    }

    async fn use_database(&mut self, database: &str) -> Result<()> {
        self.database = Some(database.to_string());
        Ok(())
    }

    async fn ping(&mut self) -> Result<()> {
        self.post(PING_SQL).await.map(|_| ())
    }

    fn is_broken(&self) -> bool {
        self.broken
    }
}

/// Body of a REST reply.
///
/// TDengine 3.x answers with `code`/`column_meta`, 2.x with
/// `status`/`head`; both carry `data` and `rows`.
#[derive(Debug, Deserialize)]
struct RestResponse {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    head: Vec<String>,
    #[serde(default)]
    column_meta: Vec<Vec<Value>>,
    #[serde(default)]
    data: Vec<Vec<Value>>,
    #[serde(default)]
    rows: u64,
}

impl RestResponse {
    fn is_error(&self) -> bool {
        self.code != 0 || self.status.as_deref() == Some("error")
    }

    fn first_column(&self) -> Option<&str> {
        self.column_meta
            .first()
            .and_then(|meta| meta.first())
            .and_then(Value::as_str)
            .or_else(|| self.head.first().map(String::as_str))
    }

    fn affected_rows(&self) -> u64 {
        if self.first_column() == Some("affected_rows") {
            if let Some(n) = self.data.first().and_then(|row| row.first()).and_then(Value::as_u64) {
                return n;
            }
        }
        self.rows
    }
}

fn decode_response(status: u16, body: &str) -> Result<RestResponse> {
    let response: RestResponse = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(_) if !(200..300).contains(&status) => {
            return Err(Error::Http {
                status,
                body: body.to_string(),
            })
        }
        Err(e) => return Err(e.into()),
    };

    if response.is_error() {
        return Err(Error::Server {
            code: response.code,
            desc: response.desc.unwrap_or_default(),
        });
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_affected_rows_from_v3_reply() {
        let body = r#"{"code":0,"column_meta":[["affected_rows","INT",4]],"data":[[3]],"rows":1}"#;
        let response = decode_response(200, body).unwrap();
        assert_eq!(response.affected_rows(), 3);
    }

    #[test]
    fn reads_affected_rows_from_v2_reply() {
        let body = r#"{"status":"succ","head":["affected_rows"],"column_meta":[["affected_rows",4,4]],"data":[[10]],"rows":1}"#;
        let response = decode_response(200, body).unwrap();
        assert_eq!(response.affected_rows(), 10);
    }

    #[test]
    fn query_reply_counts_rows() {
        let body = r#"{"code":0,"column_meta":[["server_version()","VARCHAR",7]],"data":[["3.0.4.1"]],"rows":1}"#;
        let response = decode_response(200, body).unwrap();
        assert_eq!(response.affected_rows(), 1);
    }

    #[test]
    fn server_errors_carry_code_and_description() {
        let body = r#"{"code":9731,"desc":"Table does not exist"}"#;
        match decode_response(200, body) {
            Err(Error::Server { code, desc }) => {
                assert_eq!(code, 9731);
                assert_eq!(desc, "Table does not exist");
            }
            other => panic!("unexpected {:?}", other),
        }

        let body = r#"{"status":"error","code":866,"desc":"invalid SQL"}"#;
        assert!(matches!(
            decode_response(200, body),
            Err(Error::Server { code: 866, .. })
        ));
    }

    #[test]
    fn non_json_error_page_is_an_http_error() {
        match decode_response(401, "Unauthorized") {
            Err(Error::Http { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "Unauthorized");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(decode_response(200, "<html>"), Err(Error::Decode(_))));
    }

    #[test]
    fn url_tracks_selected_database() {
        let connector = RestConnector::new("http://td:6041/", "root", "taosdata");
        let mut session = RestSession {
            client: Client::new(),
            endpoint: connector.endpoint.clone(),
            user: connector.user.clone(),
            password: connector.password.clone(),
            database: None,
            broken: false,
        };
        assert_eq!(session.url(), "http://td:6041/rest/sql");
        session.database = Some("pool_test".to_string());
        assert_eq!(session.url(), "http://td:6041/rest/sql/pool_test");
    }
}
