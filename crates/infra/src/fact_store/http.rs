//! HTTP client for the hosted fact store.
//!
//! ## Endpoints
//!
//! | Operation   | Request                     | Body / query                                   | Response         |
//! |-------------|-----------------------------|------------------------------------------------|------------------|
//! | `tell`      | `POST /api/facts`           | wire fact                                      | ignored          |
//! | `bulk`      | `POST /api/bulk`            | `{"delete": [..], "tell": [..]}`               | ignored          |
//! | `authorize` | `POST /api/authorize`       | actor, action, resource                        | `{"allowed": b}` |
//! | `actions`   | `POST /api/actions`         | actor, resource                                | `{"results": []}`|
//! | `list`      | `POST /api/list`            | actor, action, resource type                   | `{"results": []}`|
//! | `get`       | `GET /api/facts`            | `predicate`, `args.N.type`, `args.N.id`        | `[wire fact]`    |
//!
//! ## Error Mapping
//!
//! | reqwest outcome            | StoreError    |
//! |----------------------------|---------------|
//! | timeout                    | `TimedOut`    |
//! | connect / other transport  | `Unreachable` |
//! | non-2xx status             | `Rejected`    |
//! | body decode failure        | `Malformed`   |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use factgate_core::{Action, EntityRef, Fact, ResourceKind, WireFact};

use super::r#trait::{FactStore, StoreError};

#[derive(Debug, Serialize)]
struct BulkBody {
    delete: Vec<WireFact>,
    tell: Vec<WireFact>,
}

#[derive(Debug, Serialize)]
struct AuthorizeBody<'a> {
    actor_type: &'a str,
    actor_id: &'a str,
    action: &'a str,
    resource_type: &'a str,
    resource_id: &'a str,
}

#[derive(Debug, Serialize)]
struct ActionsBody<'a> {
    actor_type: &'a str,
    actor_id: &'a str,
    resource_type: &'a str,
    resource_id: &'a str,
}

#[derive(Debug, Serialize)]
struct ListBody<'a> {
    actor_type: &'a str,
    actor_id: &'a str,
    action: &'a str,
    resource_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct AllowedResponse {
    allowed: bool,
}

#[derive(Debug, Deserialize)]
struct ResultsResponse {
    results: Vec<String>,
}

/// Fact store reached over HTTP with a bearer API key.
#[derive(Debug, Clone)]
pub struct HttpFactStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpFactStore {
    /// Every request is bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Unreachable(format!("failed to build http client: {e}")))?;
        Ok(Self::with_client(client, base_url, api_key))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            api_key,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = self.authed(request).send().await.map_err(map_transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(StoreError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StoreError> {
        let response = self.send(request).await?;
        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::TimedOut(e.to_string())
            } else {
                StoreError::Malformed(e.to_string())
            }
        })
    }
}

fn map_transport_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::TimedOut(err.to_string())
    } else if err.is_decode() {
        StoreError::Malformed(err.to_string())
    } else {
        StoreError::Unreachable(err.to_string())
    }
}

/// Query parameters for `GET /api/facts`.
///
/// Wildcard positions contribute only their type; fully unconstrained
/// positions contribute nothing.
pub fn fact_query(pattern: &Fact) -> Vec<(String, String)> {
    let mut params = vec![("predicate".to_string(), pattern.predicate().name().to_string())];
    for (i, term) in pattern.args().iter().enumerate() {
        if let Some(kind) = term.kind() {
            params.push((format!("args.{i}.type"), kind.to_string()));
        }
        if let Some(id) = term.id() {
            params.push((format!("args.{i}.id"), id.to_string()));
        }
    }
    params
}

#[async_trait]
impl FactStore for HttpFactStore {
    #[instrument(skip_all, fields(fact = %fact), err)]
    async fn tell(&self, fact: &Fact) -> Result<(), StoreError> {
        let request = self.client.post(self.url("/api/facts")).json(&fact.to_wire());
        self.send(request).await.map(|_| ())
    }

    #[instrument(skip_all, fields(deletes = delete.len(), tells = tell.len()), err)]
    async fn bulk(&self, delete: &[Fact], tell: &[Fact]) -> Result<(), StoreError> {
        let body = BulkBody {
            delete: delete.iter().map(Fact::to_wire).collect(),
            tell: tell.iter().map(Fact::to_wire).collect(),
        };
        let request = self.client.post(self.url("/api/bulk")).json(&body);
        self.send(request).await.map(|_| ())
    }

    #[instrument(skip_all, fields(actor = %actor, action = %action, resource = %resource), err)]
    async fn authorize(&self, actor: &EntityRef, action: &Action, resource: &EntityRef) -> Result<bool, StoreError> {
        let body = AuthorizeBody {
            actor_type: actor.kind.as_str(),
            actor_id: &actor.id,
            action: action.as_str(),
            resource_type: resource.kind.as_str(),
            resource_id: &resource.id,
        };
        let request = self.client.post(self.url("/api/authorize")).json(&body);
        let response: AllowedResponse = self.send_json(request).await?;
        Ok(response.allowed)
    }

    #[instrument(skip_all, fields(actor = %actor, resource = %resource), err)]
    async fn actions(&self, actor: &EntityRef, resource: &EntityRef) -> Result<Vec<String>, StoreError> {
        let body = ActionsBody {
            actor_type: actor.kind.as_str(),
            actor_id: &actor.id,
            resource_type: resource.kind.as_str(),
            resource_id: &resource.id,
        };
        let request = self.client.post(self.url("/api/actions")).json(&body);
        let response: ResultsResponse = self.send_json(request).await?;
        Ok(response.results)
    }

    #[instrument(skip_all, fields(actor = %actor, action = %action, kind = %kind), err)]
    async fn list(&self, actor: &EntityRef, action: &Action, kind: ResourceKind) -> Result<Vec<String>, StoreError> {
        let body = ListBody {
            actor_type: actor.kind.as_str(),
            actor_id: &actor.id,
            action: action.as_str(),
            resource_type: kind.as_str(),
        };
        let request = self.client.post(self.url("/api/list")).json(&body);
        let response: ResultsResponse = self.send_json(request).await?;
        Ok(response.results)
    }

    #[instrument(skip_all, fields(pattern = %pattern), err)]
    async fn get(&self, pattern: &Fact) -> Result<Vec<WireFact>, StoreError> {
        let request = self.client.get(self.url("/api/facts")).query(&fact_query(pattern));
        self.send_json(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use factgate_core::{FactEncoder, Predicate, Role, Term};

    #[test]
    fn query_carries_only_constrained_positions() {
        let pattern = Fact::new(
            Predicate::HasRole,
            vec![
                Term::of_kind(ResourceKind::User),
                Term::Any,
                Term::entity(&EntityRef::organization(2)),
            ],
        )
        .unwrap();

        let params = fact_query(&pattern);
        let expected: Vec<(String, String)> = [
            ("predicate", "has_role"),
            ("args.0.type", "User"),
            ("args.2.type", "Organization"),
            ("args.2.id", "2"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(params, expected);
    }

    #[test]
    fn bulk_body_uses_wire_shape() {
        let fact = FactEncoder::role_assignment(&EntityRef::user(1), &Role::ADMIN, &EntityRef::repository(7)).unwrap();
        let body = BulkBody {
            delete: vec![],
            tell: vec![fact.to_wire()],
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["delete"], serde_json::json!([]));
        assert_eq!(value["tell"][0]["predicate"], "has_role");
        assert_eq!(value["tell"][0]["args"][2]["id"], "7");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let store = HttpFactStore::with_client(Client::new(), "http://localhost:8080/", None);
        assert_eq!(store.url("/api/list"), "http://localhost:8080/api/list");
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        // Port 9 (discard) is not expected to be listening on loopback.
        let store = HttpFactStore::new("http://127.0.0.1:9", None, Duration::from_millis(500)).unwrap();
        let err = store
            .authorize(&EntityRef::user(1), &Action::READ, &EntityRef::repository(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unreachable(_) | StoreError::TimedOut(_)));
    }
}
