//! Stateless HTTP request builder and response parser for the CRM API.
//!
//! # Design
//! `CrmClient` holds only the base URL and a static access token and carries
//! no mutable state between calls. Each operation is split into a `build_*`
//! method that produces an `HttpRequest` and a `parse_*`/`classify_*` method
//! that consumes an `HttpResponse`. The host (or `BatchEngine`) executes the
//! round-trip in between.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use url::form_urlencoded;

use crate::config::{redact, ClientConfig};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::recovery::{classify_batch_response, ChunkOutcome};
use crate::types::{
    AssociationArchive, AssociationLink, BatchInput, BatchReadQuery, ListObjectsQuery,
    ListResponse, ObjectType,
};

/// Which batch write endpoint to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOperation {
    Create,
    Update,
}

impl BatchOperation {
    fn segment(self) -> &'static str {
        match self {
            BatchOperation::Create => "create",
            BatchOperation::Update => "update",
        }
    }
}

#[derive(Serialize)]
struct Inputs<'a, I> {
    inputs: &'a [I],
}

#[derive(Serialize)]
struct IdInput<'a> {
    id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchReadBody<'a> {
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    properties: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    properties_with_history: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    id_property: Option<&'a str>,
    inputs: Vec<IdInput<'a>>,
}

fn id_inputs(ids: &[String]) -> Vec<IdInput<'_>> {
    ids.iter().map(|id| IdInput { id }).collect()
}

/// Synchronous, stateless client for the CRM REST API.
#[derive(Clone)]
pub struct CrmClient {
    base_url: String,
    access_token: Option<String>,
}

impl fmt::Debug for CrmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrmClient")
            .field("base_url", &self.base_url)
            .field("access_token", &redact(&self.access_token))
            .finish()
    }
}

impl CrmClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_list_objects(
        &self,
        object_type: &ObjectType,
        query: &ListObjectsQuery,
        after: Option<&str>,
    ) -> HttpRequest {
        let mut params = form_urlencoded::Serializer::new(String::new());
        if let Some(limit) = query.limit {
            params.append_pair("limit", &limit.to_string());
        }
        if let Some(after) = after.filter(|a| !a.is_empty()) {
            params.append_pair("after", after);
        }
        if !query.properties.is_empty() {
            params.append_pair("properties", &query.properties.join(","));
        }
        if !query.properties_with_history.is_empty() {
            params.append_pair(
                "propertiesWithHistory",
                &query.properties_with_history.join(","),
            );
        }
        if !query.associations.is_empty() {
            params.append_pair("associations", &query.associations.join(","));
        }
        if let Some(archived) = query.archived {
            params.append_pair("archived", &archived.to_string());
        }
        let params = params.finish();

        let mut path = format!("{}/crm/v3/objects/{object_type}", self.base_url);
        if !params.is_empty() {
            path.push('?');
            path.push_str(&params);
        }
        self.request(HttpMethod::Get, path, None)
    }

    pub fn build_batch_write(
        &self,
        object_type: &ObjectType,
        operation: BatchOperation,
        inputs: &[BatchInput],
    ) -> Result<HttpRequest, ApiError> {
        let body = to_json(&Inputs { inputs })?;
        Ok(self.request(
            HttpMethod::Post,
            format!(
                "{}/crm/v3/objects/{object_type}/batch/{}",
                self.base_url,
                operation.segment()
            ),
            Some(body),
        ))
    }

    pub fn build_batch_archive(
        &self,
        object_type: &ObjectType,
        ids: &[String],
    ) -> Result<HttpRequest, ApiError> {
        let body = to_json(&Inputs {
            inputs: &id_inputs(ids),
        })?;
        Ok(self.request(
            HttpMethod::Post,
            format!("{}/crm/v3/objects/{object_type}/batch/archive", self.base_url),
            Some(body),
        ))
    }

    pub fn build_batch_create_associations(
        &self,
        from: &ObjectType,
        to: &ObjectType,
        inputs: &[AssociationLink],
    ) -> Result<HttpRequest, ApiError> {
        let body = to_json(&Inputs { inputs })?;
        Ok(self.request(
            HttpMethod::Post,
            format!("{}/crm/v4/associations/{from}/{to}/batch/create", self.base_url),
            Some(body),
        ))
    }

    /// Read objects by id (or by `query.id_property` values).
    pub fn build_batch_read(
        &self,
        object_type: &ObjectType,
        query: &BatchReadQuery,
        ids: &[String],
    ) -> Result<HttpRequest, ApiError> {
        let body = to_json(&BatchReadBody {
            properties: &query.properties,
            properties_with_history: &query.properties_with_history,
            id_property: query.id_property.as_deref(),
            inputs: id_inputs(ids),
        })?;
        Ok(self.request(
            HttpMethod::Post,
            format!("{}/crm/v3/objects/{object_type}/batch/read", self.base_url),
            Some(body),
        ))
    }

    pub fn build_batch_read_associations(
        &self,
        from: &ObjectType,
        to: &ObjectType,
        ids: &[String],
    ) -> Result<HttpRequest, ApiError> {
        let body = to_json(&Inputs {
            inputs: &id_inputs(ids),
        })?;
        Ok(self.request(
            HttpMethod::Post,
            format!("{}/crm/v4/associations/{from}/{to}/batch/read", self.base_url),
            Some(body),
        ))
    }

    pub fn build_batch_archive_associations(
        &self,
        from: &ObjectType,
        to: &ObjectType,
        inputs: &[AssociationArchive],
    ) -> Result<HttpRequest, ApiError> {
        let body = to_json(&Inputs { inputs })?;
        Ok(self.request(
            HttpMethod::Post,
            format!("{}/crm/v4/associations/{from}/{to}/batch/archive", self.base_url),
            Some(body),
        ))
    }

    pub fn parse_list_page<T: DeserializeOwned>(
        &self,
        response: HttpResponse,
    ) -> Result<ListResponse<T>, ApiError> {
        check_status(&response, &[200])?;
        serde_json::from_str(&response.body)
            .map_err(|e| ApiError::DeserializationError(e.to_string()))
    }

    pub fn classify_batch_write<T: DeserializeOwned>(
        &self,
        response: HttpResponse,
    ) -> ChunkOutcome<T> {
        classify_batch_response(response)
    }

    /// Archive endpoints answer 204 with no body; 200 is accepted as well.
    pub fn parse_batch_archive(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response, &[200, 204])
    }

    fn request(&self, method: HttpMethod, path: String, body: Option<String>) -> HttpRequest {
        let mut headers = Vec::new();
        if let Some(token) = &self.access_token {
            headers.push(("authorization".to_string(), format!("Bearer {token}")));
        }
        if body.is_some() {
            headers.push(("content-type".to_string(), "application/json".to_string()));
        }
        HttpRequest {
            method,
            path,
            headers,
            body,
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string(value).map_err(|e| ApiError::SerializationError(e.to_string()))
}

/// Map statuses outside `expected` to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse, expected: &[u16]) -> Result<(), ApiError> {
    if expected.contains(&response.status) {
        return Ok(());
    }
    Err(ApiError::from_response(response))
}
