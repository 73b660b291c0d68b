//! In-memory stand-in for the HubSpot CRM object and association endpoints.
//!
//! Implements just enough of the real service for end-to-end tests: cursor
//! pagination, batch create/update/archive with the `Property values were
//! not valid: [...]` validation envelope, 207 multi-status on unknown ids,
//! v4 association batches, and scripted 429 throttling.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::Arc,
};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const MAX_BATCH_INPUTS: usize = 100;
pub const DEFAULT_PAGE_LIMIT: usize = 10;
pub const DAILY_REMAINING_HEADER: &str = "x-hubspot-ratelimit-daily-remaining";
pub const VALIDATION_ERROR_PREFIX: &str = "Property values were not valid: ";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredObject {
    pub id: String,
    pub properties: BTreeMap<String, String>,
    pub archived: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAssociation {
    pub from_object_type_id: String,
    pub from_object_id: i64,
    pub to_object_type_id: String,
    pub to_object_id: i64,
    pub labels: Vec<String>,
    #[serde(skip)]
    pub types: Vec<AssociationTypeInput>,
}

#[derive(Deserialize)]
pub struct BatchInputs<T> {
    pub inputs: Vec<T>,
}

#[derive(Deserialize)]
pub struct ObjectInput {
    pub id: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Deserialize)]
pub struct IdInput {
    pub id: String,
}

#[derive(Deserialize)]
pub struct AssociationId {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationTypeInput {
    pub association_category: String,
    pub association_type_id: i64,
}

#[derive(Deserialize)]
pub struct AssociationInput {
    pub from: AssociationId,
    pub to: AssociationId,
    #[serde(default)]
    pub types: Vec<AssociationTypeInput>,
}

#[derive(Deserialize)]
pub struct AssociationArchiveInput {
    pub from: AssociationId,
    #[serde(default)]
    pub to: Vec<AssociationId>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReadRequest {
    #[serde(default)]
    pub properties: Vec<String>,
    #[serde(default)]
    pub properties_with_history: Vec<String>,
    pub id_property: Option<String>,
    pub inputs: Vec<IdInput>,
}

#[derive(Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
    pub after: Option<String>,
}

/// Body of `POST /__control/throttle`: queue `count` 429 responses, each
/// carrying `daily_remaining` in the quota header when set.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottleScript {
    pub count: usize,
    pub daily_remaining: Option<u64>,
}

#[derive(Default)]
pub struct Store {
    objects: HashMap<String, Vec<StoredObject>>,
    associations: Vec<StoredAssociation>,
    throttles: VecDeque<Option<u64>>,
    next_id: u64,
}

impl Store {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    fn live(&self, object_type: &str) -> Vec<StoredObject> {
        self.objects
            .get(object_type)
            .map(|all| all.iter().filter(|o| !o.archived).cloned().collect())
            .unwrap_or_default()
    }
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    Router::new()
        .route("/crm/v3/objects/{object_type}", get(list_objects))
        .route("/crm/v3/objects/{object_type}/batch/create", post(batch_create))
        .route("/crm/v3/objects/{object_type}/batch/update", post(batch_update))
        .route("/crm/v3/objects/{object_type}/batch/archive", post(batch_archive))
        .route("/crm/v3/objects/{object_type}/batch/read", post(batch_read))
        .route(
            "/crm/v4/associations/{from}/{to}/batch/create",
            post(create_associations),
        )
        .route(
            "/crm/v4/associations/{from}/{to}/batch/read",
            post(read_associations),
        )
        .route(
            "/crm/v4/associations/{from}/{to}/batch/archive",
            post(archive_associations),
        )
        .route("/__control/throttle", post(script_throttle))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Well-known type ids reported in association results.
pub fn object_type_id(object_type: &str) -> String {
    match object_type {
        "contacts" => "0-1",
        "companies" => "0-2",
        "deals" => "0-3",
        "tickets" => "0-5",
        other => other,
    }
    .to_string()
}

fn error_response(status: StatusCode, category: &str, message: String) -> Response {
    let body = serde_json::json!({
        "status": "error",
        "message": message,
        "correlationId": Uuid::new_v4(),
        "category": category,
    });
    (status, Json(body)).into_response()
}

/// Pop one scripted throttle, if any, and turn it into a 429.
async fn throttled(db: &Db) -> Option<Response> {
    let remaining = db.write().await.throttles.pop_front()?;
    tracing::info!(daily_remaining = ?remaining, "throttling request");
    let mut response = error_response(
        StatusCode::TOO_MANY_REQUESTS,
        "RATE_LIMITS",
        "You have reached your secondly limit.".to_string(),
    );
    if let Some(remaining) = remaining {
        if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
            response.headers_mut().insert(DAILY_REMAINING_HEADER, value);
        }
    }
    Some(response)
}

/// Server-side property validation, in the shape the real API reports it.
pub fn validate_properties(properties: &BTreeMap<String, String>) -> Vec<serde_json::Value> {
    let mut errors = Vec::new();
    if let Some(email) = properties.get("email") {
        if !email.is_empty() && !is_plausible_email(email) {
            errors.push(serde_json::json!({
                "isValid": false,
                "message": format!("Email address {email} is invalid"),
                "error": "INVALID_EMAIL",
                "name": "email",
            }));
        }
    }
    if let Some(count) = properties.get("numberofemployees") {
        if !count.is_empty() && count.parse::<i64>().is_err() {
            errors.push(serde_json::json!({
                "isValid": false,
                "message": format!("{count} was not a valid number."),
                "error": "INVALID_INTEGER",
                "name": "numberofemployees",
            }));
        }
    }
    errors
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    }
}

fn too_many(count: usize) -> Option<Response> {
    (count > MAX_BATCH_INPUTS).then(|| {
        error_response(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            format!("Too many inputs: {count} > {MAX_BATCH_INPUTS}"),
        )
    })
}

/// 200 when every input succeeded, otherwise 207 with the per-item errors.
fn batch_result<T: Serialize>(
    ok: StatusCode,
    results: Vec<T>,
    errors: Vec<serde_json::Value>,
) -> Response {
    if errors.is_empty() {
        let body = serde_json::json!({ "status": "COMPLETE", "results": results });
        return (ok, Json(body)).into_response();
    }
    let body = serde_json::json!({
        "status": "COMPLETE",
        "results": results,
        "numErrors": errors.len(),
        "errors": errors,
    });
    (StatusCode::MULTI_STATUS, Json(body)).into_response()
}

fn not_found(object_type: &str, ids: Vec<String>) -> serde_json::Value {
    serde_json::json!({
        "status": "error",
        "category": "OBJECT_NOT_FOUND",
        "message": format!("Could not get some {object_type} objects, they may be deleted or not exist."),
        "context": { "ids": ids },
    })
}

fn reject_invalid(inputs: &[ObjectInput]) -> Option<Response> {
    if let Some(response) = too_many(inputs.len()) {
        return Some(response);
    }
    let errors: Vec<_> = inputs
        .iter()
        .flat_map(|input| validate_properties(&input.properties))
        .collect();
    if errors.is_empty() {
        return None;
    }
    let embedded = serde_json::Value::Array(errors).to_string();
    Some(error_response(
        StatusCode::BAD_REQUEST,
        "VALIDATION_ERROR",
        format!("{VALIDATION_ERROR_PREFIX}{embedded}"),
    ))
}

async fn list_objects(
    State(db): State<Db>,
    Path(object_type): Path<String>,
    Query(params): Query<ListParams>,
) -> Response {
    if let Some(response) = throttled(&db).await {
        return response;
    }
    let start = match params.after.as_deref().map(str::parse::<usize>) {
        None => 0,
        Some(Ok(start)) => start,
        Some(Err(_)) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                "Invalid paging cursor".to_string(),
            )
        }
    };
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_BATCH_INPUTS);

    let all = db.read().await.live(&object_type);
    let end = start.saturating_add(limit).min(all.len());
    let results = all.get(start..end).unwrap_or_default();
    let mut body = serde_json::json!({ "results": results });
    if end < all.len() {
        body["paging"] = serde_json::json!({
            "next": {
                "after": end.to_string(),
                "link": format!("/crm/v3/objects/{object_type}?after={end}"),
            }
        });
    }
    (StatusCode::OK, Json(body)).into_response()
}

async fn batch_create(
    State(db): State<Db>,
    Path(object_type): Path<String>,
    Json(batch): Json<BatchInputs<ObjectInput>>,
) -> Response {
    if let Some(response) = throttled(&db).await {
        return response;
    }
    if let Some(response) = reject_invalid(&batch.inputs) {
        return response;
    }
    let mut store = db.write().await;
    let mut results = Vec::with_capacity(batch.inputs.len());
    for input in batch.inputs {
        let object = StoredObject {
            id: store.allocate_id(),
            properties: input.properties,
            archived: false,
        };
        results.push(object.clone());
        store.objects.entry(object_type.clone()).or_default().push(object);
    }
    tracing::info!(%object_type, created = results.len(), "batch create");
    let body = serde_json::json!({ "status": "COMPLETE", "results": results });
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn batch_update(
    State(db): State<Db>,
    Path(object_type): Path<String>,
    Json(batch): Json<BatchInputs<ObjectInput>>,
) -> Response {
    if let Some(response) = throttled(&db).await {
        return response;
    }
    if let Some(response) = reject_invalid(&batch.inputs) {
        return response;
    }
    let mut store = db.write().await;
    let objects = store.objects.entry(object_type.clone()).or_default();
    let mut results = Vec::new();
    let mut errors = Vec::new();
    for input in batch.inputs {
        let id = input.id.unwrap_or_default();
        match objects.iter_mut().find(|o| o.id == id && !o.archived) {
            Some(object) => {
                object.properties.extend(input.properties);
                results.push(object.clone());
            }
            None => errors.push(not_found(&object_type, vec![id])),
        }
    }
    tracing::info!(%object_type, updated = results.len(), failed = errors.len(), "batch update");
    batch_result(StatusCode::OK, results, errors)
}

async fn batch_archive(
    State(db): State<Db>,
    Path(object_type): Path<String>,
    Json(batch): Json<BatchInputs<IdInput>>,
) -> Response {
    if let Some(response) = throttled(&db).await {
        return response;
    }
    if let Some(response) = too_many(batch.inputs.len()) {
        return response;
    }
    let mut store = db.write().await;
    if let Some(objects) = store.objects.get_mut(&object_type) {
        for object in objects.iter_mut() {
            if batch.inputs.iter().any(|input| input.id == object.id) {
                object.archived = true;
            }
        }
    }
    tracing::info!(%object_type, archived = batch.inputs.len(), "batch archive");
    StatusCode::NO_CONTENT.into_response()
}

/// Look objects up by id, or by `idProperty` when given. Only the requested
/// properties are returned; without any, every stored property is.
async fn batch_read(
    State(db): State<Db>,
    Path(object_type): Path<String>,
    Json(batch): Json<BatchReadRequest>,
) -> Response {
    if let Some(response) = throttled(&db).await {
        return response;
    }
    if let Some(response) = too_many(batch.inputs.len()) {
        return response;
    }
    let live = db.read().await.live(&object_type);
    let wanted: Vec<&String> = batch
        .properties
        .iter()
        .chain(&batch.properties_with_history)
        .collect();
    let mut results = Vec::new();
    let mut missing = Vec::new();
    for input in batch.inputs {
        let found = live.iter().find(|object| match &batch.id_property {
            Some(property) => object.properties.get(property) == Some(&input.id),
            None => object.id == input.id,
        });
        match found {
            Some(object) => {
                let mut object = object.clone();
                if !wanted.is_empty() {
                    object.properties.retain(|name, _| wanted.contains(&name));
                }
                results.push(object);
            }
            None => missing.push(input.id),
        }
    }
    tracing::info!(%object_type, found = results.len(), missing = missing.len(), "batch read");
    let errors = if missing.is_empty() {
        Vec::new()
    } else {
        vec![not_found(&object_type, missing)]
    };
    batch_result(StatusCode::OK, results, errors)
}

async fn create_associations(
    State(db): State<Db>,
    Path((from, to)): Path<(String, String)>,
    Json(batch): Json<BatchInputs<AssociationInput>>,
) -> Response {
    if let Some(response) = throttled(&db).await {
        return response;
    }
    let mut store = db.write().await;
    let mut results = Vec::new();
    let mut errors = Vec::new();
    for input in batch.inputs {
        match (input.from.id.parse::<i64>(), input.to.id.parse::<i64>()) {
            (Ok(from_id), Ok(to_id)) => {
                let association = StoredAssociation {
                    from_object_type_id: object_type_id(&from),
                    from_object_id: from_id,
                    to_object_type_id: object_type_id(&to),
                    to_object_id: to_id,
                    labels: Vec::new(),
                    types: input.types,
                };
                store.associations.push(association.clone());
                results.push(association);
            }
            _ => errors.push(serde_json::json!({
                "status": "error",
                "category": "VALIDATION_ERROR",
                "message": format!("Invalid object id pair {} -> {}", input.from.id, input.to.id),
            })),
        }
    }
    tracing::info!(%from, %to, created = results.len(), failed = errors.len(), "association batch");
    batch_result(StatusCode::CREATED, results, errors)
}

fn same_pair(association: &StoredAssociation, from: &str, to: &str) -> bool {
    association.from_object_type_id == object_type_id(from)
        && association.to_object_type_id == object_type_id(to)
}

/// Group stored associations by source id. Ids with no association of the
/// requested pair are reported as 207 item errors.
async fn read_associations(
    State(db): State<Db>,
    Path((from, to)): Path<(String, String)>,
    Json(batch): Json<BatchInputs<IdInput>>,
) -> Response {
    if let Some(response) = throttled(&db).await {
        return response;
    }
    let store = db.read().await;
    let mut results = Vec::new();
    let mut errors = Vec::new();
    for input in batch.inputs {
        let targets: Vec<serde_json::Value> = store
            .associations
            .iter()
            .filter(|a| same_pair(a, &from, &to) && a.from_object_id.to_string() == input.id)
            .map(|a| {
                let types: Vec<_> = a
                    .types
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "category": t.association_category,
                            "typeId": t.association_type_id,
                            "label": null,
                        })
                    })
                    .collect();
                serde_json::json!({ "toObjectId": a.to_object_id, "associationTypes": types })
            })
            .collect();
        if targets.is_empty() {
            errors.push(serde_json::json!({
                "status": "error",
                "category": "OBJECT_NOT_FOUND",
                "message": format!("No {to} is associated with {from} {}", input.id),
                "context": { "fromObjectId": [input.id] },
            }));
        } else {
            results.push(serde_json::json!({ "from": { "id": input.id }, "to": targets }));
        }
    }
    tracing::info!(%from, %to, found = results.len(), missing = errors.len(), "association read");
    batch_result(StatusCode::OK, results, errors)
}

async fn archive_associations(
    State(db): State<Db>,
    Path((from, to)): Path<(String, String)>,
    Json(batch): Json<BatchInputs<AssociationArchiveInput>>,
) -> Response {
    if let Some(response) = throttled(&db).await {
        return response;
    }
    let mut store = db.write().await;
    let before = store.associations.len();
    store.associations.retain(|a| {
        !(same_pair(a, &from, &to)
            && batch.inputs.iter().any(|input| {
                input.from.id == a.from_object_id.to_string()
                    && input.to.iter().any(|target| target.id == a.to_object_id.to_string())
            }))
    });
    let removed = before - store.associations.len();
    tracing::info!(%from, %to, removed, "association archive");
    StatusCode::NO_CONTENT.into_response()
}

async fn script_throttle(State(db): State<Db>, Json(script): Json<ThrottleScript>) -> StatusCode {
    let mut store = db.write().await;
    store
        .throttles
        .extend(std::iter::repeat(script.daily_remaining).take(script.count));
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn valid_properties_pass() {
        let errors = validate_properties(&props(&[
            ("email", "ada@example.com"),
            ("numberofemployees", "12"),
        ]));
        assert!(errors.is_empty());
    }

    #[test]
    fn blank_email_is_accepted() {
        assert!(validate_properties(&props(&[("email", "")])).is_empty());
    }

    #[test]
    fn malformed_email_reports_invalid_email() {
        let errors = validate_properties(&props(&[("email", "not-an-email")]));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["error"], "INVALID_EMAIL");
        assert_eq!(errors[0]["message"], "Email address not-an-email is invalid");
    }

    #[test]
    fn non_numeric_count_reports_invalid_integer() {
        let errors = validate_properties(&props(&[("numberofemployees", "lots")]));
        assert_eq!(errors[0]["error"], "INVALID_INTEGER");
        assert_eq!(errors[0]["name"], "numberofemployees");
    }

    #[test]
    fn known_types_map_to_type_ids() {
        assert_eq!(object_type_id("contacts"), "0-1");
        assert_eq!(object_type_id("companies"), "0-2");
        assert_eq!(object_type_id("p_custom"), "p_custom");
    }

    #[test]
    fn stored_object_serializes_camel_case() {
        let object = StoredObject {
            id: "1".to_string(),
            properties: props(&[("email", "a@b.co")]),
            archived: false,
        };
        let json = serde_json::to_value(&object).unwrap();
        assert_eq!(json["id"], "1");
        assert_eq!(json["properties"]["email"], "a@b.co");
        assert_eq!(json["archived"], false);
    }
}
