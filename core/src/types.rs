//! Wire DTOs for the CRM endpoints the engine drives.
//!
//! # Design
//! Only the shapes the batch engine reads or writes are modelled. Entity
//! payloads stay generic (`CrmObject` with a property map) because the
//! engine never inspects anything but the `email` property. Properties use a
//! `BTreeMap` so request bodies serialize deterministically.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Property the invalid-email recovery inspects and blanks.
pub const EMAIL_PROPERTY: &str = "email";

/// CRM object type segment used in `/crm/v3/objects/{type}` paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Calls,
    Companies,
    Contacts,
    Courses,
    Deals,
    Emails,
    FeedbackSubmissions,
    LineItems,
    Meetings,
    Notes,
    Products,
    Quotes,
    Tasks,
    Tickets,
    /// A custom object, addressed by its fully qualified name or type id.
    Custom(String),
}

impl ObjectType {
    pub fn as_str(&self) -> &str {
        match self {
            ObjectType::Calls => "calls",
            ObjectType::Companies => "companies",
            ObjectType::Contacts => "contacts",
            ObjectType::Courses => "0-410",
            ObjectType::Deals => "deals",
            ObjectType::Emails => "emails",
            ObjectType::FeedbackSubmissions => "feedback_submissions",
            ObjectType::LineItems => "line_items",
            ObjectType::Meetings => "meetings",
            ObjectType::Notes => "notes",
            ObjectType::Products => "products",
            ObjectType::Quotes => "quotes",
            ObjectType::Tasks => "tasks",
            ObjectType::Tickets => "tickets",
            ObjectType::Custom(name) => name,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who defined an association type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssociationCategory {
    HubspotDefined,
    UserDefined,
    IntegratorDefined,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationType {
    pub association_category: AssociationCategory,
    pub association_type_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationId {
    pub id: String,
}

/// An association declared inline on a created object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationSpec {
    pub to: AssociationId,
    pub types: Vec<AssociationType>,
}

/// One item of a batch create or update.
///
/// `id` is absent for creates. The engine leaves items untouched except
/// when invalid-email recovery blanks the `email` property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub properties: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub associations: Option<Vec<AssociationSpec>>,
}

impl BatchInput {
    pub fn create() -> Self {
        Self::default()
    }

    pub fn update(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_association(mut self, association: AssociationSpec) -> Self {
        self.associations
            .get_or_insert_with(Vec::new)
            .push(association);
        self
    }

    pub fn email(&self) -> Option<&str> {
        self.properties.get(EMAIL_PROPERTY).map(String::as_str)
    }
}

/// A CRM record as returned by list and batch endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmObject {
    pub id: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

impl CrmObject {
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(|v| v.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextPage {
    #[serde(default)]
    pub after: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub next: Option<NextPage>,
}

/// `{ results: [...], paging: { next: { after } } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

impl<T> ListResponse<T> {
    /// The cursor for the next page. An empty `after` means final page,
    /// same as absent paging.
    pub fn next_after(&self) -> Option<&str> {
        self.paging
            .as_ref()
            .and_then(|p| p.next.as_ref())
            .map(|n| n.after.as_str())
            .filter(|after| !after.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchErrorDetail {
    #[serde(default)]
    pub sub_category: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub r#in: Option<String>,
    #[serde(default)]
    pub context: serde_json::Value,
    #[serde(default)]
    pub message: String,
}

/// One per-item failure inside a batch response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemError {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub context: serde_json::Value,
    #[serde(default)]
    pub errors: Vec<BatchErrorDetail>,
}

/// `{ status, results, numErrors, errors }` from batch write endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse<T> {
    #[serde(default)]
    pub status: String,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub num_errors: usize,
    #[serde(default)]
    pub errors: Vec<BatchItemError>,
}

/// The CRM error envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
    pub correlation_id: Option<String>,
    pub category: Option<String>,
    pub links: BTreeMap<String, String>,
}

/// One entry of the JSON array embedded in a property-validation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyError {
    #[serde(default)]
    pub is_valid: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub name: String,
}

/// Filter and paging configuration for listing objects.
///
/// Setting `after` selects single-page mode: exactly that page is fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsQuery {
    pub limit: Option<u32>,
    pub after: Option<String>,
    pub properties: Vec<String>,
    pub properties_with_history: Vec<String>,
    pub associations: Vec<String>,
    pub archived: Option<bool>,
}

/// Input of the v4 batch association create endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationLink {
    pub types: Vec<AssociationType>,
    pub from: AssociationId,
    pub to: AssociationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationResult {
    pub from_object_type_id: String,
    pub from_object_id: i64,
    pub to_object_type_id: String,
    pub to_object_id: i64,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Which properties a batch read returns, and which property the ids refer
/// to (`None` means the object id).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReadQuery {
    pub properties: Vec<String>,
    pub properties_with_history: Vec<String>,
    pub id_property: Option<String>,
}

/// Association type as reported by the v4 read endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationLabel {
    pub category: AssociationCategory,
    pub type_id: i64,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationTarget {
    pub to_object_id: i64,
    #[serde(default)]
    pub association_types: Vec<AssociationLabel>,
}

/// Everything one source object is associated with, from a v4 batch read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationsOf {
    pub from: AssociationId,
    #[serde(default)]
    pub to: Vec<AssociationTarget>,
}

/// Input of the v4 batch association archive endpoint: removes every
/// association from `from` to each of `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationArchive {
    pub from: AssociationId,
    pub to: Vec<AssociationId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_input_omits_id_and_associations() {
        let input = BatchInput::create().with_property("email", "a@example.com");
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json, serde_json::json!({"properties": {"email": "a@example.com"}}));
    }

    #[test]
    fn association_spec_uses_wire_names() {
        let input = BatchInput::update("51").with_association(AssociationSpec {
            to: AssociationId {
                id: "101".to_string(),
            },
            types: vec![AssociationType {
                association_category: AssociationCategory::HubspotDefined,
                association_type_id: 279,
            }],
        });
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["id"], "51");
        assert_eq!(json["associations"][0]["to"]["id"], "101");
        assert_eq!(
            json["associations"][0]["types"][0]["associationCategory"],
            "HUBSPOT_DEFINED"
        );
        assert_eq!(json["associations"][0]["types"][0]["associationTypeId"], 279);
    }

    #[test]
    fn empty_after_counts_as_final_page() {
        let page: ListResponse<CrmObject> =
            serde_json::from_str(r#"{"results":[],"paging":{"next":{"after":""}}}"#).unwrap();
        assert_eq!(page.next_after(), None);

        let page: ListResponse<CrmObject> = serde_json::from_str(r#"{"results":[]}"#).unwrap();
        assert_eq!(page.next_after(), None);

        let page: ListResponse<CrmObject> =
            serde_json::from_str(r#"{"results":[],"paging":{"next":{"after":"200","link":"x"}}}"#)
                .unwrap();
        assert_eq!(page.next_after(), Some("200"));
    }

    #[test]
    fn batch_response_tolerates_missing_fields() {
        let response: BatchResponse<CrmObject> =
            serde_json::from_str(r#"{"status":"COMPLETE","results":[{"id":"1","properties":{"email":null}}]}"#)
                .unwrap();
        assert_eq!(response.num_errors, 0);
        assert!(response.errors.is_empty());
        assert_eq!(response.results[0].property("email"), None);
    }

    #[test]
    fn custom_object_type_displays_its_name() {
        assert_eq!(ObjectType::Custom("2-123456".to_string()).to_string(), "2-123456");
        assert_eq!(ObjectType::Courses.as_str(), "0-410");
    }

    #[test]
    fn association_read_result_parses_v4_shape() {
        let raw = r#"{"from":{"id":"10"},"to":[{"toObjectId":20,"associationTypes":[{"category":"HUBSPOT_DEFINED","typeId":1,"label":null},{"category":"USER_DEFINED","typeId":7,"label":"Billing"}]}]}"#;
        let read: AssociationsOf = serde_json::from_str(raw).unwrap();
        assert_eq!(read.from.id, "10");
        assert_eq!(read.to[0].to_object_id, 20);
        assert_eq!(read.to[0].association_types[1].category, AssociationCategory::UserDefined);
        assert_eq!(read.to[0].association_types[1].label.as_deref(), Some("Billing"));
    }
}
