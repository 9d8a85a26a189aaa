use serde::{Deserialize, Serialize};

pub const COLLECTION_NAME: &str = "events";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
    pub default_sorting_field: String,
    pub token_separators: Vec<String>,
    pub symbols_to_index: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facet: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infix: Option<bool>,
}

impl FieldSchema {
    fn new(name: &str, field_type: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: field_type.to_string(),
            facet: None,
            optional: None,
            index: None,
            infix: None,
        }
    }

    fn facet(mut self) -> Self {
        self.facet = Some(true);
        self
    }

    fn optional(mut self) -> Self {
        self.optional = Some(true);
        self
    }

    /// Stored but excluded from the inverted index. Unindexed fields must
    /// also be optional for the engine to accept them.
    fn unindexed(mut self) -> Self {
        self.index = Some(false);
        self.optional = Some(true);
        self
    }

    fn infix(mut self) -> Self {
        self.infix = Some(true);
        self
    }
}

/// The fixed projection schema for the `events` collection.
pub fn events_schema() -> CollectionSchema {
    CollectionSchema {
        name: COLLECTION_NAME.to_string(),
        fields: vec![
            FieldSchema::new("name", "string").infix(),
            FieldSchema::new("slug", "string").unindexed(),
            FieldSchema::new("event_type", "string").facet(),
            FieldSchema::new("description", "string").optional(),
            FieldSchema::new("start_date", "int64").facet(),
            FieldSchema::new("end_date", "int64").optional(),
            FieldSchema::new("year", "int32").facet(),
            FieldSchema::new("month", "int32").facet(),
            FieldSchema::new("city_id", "int32").facet(),
            FieldSchema::new("region_id", "int32").facet(),
            FieldSchema::new("city_name", "string").facet(),
            FieldSchema::new("region_name", "string").facet(),
            FieldSchema::new("city_slug", "string").unindexed(),
            FieldSchema::new("region_slug", "string").unindexed(),
            FieldSchema::new("venue_name", "string").optional(),
            FieldSchema::new("venue_slug", "string").unindexed(),
            FieldSchema::new("geo_location", "geopoint").optional(),
            FieldSchema::new("genres", "string[]").facet(),
            FieldSchema::new("genre_slugs", "string[]").facet(),
            FieldSchema::new("artists", "string[]").infix(),
            FieldSchema::new("artist_slugs", "string[]").unindexed(),
            FieldSchema::new("organizer_name", "string").optional(),
            FieldSchema::new("official_website", "string").unindexed(),
            FieldSchema::new("status", "string").facet(),
            FieldSchema::new("confidence_score", "float"),
            FieldSchema::new("is_verified", "bool").facet(),
            FieldSchema::new("is_pinned", "bool"),
            FieldSchema::new("cultural_significance", "int32"),
            FieldSchema::new("has_tickets", "bool").facet(),
            FieldSchema::new("updated_at", "int64"),
        ],
        default_sorting_field: "start_date".to_string(),
        token_separators: vec!["-".to_string(), "'".to_string()],
        symbols_to_index: vec!["&".to_string()],
    }
}
