use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

/// Matches `KEY = value` lines of a plain-text GetFeatureInfo response.
const FIELD_PATTERN: &str = r"(?m)^\s*([A-Za-z0-9_]+)\s*=\s*(.*?)\s*$";

const CASE_FOLDER_ID: &str = "CASEFOLDERID";
const CITY: &str = "MUNICIPIO";
const ADDRESS: &str = "DIRECCION";
const DESCRIPTION: &str = "DESCRIPCION_ES";
const CALLS: &str = "ASOCIADAS";

/// Attributes of an incident as published by the map service.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IncidentInfo {
    pub case_folder_id: u64,
    pub city: String,
    pub address: String,
    pub description: String,
    /// Number of related emergency calls
    pub calls: u32,
}

/// Parses a `text/plain` GetFeatureInfo response.
///
/// When several features are listed, the first value of each field wins.
pub fn parse_feature_info(text: &str) -> Result<IncidentInfo> {
    let field_regex = Regex::new(FIELD_PATTERN)?;

    let mut fields: HashMap<&str, &str> = HashMap::new();
    for caps in field_regex.captures_iter(text) {
        if let (Some(key), Some(value)) = (caps.get(1), caps.get(2)) {
            fields.entry(key.as_str()).or_insert(value.as_str());
        }
    }

    if fields.is_empty() {
        return Err(anyhow!("No feature attributes in response"));
    }

    let get = |key: &str| {
        fields
            .get(key)
            .copied()
            .ok_or_else(|| anyhow!("Missing field {} in feature info", key))
    };

    Ok(IncidentInfo {
        case_folder_id: get(CASE_FOLDER_ID)?
            .parse()
            .with_context(|| format!("Invalid {}", CASE_FOLDER_ID))?,
        city: get(CITY)?.to_string(),
        address: get(ADDRESS)?.to_string(),
        description: get(DESCRIPTION)?.to_string(),
        calls: get(CALLS)?
            .parse()
            .with_context(|| format!("Invalid {}", CALLS))?,
    })
}
