use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::info;

use crate::client::ApiTransport;
use crate::error::{MirrorError, Result};
use crate::model::Namespace;

/// Display name used for the main namespace, whose wiki name is empty.
pub const MAIN_NAMESPACE_NAME: &str = "Main";

/// All exportable namespaces, ascending by id. Negative ids are dropped.
pub fn list_namespaces<T: ApiTransport>(transport: &T) -> Result<Vec<Namespace>> {
    info!("fetching namespaces");
    let response = transport.get(&[
        ("action", "query".to_string()),
        ("meta", "siteinfo".to_string()),
        ("siprop", "namespaces".to_string()),
    ])?;
    let parsed: SiteInfoResponse =
        serde_json::from_value(response).map_err(|source| MirrorError::Decode {
            what: "siteinfo namespaces",
            source,
        })?;

    let mut by_id = BTreeMap::new();
    for (key, item) in parsed.query.namespaces {
        let id = match item.id {
            Some(id) => id,
            None => key.parse::<i32>().map_err(|_| MirrorError::Api {
                code: "badnamespace".to_string(),
                info: format!("namespace key is not numeric: {key}"),
            })?,
        };
        let display_name = item
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| MAIN_NAMESPACE_NAME.to_string());
        let namespace = Namespace { id, display_name };
        if namespace.is_exportable() {
            by_id.insert(id, namespace);
        }
    }

    let namespaces: Vec<Namespace> = by_id.into_values().collect();
    info!(count = namespaces.len(), "found exportable namespaces");
    Ok(namespaces)
}

#[derive(Debug, Deserialize, Default)]
struct SiteInfoResponse {
    #[serde(default)]
    query: SiteInfoPayload,
}

#[derive(Debug, Deserialize, Default)]
struct SiteInfoPayload {
    #[serde(default)]
    namespaces: BTreeMap<String, NamespaceItem>,
}

#[derive(Debug, Deserialize)]
struct NamespaceItem {
    id: Option<i32>,
    #[serde(alias = "*")]
    name: Option<String>,
}
