// libs/appointment-cell/src/services/directory.rs
//! Name lookups used to decorate appointment listings. Rows that fail to
//! resolve are shown as `Unknown` rather than failing the listing.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use shared_database::{tables, Query, Store};

use crate::models::AppointmentError;

pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Default)]
pub struct PatientContact {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

fn text(row: &Value, column: &str) -> Option<String> {
    row.get(column).and_then(|v| v.as_str()).map(str::to_string)
}

/// Doctor id to name for every doctor of the clinic.
pub async fn doctor_names(store: &dyn Store, clinic_id: &str) -> Result<HashMap<String, String>, AppointmentError> {
    let rows = store
        .find(tables::DOCTORS, &Query::new().eq("clinic_id", clinic_id))
        .await?;

    Ok(rows
        .iter()
        .filter_map(|row| Some((text(row, "id")?, text(row, "name").unwrap_or_default())))
        .collect())
}

pub async fn patient_contacts<'a>(
    store: &dyn Store,
    clinic_id: &str,
    patient_ids: impl IntoIterator<Item = &'a str>,
) -> Result<HashMap<String, PatientContact>, AppointmentError> {
    let ids: HashSet<&str> = patient_ids.into_iter().collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = store
        .find(
            tables::PATIENTS,
            &Query::new().eq("clinic_id", clinic_id).in_list("id", ids),
        )
        .await?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            Some((
                text(row, "id")?,
                PatientContact {
                    name: text(row, "name").unwrap_or_default(),
                    phone: text(row, "phone"),
                    email: text(row, "email"),
                },
            ))
        })
        .collect())
}

pub fn name_or_unknown(names: &HashMap<String, String>, id: &str) -> String {
    names.get(id).cloned().unwrap_or_else(|| UNKNOWN.to_string())
}
