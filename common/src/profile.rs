use std::collections::BTreeMap;

use crate::types::DeviceProfile;

/// Turns a header row plus data rows into rows keyed by their first cell.
///
/// Short rows are padded with empty strings; rows with a blank key are skipped.
/// A repeated key keeps the last row.
pub fn rows_to_map(values: &[Vec<String>]) -> BTreeMap<String, BTreeMap<String, String>> {
    let Some((header, rows)) = values.split_first() else {
        return BTreeMap::new();
    };

    rows.iter()
        .filter_map(|row| {
            let key = row.first()?.trim();
            if key.is_empty() {
                return None;
            }

            let fields = header
                .iter()
                .enumerate()
                .map(|(index, column)| {
                    let cell = row.get(index).map(|cell| cell.trim()).unwrap_or_default();
                    (column.trim().to_string(), cell.to_string())
                })
                .collect();
            Some((key.to_string(), fields))
        })
        .collect()
}

pub fn rows_to_profiles(values: &[Vec<String>]) -> BTreeMap<String, DeviceProfile> {
    rows_to_map(values)
        .into_iter()
        .map(|(device_id, fields)| {
            let mut profile = DeviceProfile {
                device_id: device_id.clone(),
                ..DeviceProfile::default()
            };

            for (column, value) in fields {
                match column_key(&column).as_str() {
                    "farmsize" => profile.farm_size = value,
                    "planttype" | "plant" | "crop" => profile.plant_type = value,
                    "ownername" | "owner" | "name" => profile.owner_name = value,
                    "location" | "farmlocation" => profile.location = value,
                    "phone" | "phonenumber" => profile.phone = value,
                    _ => {}
                }
            }

            (device_id, profile)
        })
        .collect()
}

fn column_key(column: &str) -> String {
    column
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
