// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// COCO Camera Traps JSON

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{CamtrapError, Result};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Only `info` is interpreted; images, annotations and categories stay raw.
#[derive(Debug, Clone, Deserialize)]
pub struct CocoCameraTraps {
    pub info: CocoInfo,
    #[serde(default)]
    pub images: Vec<Value>,
    #[serde(default)]
    pub annotations: Vec<Value>,
    #[serde(default)]
    pub categories: Vec<Value>,
}

impl CocoCameraTraps {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| CamtrapError::io_at(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// The `info` block. `version` and `year` are kept raw: datasets write them
/// both as numbers and as strings.
#[derive(Debug, Clone, Deserialize)]
pub struct CocoInfo {
    pub description: String,
    pub contributor: String,
    version: Value,
    year: Value,
    date_created: String,
}

impl CocoInfo {
    pub fn version(&self) -> Result<f64> {
        let parsed = match &self.version {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| CamtrapError::InvalidInfoField {
            field: "version",
            value: self.version.to_string(),
        })
    }

    pub fn year(&self) -> Result<i32> {
        let parsed = match &self.year {
            Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| CamtrapError::InvalidInfoField {
            field: "year",
            value: self.year.to_string(),
        })
    }

    pub fn date_created(&self) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(&self.date_created, DATE_FORMAT).map_err(|source| {
            CamtrapError::InvalidDate {
                value: self.date_created.clone(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn info(version: Value, year: Value, date: &str) -> CocoInfo {
        serde_json::from_value(json!({
            "description": "",
            "contributor": "",
            "version": version,
            "year": year,
            "date_created": date,
        }))
        .unwrap()
    }

    #[test]
    fn version_and_year_accept_numbers_and_strings() {
        let a = info(json!("1.0"), json!("2018"), "2018-05-21");
        assert_eq!(a.version().unwrap(), 1.0);
        assert_eq!(a.year().unwrap(), 2018);

        let b = info(json!(2.5), json!(2019), "2019-01-01");
        assert_eq!(b.version().unwrap(), 2.5);
        assert_eq!(b.year().unwrap(), 2019);
    }

    #[test]
    fn non_numeric_version_is_rejected() {
        let a = info(json!("v1"), json!(2018), "2018-05-21");
        assert!(matches!(
            a.version(),
            Err(CamtrapError::InvalidInfoField { field: "version", .. })
        ));
        let b = info(json!(null), json!([2018]), "2018-05-21");
        assert!(b.version().is_err());
        assert!(b.year().is_err());
    }

    #[test]
    fn date_must_be_year_month_day() {
        assert_eq!(
            info(json!(1), json!(1), "2018-05-21").date_created().unwrap(),
            NaiveDate::from_ymd_opt(2018, 5, 21).unwrap()
        );
        for bad in ["05/21/2018", "2018-05-21 10:00:00", "2018-13-01", ""] {
            match info(json!(1), json!(1), bad).date_created() {
                Err(CamtrapError::InvalidDate { value, .. }) => assert_eq!(value, bad),
                other => panic!("{bad:?} parsed as {other:?}"),
            }
        }
    }

    #[test]
    fn load_full_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coco.json");
        fs::write(
            &path,
            json!({
                "info": {
                    "description": "Missouri camera traps",
                    "contributor": "Zhang et al.",
                    "version": "1.0",
                    "year": 2018,
                    "date_created": "2018-05-21"
                },
                "images": [{
                    "id": "img1",
                    "file_name": "Set1/1.58-Roe_Deer/SEQ75520/SEQ75520_IMG_0011.JPG",
                    "width": 1920,
                    "height": 1080
                }],
                "annotations": [{"id": 1, "image_id": "img1", "category_id": 2}],
                "categories": [{"id": 2, "name": "roe_deer"}]
            })
            .to_string(),
        )
        .unwrap();

        let coco = CocoCameraTraps::load(&path).unwrap();
        assert_eq!(coco.info.contributor, "Zhang et al.");
        assert_eq!(coco.images.len(), 1);
        assert_eq!(coco.images[0]["width"], 1920);
        assert_eq!(coco.annotations.len(), 1);
        assert_eq!(coco.categories[0]["name"], "roe_deer");
    }

    #[test]
    fn loose_image_and_category_records_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coco.json");
        fs::write(
            &path,
            json!({
                "info": {
                    "description": "",
                    "contributor": "lab",
                    "version": 1.0,
                    "year": "2020",
                    "date_created": "2020-02-29"
                },
                "images": [
                    {"id": "a", "file_name": "x.JPG", "width": 1920.0},
                    {"id": 7, "location": "site 3"}
                ],
                "categories": [{"id": "0", "name": "empty"}]
            })
            .to_string(),
        )
        .unwrap();

        let coco = CocoCameraTraps::load(&path).unwrap();
        assert_eq!(coco.images.len(), 2);
        assert_eq!(coco.categories.len(), 1);
        assert_eq!(coco.info.year().unwrap(), 2020);
    }

    #[test]
    fn missing_info_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coco.json");
        fs::write(&path, r#"{"images": []}"#).unwrap();
        assert!(matches!(CocoCameraTraps::load(&path), Err(CamtrapError::Json(_))));
    }
}
