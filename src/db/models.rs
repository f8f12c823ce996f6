// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::FromRow;

use crate::db::coco::CocoInfo;
use crate::error::Result;

/// Year recorded when no COCO metadata is supplied.
pub const DEFAULT_YEAR: i32 = 2019;

/// A row of the `info` table.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Info {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub contributor: String,
    pub version: Option<f64>,
    pub year: Option<i32>,
    pub date_created: Option<NaiveDate>,
}

/// Values for a new `info` row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewInfo {
    pub name: String,
    pub description: String,
    pub contributor: String,
    pub version: f64,
    pub year: i32,
    pub date_created: NaiveDate,
}

impl NewInfo {
    pub fn from_coco(db_name: &str, info: &CocoInfo) -> Result<Self> {
        Ok(Self {
            name: db_name.to_string(),
            description: info.description.clone(),
            contributor: info.contributor.clone(),
            version: info.version()?,
            year: info.year()?,
            date_created: info.date_created()?,
        })
    }

    pub fn defaults(db_name: &str, user: &str, today: NaiveDate) -> Self {
        Self {
            name: db_name.to_string(),
            description: String::new(),
            contributor: user.to_string(),
            version: 0.0,
            year: DEFAULT_YEAR,
            date_created: today,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_db_user_as_contributor() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let info = NewInfo::defaults("missouricameratraps", "new_user", today);
        assert_eq!(info.name, "missouricameratraps");
        assert_eq!(info.description, "");
        assert_eq!(info.contributor, "new_user");
        assert_eq!(info.version, 0.0);
        assert_eq!(info.year, 2019);
        assert_eq!(info.date_created, today);
    }

    #[test]
    fn from_coco_copies_metadata() {
        let coco: CocoInfo = serde_json::from_value(serde_json::json!({
            "description": "Missouri camera traps",
            "contributor": "Zhang et al.",
            "version": "1.0",
            "year": 2018,
            "date_created": "2018-05-21"
        }))
        .unwrap();
        let info = NewInfo::from_coco("snapshot", &coco).unwrap();
        assert_eq!(info.name, "snapshot");
        assert_eq!(info.contributor, "Zhang et al.");
        assert_eq!(info.version, 1.0);
        assert_eq!(info.year, 2018);
        assert_eq!(info.date_created, NaiveDate::from_ymd_opt(2018, 5, 21).unwrap());
    }
}
