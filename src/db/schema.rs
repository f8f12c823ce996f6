// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! SQL DDL for the active-learning target database.

/// One metadata row per initialization run:
/// - `id` SERIAL PRIMARY KEY
/// - `name` is the database name
/// - `version`/`year`/`date_created` come from the COCO `info` block when given
pub const INFO_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS info (
    id SERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NULL,
    contributor TEXT NOT NULL,
    version DOUBLE PRECISION NULL,
    year INTEGER NULL,
    date_created DATE NULL
);
"#;
