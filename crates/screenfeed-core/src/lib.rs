//! Core domain model for screenfeed: dataset identities, declarative
//! per-dataset schemas, and the column value model shared by the mapping and
//! storage layers.

use std::fmt;

use serde::Serialize;

pub const CRATE_NAME: &str = "screenfeed-core";

/// The three upstream catalog feeds, in ingestion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DatasetId {
    PopularCelebrities,
    WeeklyTop10,
    MovieSearch,
}

impl DatasetId {
    pub fn all() -> [DatasetId; 3] {
        [
            DatasetId::PopularCelebrities,
            DatasetId::WeeklyTop10,
            DatasetId::MovieSearch,
        ]
    }

    pub fn spec(self) -> &'static DatasetSpec {
        match self {
            DatasetId::PopularCelebrities => &POPULAR_CELEBRITIES,
            DatasetId::WeeklyTop10 => &WEEKLY_TOP_10,
            DatasetId::MovieSearch => &MOVIES,
        }
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.spec().table)
    }
}

/// SQLite column affinity for a mapped output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
}

impl ColumnType {
    pub fn sql_affinity(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
        }
    }
}

/// A concrete cell value bound into the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ColumnValue {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
}

impl ColumnValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ColumnValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Fallback applied when an optional field is absent from the source record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    Null,
    Text(&'static str),
}

impl FieldDefault {
    pub fn to_value(self) -> ColumnValue {
        match self {
            FieldDefault::Null => ColumnValue::Null,
            FieldDefault::Text(text) => ColumnValue::Text(text.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Absence is a mapping failure, never defaulted.
    Required,
    /// Absence resolves to the documented default.
    Optional(FieldDefault),
}

/// How a column's value is pulled out of a flattened record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    /// Direct lookup of a dotted field path produced by flattening.
    Key(&'static str),
    /// First category's first watch option's provider name; every missing or
    /// empty level of the descent short-circuits to `"Unknown"`.
    FirstWatchProvider,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub column: &'static str,
    pub extraction: Extraction,
    pub ty: ColumnType,
    pub requirement: Requirement,
}

/// Declarative shape of one dataset: where its records sit inside the feed
/// envelope, which table they land in, and how each output column is derived.
#[derive(Debug, Clone, Copy)]
pub struct DatasetSpec {
    pub id: DatasetId,
    pub table: &'static str,
    /// Object keys descended to reach the record array inside the feed envelope.
    pub records_path: &'static [&'static str],
    pub key_column: &'static str,
    /// weekly_top_10 is dropped and recreated on every ingestion run; the other
    /// tables upsert in place and may keep stale survivors. This asymmetry comes
    /// from the feeds themselves and is kept per table rather than unified.
    pub reset_before_load: bool,
    pub fields: &'static [FieldSpec],
}

impl DatasetSpec {
    pub fn key_index(&self) -> Option<usize> {
        self.fields.iter().position(|f| f.column == self.key_column)
    }
}

/// A fully mapped output row; values align one-to-one with
/// `DatasetSpec::fields`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappedRow {
    pub values: Vec<ColumnValue>,
}

impl MappedRow {
    pub fn primary_key<'a>(&'a self, spec: &DatasetSpec) -> Option<&'a ColumnValue> {
        spec.key_index().and_then(|idx| self.values.get(idx))
    }
}

pub const POPULAR_CELEBRITIES: DatasetSpec = DatasetSpec {
    id: DatasetId::PopularCelebrities,
    table: "popular_celebrities",
    records_path: &["data", "list"],
    key_column: "id",
    reset_before_load: false,
    fields: &[
        FieldSpec {
            column: "id",
            extraction: Extraction::Key("id"),
            ty: ColumnType::Text,
            requirement: Requirement::Required,
        },
        FieldSpec {
            column: "name",
            extraction: Extraction::Key("nameText.text"),
            ty: ColumnType::Text,
            requirement: Requirement::Required,
        },
        FieldSpec {
            column: "birth_date",
            extraction: Extraction::Key(
                "birthDateComponents.displayableProperty.value.plainText",
            ),
            ty: ColumnType::Text,
            requirement: Requirement::Optional(FieldDefault::Null),
        },
        FieldSpec {
            column: "height",
            extraction: Extraction::Key("height.measurement.value"),
            ty: ColumnType::Real,
            requirement: Requirement::Optional(FieldDefault::Null),
        },
        FieldSpec {
            column: "current_rank",
            extraction: Extraction::Key("meterRanking.currentRank"),
            ty: ColumnType::Integer,
            requirement: Requirement::Optional(FieldDefault::Null),
        },
    ],
};

pub const WEEKLY_TOP_10: DatasetSpec = DatasetSpec {
    id: DatasetId::WeeklyTop10,
    table: "weekly_top_10",
    records_path: &["data"],
    key_column: "id",
    reset_before_load: true,
    fields: &[
        FieldSpec {
            column: "id",
            extraction: Extraction::Key("id"),
            ty: ColumnType::Text,
            requirement: Requirement::Required,
        },
        FieldSpec {
            column: "title",
            extraction: Extraction::Key("titleText.text"),
            ty: ColumnType::Text,
            requirement: Requirement::Required,
        },
        FieldSpec {
            column: "release_year",
            extraction: Extraction::Key("releaseYear.year"),
            ty: ColumnType::Integer,
            requirement: Requirement::Optional(FieldDefault::Null),
        },
        FieldSpec {
            column: "rating",
            extraction: Extraction::Key("ratingsSummary.aggregateRating"),
            ty: ColumnType::Real,
            requirement: Requirement::Optional(FieldDefault::Null),
        },
        FieldSpec {
            column: "vote_count",
            extraction: Extraction::Key("ratingsSummary.voteCount"),
            ty: ColumnType::Integer,
            requirement: Requirement::Optional(FieldDefault::Null),
        },
        FieldSpec {
            column: "rank",
            extraction: Extraction::Key("chartMeterRanking.currentRank"),
            ty: ColumnType::Integer,
            requirement: Requirement::Optional(FieldDefault::Null),
        },
        FieldSpec {
            column: "provider",
            extraction: Extraction::FirstWatchProvider,
            ty: ColumnType::Text,
            requirement: Requirement::Optional(FieldDefault::Text("Unknown")),
        },
    ],
};

pub const MOVIES: DatasetSpec = DatasetSpec {
    id: DatasetId::MovieSearch,
    table: "movies",
    records_path: &["data"],
    key_column: "id",
    reset_before_load: false,
    fields: &[
        FieldSpec {
            column: "id",
            extraction: Extraction::Key("id"),
            ty: ColumnType::Text,
            requirement: Requirement::Required,
        },
        FieldSpec {
            column: "qid",
            extraction: Extraction::Key("qid"),
            ty: ColumnType::Text,
            requirement: Requirement::Required,
        },
        FieldSpec {
            column: "title",
            extraction: Extraction::Key("title"),
            ty: ColumnType::Text,
            requirement: Requirement::Required,
        },
        FieldSpec {
            column: "year",
            extraction: Extraction::Key("year"),
            ty: ColumnType::Integer,
            requirement: Requirement::Optional(FieldDefault::Null),
        },
        FieldSpec {
            column: "stars",
            extraction: Extraction::Key("stars"),
            ty: ColumnType::Text,
            requirement: Requirement::Optional(FieldDefault::Text("Unknown")),
        },
        FieldSpec {
            column: "q",
            extraction: Extraction::Key("q"),
            ty: ColumnType::Text,
            requirement: Requirement::Required,
        },
        FieldSpec {
            column: "image_url",
            extraction: Extraction::Key("image"),
            ty: ColumnType::Text,
            requirement: Requirement::Optional(FieldDefault::Null),
        },
    ],
};
