//! A small employee segment shared by tests across the workspace.

use std::path::Path;

use tessera_dtype::DataType;
use tessera_error::TesseraExpect;

use crate::{
    FieldSpec, FieldValue, GenericRow, ImmutableSegment, IndexLoadingConfig, Schema,
    SegmentCreator, SegmentGeneratorConfig,
};

/// `(name, country, language, salary, bonus, tags)` rows, already in `name` order.
pub const ROWS: [(&str, &str, &str, i32, f64, &[i32]); 6] = [
    ("Rahul", "IN", "Hin", 3, 0.5, &[1, 2]),
    ("Rahul", "IN", "Hin", 5, 1.5, &[2]),
    ("Rahul", "CH", "Eng", 2, 2.5, &[3, 1, 2]),
    ("Zackie", "CH", "Eng", 8, 3.5, &[1]),
    ("Zackie", "CH", "Eng", 9, 4.5, &[4]),
    ("Zackie", "US", "Eng", 1, 5.5, &[2, 3]),
];

pub fn schema() -> Schema {
    Schema::new(vec![
        FieldSpec::single("name", DataType::String),
        FieldSpec::single("country", DataType::String),
        FieldSpec::single("language", DataType::String),
        FieldSpec::single("salary", DataType::Int),
        FieldSpec::single("bonus", DataType::Double),
        FieldSpec::multi("tags", DataType::Int),
    ])
    .tessera_expect("employee schema")
}

pub fn config() -> SegmentGeneratorConfig {
    SegmentGeneratorConfig::new("employees")
        .with_no_dictionary_columns(vec!["bonus".to_string()])
        .with_inverted_index_columns(vec!["country".to_string(), "tags".to_string()])
        .with_raw_docs_per_chunk(4)
}

/// Build the employee segment in `dir` and load it back.
pub fn employee_segment(dir: &Path, generator: SegmentGeneratorConfig, loading: &IndexLoadingConfig) -> ImmutableSegment {
    let mut creator = SegmentCreator::try_new(schema(), generator).tessera_expect("segment creator");
    for (name, country, language, salary, bonus, tags) in ROWS {
        let row = GenericRow::new()
            .with("name", name)
            .with("country", country)
            .with("language", language)
            .with("salary", salary)
            .with("bonus", bonus)
            .with("tags", FieldValue::multi(tags.iter().copied()));
        creator.index_row(&row).tessera_expect("index row");
    }
    creator.build(dir).tessera_expect("build segment");
    ImmutableSegment::load(dir, loading).tessera_expect("load segment")
}
