#![allow(dead_code)]

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tessera::dtype::DataType;
use tessera::segment::{
    FieldSpec, FieldValue, GenericRow, ImmutableSegment, IndexLoadingConfig, Schema, SegmentCreator,
    SegmentGeneratorConfig,
};

pub const NUM_EVENTS: usize = 12_000;

#[derive(Debug, Clone)]
pub struct Event {
    pub day: i32,
    pub city: String,
    pub device: i32,
    pub clicks: i64,
    pub score: f64,
    pub labels: Vec<i32>,
}

/// Events in day order, so `day` is written with a sorted index.
pub fn events(seed: u64) -> Vec<Event> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..NUM_EVENTS)
        .map(|i| Event {
            day: (i / 1_000) as i32,
            city: format!("city-{:02}", rng.random_range(0..40)),
            device: rng.random_range(0..6),
            clicks: rng.random_range(0..1_000),
            score: f64::from(rng.random_range(0..10_000)) / 100.0,
            labels: (0..rng.random_range(1..=4))
                .map(|_| rng.random_range(0..10))
                .collect(),
        })
        .collect()
}

pub fn schema() -> Schema {
    Schema::new(vec![
        FieldSpec::single("day", DataType::Int),
        FieldSpec::single("city", DataType::String),
        FieldSpec::single("device", DataType::Int),
        FieldSpec::single("clicks", DataType::Long),
        FieldSpec::single("score", DataType::Double),
        FieldSpec::multi("labels", DataType::Int),
    ])
    .unwrap()
}

pub fn generator_config() -> SegmentGeneratorConfig {
    SegmentGeneratorConfig::new("events")
        .with_no_dictionary_columns(vec!["score".to_string()])
        .with_inverted_index_columns(vec!["city".to_string(), "labels".to_string()])
}

pub fn write_segment(dir: &Path, events: &[Event], config: SegmentGeneratorConfig) {
    let mut creator = SegmentCreator::try_new(schema(), config).unwrap();
    for event in events {
        let row = GenericRow::new()
            .with("day", event.day)
            .with("city", event.city.as_str())
            .with("device", event.device)
            .with("clicks", event.clicks)
            .with("score", event.score)
            .with("labels", FieldValue::multi(event.labels.iter().copied()));
        creator.index_row(&row).unwrap();
    }
    creator.build(dir).unwrap();
}

pub fn event_segment(dir: &Path, events: &[Event]) -> ImmutableSegment {
    tessera::init_logging(log::LevelFilter::Debug);
    write_segment(dir, events, generator_config());
    ImmutableSegment::load(dir, &IndexLoadingConfig::default()).unwrap()
}
