use anyhow::Result;
use csvchunk::testing::{MemorySinkFactory, RecordingLog, TempChunkDir, read_chunk_rows, rows};
use csvchunk::*;
use std::fs;

fn sample_source() -> VecRowSource {
    VecRowSource::new(rows(&[&["h"], &["1"], &["2"]]))
}

#[test]
fn missing_source_is_rejected() {
    let err = Pipeline::builder()
        .sink_factory(MemorySinkFactory::new())
        .chunk_capacity(5)
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::MissingSource));
    assert_eq!(err.to_string(), "no row source configured");
}

#[test]
fn missing_sink_is_rejected() {
    let err = Pipeline::builder()
        .source(sample_source())
        .chunk_capacity(5)
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::MissingSink));
}

#[test]
fn non_positive_capacity_is_rejected() {
    for capacity in [0, -1, i64::MIN] {
        let sinks = MemorySinkFactory::new();
        let err = Pipeline::builder()
            .source(sample_source())
            .sink_factory(sinks.clone())
            .chunk_capacity(capacity)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidChunkCapacity(c) if c == capacity));
        assert!(sinks.captured().is_empty());
    }
}

#[test]
fn capacity_defaults_to_invalid() {
    let err = Pipeline::builder()
        .source(sample_source())
        .sink_factory(MemorySinkFactory::new())
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidChunkCapacity(0)));
}

#[test]
fn checks_run_in_order() {
    let err = PipelineBuilder::new().chunk_capacity(-3).build().unwrap_err();
    assert!(matches!(err, ConfigError::MissingSource));

    let err = PipelineBuilder::new()
        .source(sample_source())
        .chunk_capacity(-3)
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::MissingSink));
}

#[test]
fn structural_errors_come_before_opening_input() -> Result<()> {
    let dir = TempChunkDir::new()?;
    let missing = dir.file_path("does-not-exist.csv");

    let err = Pipeline::builder()
        .input_file(&missing)
        .chunk_capacity(10)
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::MissingSink));

    let err = Pipeline::builder()
        .input_file(&missing)
        .output_template(dir.template("out_%d.csv"))
        .chunk_capacity(0)
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidChunkCapacity(0)));

    let err = Pipeline::builder()
        .input_file(&missing)
        .output_template(dir.template("out_%d.csv"))
        .chunk_capacity(10)
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::OpenInput { ref path, .. } if *path == missing));
    assert!(dir.files()?.is_empty());
    Ok(())
}

#[test]
fn defaults() -> Result<()> {
    let pipeline = Pipeline::builder()
        .source(sample_source())
        .sink_factory(MemorySinkFactory::new())
        .chunk_capacity(4)
        .build()?;
    assert_eq!(pipeline.chunk_capacity(), 4);
    assert_eq!(pipeline.header_policy(), HeaderPolicy::EmitPerChunk);
    Ok(())
}

#[test]
fn skip_headers_sets_policy() -> Result<()> {
    let pipeline = Pipeline::builder()
        .source(sample_source())
        .sink_factory(MemorySinkFactory::new())
        .chunk_capacity(4)
        .skip_headers(true)
        .build()?;
    assert_eq!(pipeline.header_policy(), HeaderPolicy::Never);
    Ok(())
}

#[test]
fn header_policy_serializes_snake_case() -> Result<()> {
    assert_eq!(serde_json::to_string(&HeaderPolicy::EmitPerChunk)?, r#""emit_per_chunk""#);
    let parsed: HeaderPolicy = serde_json::from_str(r#""never""#)?;
    assert_eq!(parsed, HeaderPolicy::Never);
    Ok(())
}

#[test]
fn template_without_placeholder_warns_when_splitting() -> Result<()> {
    let dir = TempChunkDir::new()?;
    let log = RecordingLog::new();
    Pipeline::builder()
        .source(sample_source())
        .output_template(dir.template("single.csv"))
        .chunk_capacity(1)
        .logger(log.clone())
        .build()?;
    assert!(log.contains("has no chunk placeholder"));
    Ok(())
}

#[test]
fn template_without_placeholder_is_quiet_for_single_chunk() -> Result<()> {
    let dir = TempChunkDir::new()?;
    let log = RecordingLog::new();
    Pipeline::builder()
        .source(sample_source())
        .output_template(dir.template("single.csv"))
        .chunk_capacity(i64::MAX)
        .logger(log.clone())
        .build()?;
    assert!(log.messages().is_empty());
    Ok(())
}

#[test]
fn from_file_splits_and_transforms() -> Result<()> {
    let dir = TempChunkDir::new()?;
    let input = dir.file_path("input.csv");
    fs::write(&input, "name\nann\nbob\ncy\n")?;

    let summary = Pipeline::from_file(&input, 2, dir.template("part_%d.csv"), RowNumber::new("S.no"))?
        .run()?;
    assert_eq!(summary.rows_per_chunk(), vec![2, 1]);

    assert_eq!(
        read_chunk_rows(dir.file_path("part_1.csv"))?,
        rows(&[&["S.no", "name"], &["1", "ann"], &["2", "bob"]])
    );
    assert_eq!(
        read_chunk_rows(dir.file_path("part_2.csv"))?,
        rows(&[&["S.no", "name"], &["3", "cy"]])
    );
    Ok(())
}

#[test]
fn small_buffers_still_work() -> Result<()> {
    let dir = TempChunkDir::new()?;
    let input = dir.file_path("input.csv");
    fs::write(&input, "h\nsome longer value\nanother one\n")?;

    Pipeline::builder()
        .input_file(&input)
        .output_template(dir.template("out_%d.csv"))
        .chunk_capacity(10)
        .read_buffer_size(1)
        .write_buffer_size(1)
        .logger(NoopLog)
        .build()?
        .run()?;

    assert_eq!(
        read_chunk_rows(dir.file_path("out_1.csv"))?,
        rows(&[&["h"], &["some longer value"], &["another one"]])
    );
    Ok(())
}
