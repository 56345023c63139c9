use anyhow::Result;
use csvchunk::testing::{RecordingLog, TempChunkDir, read_chunk_rows, rows};
use csvchunk::*;
use std::fs;

fn letters_csv() -> VecRowSource {
    VecRowSource::new(rows(&[
        &["a", "b", "c"],
        &["d", "e", "f"],
        &["g", "h", "i"],
        &["j", "k", "l"],
    ]))
}

#[test]
fn template_files_hold_one_chunk_each() -> Result<()> {
    let dir = TempChunkDir::new()?;
    Pipeline::builder()
        .source(letters_csv())
        .output_template(dir.template("chunk_%d.csv"))
        .chunk_capacity(1)
        .logger(NoopLog)
        .build()?
        .run()?;

    let files = dir.files()?;
    assert_eq!(files.len(), 3);
    assert_eq!(
        read_chunk_rows(dir.file_path("chunk_1.csv"))?,
        rows(&[&["a", "b", "c"], &["d", "e", "f"]])
    );
    assert_eq!(
        read_chunk_rows(dir.file_path("chunk_2.csv"))?,
        rows(&[&["a", "b", "c"], &["g", "h", "i"]])
    );
    let text = fs::read_to_string(dir.file_path("chunk_3.csv"))?;
    assert_eq!(text.lines().collect::<Vec<_>>(), vec!["a,b,c", "j,k,l"]);
    Ok(())
}

#[test]
fn zero_padded_template() -> Result<()> {
    let dir = TempChunkDir::new()?;
    Pipeline::builder()
        .source(letters_csv())
        .output_template(dir.template("part-%03d.csv"))
        .chunk_capacity(2)
        .logger(NoopLog)
        .build()?
        .run()?;

    let names: Vec<String> = dir
        .files()?
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    assert_eq!(names, vec!["part-001.csv", "part-002.csv"]);
    Ok(())
}

#[test]
fn template_without_placeholder_appends_every_chunk() -> Result<()> {
    let dir = TempChunkDir::new()?;
    let log = RecordingLog::new();
    Pipeline::builder()
        .source(letters_csv())
        .output_template(dir.template("all.csv"))
        .chunk_capacity(1)
        .logger(log.clone())
        .build()?
        .run()?;

    assert_eq!(dir.files()?.len(), 1);
    assert_eq!(
        read_chunk_rows(dir.file_path("all.csv"))?,
        rows(&[
            &["a", "b", "c"],
            &["d", "e", "f"],
            &["a", "b", "c"],
            &["g", "h", "i"],
            &["a", "b", "c"],
            &["j", "k", "l"],
        ])
    );
    assert!(log.contains("has no chunk placeholder"));
    Ok(())
}

#[test]
fn malformed_template_truncates_to_prefix() -> Result<()> {
    let dir = TempChunkDir::new()?;
    Pipeline::builder()
        .source(letters_csv())
        .output_template(dir.template("out_%s.csv"))
        .chunk_capacity(i64::MAX)
        .logger(NoopLog)
        .build()?
        .run()?;

    assert_eq!(dir.files()?, vec![dir.file_path("out_")]);
    Ok(())
}

#[test]
fn existing_files_are_appended_to() -> Result<()> {
    let dir = TempChunkDir::new()?;
    fs::write(dir.file_path("c_1.csv"), "old,row\n")?;
    Pipeline::builder()
        .source(VecRowSource::new(rows(&[&["h"], &["1"]])))
        .output_template(dir.template("c_%d.csv"))
        .chunk_capacity(5)
        .logger(NoopLog)
        .build()?
        .run()?;

    assert_eq!(
        read_chunk_rows(dir.file_path("c_1.csv"))?,
        rows(&[&["old", "row"], &["h"], &["1"]])
    );
    Ok(())
}

#[test]
fn missing_parent_directory_fails_open() -> Result<()> {
    let dir = TempChunkDir::new()?;
    let err = Pipeline::builder()
        .source(letters_csv())
        .output_template(dir.template("nope/out_%d.csv"))
        .chunk_capacity(1)
        .logger(NoopLog)
        .build()?
        .run()
        .unwrap_err();
    assert!(format!("{err:#}").contains("open chunk 1"));
    Ok(())
}

#[test]
fn fields_are_quoted_when_needed() -> Result<()> {
    let dir = TempChunkDir::new()?;
    let tricky = rows(&[&["h1", "h2"], &["a,b", "say \"hi\""], &["line\nbreak", ""]]);
    Pipeline::builder()
        .source(VecRowSource::new(tricky.clone()))
        .output_template(dir.template("q_%d.csv"))
        .chunk_capacity(10)
        .logger(NoopLog)
        .build()?
        .run()?;

    assert_eq!(read_chunk_rows(dir.file_path("q_1.csv"))?, tricky);
    Ok(())
}

#[test]
fn csv_chunk_writer_rejects_writes_after_close() -> Result<()> {
    let mut writer = CsvChunkWriter::new(Vec::new(), 64);
    writer.write_row(&["x".to_string()])?;
    writer.flush()?;
    writer.close()?;
    assert!(writer.write_row(&["y".to_string()]).is_err());
    assert!(writer.flush().is_err());
    // Closing twice is harmless.
    writer.close()?;
    Ok(())
}

#[test]
fn writer_factory_opens_requested_ordinals() -> Result<()> {
    let dir = TempChunkDir::new()?;
    let base = dir.path().to_path_buf();
    let mut factory = WriterFactory::new(
        move |n: u64| fs::File::create(base.join(format!("w{n}.csv"))),
        1024,
    );

    for n in 1..=2u64 {
        let mut writer = factory.open(n)?;
        writer.write_row(&[format!("row {n}")])?;
        writer.flush()?;
        writer.close()?;
    }
    assert_eq!(read_chunk_rows(dir.file_path("w2.csv"))?, rows(&[&["row 2"]]));
    Ok(())
}

#[test]
fn template_factory_reports_paths() {
    let factory = FileTemplateFactory::new("out/part_%02d.csv", 1024);
    assert_eq!(factory.path_for(3), std::path::PathBuf::from("out/part_03.csv"));
    assert!(factory.has_placeholder());
    assert_eq!(render_chunk_name("x_%d_y", 12), "x_12_y");
}

#[test]
fn left_justified_template_pads_after_ordinal() -> Result<()> {
    let dir = TempChunkDir::new()?;
    Pipeline::builder()
        .source(letters_csv())
        .output_template(dir.template("part-%-3d.csv"))
        .chunk_capacity(2)
        .logger(NoopLog)
        .build()?
        .run()?;

    assert_eq!(
        read_chunk_rows(dir.file_path("part-1  .csv"))?,
        rows(&[&["a", "b", "c"], &["d", "e", "f"], &["g", "h", "i"]])
    );
    assert_eq!(
        read_chunk_rows(dir.file_path("part-2  .csv"))?,
        rows(&[&["a", "b", "c"], &["j", "k", "l"]])
    );
    Ok(())
}
