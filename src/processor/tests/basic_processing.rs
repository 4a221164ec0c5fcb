//! Basic pipeline runs over well-formed inputs

use super::{archive_path, input_dir, test_config};
use crate::constants::RADOLAN_CRS;
use crate::models::{NestingMode, OutputMode};
use crate::processor::{ChannelProgress, Pipeline, ProgressEvent, collect_stats};
use crate::projection::{ProjectionSpec, StereographicEngine};
use crate::stack::Selection;
use crate::testdata::{SyntheticComposite, write_hourly_archive, write_tar};
use chrono::Duration;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_stack_mode_single_archive() {
    let temp_dir = TempDir::new().unwrap();
    let archive = archive_path(&input_dir(&temp_dir), 1);
    write_hourly_archive(&archive, 4, 3, 4, true).unwrap();

    let pipeline = Pipeline::new(test_config(&temp_dir)).unwrap();
    let mut results = pipeline.run(std::slice::from_ref(&archive)).await;

    let output = results.remove(&archive).unwrap().unwrap();
    assert_eq!(output.staging.extracted, 4);

    let stack = output.stack().unwrap();
    assert_eq!(stack.values.dim(), (4, 3, 4));
    let timestamps = &stack.metadata.timestamps;
    for pair in timestamps.windows(2) {
        assert_eq!(pair[1] - pair[0], Duration::hours(1));
    }
    assert!(
        stack.metadata.files[0].starts_with(temp_dir.path().join("staging").join("RW-201801"))
    );
}

#[tokio::test]
async fn test_rerun_stages_nothing_new() {
    let temp_dir = TempDir::new().unwrap();
    let archive = archive_path(&input_dir(&temp_dir), 1);
    write_hourly_archive(&archive, 3, 2, 2, false).unwrap();

    let pipeline = Pipeline::new(test_config(&temp_dir)).unwrap();
    let first = pipeline.run(std::slice::from_ref(&archive)).await;
    let second = pipeline.run(std::slice::from_ref(&archive)).await;

    let first = first[&archive].as_ref().unwrap();
    let second = second[&archive].as_ref().unwrap();
    assert_eq!(first.staging.extracted, 3);
    assert_eq!(second.staging.extracted, 0);
    assert_eq!(second.staging.already_present, 3);
    assert_eq!(first.staging.members, second.staging.members);
    assert_eq!(
        first.stack().unwrap().values,
        second.stack().unwrap().values
    );
}

#[tokio::test]
async fn test_selection_picks_sorted_members() {
    let temp_dir = TempDir::new().unwrap();
    let archive = archive_path(&input_dir(&temp_dir), 1);
    write_hourly_archive(&archive, 10, 2, 2, true).unwrap();

    let config = test_config(&temp_dir).with_selection(Selection::new(vec![1, 3, 5]));
    let pipeline = Pipeline::new(config).unwrap();
    let results = pipeline.run(std::slice::from_ref(&archive)).await;

    let stack = results[&archive].as_ref().unwrap().stack().unwrap();
    let start = SyntheticComposite::ramp(1, 1).timestamp;
    assert_eq!(
        stack.metadata.timestamps,
        vec![start, start + Duration::hours(2), start + Duration::hours(4)]
    );
}

#[tokio::test]
async fn test_layers_mode_returns_individual_layers() {
    let temp_dir = TempDir::new().unwrap();
    let archive = archive_path(&input_dir(&temp_dir), 2);
    write_hourly_archive(&archive, 3, 2, 3, true).unwrap();

    let config = test_config(&temp_dir).with_output_mode(OutputMode::Layers);
    let results = Pipeline::new(config)
        .unwrap()
        .run(std::slice::from_ref(&archive))
        .await;

    let batch = results[&archive].as_ref().unwrap().layers().unwrap();
    assert_eq!(batch.layers.len(), 3);
    assert!(batch.failures.is_empty());
    assert!(batch.layers.iter().all(|layer| layer.dims() == (2, 3)));
}

#[tokio::test]
async fn test_bare_composite_input() {
    let temp_dir = TempDir::new().unwrap();
    let path = SyntheticComposite::new(1, 2, vec![10, 20])
        .write_to(&input_dir(&temp_dir))
        .unwrap();

    let results = Pipeline::new(test_config(&temp_dir))
        .unwrap()
        .run(std::slice::from_ref(&path))
        .await;

    let output = results[&path].as_ref().unwrap();
    assert_eq!(output.staging.extracted, 0);
    assert_eq!(output.stack().unwrap().values.as_slice().unwrap(), &[1.0, 2.0]);
    // Bare composites are read in place
    assert!(!temp_dir.path().join("staging").exists());
}

#[tokio::test]
async fn test_nested_archive_is_unpacked_twice() {
    let temp_dir = TempDir::new().unwrap();
    let inputs = input_dir(&temp_dir);
    let scratch = TempDir::new().unwrap();

    let mut inner = Vec::new();
    for day in 0..2 {
        let members: Vec<(String, Vec<u8>)> = (0..2)
            .map(|hour| {
                let composite = SyntheticComposite::ramp(2, 2).hours_later(day * 24 + hour);
                (composite.file_name(), composite.encode())
            })
            .collect();
        let name = format!("RW-2018012{day}.tar.gz");
        let path = scratch.path().join(&name);
        write_tar(&path, &members, true).unwrap();
        inner.push((name, std::fs::read(&path).unwrap()));
    }
    let outer = inputs.join("RW-201801.tar");
    write_tar(&outer, &inner, false).unwrap();

    for nesting in [NestingMode::Auto, NestingMode::Nested] {
        let config = test_config(&temp_dir).with_nesting(nesting);
        let results = Pipeline::new(config)
            .unwrap()
            .run(std::slice::from_ref(&outer))
            .await;

        let stack = results[&outer].as_ref().unwrap().stack().unwrap();
        assert_eq!(stack.len(), 4);
        let timestamps = &stack.metadata.timestamps;
        assert!(timestamps.windows(2).all(|pair| pair[0] < pair[1]));
    }
}

#[tokio::test]
async fn test_projection_is_attached() {
    let temp_dir = TempDir::new().unwrap();
    let archive = archive_path(&input_dir(&temp_dir), 3);
    write_hourly_archive(&archive, 2, 3, 3, true).unwrap();

    let config = test_config(&temp_dir).with_projection(ProjectionSpec::Radolan);
    let results = Pipeline::new(config)
        .unwrap()
        .run(std::slice::from_ref(&archive))
        .await;

    let stack = results[&archive].as_ref().unwrap().stack().unwrap();
    let crs = stack.spatial.crs.as_ref().unwrap();
    assert_eq!(crs.definition(), RADOLAN_CRS);
    assert_eq!(stack.layer(1).unwrap().spatial, stack.spatial);
}

#[tokio::test]
async fn test_reprojection_with_engine() {
    let temp_dir = TempDir::new().unwrap();
    let archive = archive_path(&input_dir(&temp_dir), 4);
    write_hourly_archive(&archive, 2, 9, 9, true).unwrap();

    let config = test_config(&temp_dir)
        .with_projection(ProjectionSpec::Radolan)
        .with_reprojection();
    let results = Pipeline::new(config)
        .unwrap()
        .with_engine(Arc::new(StereographicEngine::new()))
        .run(std::slice::from_ref(&archive))
        .await;

    let stack = results[&archive].as_ref().unwrap().stack().unwrap();
    assert!(stack.spatial.crs.as_ref().unwrap().is_geographic());
    assert_eq!(stack.values.dim(), (2, 9, 9));
}

#[tokio::test]
async fn test_progress_events_are_emitted() {
    let temp_dir = TempDir::new().unwrap();
    let archive = archive_path(&input_dir(&temp_dir), 5);
    write_hourly_archive(&archive, 3, 2, 2, true).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let pipeline = Pipeline::new(test_config(&temp_dir))
        .unwrap()
        .with_progress(Arc::new(ChannelProgress::new(tx)));
    pipeline.run(std::slice::from_ref(&archive)).await;

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert_eq!(events.first(), Some(&ProgressEvent::BatchStarted { inputs: 1 }));
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::BatchFinished {
            succeeded: 1,
            failed: 0
        })
    );
    let decoded = events
        .iter()
        .filter(|event| matches!(event, ProgressEvent::MemberDecoded { total: 3, .. }))
        .count();
    assert_eq!(decoded, 3);
    assert!(events.contains(&ProgressEvent::ArchiveStaged {
        archive: archive.clone(),
        members: 3,
        extracted: 3,
    }));
}

#[tokio::test]
async fn test_batch_stats() {
    let temp_dir = TempDir::new().unwrap();
    let inputs = input_dir(&temp_dir);
    let archives: Vec<_> = (1..=2).map(|month| archive_path(&inputs, month)).collect();
    for archive in &archives {
        write_hourly_archive(archive, 2, 2, 2, true).unwrap();
    }

    let results = Pipeline::new(test_config(&temp_dir))
        .unwrap()
        .run(&archives)
        .await;
    let stats = collect_stats(&results, std::time::Duration::from_millis(5));

    assert_eq!(stats.archives_processed, 2);
    assert_eq!(stats.archives_failed, 0);
    assert_eq!(stats.members_extracted, 4);
    assert_eq!(stats.layers_decoded, 4);
    assert_eq!(stats.processing_time_ms, 5);
}

#[tokio::test]
async fn test_inspect_reads_headers_only() {
    let temp_dir = TempDir::new().unwrap();
    let archive = archive_path(&input_dir(&temp_dir), 6);
    write_hourly_archive(&archive, 3, 5, 4, true).unwrap();

    let pipeline = Pipeline::new(test_config(&temp_dir)).unwrap();
    let headers = pipeline.inspect(&archive).await.unwrap();

    assert_eq!(headers.len(), 3);
    for (member, header) in &headers {
        assert!(member.exists());
        let header = header.as_ref().unwrap();
        assert_eq!(header.product, "RW");
        assert_eq!(header.dims(), (5, 4));
    }
}
