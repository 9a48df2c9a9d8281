//! Concurrent read behavior: pooled streams, shared caches, racing
//! materialization of the lazy tree.

use std::sync::Arc;

use scenevault::api::{IArchive, OArchive, OObject, OProperty};
use scenevault::core::{SampleSelector, TimeSampling};
use scenevault::util::DataType;

use tempfile::NamedTempFile;

fn write_scene(path: &std::path::Path) {
    let mut archive = OArchive::create(path).unwrap();
    let ts = archive.add_time_sampling(TimeSampling::uniform(1.0 / 30.0, 0.0));

    let mut root = OObject::new("");
    let shape = root.add_child(OObject::new("shape")).unwrap();

    let mut frame = OProperty::scalar("frame", DataType::INT32).with_time_sampling(ts);
    for i in 0..8i32 {
        frame.add_scalar_pod(&i).unwrap();
    }
    shape.add_property(frame).unwrap();

    let points = shape.add_array("points", DataType::FLOAT32).unwrap();
    let payload: Vec<f32> = (0..6000).map(|i| i as f32 * 0.5).collect();
    points.add_array_pod(&payload).unwrap();

    for i in 0..4 {
        root.add_child(OObject::new(format!("extra{}", i))).unwrap();
    }

    archive.write_archive(&mut root).unwrap();
}

#[test]
fn pooled_streams_serve_parallel_readers() {
    let file = NamedTempFile::new().unwrap();
    write_scene(file.path());

    let archive = IArchive::open_with_streams(file.path(), 4).unwrap();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                let shape = archive.find_object("/shape").unwrap().unwrap();
                let props = shape.properties().unwrap();

                let frame = props.scalar_by_name("frame").unwrap().unwrap();
                assert_eq!(frame.num_samples(), 8);
                for i in 0..8 {
                    let v: i32 = frame.read_typed(SampleSelector::Index(i)).unwrap();
                    assert_eq!(v, i as i32);
                }

                let points = props.array_by_name("points").unwrap().unwrap();
                let data: Vec<f32> = points.read_typed(SampleSelector::Index(0)).unwrap();
                assert_eq!(data.len(), 6000);
                assert_eq!(data[4999], 4999.0 * 0.5);
            });
        }
    });
}

#[test]
fn racing_readers_share_one_cached_payload() {
    let file = NamedTempFile::new().unwrap();
    write_scene(file.path());

    let archive = IArchive::open(file.path()).unwrap();

    let payloads: Vec<Arc<Vec<u8>>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    let shape = archive.find_object("/shape").unwrap().unwrap();
                    let props = shape.properties().unwrap();
                    let points = props.array_by_name("points").unwrap().unwrap();
                    points.read_sample(SampleSelector::Index(0)).unwrap().data
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // Every thread lands on the same cached block.
    for payload in &payloads[1..] {
        assert!(Arc::ptr_eq(&payloads[0], payload));
    }
}

#[test]
fn racing_materialization_reads_the_same_tree() {
    let file = NamedTempFile::new().unwrap();
    write_scene(file.path());

    let archive = IArchive::open_with_streams(file.path(), 2).unwrap();
    let root = archive.root().unwrap();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for i in 0..root.num_children() {
                    let child = root.child(i).unwrap();
                    assert!(!child.name().is_empty());
                }
                let by_index = root.child(0).unwrap();
                let by_name = root.child_by_name("shape").unwrap().unwrap();
                assert_eq!(by_index.full_name(), by_name.full_name());
                assert_eq!(by_name.properties().unwrap().num_properties(), 2);
            });
        }
    });
}
