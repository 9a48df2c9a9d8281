//! Integration tests for writing archives and verifying round-trip.

use scenevault::api::{IArchive, OArchive, OObject, OProperty};
use scenevault::core::{MetaData, SampleSelector, TimeSampling};
use scenevault::util::{DataType, Dimensions, Error};
use scenevault::vault::CURRENT_VERSION;

use tempfile::NamedTempFile;

#[test]
fn roundtrip_simple_hierarchy() {
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    let path = temp.path();

    {
        let mut archive = OArchive::create(path).expect("Failed to create archive");

        let mut root = OObject::new("");
        root.add_child(OObject::new("left")).unwrap();
        root.add_child(OObject::new("right")).unwrap();
        let parent = root.add_child(OObject::new("parent")).unwrap();
        parent.add_child(OObject::new("nested")).unwrap();

        archive.write_archive(&mut root).expect("Failed to write archive");
    }

    let archive = IArchive::open(path).expect("Failed to open archive");
    let root = archive.root().unwrap();

    assert_eq!(root.num_children(), 3);

    let child_names: Vec<String> = root
        .children()
        .map(|c| c.unwrap().name().to_string())
        .collect();
    assert_eq!(child_names, vec!["left", "right", "parent"]);

    let parent = root.child_by_name("parent").unwrap().expect("no 'parent' child");
    assert_eq!(parent.full_name(), "/parent");
    assert_eq!(parent.num_children(), 1);
    let nested = parent.child(0).unwrap();
    assert_eq!(nested.name(), "nested");
    assert_eq!(nested.full_name(), "/parent/nested");
}

#[test]
fn roundtrip_deep_tree_with_metadata() {
    let temp = NamedTempFile::new().unwrap();
    let path = temp.path();

    let width = 3usize;
    let depth = 3usize;

    fn grow(node: &mut OObject, level: usize, depth: usize, width: usize) {
        if level == depth {
            return;
        }
        for i in 0..width {
            let mut meta = MetaData::new();
            meta.set("level", level.to_string()).unwrap();
            let child = node
                .add_child(OObject::new(format!("node{}", i)).with_meta_data(meta))
                .unwrap();
            grow(child, level + 1, depth, width);
        }
    }

    {
        let mut archive = OArchive::create(path).unwrap();
        let mut root = OObject::new("");
        grow(&mut root, 0, depth, width);
        archive.write_archive(&mut root).unwrap();
    }

    let archive = IArchive::open(path).unwrap();

    fn verify(node: &scenevault::api::IObject, level: usize, depth: usize, width: usize) {
        if level == depth {
            assert_eq!(node.num_children(), 0);
            return;
        }
        assert_eq!(node.num_children(), width);
        for i in 0..width {
            let child = node.child(i).unwrap();
            assert_eq!(child.name(), format!("node{}", i));
            assert_eq!(child.meta_data().get("level"), Some(level.to_string().as_str()));
            verify(&child, level + 1, depth, width);
        }
    }

    let root = archive.root().unwrap();
    verify(&root, 0, depth, width);

    let deep = archive.find_object("/node1/node2/node0").unwrap().unwrap();
    assert_eq!(deep.full_name(), "/node1/node2/node0");
}

#[test]
fn roundtrip_sampled_properties() {
    let temp = NamedTempFile::new().unwrap();
    let path = temp.path();

    {
        let mut archive = OArchive::create(path).unwrap();
        let ts = archive.add_time_sampling(TimeSampling::uniform(0.25, 1.0));

        let mut root = OObject::new("");
        let shape = root.add_child(OObject::new("shape")).unwrap();

        let mut radius = OProperty::scalar("radius", DataType::FLOAT64).with_time_sampling(ts);
        radius.add_scalar_pod(&1.0f64).unwrap();
        radius.add_scalar_pod(&1.5f64).unwrap();
        radius.add_scalar_pod(&2.0f64).unwrap();
        shape.add_property(radius).unwrap();

        let counts = shape.add_array("counts", DataType::INT32).unwrap();
        counts.add_array_pod(&[4i32, 4, 3]).unwrap();
        counts.add_array_pod(&[4i32, 4, 4, 3]).unwrap();

        archive.write_archive(&mut root).unwrap();
    }

    let archive = IArchive::open(path).unwrap();
    assert_eq!(archive.version(), CURRENT_VERSION);
    assert_eq!(archive.num_time_samplings(), 2);
    assert_eq!(archive.max_samples_for_time_sampling(1), Some(3));

    let shape = archive.find_object("/shape").unwrap().unwrap();
    let props = shape.properties().unwrap();

    let radius = props.scalar_by_name("radius").unwrap().unwrap();
    assert_eq!(radius.num_samples(), 3);
    assert!((radius.sample_time(0) - 1.0).abs() < 1e-12);
    assert!((radius.sample_time(2) - 1.5).abs() < 1e-12);
    let mid: f64 = radius.read_typed(SampleSelector::TimeNear(1.3)).unwrap();
    assert_eq!(mid, 1.5);
    let floor: f64 = radius.read_typed(SampleSelector::TimeFloor(1.49)).unwrap();
    assert_eq!(floor, 1.5);
    let ceil: f64 = radius.read_typed(SampleSelector::TimeCeil(1.26)).unwrap();
    assert_eq!(ceil, 2.0);

    let counts = props.array_by_name("counts").unwrap().unwrap();
    assert_eq!(counts.num_samples(), 2);
    assert_eq!(counts.sample_dimensions(0).unwrap(), Dimensions::d1(3));
    assert_eq!(counts.sample_dimensions(1).unwrap(), Dimensions::d1(4));
    let second: Vec<i32> = counts.read_typed(SampleSelector::Index(1)).unwrap();
    assert_eq!(second, vec![4, 4, 4, 3]);
}

#[test]
fn identical_samples_written_once() {
    let payload: Vec<f32> = (0..3000).map(|i| i as f32).collect();

    let write = |dedup: bool| -> (u64, usize) {
        let temp = NamedTempFile::new().unwrap();
        let mut archive = OArchive::create(temp.path()).unwrap();
        archive.set_dedup_enabled(dedup);

        let mut root = OObject::new("");
        let shape = root.add_child(OObject::new("shape")).unwrap();
        let points = shape.add_array("points", DataType::FLOAT32).unwrap();
        for _ in 0..4 {
            points.add_array_pod(&payload).unwrap();
        }
        archive.write_archive(&mut root).unwrap();
        let hits = archive.dedup_hits();

        let size = std::fs::metadata(temp.path()).unwrap().len();

        // Shared blocks also read back byte-identical.
        let reader = IArchive::open(temp.path()).unwrap();
        let shape = reader.find_object("/shape").unwrap().unwrap();
        let props = shape.properties().unwrap();
        let points = props.array_by_name("points").unwrap().unwrap();
        assert_eq!(points.num_samples(), 4);
        let first = points.read_sample(SampleSelector::Index(0)).unwrap();
        let last = points.read_sample(SampleSelector::Index(3)).unwrap();
        assert_eq!(first.data, last.data);
        assert_eq!(points.sample_key(0).unwrap(), points.sample_key(3).unwrap());

        (size, hits)
    };

    let (deduped_size, hits) = write(true);
    let (plain_size, no_hits) = write(false);

    assert_eq!(hits, 3);
    assert_eq!(no_hits, 0);
    // Three duplicate 12000-byte payloads collapse onto one block.
    assert!(deduped_size + 3 * 12_000 <= plain_size);
}

#[test]
fn finalized_tree_rejects_further_writes() {
    let temp = NamedTempFile::new().unwrap();

    let mut archive = OArchive::create(temp.path()).unwrap();
    let mut root = OObject::new("");
    root.add_child(OObject::new("shape")).unwrap();
    archive.write_archive(&mut root).unwrap();

    assert!(matches!(
        root.add_child(OObject::new("late")),
        Err(Error::Sealed(_))
    ));

    let mut another = OObject::new("");
    assert!(matches!(
        archive.write_archive(&mut another),
        Err(Error::Frozen)
    ));
}

#[test]
fn newer_format_version_is_refused() {
    let temp = NamedTempFile::new().unwrap();
    let path = temp.path();

    {
        let mut archive = OArchive::create(path).unwrap();
        let mut root = OObject::new("");
        archive.write_archive(&mut root).unwrap();
    }

    // Stamp a version this library does not understand.
    let mut bytes = std::fs::read(path).unwrap();
    bytes[6..8].copy_from_slice(&(CURRENT_VERSION + 1).to_le_bytes());
    std::fs::write(path, &bytes).unwrap();

    match IArchive::open(path) {
        Err(Error::UnsupportedVersion(v)) => assert_eq!(v, CURRENT_VERSION + 1),
        other => panic!("expected version refusal, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn unfinalized_archive_reopens_empty() {
    let temp = NamedTempFile::new().unwrap();
    let path = temp.path();

    {
        let archive = OArchive::create(path).unwrap();
        archive.close().unwrap();
    }

    let archive = IArchive::open(path).unwrap();
    let root = archive.root().unwrap();
    assert_eq!(root.num_children(), 0);
    assert_eq!(root.properties().unwrap().num_properties(), 0);
}

#[test]
fn truncated_archive_is_refused() {
    let temp = NamedTempFile::new().unwrap();
    std::fs::write(temp.path(), b"Vau").unwrap();

    assert!(matches!(
        IArchive::open(temp.path()),
        Err(Error::UnexpectedEof(_))
    ));
}
