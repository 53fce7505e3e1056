use std::fs;
use std::path::Path;

use pfb_backend::pfb::{LoadState, dist_path, read_offsets_file};
use pfb_backend::{Difference, PfbDataset, PfbError, Topology, VoxelGrid};

const NX: usize = 41;
const NY: usize = 41;
const NZ: usize = 50;

fn sample_value(x: usize, y: usize, z: usize) -> f64 {
    x as f64 * 0.5 + y as f64 * 100.0 + z as f64 * 10_000.0 - 3.25
}

/// 41x41x50 的网格以 4x4x1 拓扑写入文件
fn write_sample(dir: &Path) -> std::path::PathBuf {
    let mut data = Vec::with_capacity(NX * NY * NZ);
    for z in 0..NZ {
        for y in 0..NY {
            for x in 0..NX {
                data.push(sample_value(x, y, z));
            }
        }
    }
    let mut dataset = PfbDataset::from_voxel_grid(VoxelGrid::new([NX, NY, NZ], data).unwrap());
    dataset.set_topology(Topology::new(4, 4, 1).unwrap());
    let path = dir.join("press.init.pfb");
    dataset.write_file(&path).unwrap();
    path
}

fn open(path: &Path) -> PfbDataset<'static> {
    let mut dataset = PfbDataset::with_path(path);
    dataset.load_header().unwrap();
    dataset.load_pqr().unwrap();
    dataset
}

#[test]
fn header_and_topology_are_recovered() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sample(dir.path());

    let mut dataset = PfbDataset::with_path(&path);
    assert_eq!(dataset.state(), LoadState::Closed);
    dataset.load_header().unwrap();
    assert_eq!(dataset.state(), LoadState::HeaderLoaded);
    assert_eq!((dataset.nx(), dataset.ny(), dataset.nz()), (NX, NY, NZ));
    assert_eq!(dataset.num_subgrids(), 16);
    assert_eq!((dataset.dx(), dataset.dy(), dataset.dz()), (1.0, 1.0, 1.0));

    dataset.load_pqr().unwrap();
    assert_eq!(dataset.state(), LoadState::TopologyKnown);
    assert_eq!((dataset.p(), dataset.q(), dataset.r()), (4, 4, 1));
}

#[test]
fn point_reads_match_full_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sample(dir.path());

    let mut full = open(&path);
    full.load_data().unwrap();
    assert_eq!(full.state(), LoadState::DataLoaded);

    let mut reader = open(&path);
    for z in 0..NZ {
        for y in 0..NY {
            for x in 0..NX {
                let expected = sample_value(x, y, z);
                assert_eq!(full[[x, y, z]], expected);
                assert_eq!(reader.file_read_point(x, y, z).unwrap(), expected);
            }
        }
    }
}

#[test]
fn subgrid_reads_match_full_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sample(dir.path());
    let mut dataset = open(&path);

    // 41 = 11 + 10 + 10 + 10，余数块在前
    let values = dataset.file_read_subgrid_at_grid_index(1, 3, 0).unwrap();
    assert_eq!(values.len(), 10 * 10 * NZ);
    assert_eq!(values[0], sample_value(11, 31, 0));
    assert_eq!(values[values.len() - 1], sample_value(20, 40, NZ - 1));

    let same = dataset.file_read_subgrid_at_point_index(15, 35, 7).unwrap();
    assert_eq!(same, values);

    assert!(matches!(
        dataset.file_read_subgrid_at_grid_index(4, 0, 0),
        Err(PfbError::InvalidArgument(_))
    ));
    assert!(matches!(
        dataset.file_read_point(NX, 0, 0),
        Err(PfbError::InvalidArgument(_))
    ));
}

#[test]
fn rewrite_with_same_topology_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sample(dir.path());

    let mut dataset = open(&path);
    dataset.load_data().unwrap();
    let copy = dir.path().join("copy.pfb");
    dataset.write_file(&copy).unwrap();

    assert_eq!(fs::read(&path).unwrap(), fs::read(&copy).unwrap());
}

#[test]
fn redistributed_file_keeps_header_and_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sample(dir.path());
    let out = dir.path().join("press.init.2x2.pfb");

    let mut source = PfbDataset::with_path(&path);
    let offsets = source.dist_file(Topology::new(2, 2, 1).unwrap(), &out).unwrap();
    assert_eq!(offsets.len(), 5);

    let original = fs::read(&path).unwrap();
    let redistributed = fs::read(&out).unwrap();
    assert_eq!(original[..60], redistributed[..60]);
    assert_ne!(original[60..64], redistributed[60..64]);
    assert_eq!(*offsets.last().unwrap() as usize, redistributed.len());

    let sidecar = fs::read_to_string(dist_path(&out)).unwrap();
    assert_eq!(sidecar.lines().count(), 5);
    assert_eq!(read_offsets_file(&dist_path(&out)).unwrap(), offsets);

    let mut reloaded = open(&out);
    assert_eq!((reloaded.p(), reloaded.q(), reloaded.r()), (2, 2, 1));
    reloaded.load_data().unwrap();
    let mut before = open(&path);
    before.load_data().unwrap();
    assert_eq!(before.compare(&reloaded), Difference::None);
    assert_eq!(source.compare(&reloaded), Difference::None);
    assert_eq!(source.filename(), Some(out.as_path()));
}

#[test]
fn small_grid_round_trips_through_uneven_split() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("small.pfb");
    let mut values: Vec<f64> = (0..64).map(|i| f64::from(i) * 1.5).collect();

    let mut written = PfbDataset::from_slice(&mut values, 8, 8, 1).unwrap();
    assert!(!written.is_data_owner());
    written.set_topology(Topology::new(3, 3, 1).unwrap());
    written.write_file(&out).unwrap();

    let mut read_back = open(&out);
    assert_eq!((read_back.p(), read_back.q(), read_back.r()), (3, 3, 1));
    read_back.load_data().unwrap();
    assert!(read_back.is_data_owner());
    assert_eq!(written.compare(&read_back), Difference::None);
}

#[test]
fn threaded_load_matches_sequential_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sample(dir.path());

    let mut sequential = open(&path);
    sequential.load_data().unwrap();

    for threads in [1, 8, 40] {
        let mut threaded = open(&path);
        threaded.load_data_threaded(threads).unwrap();
        assert_eq!(sequential.compare(&threaded), Difference::None, "{threads} 个线程");
    }

    let mut threaded = open(&path);
    assert!(matches!(
        threaded.load_data_threaded(0),
        Err(PfbError::InvalidArgument(_))
    ));
}

#[test]
fn clip_loads_corner_region() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sample(dir.path());

    let mut dataset = open(&path);
    dataset.load_clip(39, 39, 2, 2).unwrap();
    assert_eq!((dataset.nx(), dataset.ny(), dataset.nz()), (2, 2, NZ));
    assert_eq!((dataset.x(), dataset.y(), dataset.z()), (39.0, 39.0, 0.0));
    assert_eq!(dataset.num_subgrids(), 1);
    assert_eq!(dataset.topology(), Topology::default());

    for z in 0..NZ {
        for y in 0..2 {
            for x in 0..2 {
                assert_eq!(dataset[[x, y, z]], sample_value(39 + x, 39 + y, z));
            }
        }
    }

    let mut dataset = open(&path);
    assert!(matches!(
        dataset.load_clip(40, 0, 2, 1),
        Err(PfbError::InvalidArgument(_))
    ));
}

#[test]
fn broken_files_fail_to_load_header() {
    let dir = tempfile::tempdir().unwrap();

    let empty = dir.path().join("empty.pfb");
    fs::write(&empty, []).unwrap();
    assert!(matches!(
        PfbDataset::with_path(&empty).load_header(),
        Err(PfbError::HeaderCorrupt { .. })
    ));

    let truncated = dir.path().join("truncated.pfb");
    fs::write(&truncated, [0u8; 30]).unwrap();
    let mut dataset = PfbDataset::with_path(&truncated);
    assert!(matches!(
        dataset.load_header(),
        Err(PfbError::HeaderCorrupt { .. })
    ));
    assert_eq!(dataset.state(), LoadState::Closed);

    let missing = dir.path().join("missing.pfb");
    assert!(matches!(
        PfbDataset::with_path(&missing).load_header(),
        Err(PfbError::Open { .. })
    ));

    assert!(PfbDataset::new().load_header().is_err());
}

#[test]
fn truncated_data_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sample(dir.path());
    let bytes = fs::read(&path).unwrap();
    let cut = dir.path().join("cut.pfb");
    fs::write(&cut, &bytes[..bytes.len() - 8]).unwrap();

    let mut dataset = open(&cut);
    assert!(matches!(
        dataset.load_data(),
        Err(PfbError::DataCorrupt { .. })
    ));
}
