mod common;

use common::*;
use ndarray::s;
use tempfile::TempDir;
use terrain_tiler::{NoDataFinalizer, RasterIo};

#[test]
fn test_final_restamping() {
    let dir = TempDir::new().unwrap();
    let reference = dir.path().join("dsm.tif");
    let assembled = dir.path().join("assembled.tif");
    let output = dir.path().join("dtm.tif");

    let mut dsm = terrain(30, 40);
    dsm.slice_mut(s![..5, ..]).fill(EXTERNAL);
    dsm[[20, 20]] = EXTERNAL;
    write_f32(&reference, dsm.clone());
    // solver smeared values over the exterior
    write_f32(&assembled, terrain(30, 40).mapv(|v| v - 3.0));

    let stamped = NoDataFinalizer::new(EXTERNAL)
        .finalize_file(&assembled, &reference, &output)
        .unwrap();
    assert_eq!(stamped, 5 * 40 + 1);

    let dtm = RasterIo::read::<f32, _>(&output).unwrap();
    assert_eq!(dtm.no_data, Some(-32768.0));
    assert_eq!(dtm.transform, origin());
    for ((r, c), &v) in dtm.data.indexed_iter() {
        if dsm[[r, c]] == EXTERNAL {
            assert_eq!(v, EXTERNAL);
        } else {
            assert_eq!(v, terrain(30, 40)[[r, c]] - 3.0);
        }
    }
}

#[test]
fn test_restamping_rejects_shape_mismatch() {
    let dir = TempDir::new().unwrap();
    let reference = dir.path().join("dsm.tif");
    let assembled = dir.path().join("assembled.tif");
    write_f32(&reference, terrain(30, 40));
    write_f32(&assembled, terrain(30, 41));

    let err = NoDataFinalizer::new(EXTERNAL)
        .finalize_file(&assembled, &reference, dir.path().join("dtm.tif"))
        .unwrap_err();
    assert!(matches!(err, terrain_tiler::DtmError::ShapeMismatch { .. }));
}
