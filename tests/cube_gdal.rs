use std::{fs, path::Path};

use cuber::{
    zarr_store, BoundingBox, CubeBuilder, CubeConfig, CubeTarget, CuberError, DateGlob, DatedFile,
    GdalRaster, Sources, StorageError, ZarrStore,
};
use gdal::{raster::Buffer, spatial_ref::SpatialRef, DriverManager};
use ndarray::Axis;
use serde_json::json;

const WIDTH: usize = 20;
const HEIGHT: usize = 20;

/// Two band GeoTIFF of 0.1° pixels over [10°, 12°] x [40°, 42°], every pixel set to `value`.
fn write_geotiff(path: &Path, value: f64) {
    let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
    let mut dataset = driver
        .create_with_band_type::<f64, _>(path, WIDTH, HEIGHT, 2)
        .unwrap();
    dataset
        .set_geo_transform(&[10., 0.1, 0., 42., 0., -0.1])
        .unwrap();
    dataset
        .set_spatial_ref(&SpatialRef::from_epsg(4326).unwrap())
        .unwrap();
    for band in 1..=2 {
        let mut buffer = Buffer::new((WIDTH, HEIGHT), vec![value * band as f64; WIDTH * HEIGHT]);
        dataset
            .rasterband(band)
            .unwrap()
            .write((0, 0), (WIDTH, HEIGHT), &mut buffer)
            .unwrap();
    }
}

fn write_bbox(path: &Path) {
    fs::write(
        path,
        r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[10.5, 40.5], [11.5, 40.5], [11.5, 41.5], [10.5, 41.5], [10.5, 40.5]]]
                }
            }]
        }"#,
    )
    .unwrap();
}

#[test_log::test]
fn builds_zarr_cube_from_dated_geotiffs() {
    let dir = tempfile::tempdir().unwrap();
    let scenes = dir.path().join("scenes");
    fs::create_dir(&scenes).unwrap();
    for (date, value) in [("2021-03-01", 3.), ("2021-01-01", 1.), ("2021-02-01", 2.)] {
        write_geotiff(&scenes.join(format!("S2_{date}.tif")), value);
    }
    let bbox_path = dir.path().join("aoi.geojson");
    write_bbox(&bbox_path);

    let files = DateGlob::new("%Y-%m-%d").discover(&scenes, "tif").unwrap();
    let (paths, labels) = DatedFile::unzip(files);
    assert_eq!(labels, ["2021-01-01", "2021-02-01", "2021-03-01"]);

    let bbox = BoundingBox::from_geometry_file(&bbox_path, None).unwrap();
    let uri = dir.path().join("cube.zarr");
    let uri = uri.to_str().unwrap();
    let config = CubeConfig::default();
    let store = ZarrStore::from_config(&config);
    let cube = CubeBuilder::new(config)
        .build(
            Sources::<GdalRaster>::Paths(paths),
            "EPSG:4326",
            &bbox,
            &labels,
            CubeTarget::create(&store, uri),
        )
        .unwrap();
    assert_eq!(cube.shape(), [2, 10, 10, 3]);

    let metadata = zarr_store::read_metadata(uri).unwrap();
    assert_eq!(metadata["crs"], json!("EPSG:4326"));
    assert_eq!(metadata["upper_left"], json!([41.5, 10.5]));
    assert_eq!(metadata["lower_right"], json!([40.5, 11.5]));
    assert_eq!(metadata["attr"], json!("value"));
    assert_eq!(metadata["time_labels"], json!(labels));

    let array = zarr_store::read_region(uri, [0; 4], cube.shape()).unwrap();
    for (time, expected) in [1., 2., 3.].into_iter().enumerate() {
        let slice = array.index_axis(Axis(3), time);
        assert!(slice.index_axis(Axis(0), 0).iter().all(|value| *value == expected));
        assert!(slice.index_axis(Axis(0), 1).iter().all(|value| *value == 2. * expected));
    }
}

#[test]
fn second_build_into_same_uri_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let raster = dir.path().join("scene.tif");
    write_geotiff(&raster, 1.);
    let uri = dir.path().join("cube.zarr");
    let uri = uri.to_str().unwrap();
    let store = ZarrStore::default();
    let bbox = BoundingBox::geographic(10.5, 40.5, 11.5, 41.5);
    let labels = ["2021-01-01".to_string()];
    let build = || {
        CubeBuilder::default().build(
            Sources::<GdalRaster>::Paths(vec![raster.clone()]),
            "EPSG:4326",
            &bbox,
            &labels,
            CubeTarget::create(&store, uri),
        )
    };

    build().unwrap();
    assert!(matches!(
        build(),
        Err(CuberError::Storage(StorageError::AlreadyExists { .. }))
    ));
}
