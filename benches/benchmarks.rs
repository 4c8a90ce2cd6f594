use criterion::{criterion_group, criterion_main, Criterion};
use cuber::{Aligner, BoundingBox, CubeBuilder, CubeConfig, GdalRaster, GridTransform, Resampling, Sources};
use gdal::{raster::Buffer, spatial_ref::SpatialRef, DriverManager};

const SIZE: (usize, usize) = (1024, 1024);

fn mem_raster(value: f64) -> GdalRaster {
    let driver = DriverManager::get_driver_by_name("MEM").unwrap();
    let mut dataset = driver
        .create_with_band_type::<f64, _>("", SIZE.0, SIZE.1, 3)
        .unwrap();
    dataset
        .set_geo_transform(&[10., 0.001, 0., 46., 0., -0.001])
        .unwrap();
    dataset
        .set_spatial_ref(&SpatialRef::from_epsg(4326).unwrap())
        .unwrap();
    for band in 1..=3 {
        let data = (0..SIZE.0 * SIZE.1).map(|idx| value + idx as f64).collect();
        let mut buffer = Buffer::new(SIZE, data);
        dataset
            .rasterband(band)
            .unwrap()
            .write((0, 0), SIZE, &mut buffer)
            .unwrap();
    }
    GdalRaster::from_dataset(dataset)
}

fn bench_align(c: &mut Criterion) {
    let raster = mem_raster(0.);
    let same_crs = GridTransform::derive(&raster, "EPSG:4326").unwrap();
    let web_mercator = GridTransform::derive(&raster, "EPSG:3857").unwrap();
    c.bench_function("align_nearest", |b| {
        b.iter(|| Aligner::default().align(&raster, &same_crs))
    });
    c.bench_function("align_bilinear_3857", |b| {
        b.iter(|| Aligner::new(Resampling::Bilinear, f64::NAN).align(&raster, &web_mercator))
    });
}

fn bench_build_in_memory(c: &mut Criterion) {
    let bbox = BoundingBox::geographic(10.2, 45.2, 10.8, 45.8);
    let labels: Vec<String> = (1..=4).map(|day| format!("2021-01-0{day}")).collect();
    for parallel in [false, true] {
        let builder = CubeBuilder::new(CubeConfig::default().with_parallel(parallel));
        c.bench_function(&format!("build_in_memory_parallel_{parallel}"), |b| {
            b.iter(|| {
                let sources: Vec<GdalRaster> = (0..4).map(|idx| mem_raster(idx as f64)).collect();
                builder.build_in_memory(Sources::Open(sources), "EPSG:4326", &bbox, &labels)
            })
        });
    }
}

criterion_group!(benches, bench_align, bench_build_in_memory);
criterion_main!(benches);
