// tests/pipeline_tests.rs
use std::path::PathBuf;

use cdi_engine::config::{InputConfig, PipelineConfig, WorkerSetting};
use cdi_engine::grid::GridDataset;
use cdi_engine::io::{read_grid, write_grid, GridSource, NODATA_VALUE};
use cdi_engine::pipeline::CdiPipeline;
use cdi_engine::processing::{CellRule, ParallelGridExecutor, TimeAlignment};
use cdi_engine::CdiError;
use chrono::NaiveDate;
use gdal::raster::Buffer;
use gdal::{DriverManager, Metadata};
use tempfile::tempdir;

fn date(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap()
}

fn input(name: &str) -> InputConfig {
    InputConfig {
        name: name.to_string(),
        path: PathBuf::from(format!("{name}.nc")),
        variable: None,
        rank: true,
        invert: None,
    }
}

fn config(names: &[&str]) -> PipelineConfig {
    PipelineConfig {
        inputs: names.iter().map(|n| input(n)).collect(),
        output: PathBuf::from("cdi.tif"),
        weights: Default::default(),
        weights_file: None,
        workers: WorkerSetting::default(),
        chunk_cells: None,
        alignment: TimeAlignment::Intersection,
        cell_rule: CellRule::Available,
        output_variable: "cdi".to_string(),
        drop_empty_ranked: false,
    }
}

/// One-cell grid over Januaries 2000.. with the given raw values
fn januaries(name: &str, values: &[f64]) -> GridDataset {
    let times = (0..values.len()).map(|i| date(2000 + i as i32, 1)).collect();
    GridDataset::new(
        name,
        vec![-35.0],
        vec![149.0],
        times,
        values.iter().map(|&v| Some(v)).collect(),
    )
    .unwrap()
}

#[test]
fn test_config_rejects_unknown_weight() {
    let mut config = config(&["ndvi", "spi"]);
    config.weights.insert("awc".to_string(), 0.5);
    let err = CdiPipeline::new(config, ParallelGridExecutor::single()).err().unwrap();
    assert!(matches!(err, CdiError::Configuration(_)), "{err}");
}

#[test]
fn test_config_rejects_negative_weight_and_zero_workers() {
    let mut negative = config(&["ndvi", "spi"]);
    negative.weights.insert("spi".to_string(), -0.1);
    assert!(matches!(
        CdiPipeline::new(negative, ParallelGridExecutor::single()),
        Err(CdiError::Configuration(_))
    ));

    let mut zero = config(&["ndvi"]);
    zero.workers = WorkerSetting::Count(0);
    assert!(matches!(zero.executor(), Err(CdiError::Configuration(_))));

    let mut negative_workers = config(&["ndvi"]);
    negative_workers.workers = WorkerSetting::Count(-2);
    assert!(matches!(negative_workers.executor(), Err(CdiError::Configuration(_))));
}

#[test]
fn test_config_from_json_defaults() {
    let json = r#"{
        "inputs": [
            { "name": "ndvi", "path": "ndvi.nc" },
            { "name": "et", "path": "et.tif", "variable": "eto", "rank": false }
        ],
        "output": "out/cdi.tif",
        "weights": { "ndvi": 0.25 },
        "workers": 3
    }"#;
    let config: PipelineConfig = serde_json::from_str(json).unwrap();

    assert_eq!(config.output_variable, "cdi");
    assert_eq!(config.alignment, TimeAlignment::Intersection);
    assert_eq!(config.cell_rule, CellRule::Available);
    assert!(config.inputs[0].rank);
    assert!(!config.inputs[1].rank);
    assert_eq!(config.inputs[1].source().variable, "eto");
    assert_eq!(config.executor().unwrap().workers(), 3);
}

#[test]
fn test_pipeline_ranks_then_combines() {
    let mut config = config(&["ndvi", "et"]);
    config.weights.insert("ndvi".to_string(), 0.5);
    config.weights.insert("et".to_string(), 0.5);
    let pipeline = CdiPipeline::new(config, ParallelGridExecutor::single()).unwrap();

    // ndvi ranks 0, 50, 100; et ranks 100, 50, 0 and is inverted
    let ndvi = januaries("ndvi", &[0.1, 0.2, 0.3]);
    let et = januaries("et", &[30.0, 20.0, 10.0]);
    let cdi = pipeline.compute(vec![ndvi, et]).unwrap();

    assert_eq!(cdi.variable(), "cdi");
    assert_eq!(cdi.values(), &[Some(0.0), Some(50.0), Some(100.0)]);
}

#[test]
fn test_pipeline_invert_override_and_preranked_input() {
    let mut config = config(&["et", "spi"]);
    config.inputs[0].invert = Some(false);
    config.inputs[1].rank = false;
    let pipeline = CdiPipeline::new(config, ParallelGridExecutor::single()).unwrap();

    let et = januaries("et", &[1.0, 2.0]);
    let spi = januaries("spi", &[40.0, 40.0]);
    let cdi = pipeline.compute(vec![et, spi]).unwrap();

    // et ranks 0, 100 taken as-is; spi is used unranked
    assert_eq!(cdi.values(), &[Some(20.0), Some(70.0)]);
}

#[test]
fn test_pipeline_rejects_misaligned_grids_before_ranking() {
    let pipeline =
        CdiPipeline::new(config(&["ndvi", "spi"]), ParallelGridExecutor::single()).unwrap();
    let ndvi = januaries("ndvi", &[1.0, 2.0]);
    let spi = GridDataset::new(
        "spi",
        vec![-35.0],
        vec![150.0],
        vec![date(2000, 1), date(2001, 1)],
        vec![Some(1.0), Some(2.0)],
    )
    .unwrap();

    let err = pipeline.compute(vec![ndvi, spi]).err().unwrap();
    assert!(matches!(err, CdiError::ShapeMismatch { axis: "lon", .. }), "{err}");

    let err = pipeline.compute(vec![januaries("ndvi", &[1.0])]).err().unwrap();
    assert!(matches!(err, CdiError::Configuration(_)), "{err}");
}

#[test]
fn test_geotiff_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("cdi.tif");

    let grid = GridDataset::from_time_major(
        "cdi",
        vec![-30.25, -30.75],
        vec![140.25, 140.75, 141.25],
        vec![date(2001, 1), date(2001, 2)],
        vec![
            vec![Some(10.0), None, Some(30.0), Some(40.0), Some(50.0), Some(60.0)],
            vec![Some(1.5), Some(2.5), Some(3.5), None, None, Some(6.5)],
        ],
    )
    .unwrap()
    .with_units("weighted percentile rank");

    write_grid(&grid, &path).unwrap();
    assert!(path.exists());

    let read = read_grid(&GridSource::new("cdi", &path, "cdi")).unwrap();
    assert_eq!(read.shape(), (2, 3, 2));
    assert_eq!(read.times(), grid.times());
    assert_eq!(read.units(), Some("weighted percentile rank"));
    assert_eq!(read.values(), grid.values());
    for (a, b) in read.lat().iter().zip(grid.lat()) {
        assert!((a - b).abs() < 1e-9);
    }
    assert!(read.values().iter().flatten().all(|&v| v != NODATA_VALUE));

    let err = read_grid(&GridSource::new("spi", &path, "spi")).err().unwrap();
    assert!(matches!(err, CdiError::MissingVariable { .. }), "{err}");
}

#[test]
fn test_netcdf_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ranked.nc");

    let grid = GridDataset::from_time_major(
        "spi",
        vec![-30.25, -30.75],
        vec![140.25, 140.75, 141.25],
        vec![date(2000, 1), date(2000, 2), date(2001, 1)],
        vec![
            vec![Some(0.0), Some(50.0), None, Some(100.0), Some(25.0), Some(75.0)],
            vec![None, None, None, None, None, None],
            vec![Some(100.0), Some(50.0), Some(10.0), None, Some(75.0), Some(25.0)],
        ],
    )
    .unwrap()
    .with_units("percentile rank");

    write_grid(&grid, &path).unwrap();

    // read back by variable name, the way the combine step opens its inputs
    let read = read_grid(&GridSource::new("spi", &path, "spi")).unwrap();
    assert_eq!(read.shape(), (2, 3, 3));
    assert_eq!(read.times(), grid.times());
    assert_eq!(read.values(), grid.values());
    for (a, b) in read.lon().iter().zip(grid.lon()) {
        assert!((a - b).abs() < 1e-6, "lon {a} vs {b}");
    }

    let err = read_grid(&GridSource::new("cdi", &path, "cdi")).err().unwrap();
    assert!(matches!(err, CdiError::MissingVariable { .. }), "{err}");
}

#[test]
fn test_plain_geotiff_reads_as_requested_variable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ndvi.tif");
    {
        let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
        let mut dataset = driver.create_with_band_type::<f64, _>(&path, 2, 1, 2).unwrap();
        dataset
            .set_geo_transform(&[140.0, 1.0, 0.0, -30.0, 0.0, -1.0])
            .unwrap();
        for (i, day) in ["2000-01-01", "2001-01-01"].iter().enumerate() {
            let mut band = dataset.rasterband(i + 1).unwrap();
            band.set_metadata_item("TIME", day, "").unwrap();
            let mut buffer = Buffer::new((2, 1), vec![0.1 * (i + 1) as f64, 0.5]);
            band.write((0, 0), (2, 1), &mut buffer).unwrap();
        }
    }

    let read = read_grid(&GridSource::new("ndvi", &path, "ndvi")).unwrap();
    assert_eq!(read.shape(), (1, 2, 2));
    assert_eq!(read.lon(), &[140.5, 141.5]);
    assert_eq!(read.times(), &[date(2000, 1), date(2001, 1)]);
    assert_eq!(read.series(0), &[Some(0.1), Some(0.2)]);
    assert_eq!(read.units(), None);
}

#[test]
fn test_missing_input_file() {
    let dir = tempdir().unwrap();
    let err = PipelineConfig::load(&dir.path().join("absent.json")).err().unwrap();
    assert!(matches!(err, CdiError::FileNotFound { .. }));
}
