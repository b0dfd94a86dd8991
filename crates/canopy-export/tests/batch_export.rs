//! Integration test: run synthetic field images through the full pipeline and export every format.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::Cursor;

use canopy_export::{ResultManifest, TraitsOptions, to_geostreams_csv, to_traits_csv};
use canopy_pipeline::{EncodedImage, Orchestrator, PipelineConfig, PlotCatalog, Provenance};

const GREEN: image::Rgb<u8> = image::Rgb([30, 170, 40]);
const SOIL: image::Rgb<u8> = image::Rgb([130, 110, 90]);

fn png(image: image::RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("PNG encoding should succeed");
    bytes
}

#[test]
fn batch_exports_traits_geostreams_and_manifest() {
    let config = PipelineConfig {
        provenance: Provenance {
            citation_author: "Doe, Jane".to_string(),
            species: "Sorghum bicolor".to_string(),
            timestamp: Some("2018-05-02T11:22:33-07:00".to_string()),
            ..Provenance::default()
        },
        ..PipelineConfig::default()
    };
    let orchestrator = Orchestrator::new(config).unwrap();

    let sources = [
        EncodedImage::new(
            "partial.png",
            png(image::RgbImage::from_fn(12, 10, |x, _| {
                if x < 7 { GREEN } else { SOIL }
            })),
        ),
        EncodedImage::new("corrupt.png", vec![0x89, b'P', b'N', b'G']),
    ];
    let batch = orchestrator.run(&sources, &PlotCatalog::empty());
    assert_eq!(batch.records.len(), 1);
    assert_eq!(batch.failures.len(), 1);

    let traits = to_traits_csv(&batch.records, TraitsOptions::default()).unwrap();
    let rows: Vec<&str> = traits.lines().collect();
    eprintln!("{traits}");
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[1],
        "2018-05-02T11:22:33,58.3,2,Sorghum bicolor,whole_image,\"Doe, Jane\",2018,Unknown,\
         Green Canopy Cover Estimation from Field Scanner RGB images"
    );

    let geostreams = to_geostreams_csv(&batch.records).unwrap();
    let row = geostreams.lines().nth(1).unwrap();
    assert!(row.starts_with("whole_image,Canopy Cover,"));
    assert!(row.ends_with(",partial.png,58.3,2018-05-02"));

    let manifest = ResultManifest::from_batch(&batch, Vec::new());
    assert!(manifest.is_success());
}
