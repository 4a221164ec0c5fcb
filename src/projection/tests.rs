use super::*;
use crate::composite::decode;
use crate::grid::GridLayer;
use crate::testdata::SyntheticComposite;
use tempfile::TempDir;

fn layer(rows: usize, cols: usize) -> GridLayer {
    let temp_dir = TempDir::new().unwrap();
    let path = SyntheticComposite::ramp(rows, cols)
        .write_to(temp_dir.path())
        .unwrap();
    decode(&path, -1.0, -2.0).unwrap()
}

#[test]
fn test_radolan_spec_resolves_to_national_grid() {
    let (crs, extent) = ProjectionSpec::Radolan.resolve().unwrap();
    assert_eq!(crs.definition(), RADOLAN_CRS);
    assert_eq!(crs.projection(), "stere");
    assert_eq!(crs.param_f64("lon_0"), Some(10.0));
    assert_eq!(extent.as_tuple(), RADOLAN_EXTENT);
    assert!((extent.width() - 900.0).abs() < 1e-9);
}

#[test]
fn test_rw_and_seasonal_grids() {
    let (rw_crs, rw_extent) = ProjectionSpec::Rw.resolve().unwrap();
    assert_eq!(rw_crs.definition(), RADOLAN_CRS);
    assert_eq!(rw_extent.as_tuple(), RW_EXTENT);

    let (seasonal_crs, seasonal_extent) = ProjectionSpec::Seasonal.resolve().unwrap();
    assert_eq!(seasonal_crs.param_f64("lat_ts"), Some(60.0));
    assert_eq!(seasonal_extent.as_tuple(), SEASONAL_EXTENT);
}

#[test]
fn test_custom_spec_is_stamped_verbatim() {
    let spec = ProjectionSpec::Custom {
        crs: "+proj=utm +zone=32 +datum=WGS84 +units=m +no_defs".to_string(),
        extent: [280000.0, 920000.0, 5230000.0, 6110000.0],
    };
    let projected = Projector::default()
        .attach(layer(2, 3), Some(&spec), false)
        .unwrap();

    let crs = projected.spatial.crs.as_ref().unwrap();
    assert_eq!(crs.definition(), "+proj=utm +zone=32 +datum=WGS84 +units=m +no_defs");
    assert_eq!(
        projected.spatial.extent.unwrap().as_tuple(),
        [280000.0, 920000.0, 5230000.0, 6110000.0]
    );
    // Cells are untouched by attachment
    assert_eq!(projected.values, layer(2, 3).values);
}

#[test]
fn test_custom_crs_keeps_surrounding_whitespace() {
    let definition = "  +proj=stere +lat_0=90 +lon_0=10\t";
    let spec = ProjectionSpec::Custom {
        crs: definition.to_string(),
        extent: [0.0, 1.0, 0.0, 1.0],
    };
    let projected = Projector::default()
        .attach(layer(1, 1), Some(&spec), false)
        .unwrap();

    let crs = projected.spatial.crs.unwrap();
    assert_eq!(crs.definition(), definition);
    assert_eq!(crs.param_f64("lon_0"), Some(10.0));
    assert_eq!(String::from(crs), definition);
}

#[test]
fn test_invalid_crs_is_rejected() {
    for definition in [
        "proj=stere",
        "+lat_0=90",
        "+proj=stere +lat_0=north",
        "+proj=stere +proj=longlat",
        "+proj=",
    ] {
        match Crs::parse(definition) {
            Err(RadolanError::InvalidCrs { crs, .. }) => assert_eq!(crs, definition),
            other => panic!("Expected InvalidCrs for '{definition}', got {other:?}"),
        }
    }
}

#[test]
fn test_custom_spec_with_invalid_crs_fails_attachment() {
    let spec = ProjectionSpec::Custom {
        crs: "not a crs".to_string(),
        extent: [0.0, 1.0, 0.0, 1.0],
    };
    let err = Projector::default().attach(layer(1, 1), Some(&spec), false).unwrap_err();
    assert!(matches!(err, RadolanError::InvalidCrs { .. }));
}

#[test]
fn test_degenerate_extent_is_rejected() {
    assert!(Extent::from_tuple([1.0, 1.0, 0.0, 2.0]).is_err());
    assert!(Extent::from_tuple([0.0, 1.0, f64::NAN, 2.0]).is_err());
}

#[test]
fn test_reprojection_without_engine() {
    let err = Projector::default()
        .attach(layer(2, 2), Some(&ProjectionSpec::Radolan), true)
        .unwrap_err();
    match err {
        RadolanError::DependencyUnavailable { capability } => {
            assert_eq!(capability, "reproject-to-geographic")
        }
        other => panic!("Expected DependencyUnavailable, got {other:?}"),
    }
}

#[test]
fn test_reprojection_needs_a_crs() {
    let projector = Projector::new(Some(Arc::new(StereographicEngine::new())));
    let err = projector.attach(layer(2, 2), None, true).unwrap_err();
    assert!(matches!(err, RadolanError::Projection { .. }));
}

#[test]
fn test_reprojection_to_geographic() {
    let projector = Projector::new(Some(Arc::new(StereographicEngine::new()))).with_fill(-5.0);
    let projected = projector
        .attach(layer(9, 9), Some(&ProjectionSpec::Radolan), true)
        .unwrap();

    assert_eq!(projected.dims(), (9, 9));
    assert!(projected.spatial.crs.as_ref().unwrap().is_geographic());
    let extent = projected.spatial.extent.unwrap();
    assert!(extent.xmin > 1.0 && extent.xmax < 20.0);
    assert!(extent.ymin > 46.0 && extent.ymax < 56.0);

    // Outside cells carry the fill value and are masked
    for (&value, &missing) in projected.values.iter().zip(projected.no_data.iter()) {
        if missing {
            assert_eq!(value, -5.0);
        }
    }
    assert!(!projected.no_data[[4, 4]]);
}

#[test]
fn test_projection_spec_from_str() {
    assert_eq!("RADOLAN".parse::<ProjectionSpec>(), Ok(ProjectionSpec::Radolan));
    assert_eq!("rw".parse::<ProjectionSpec>(), Ok(ProjectionSpec::Rw));
    assert!("mercator".parse::<ProjectionSpec>().is_err());
}
