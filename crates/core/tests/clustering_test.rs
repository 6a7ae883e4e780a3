use geo::Point;
use serde_json::Value;
use spatio_cluster::prelude::*;
use spatio_cluster::{ClusterPyramid, SearchEllipse};
use std::sync::Arc;

/// Deterministic scatter of `n` points inside a lon/lat box.
fn scatter(n: usize, seed: u64, lon: (f64, f64), lat: (f64, f64)) -> Vec<Feature> {
    let mut state = seed;
    let mut next = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 11) as f64 / (1u64 << 53) as f64
    };
    (0..n)
        .map(|i| {
            let x = lon.0 + (lon.1 - lon.0) * next();
            let y = lat.0 + (lat.1 - lat.0) * next();
            Feature::new(i as i64, Point::new(x, y))
        })
        .collect()
}

fn pyramid() -> ClusterPyramid {
    let _ = env_logger::builder().is_test(true).try_init();
    ClusterPyramid::new(ClusterConfig::default()).unwrap()
}

#[test]
fn test_conservation_across_batches() {
    let mut pyramid = pyramid();
    let features = scatter(600, 7, (-20.0, 40.0), (-10.0, 50.0));

    for (i, batch) in features.chunks(75).enumerate() {
        pyramid.grow(batch, i % 2 == 0);
        let added = (i + 1) * 75;
        for zoom in 2..=13 {
            assert_eq!(
                pyramid.total_features_clustered(zoom),
                added,
                "zoom {zoom} after batch {i}"
            );
        }
    }

    // Every leaf has exactly one cluster per level.
    for feature in features.iter().step_by(37) {
        assert_eq!(pyramid.get_clusters(&feature.id).len(), 12);
    }
}

#[test]
fn test_centroid_is_exact() {
    let config = ClusterConfig::default().with_zoom_range(2, 2);
    let mut pyramid: ClusterPyramid = ClusterPyramid::new(config).unwrap();
    pyramid.grow(
        &[
            Feature::new(1, Point::new(0.0, 0.0)),
            Feature::new(2, Point::new(2.0, 0.0)),
        ],
        true,
    );

    let clusters = pyramid.clusters(2);
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].position, Point::new(1.0, 0.0));
    assert_eq!(clusters[0].size, 2);
    assert_eq!(clusters[0].properties["clusterSize"], 2);
}

#[test]
fn test_dissolution_in_any_order() {
    let mut pyramid = pyramid();
    let features = scatter(300, 11, (100.0, 110.0), (-5.0, 5.0));
    pyramid.grow(&features, true);

    let mut reversed = features.clone();
    reversed.reverse();
    for batch in reversed.chunks(40) {
        pyramid.shrink(batch);
    }

    for zoom in 2..=13 {
        let store = pyramid.store(zoom).unwrap();
        assert_eq!(store.all().count(), 0, "zoom {zoom}");
        assert_eq!(store.association_count(), 0, "zoom {zoom}");
    }
}

#[test]
fn test_duplicate_load_changes_nothing() {
    let mut pyramid = pyramid();
    let tile = scatter(200, 3, (0.0, 5.0), (0.0, 5.0));
    pyramid.grow(&tile, true);

    let sizes = |p: &ClusterPyramid| -> Vec<Vec<(u64, usize)>> {
        (2..=13)
            .map(|z| {
                let mut v: Vec<_> = p.clusters(z).iter().map(|c| (c.id.0, c.size)).collect();
                v.sort();
                v
            })
            .collect()
    };
    let before = sizes(&pyramid);

    // An overlapping reload of the same source data.
    let dirty = pyramid.grow(&tile, true);
    assert!(dirty.is_empty());
    assert_eq!(sizes(&pyramid), before);
}

#[test]
fn test_ellipse_not_circle() {
    let anchor = Point::new(10.0, 60.0);
    let ellipse = SearchEllipse::from_pixel_radius(&anchor, 32.0, 256, 10);
    assert!(ellipse.ry < ellipse.rx * 0.6);

    let offset = ellipse.rx * 0.8;
    let config = ClusterConfig::default().with_zoom_range(10, 10);

    let mut along_lon: ClusterPyramid = ClusterPyramid::new(config.clone()).unwrap();
    along_lon.grow(
        &[
            Feature::new(1, anchor),
            Feature::new(2, Point::new(anchor.x() + offset, anchor.y())),
        ],
        true,
    );
    assert_eq!(along_lon.clusters(10).len(), 1);

    let mut along_lat: ClusterPyramid = ClusterPyramid::new(config).unwrap();
    along_lat.grow(
        &[
            Feature::new(1, anchor),
            Feature::new(2, Point::new(anchor.x(), anchor.y() + offset)),
        ],
        true,
    );
    assert_eq!(along_lat.clusters(10).len(), 2);
}

#[test]
fn test_three_point_scenario() {
    let mut pyramid = pyramid();
    pyramid.grow(
        &[
            Feature::new(1, Point::new(10.0, 10.0)),
            Feature::new(2, Point::new(10.0001, 10.0001)),
            Feature::new(3, Point::new(50.0, 50.0)),
        ],
        true,
    );

    let mut sizes: Vec<_> = pyramid.clusters(13).iter().map(|c| c.size).collect();
    sizes.sort();
    assert_eq!(sizes, vec![1, 2]);
    assert_eq!(pyramid.total_features_clustered(2), 3);

    let near = pyramid.get_cluster(&FeatureId::from(1), 13).unwrap();
    let far = pyramid.get_cluster(&FeatureId::from(3), 13).unwrap();
    assert_ne!(near.id, far.id);
    assert_eq!(
        pyramid.get_cluster(&FeatureId::from(2), 13).map(|c| c.id),
        Some(near.id)
    );
}

fn weight(properties: &Properties) -> i64 {
    properties
        .get("sum")
        .or_else(|| properties.get("n"))
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

fn summing_hooks() -> Arc<FnAggregator> {
    Arc::new(FnAggregator::new(
        |leaf| {
            let mut p = Properties::new();
            p.insert("sum".into(), weight(leaf).into());
            p
        },
        |cluster, member, op| {
            let delta = match op {
                AggregateOp::Add => weight(member),
                AggregateOp::Remove => -weight(member),
            };
            let sum = weight(cluster) + delta;
            cluster.insert("sum".into(), sum.into());
        },
    ))
}

#[test]
fn test_hooks_track_sums_on_every_level() {
    let mut pyramid: ClusterPyramid =
        ClusterPyramid::with_hooks(ClusterConfig::default(), summing_hooks()).unwrap();
    let features = vec![
        Feature::new(1, Point::new(10.0, 10.0)).with_property("n", 2),
        Feature::new(2, Point::new(10.0001, 10.0001)).with_property("n", 3),
        Feature::new(3, Point::new(50.0, 50.0)).with_property("n", 5),
    ];
    pyramid.grow(&features, true);

    let level_sum = |p: &ClusterPyramid, zoom| -> i64 {
        p.clusters(zoom).iter().map(|c| weight(&c.properties)).sum()
    };

    let near = pyramid.get_cluster(&FeatureId::from(1), 13).unwrap();
    assert_eq!(near.properties["sum"], 5);
    assert_eq!(near.properties["isCluster"], true);
    for zoom in 2..=13 {
        assert_eq!(level_sum(&pyramid, zoom), 10, "zoom {zoom}");
    }

    pyramid.shrink(&features[..1]);
    let near = pyramid.get_cluster(&FeatureId::from(2), 13).unwrap();
    assert_eq!(near.properties["sum"], 3);
    assert_eq!(near.properties["clusterSize"], 1);
    for zoom in 2..=13 {
        assert_eq!(level_sum(&pyramid, zoom), 8, "zoom {zoom}");
    }
}

#[test]
fn test_moved_feature_keeps_totals() {
    let mut pyramid = pyramid();
    let features = scatter(50, 5, (-1.0, 1.0), (-1.0, 1.0));
    pyramid.grow(&features, true);

    let changes: Vec<_> = features
        .iter()
        .take(10)
        .map(|f| {
            let moved = Feature::new(f.id.clone(), Point::new(f.point.x() + 0.5, f.point.y()));
            (f.clone(), moved)
        })
        .collect();
    pyramid.update(&changes);

    for zoom in 2..=13 {
        assert_eq!(pyramid.total_features_clustered(zoom), 50, "zoom {zoom}");
    }

    // Removing by the new positions still dissolves everything.
    let mut current: Vec<_> = changes.into_iter().map(|(_, moved)| moved).collect();
    current.extend(features.into_iter().skip(10));
    pyramid.shrink(&current);
    for zoom in 2..=13 {
        assert!(pyramid.store(zoom).unwrap().is_empty(), "zoom {zoom}");
    }
}
