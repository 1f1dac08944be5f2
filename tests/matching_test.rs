mod common;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use skyframe::catalog::MatchedCatalog;
use skyframe::constants::ARCSEC_PER_DEG;
use skyframe::matcher::match_lists;

use common::sky_catalog;

#[test]
fn test_matching_is_asymmetric() {
    // Two cat2 sources crowd one cat1 source. Matching cat1 against cat2
    // yields one pair per cat1 row; the reverse direction maps both cat2
    // rows onto the same cat1 row.
    let ra1 = vec![10.0];
    let dec1 = vec![0.0];
    let offset = 0.2 / ARCSEC_PER_DEG;
    let ra2 = vec![10.0 + offset, 10.0 - offset];
    let dec2 = vec![0.0, 0.0];

    let forward = match_lists(&ra1, &dec1, &ra2, &dec2, 1.0 / ARCSEC_PER_DEG);
    assert_eq!(forward.n_good(), 1);

    let backward = match_lists(&ra2, &dec2, &ra1, &dec1, 1.0 / ARCSEC_PER_DEG);
    assert_eq!(backward.n_good(), 2);
    assert_eq!(backward.index, vec![Some(0), Some(0)]);
}

#[test]
fn test_separations_bounded_by_radius() {
    let radius_deg = 0.5 / ARCSEC_PER_DEG;
    let ra1 = vec![10.0, 20.0, 30.0];
    let dec1 = vec![0.0, 5.0, -5.0];
    // Neighbours at 0.2", 0.4" and 3" - the last is out of range.
    let ra2 = vec![
        10.0 + 0.2 / ARCSEC_PER_DEG,
        20.0 + 0.4 / ARCSEC_PER_DEG / (5f64.to_radians().cos()),
        30.0 + 3.0 / ARCSEC_PER_DEG,
    ];
    let dec2 = vec![0.0, 5.0, -5.0];

    let result = match_lists(&ra1, &dec1, &ra2, &dec2, radius_deg);
    assert_eq!(result.index[0], Some(0));
    assert_eq!(result.index[1], Some(1));
    assert_eq!(result.index[2], None);
    for (sep, idx) in result.separation.iter().zip(&result.index) {
        match idx {
            Some(_) => assert!(*sep <= radius_deg),
            None => assert!(sep.is_nan()),
        }
    }
}

#[test]
fn test_empty_inputs() {
    let empty: Vec<f64> = Vec::new();
    let result = match_lists(&empty, &empty, &[10.0], &[0.0], 1.0);
    assert!(result.is_empty());

    let result = match_lists(&[10.0], &[0.0], &empty, &empty, 1.0);
    assert_eq!(result.len(), 1);
    assert_eq!(result.index, vec![None]);
}

#[test]
fn test_match_state_is_stable_across_calls() {
    let cat1 = sky_catalog("one", vec![1, 2], &[10.0, 10.1], &[0.0, 0.0]);
    let cat2 = sky_catalog("two", vec![7, 8], &[10.0, 10.1], &[0.0, 0.0]);
    let matched = MatchedCatalog::new(cat1, cat2);

    let (ids1_a, ids2_a) = matched.match_inds().unwrap();
    let (ids1_a, ids2_a) = (ids1_a.to_vec(), ids2_a.to_vec());
    let (ids1_b, ids2_b) = matched.match_inds().unwrap();
    assert_eq!(ids1_a, ids1_b);
    assert_eq!(ids2_a, ids2_b);
}

#[test]
fn test_thousand_sources_with_gaussian_noise() {
    let n = 1000;
    let mut rng = StdRng::seed_from_u64(20260826);
    let noise = Normal::new(0.0, 0.1 / ARCSEC_PER_DEG).unwrap();

    let ra1: Vec<f64> = (0..n).map(|_| 10.0 + rng.random_range(0.0..1.0)).collect();
    let dec1: Vec<f64> = (0..n).map(|_| rng.random_range(-0.5..0.5)).collect();
    let ra2: Vec<f64> = ra1.iter().map(|x| x + noise.sample(&mut rng)).collect();
    let dec2: Vec<f64> = dec1.iter().map(|x| x + noise.sample(&mut rng)).collect();

    let ids1: Vec<u64> = (0..n as u64).collect();
    let ids2: Vec<u64> = (1000..1000 + n as u64).collect();
    let cat1 = sky_catalog("coadd", ids1, &ra1, &dec1);
    let cat2 = sky_catalog("visit", ids2, &ra2, &dec2);

    let matched = MatchedCatalog::with_radius(cat1, cat2, 0.5);
    let state = matched.match_state().unwrap();

    // Every source has its own noisy counterpart well inside 0.5".
    assert_eq!(state.ids1.len(), n);
    assert!(state.bad_ids.is_empty());
    // Each pair must be source i against its own counterpart.
    for (id1, id2) in state.ids1.iter().zip(&state.ids2) {
        assert_eq!(id2 - 1000, *id1);
    }
    let distances = state.distance.values.as_float().unwrap();
    assert!(distances.iter().all(|d| *d < 0.5));
    // Offsets are Rayleigh-distributed with sigma 0.1"; nearly all sit
    // below 0.45".
    let typical = distances.iter().filter(|d| **d < 0.45).count();
    assert!(typical >= n - 5);
}
