//! End-to-end fluence reconstruction tests.
//!
//! These tests verify:
//! - charge conservation over a full synthetic scan
//! - idempotence and equivalence of the lookup strategies
//! - parallel reconstruction against the sequential result
//! - a live scan on simulated axes with a sampler thread
//!
//! Run with: `cargo test --test reconstruction_integration`

use std::time::Duration;

use tempfile::TempDir;

use irradscan::fluence::{
    reconstruct, reconstruct_parallel, reconstruct_with, BeamSample, BeamSampleStream,
    DirectionPolicy, FluenceError, FluenceReconstructor, KernelParams, LookupStrategy,
    ReconstructionConfig, TrapezoidProfile, DEFAULT_SCAN_ACCEL,
};
use irradscan::sampler::{ConstantCurrent, SamplerHandle};
use irradscan::scan::{RowEvent, ScanArea, ScanController, ScanRecord};
use irradscan::stage::{Position, SimulatedAxis, XyStage};
use irradscan::units::ELEMENTARY_CHARGE;

const CURRENT: f64 = 1e-9;
const T0: f64 = 1_700_000_000.0;

// ============================================================================
// Helper Functions
// ============================================================================

/// 10 mm × 10 mm at 10 mm/s with 1 mm pitch.
fn area() -> ScanArea {
    ScanArea::from_relative(
        Position::default(),
        Position::default(),
        Position::new(10.0, 10.0),
        10.0,
        1.0,
    )
    .unwrap()
}

fn row_time() -> f64 {
    TrapezoidProfile::new(10.0, 10.0, DEFAULT_SCAN_ACCEL)
        .unwrap()
        .total_time()
}

/// One serpentine sweep; every row takes exactly its kinematic time plus
/// `overhead` at each end, separated by `gap` seconds.
fn rows(overhead: f64, gap: f64) -> Vec<RowEvent> {
    let duration = row_time() + 2.0 * overhead;
    let mut start = T0;
    let mut rows = Vec::with_capacity(10);
    for i in 0..10 {
        let stop = start + duration;
        let (x_start, x_stop) = if i % 2 == 0 { (0.0, 10.0) } else { (10.0, 0.0) };
        rows.push(RowEvent {
            row_index: i,
            sweep_index: Some(0),
            start_timestamp: start,
            stop_timestamp: stop,
            x_start,
            x_stop,
            y_start: i as f64,
            scan_speed: 10.0,
        });
        start = stop + gap;
    }
    rows
}

/// Constant current sampled at `rate_hz` around the scan.
fn beam(rate_hz: f64) -> BeamSampleStream {
    let n = (20.0 * rate_hz) as usize;
    BeamSampleStream::from_samples(
        (0..n)
            .map(|i| BeamSample::new(T0 - 1.0 + i as f64 / rate_hz, CURRENT))
            .collect(),
    )
    .unwrap()
}

fn kernel() -> KernelParams {
    KernelParams::from_sigma(2.0, 1.5).unwrap()
}

fn config() -> ReconstructionConfig {
    ReconstructionConfig::default()
        .with_bins(50, 50)
        .with_kernel(kernel())
}

fn assert_rel_close(actual: f64, expected: f64, tolerance: f64) {
    let error = (actual - expected).abs() / expected.abs();
    assert!(
        error <= tolerance,
        "{actual} differs from {expected} by {:.3}%",
        error * 100.0
    );
}

// ============================================================================
// Integration Tests
// ============================================================================

#[test]
fn test_ten_second_scan_conserves_charge() {
    let map = reconstruct(&rows(0.0, 0.0), &beam(100.0), &area(), kernel(), (50, 50)).unwrap();

    let expected = CURRENT * 10.0 / ELEMENTARY_CHARGE;
    assert_rel_close(map.deposited_particles, expected, 0.05);
    assert_rel_close(map.deposited_particles, CURRENT * 10.0 * row_time() / ELEMENTARY_CHARGE, 1e-9);

    // Part of each spot falls outside the map near the edges
    let held = map.total_particles();
    assert!(held < map.deposited_particles);
    assert!(held > 0.5 * map.deposited_particles);

    assert_eq!(map.bins(), (50, 50));
    assert!(map.values[[25, 25]] > map.values[[0, 0]]);
    assert!(map.values[[25, 25]] > map.values[[25, 0]]);
}

#[test]
fn test_wait_phase_adds_gap_charge() {
    let overhead = 0.05;
    let gap = 0.5;
    let rows = rows(overhead, gap);
    let beam = beam(1000.0);

    let mut reconstructor = FluenceReconstructor::new(&area(), config()).unwrap();
    let mut total = 0.0;
    let mut waits = 0.0;
    for row in &rows {
        let deposit = reconstructor.process_row(row, &beam).unwrap();
        assert_rel_close(deposit.overhead, overhead, 1e-6);
        total += deposit.particles();
        waits += deposit.wait_particles;
    }
    let map = reconstructor.finish();
    assert_rel_close(map.deposited_particles, total, 1e-12);

    // The wait window spans from the previous stop to this start, at most
    // one sample interval short at each end
    let per_gap = CURRENT * gap / ELEMENTARY_CHARGE;
    assert!(waits <= 9.0 * per_gap * 1.0001);
    assert!(waits >= 9.0 * CURRENT * (gap - 0.002) / ELEMENTARY_CHARGE);
}

#[test]
fn test_reconstruction_is_idempotent() {
    let rows = rows(0.02, 0.1);
    let beam = beam(100.0);
    let first = reconstruct_with(&rows, &beam, &area(), &config()).unwrap();
    let second = reconstruct_with(&rows, &beam, &area(), &config()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_lookup_strategies_agree() {
    let rows = rows(0.02, 0.1);
    let beam = beam(250.0);
    let cursor = reconstruct_with(
        &rows,
        &beam,
        &area(),
        &config().with_lookup(LookupStrategy::Cursor),
    )
    .unwrap();
    let search = reconstruct_with(
        &rows,
        &beam,
        &area(),
        &config().with_lookup(LookupStrategy::BinarySearch),
    )
    .unwrap();
    assert_eq!(cursor, search);
}

#[test]
fn test_parallel_matches_sequential() {
    let rows = rows(0.02, 0.1);
    let beam = beam(100.0);
    let sequential = reconstruct_with(&rows, &beam, &area(), &config()).unwrap();
    let parallel = reconstruct_parallel(&rows, &beam, &area(), &config()).unwrap();

    assert_rel_close(
        parallel.deposited_particles,
        sequential.deposited_particles,
        1e-12,
    );
    let peak = sequential.max();
    for (a, b) in sequential.values.iter().zip(parallel.values.iter()) {
        assert!((a - b).abs() <= peak * 1e-12);
    }
}

#[test]
fn test_direction_policies_agree_on_serpentine_rows() {
    let rows = rows(0.02, 0.1);
    let beam = beam(100.0);
    let recorded = reconstruct_with(&rows, &beam, &area(), &config()).unwrap();
    let parity = reconstruct_with(
        &rows,
        &beam,
        &area(),
        &config().with_direction(DirectionPolicy::RowParity),
    )
    .unwrap();
    assert_eq!(recorded, parity);
}

#[test]
fn test_out_of_order_rows_are_rejected() {
    let mut rows = rows(0.0, 0.0);
    rows.swap(3, 4);
    for result in [
        reconstruct_with(&rows, &beam(100.0), &area(), &config()),
        reconstruct_parallel(&rows, &beam(100.0), &area(), &config()),
    ] {
        assert!(matches!(
            result,
            Err(FluenceError::StreamOrderingViolation(_))
        ));
    }
}

#[test]
fn test_record_round_trip_reconstructs() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");
    let record = ScanRecord::new(area(), rows(0.02, 0.1), beam(100.0));
    record.save(&path).unwrap();

    let loaded = ScanRecord::load(&path).unwrap();
    let original = reconstruct_with(&record.rows, &record.beam, &record.area, &config()).unwrap();
    let restored = reconstruct_with(&loaded.rows, &loaded.beam, &loaded.area, &config()).unwrap();
    assert_rel_close(
        restored.deposited_particles,
        original.deposited_particles,
        1e-9,
    );
}

#[test]
fn test_live_scan_with_sampler() {
    let stage = XyStage::new(
        Box::new(SimulatedAxis::new("x").with_time_scale(1.0)),
        Box::new(SimulatedAxis::new("y").with_time_scale(1.0)),
    );
    let controller = ScanController::new(stage);
    let area = controller
        .prepare(Position::new(0.0, 0.0), Position::new(2.0, 2.0), 20.0, 1.0)
        .unwrap();

    let sampler = SamplerHandle::spawn(Box::new(ConstantCurrent::new(CURRENT)), 500.0, None).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    controller.start().unwrap();
    controller.finish();
    let report = controller.join().unwrap().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    let beam = sampler.snapshot();
    sampler.stop();

    assert_eq!(report.rows.len(), area.n_rows());
    let map = reconstruct_with(
        &report.rows,
        &beam,
        &area,
        &ReconstructionConfig::default().with_bins(20, 20),
    )
    .unwrap();

    let first = report.rows[0].start_timestamp;
    let last = report.rows[report.rows.len() - 1].stop_timestamp;
    let expected = CURRENT * (last - first) / ELEMENTARY_CHARGE;
    assert!(map.deposited_particles > 0.5 * expected);
    assert!(map.deposited_particles < 1.5 * expected);
}
