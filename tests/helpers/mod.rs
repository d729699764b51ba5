//! Test helpers and fixtures for clave integration tests
//!
//! Every fixture loads the in-process fake CLAP plugin through the same
//! `PluginHost::load_static` path a real binary takes after `dlopen`, so the
//! host talks to the plugin only through the C ABI.
//!
//! ## Fake plugin options
//!
//! The path string selects the fake's behavior, e.g. `fake:synth;presets=3`.
//! See `clave::plugin::testing` for the full table.

#![allow(dead_code)]

pub mod tolerances;

use clave::plugin::testing;
use clave::prelude::*;

/// Default test sample rate (matches common hardware)
pub const TEST_SAMPLE_RATE: f64 = 48000.0;

/// Standard buffer size for deterministic testing
pub const TEST_BUFFER_SIZE: usize = 512;

pub fn test_config() -> HostConfig {
    HostConfig::default()
        .sample_rate(TEST_SAMPLE_RATE)
        .block_size(1, TEST_BUFFER_SIZE as u32)
}

/// Fresh host with the fake plugin loaded and per-thread counters reset.
pub fn load_fake(options: &str) -> PluginHost {
    testing::reset();
    let mut host = PluginHost::with_config(test_config()).expect("valid test config");
    host.load_static(testing::entry(), options)
        .unwrap_or_else(|err| panic!("failed to load {options}: {err}"));
    host
}

/// Render `input` and return the output.
pub fn render(host: &mut PluginHost, input: &[f32]) -> Vec<f32> {
    let mut output = vec![0.0; input.len()];
    host.render(input, &mut output);
    output
}

/// Generate a test signal: sine wave at given frequency for specified samples.
pub fn generate_sine(frequency: f64, sample_rate: f64, num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| {
            let t = i as f64 / sample_rate;
            (2.0 * std::f64::consts::PI * frequency * t).sin() as f32
        })
        .collect()
}

/// Generate silence (zero samples).
pub fn generate_silence(num_samples: usize) -> Vec<f32> {
    vec![0.0; num_samples]
}

/// Calculate peak amplitude of a signal.
pub fn peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .map(|s| s.abs())
        .fold(0.0_f32, |a, b| a.max(b))
}

/// Check if two signals are approximately equal within tolerance.
pub fn signals_approx_equal(a: &[f32], b: &[f32], tolerance: f32) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= tolerance)
}

/// Assert that a signal is approximately silent (all values near zero).
pub fn assert_silence(samples: &[f32], tolerance: f32) {
    let max = peak(samples);
    assert!(
        max <= tolerance,
        "Expected silence, but peak amplitude was {}",
        max
    );
}
