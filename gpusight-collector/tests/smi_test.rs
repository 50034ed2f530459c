//! End-to-end tests of the GPU collector over a scripted `nvidia-smi`.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use gpusight_collector::{
    BackendError, BackendKind, Collector, CollectorError, CollectorRegistry, CollectorSelection,
    CollectorSettings, GpuConfig,
};
use gpusight_common::Sample;
use tempfile::TempDir;

const HEADER: &str = "name, index, uuid, fan.speed [%], temperature.gpu, clocks.current.graphics [MHz], clocks.current.sm [MHz], clocks.current.memory [MHz], power.draw [W], utilization.gpu [%], utilization.memory [%], memory.total [MiB], memory.free [MiB], memory.used [MiB]";

/// Write an executable script printing `output` and exiting with `status`.
fn fake_smi(dir: &Path, output: &str, status: i32) -> PathBuf {
    let path = dir.join("nvidia-smi");
    let script = format!("#!/bin/sh\ncat <<'EOF'\n{}\nEOF\nexit {}\n", output, status);

    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn settings(command: &Path) -> CollectorSettings {
    CollectorSettings {
        namespace: "node".to_string(),
        gpu: GpuConfig {
            backend: BackendKind::NvidiaSmi,
            smi_command: command.display().to_string(),
        },
    }
}

fn gpu_collector(command: &Path) -> std::sync::Arc<dyn Collector> {
    let selection = CollectorSelection {
        enabled: vec!["gpu".to_string()],
        ..Default::default()
    };
    let mut collectors = CollectorRegistry::builtin()
        .unwrap()
        .build(&selection, &settings(command))
        .unwrap();

    assert_eq!(collectors.len(), 1);
    collectors.remove(0)
}

fn value(samples: &[Sample], name: &str, minor: Option<&str>) -> Option<f64> {
    samples
        .iter()
        .find(|s| s.desc().fq_name() == name && s.label("minor_number") == minor)
        .map(Sample::value)
}

#[test]
fn test_scrape_two_devices() {
    let dir = TempDir::new().unwrap();
    let output = format!(
        "{}\n{}\n{}",
        HEADER,
        "Tesla V100, 0, GPU-aaaa, 40, 65, 1380, 1380, 877, 250.5, 99, 60, 16384, 8192, 8192",
        "Tesla V100, 1, GPU-bbbb, [N/A], 38, 135, 135, 877, 42.00, 0, 0, 16384, 16384, 0",
    );
    let collector = gpu_collector(&fake_smi(dir.path(), &output, 0));

    let mut samples = Vec::new();
    collector.update(&mut samples).unwrap();

    assert_eq!(value(&samples, "node_gpu_num_devices", None), Some(2.0));
    assert_eq!(
        value(&samples, "node_gpu_memory_used_bytes", Some("0")),
        Some(8192.0 * 1024.0 * 1024.0)
    );
    assert_eq!(
        value(&samples, "node_gpu_power_usage_milliwatts", Some("0")),
        Some(250_500.0)
    );
    assert_eq!(value(&samples, "node_gpu_duty_cycle", Some("0")), Some(99.0));
    assert_eq!(value(&samples, "node_gpu_temperature_celsius", Some("1")), Some(38.0));

    // Device 1 reports no fan; every other reading is present.
    assert_eq!(value(&samples, "node_gpu_fanspeed_percent", Some("1")), None);
    assert_eq!(samples.len(), 1 + 6 + 5);
}

#[test]
fn test_device_with_empty_uuid_skipped() {
    let dir = TempDir::new().unwrap();
    let output = format!(
        "{}\n{}\n{}",
        HEADER,
        "Tesla V100, 0, , 40, 65, 1380, 1380, 877, 250.5, 99, 60, 16384, 8192, 8192",
        "Tesla V100, 1, GPU-bbbb, 20, 38, 135, 135, 877, 42.00, 0, 0, 16384, 16384, 0",
    );
    let collector = gpu_collector(&fake_smi(dir.path(), &output, 0));

    let mut samples = Vec::new();
    collector.update(&mut samples).unwrap();

    assert_eq!(value(&samples, "node_gpu_num_devices", None), Some(2.0));
    assert_eq!(value(&samples, "node_gpu_temperature_celsius", Some("0")), None);
    assert_eq!(value(&samples, "node_gpu_temperature_celsius", Some("1")), Some(38.0));
    assert_eq!(samples.len(), 1 + 6);
}

#[test]
fn test_non_utf8_name_skips_only_that_device() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nvidia-smi");
    let script = format!(
        "#!/bin/sh\ncat <<'EOF'\n{}\n{}\nEOF\nprintf '{}\\n'\n",
        HEADER,
        "Tesla V100, 0, GPU-aaaa, 40, 65, 1380, 1380, 877, 250.5, 99, 60, 16384, 8192, 8192",
        "Tesla \\377, 1, GPU-bbbb, 20, 38, 135, 135, 877, 42.00, 0, 0, 16384, 16384, 0",
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    let collector = gpu_collector(&path);

    let mut samples = Vec::new();
    collector.update(&mut samples).unwrap();

    assert_eq!(value(&samples, "node_gpu_num_devices", None), Some(2.0));
    assert_eq!(value(&samples, "node_gpu_duty_cycle", Some("0")), Some(99.0));
    assert_eq!(value(&samples, "node_gpu_temperature_celsius", Some("1")), None);
    assert_eq!(samples.len(), 1 + 6);
}

#[test]
fn test_missing_column_fails_scrape() {
    let dir = TempDir::new().unwrap();
    let output = "name, index, uuid\nTesla V100, 0, GPU-aaaa";
    let collector = gpu_collector(&fake_smi(dir.path(), output, 0));

    let mut samples = Vec::new();
    let result = collector.update(&mut samples);

    assert!(matches!(
        result,
        Err(CollectorError::Backend(BackendError::MissingColumn(_)))
    ));
    assert_eq!(samples.len(), 1);
    assert_eq!(value(&samples, "node_gpu_num_devices", None), Some(0.0));
}

#[test]
fn test_command_failure_fails_scrape() {
    let dir = TempDir::new().unwrap();
    let collector = gpu_collector(&fake_smi(dir.path(), "NVIDIA-SMI has failed", 9));

    let mut samples = Vec::new();
    let result = collector.update(&mut samples);

    assert!(matches!(
        result,
        Err(CollectorError::Backend(BackendError::CommandFailed { .. }))
    ));
    assert_eq!(value(&samples, "node_gpu_num_devices", None), Some(0.0));
}

#[test]
fn test_gpu_not_built_unless_enabled() {
    let dir = TempDir::new().unwrap();
    let command = fake_smi(dir.path(), "", 0);

    let collectors = CollectorRegistry::builtin()
        .unwrap()
        .build(&CollectorSelection::default(), &settings(&command))
        .unwrap();

    assert!(collectors.is_empty());
}
