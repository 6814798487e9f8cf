//! End-to-end pipeline runs against the synthetic capture device.

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use ebdcap::capture::{DeviceOp, SyntheticCapture};
use ebdcap::{Pipeline, PipelineConfig, PipelineState};

/// Value of every `label: value` line with the given label, in report order.
fn field_values(report: &str, label: &str) -> Vec<String> {
    report
        .lines()
        .filter_map(|line| line.split_once(':'))
        .filter(|(l, _)| l.trim_end() == label)
        .map(|(_, v)| v.trim().to_string())
        .collect()
}

fn frame_counts(report: &str) -> Vec<u32> {
    field_values(report, "frame_count")
        .iter()
        .map(|v| v.parse().expect("frame_count is decimal"))
        .collect()
}

#[test]
fn test_frames_reported_in_capture_order() {
    let mut out = Vec::new();
    let mut pipeline = Pipeline::with_device(SyntheticCapture::new(64, 16));

    let summary = pipeline.run(25, &mut out).expect("pipeline run");

    assert_eq!(summary.captured, 25);
    assert_eq!(summary.consumer.decoded, 25);
    assert!(summary.device_error.is_none());

    let report = String::from_utf8(out).unwrap();
    assert_eq!(frame_counts(&report), (1..=25).collect::<Vec<_>>());
}

#[test]
fn test_device_failure_on_third_acquire() {
    let mut cap = SyntheticCapture::new(64, 16).fail_on_acquire(3);
    let mut out = Vec::new();

    let summary = Pipeline::with_device(&mut cap)
        .run(10, &mut out)
        .expect("pipeline run");

    assert_eq!(summary.captured, 2);
    assert_eq!(summary.consumer.decoded, 2);
    assert_eq!(summary.consumer.decode_failures, 0);
    let err = summary.device_error.expect("device error surfaced");
    assert_eq!(err.op(), DeviceOp::Dequeue);
    assert!(err.to_string().starts_with("dequeue failed"));

    let report = String::from_utf8(out).unwrap();
    assert_eq!(frame_counts(&report), vec![1, 2]);

    // stream stopped once by the producer, then released by the controller
    assert_eq!(cap.acquire_calls, 3);
    assert_eq!(cap.stop_calls, 1);
    assert!(cap.released);
}

#[test]
fn test_start_failure_reports_nothing() {
    let mut out = Vec::new();
    let summary = Pipeline::with_device(SyntheticCapture::new(64, 16).fail_on_start())
        .run(5, &mut out)
        .expect("pipeline run");

    assert_eq!(summary.captured, 0);
    assert_eq!(summary.consumer.processed, 0);
    assert_eq!(summary.device_error.map(|e| e.op()), Some(DeviceOp::Start));
    assert!(out.is_empty());
}

#[test]
fn test_short_frames_are_reported_not_fatal() {
    let mut out = Vec::new();
    let summary = Pipeline::with_device(SyntheticCapture::new(64, 16).with_frame_len(200))
        .run(3, &mut out)
        .expect("pipeline run");

    assert_eq!(summary.captured, 3);
    assert_eq!(summary.consumer.processed, 3);
    assert_eq!(summary.consumer.decode_failures, 3);

    let report = String::from_utf8(out).unwrap();
    assert_eq!(
        report
            .matches("decode error: sample truncated: 200 bytes, need at least 255")
            .count(),
        3
    );
}

#[test]
fn test_custom_sample_len() {
    let config = PipelineConfig {
        frame_count: 1,
        sample_len: 256,
    };
    let mut out = Vec::new();
    let summary = Pipeline::new(SyntheticCapture::new(64, 16), &config)
        .run(config.frame_count, &mut out)
        .expect("pipeline run");
    assert_eq!(summary.consumer.decoded, 1);

    let report = String::from_utf8(out).unwrap();
    assert!(report.contains("===== frame 1 (256 bytes) ====="));
    assert!(report.contains("[0256]"));
    assert!(!report.contains("[0257]"));
}

/// Writer that takes a while per call, like a slow terminal.
struct SlowWriter {
    inner: Vec<u8>,
    delay: Duration,
}

impl Write for SlowWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        thread::sleep(self.delay);
        Ok(())
    }
}

#[test]
fn test_slow_output_loses_nothing() {
    let mut writer = SlowWriter {
        inner: Vec::new(),
        delay: Duration::from_millis(5),
    };
    let summary = Pipeline::with_device(SyntheticCapture::new(64, 16))
        .run(20, &mut writer)
        .expect("pipeline run");

    assert_eq!(summary.captured, 20);
    assert_eq!(summary.consumer.processed, 20);
    let report = String::from_utf8(writer.inner).unwrap();
    assert_eq!(frame_counts(&report), (1..=20).collect::<Vec<_>>());
}

#[test]
fn test_cancel_drains_already_captured_frames() {
    let mut out = Vec::new();
    let mut pipeline = Pipeline::with_device(
        SyntheticCapture::new(64, 16).with_interval(Duration::from_millis(10)),
    );
    let cancel = pipeline.cancel_token();

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(45));
        cancel.cancel();
    });
    let summary = pipeline.run(1_000, &mut out).expect("pipeline run");
    canceller.join().unwrap();

    assert!(summary.cancelled);
    assert!(summary.captured > 0 && summary.captured < 1_000);
    assert_eq!(summary.consumer.processed, summary.captured);
    assert!(summary.device_error.is_none());
    assert_eq!(pipeline.state(), PipelineState::Stopped);

    let report = String::from_utf8(out).unwrap();
    let expected: Vec<u32> = (1..=summary.captured as u32).collect();
    assert_eq!(frame_counts(&report), expected);
}

#[test]
fn test_decoded_values_in_report() {
    let mut out = Vec::new();
    Pipeline::with_device(SyntheticCapture::new(640, 2))
        .run(1, &mut out)
        .expect("pipeline run");

    let report = String::from_utf8(out).unwrap();
    assert_eq!(field_values(&report, "frame_id"), vec!["1"]);
    assert_eq!(field_values(&report, "image_size.horizontal"), vec!["640"]);
    assert_eq!(field_values(&report, "image_size.vertical"), vec!["2"]);
    assert_eq!(
        field_values(&report, "voltage.high"),
        vec!["3.300 V (raw 0x0CE4)"]
    );
    // 0x0551: 35.0625 C
    assert_eq!(
        field_values(&report, "temperature.temp1"),
        vec!["35.06 C (raw 0x0551)"]
    );
}
