// 该文件是 Duizhao （对照） 项目的一部分。
// tests/process_backend.rs - 以脚本模拟待测程序
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tempfile::TempDir;

use duizhao::backend::{Backend, InferRequest, ProcessBackend, ProcessError};

fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
  let path = dir.path().join(name);
  std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
  let mut permissions = std::fs::metadata(&path).unwrap().permissions();
  permissions.set_mode(0o755);
  std::fs::set_permissions(&path, permissions).unwrap();
  path
}

fn request<'a>(model: &'a Path, image: &'a Path) -> InferRequest<'a> {
  InferRequest {
    model,
    image,
    confidence: 0.25,
  }
}

#[test]
fn parses_record_from_stdout() {
  let dir = tempfile::tempdir().unwrap();
  let program = script(
    &dir,
    "ok.sh",
    r#"echo "loading $1" >&2
cat <<'EOF'
{"version": "V8", "model": "yolov8n", "endToEnd": false, "numClasses": 80,
 "detections": [{"classId": 0, "confidence": 0.91, "x": 0.1, "y": 0.2, "width": 0.3, "height": 0.4}]}
EOF"#,
  );

  let output = ProcessBackend::new(&program)
    .infer(&request(Path::new("m.onnx"), Path::new("bus.jpg")))
    .unwrap();

  assert_eq!(output.version, "V8");
  assert_eq!(output.end_to_end, Some(false));
  assert_eq!(output.num_classes, Some(80));
  assert_eq!(output.detections.len(), 1);
  assert_eq!(output.detections[0].class_id, 0);
}

#[test]
fn passes_arguments_and_offscreen_platform() {
  let dir = tempfile::tempdir().unwrap();
  let program = script(
    &dir,
    "args.sh",
    r#"printf '{"version": "%s|%s|%s|%s", "detections": []}' "$1" "$2" "$3" "$QT_QPA_PLATFORM""#,
  );

  let output = ProcessBackend::new(&program)
    .infer(&request(Path::new("m.onnx"), Path::new("bus.jpg")))
    .unwrap();

  assert_eq!(output.version, "m.onnx|bus.jpg|0.25|offscreen");
  assert!(output.detections.is_empty());
}

#[test]
fn non_zero_exit_reports_code_and_stderr() {
  let dir = tempfile::tempdir().unwrap();
  let program = script(&dir, "fail.sh", "echo 'model not found' >&2\nexit 3");

  let err = ProcessBackend::new(&program)
    .infer(&request(Path::new("m.onnx"), Path::new("bus.jpg")))
    .unwrap_err();

  match err {
    ProcessError::ExitFailure { code, stderr } => {
      assert_eq!(code, Some(3));
      assert_eq!(stderr, "model not found");
    }
    other => panic!("unexpected error: {:?}", other),
  }
}

#[test]
fn garbage_output_is_malformed() {
  let dir = tempfile::tempdir().unwrap();
  let program = script(&dir, "garbage.sh", "echo 'Segmentation fault? no, just text'");

  let err = ProcessBackend::new(&program)
    .infer(&request(Path::new("m.onnx"), Path::new("bus.jpg")))
    .unwrap_err();

  match err {
    ProcessError::MalformedOutput { stdout_head, .. } => {
      assert!(stdout_head.starts_with("Segmentation fault?"));
    }
    other => panic!("unexpected error: {:?}", other),
  }
}

#[test]
fn invalid_detection_is_malformed() {
  let dir = tempfile::tempdir().unwrap();
  let program = script(
    &dir,
    "negative.sh",
    r#"echo '{"version": "V8", "detections": [{"classId": -1, "confidence": 0.5, "x": 0, "y": 0, "width": 0.1, "height": 0.1}]}'"#,
  );

  let err = ProcessBackend::new(&program)
    .infer(&request(Path::new("m.onnx"), Path::new("bus.jpg")))
    .unwrap_err();

  assert!(matches!(err, ProcessError::MalformedOutput { .. }));
}

#[test]
fn slow_program_is_killed_at_deadline() {
  let dir = tempfile::tempdir().unwrap();
  let program = script(&dir, "slow.sh", "exec sleep 5");

  let started = Instant::now();
  let err = ProcessBackend::new(&program)
    .with_timeout(Duration::from_millis(200))
    .infer(&request(Path::new("m.onnx"), Path::new("bus.jpg")))
    .unwrap_err();

  assert!(matches!(err, ProcessError::Timeout(timeout) if timeout == Duration::from_millis(200)));
  assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn background_process_holding_stdout_does_not_extend_deadline() {
  let dir = tempfile::tempdir().unwrap();
  let program = script(
    &dir,
    "background.sh",
    r#"sleep 3 &
echo '{"version": "V8", "detections": []}'
exit 0"#,
  );

  let started = Instant::now();
  let err = ProcessBackend::new(&program)
    .with_timeout(Duration::from_millis(300))
    .infer(&request(Path::new("m.onnx"), Path::new("bus.jpg")))
    .unwrap_err();

  assert!(matches!(err, ProcessError::Timeout(_)));
  assert!(started.elapsed() < Duration::from_secs(2));
}
