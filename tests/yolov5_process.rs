// 该文件是 Detjob （检测作业） 项目的一部分。
// tests/yolov5_process.rs - YOLOv5 外部进程测试
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

mod common;

use detjob::{
  job::{UnmatchedPolicy, reconcile},
  model::{Model, Yolov5Builder, Yolov5Error},
};
use serde_json::json;

use common::{StubKind, stub_yolov5_repo, write_test_image};

#[test]
fn parses_result_file_of_successful_run() {
  let dir = tempfile::tempdir().unwrap();
  let repo = stub_yolov5_repo(dir.path(), StubKind::Ok);
  let image = dir.path().join("street.scene.png");
  write_test_image(&image, 8, 8);

  let process = Yolov5Builder::new("best.pt").repo(&repo).python("sh").build();
  let run = process.run(&image).unwrap();

  assert_eq!(run.result.len(), 2);
  let first = run.result.items[0];
  assert_eq!(first.class_id, 1);
  assert_eq!(first.x_center, 0.5);
  assert_eq!(first.y_center, 0.5);
  assert_eq!(first.width, 0.2);
  assert_eq!(first.height, 0.2);
  assert_eq!(first.confidence, 0.9);
  assert!(run.annotated_image.is_file());
  assert!(run.run_dir.starts_with(repo.join("runs").join("detect")));
}

#[test]
fn consecutive_runs_use_separate_directories() {
  let dir = tempfile::tempdir().unwrap();
  let repo = stub_yolov5_repo(dir.path(), StubKind::Ok);
  let image = dir.path().join("a.png");
  write_test_image(&image, 8, 8);

  let process = Yolov5Builder::new("best.pt").repo(&repo).python("sh").build();
  let first = process.run(&image).unwrap();
  let second = process.run(&image).unwrap();
  assert_ne!(first.run_dir, second.run_dir);
}

#[test]
fn infer_removes_run_directory_unless_kept() {
  let dir = tempfile::tempdir().unwrap();
  let repo = stub_yolov5_repo(dir.path(), StubKind::Ok);
  let image = dir.path().join("a.png");
  write_test_image(&image, 8, 8);
  let runs = dir.path().join("runs");

  let process = Yolov5Builder::new("best.pt")
    .repo(&repo)
    .python("sh")
    .runs_dir(&runs)
    .build();
  assert_eq!(process.infer(image.as_path()).unwrap().len(), 2);
  assert_eq!(std::fs::read_dir(&runs).unwrap().count(), 0);

  let kept = Yolov5Builder::new("best.pt")
    .repo(&repo)
    .python("sh")
    .runs_dir(&runs)
    .keep_runs(true)
    .build();
  kept.infer(image.as_path()).unwrap();
  assert_eq!(std::fs::read_dir(&runs).unwrap().count(), 1);
}

#[test]
fn run_directory_can_be_removed_by_caller() {
  let dir = tempfile::tempdir().unwrap();
  let repo = stub_yolov5_repo(dir.path(), StubKind::Ok);
  let image = dir.path().join("a.png");
  write_test_image(&image, 8, 8);

  let process = Yolov5Builder::new("best.pt").repo(&repo).python("sh").build();
  let run = process.run(&image).unwrap();
  assert!(run.run_dir.is_dir());
  run.remove().unwrap();
  assert!(!run.run_dir.exists());
  // 重复删除不报错
  run.remove().unwrap();
}

#[test]
fn nonzero_exit_carries_stderr() {
  let dir = tempfile::tempdir().unwrap();
  let repo = stub_yolov5_repo(dir.path(), StubKind::Fail);
  let image = dir.path().join("a.png");
  write_test_image(&image, 8, 8);

  let process = Yolov5Builder::new("best.pt").repo(&repo).python("sh").build();
  match process.infer(image.as_path()) {
    Err(Yolov5Error::ExitError { code, stderr }) => {
      assert_eq!(code, Some(3));
      assert!(stderr.contains("CUDA out of memory"));
    }
    other => panic!("unexpected result: {:?}", other),
  }
}

#[test]
fn missing_result_file_is_an_error() {
  let dir = tempfile::tempdir().unwrap();
  let repo = stub_yolov5_repo(dir.path(), StubKind::Silent);
  let image = dir.path().join("a.png");
  write_test_image(&image, 8, 8);

  let process = Yolov5Builder::new("best.pt").repo(&repo).python("sh").build();
  assert!(matches!(
    process.infer(image.as_path()),
    Err(Yolov5Error::MissingResult(path)) if path.ends_with("labels/a.txt")
  ));
}

#[test]
fn detector_errors_become_outcome_errors() {
  let dir = tempfile::tempdir().unwrap();
  let repo = stub_yolov5_repo(dir.path(), StubKind::Fail);
  write_test_image(&dir.path().join("a.png"), 8, 8);

  let mut job = serde_json::from_value(json!({
    "images": [{"id": 1, "path": "a.png"}, {"id": 2, "path": "b.png"}],
    "results": [{"imageId": 1, "data": {}}, {"imageId": 2, "data": {}}]
  }))
  .unwrap();
  let process = Yolov5Builder::new("best.pt").repo(&repo).python("sh").build();
  let report = reconcile(&mut job, &process, dir.path(), UnmatchedPolicy::Error).unwrap();

  assert_eq!(report.processed, 2);
  assert_eq!(report.failed, 2);
  let first = job.results[0].data.as_ref().unwrap();
  assert!(first["error"].as_str().unwrap().contains("CUDA out of memory"));
  assert_eq!(first["finish"], false);
  let second = job.results[1].data.as_ref().unwrap();
  assert!(second["error"].as_str().unwrap().contains("b.png"));
}
