// 该文件是 Detjob （检测作业） 项目的一部分。
// tests/reconcile_cli.rs - 作业对账命令行测试
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

mod common;

use std::process::{Command, Output};

use serde_json::{Value, json};

fn detjob(args: &[&str]) -> Output {
  Command::new(env!("CARGO_BIN_EXE_detjob"))
    .args(args)
    .env_remove("DETJOB_DATASET_ROOT")
    .output()
    .expect("Failed to run detjob")
}

fn stdout_json(output: &Output) -> Value {
  serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

#[test]
fn wrong_argument_count_exits_with_usage() {
  let output = detjob(&[]);
  assert_eq!(output.status.code(), Some(1));
  assert!(!output.stderr.is_empty());
  assert!(output.stdout.is_empty());

  let output = detjob(&["{}", "w.pt", "extra"]);
  assert_eq!(output.status.code(), Some(1));
}

#[test]
fn missing_image_is_reported_in_its_slot() {
  let dir = tempfile::tempdir().unwrap();
  let job = r#"{"images":[{"id":1,"path":"missing.jpg"}],"results":[{"imageId":1,"data":{}}]}"#;

  let root = dir.path().to_str().unwrap();
  let output = detjob(&["--dataset-root", root, job]);
  assert_eq!(output.status.code(), Some(0));

  let out = stdout_json(&output);
  let data = &out["results"][0]["data"];
  assert!(data["error"].as_str().unwrap().contains("missing.jpg"));
  assert_eq!(data["finish"], false);
}

#[test]
fn batch_continues_after_failures_and_preserves_shape() {
  let dir = tempfile::tempdir().unwrap();
  common::write_test_image(&dir.path().join("ok.png"), 4, 4);
  let job = json!({
    "userEmail": "user@example.com",
    "images": [
      {"id": 1, "path": "missing.jpg"},
      {"id": 2, "path": "ok.png", "datasetId": 3}
    ],
    "results": [
      {"imageId": 1, "data": {}},
      {"imageId": 2, "data": {"aiId": 5}},
      {"imageId": 7, "data": {"untouched": true}}
    ]
  });

  let root = dir.path().to_str().unwrap();
  let output = detjob(&["--dataset-root", root, &job.to_string()]);
  assert_eq!(output.status.code(), Some(0));

  let out = stdout_json(&output);
  assert_eq!(out["images"], job["images"]);
  assert_eq!(out["userEmail"], job["userEmail"]);
  assert_eq!(out["results"].as_array().unwrap().len(), 3);

  assert_eq!(out["results"][0]["data"]["finish"], false);
  let ok = &out["results"][1]["data"];
  assert_eq!(ok["error"], Value::Null);
  assert_eq!(ok["finish"], true);
  assert_eq!(ok["aiId"], 5);
  assert_eq!(out["results"][2], job["results"][2]);
}

#[test]
fn unmatched_image_exits_with_reconcile_error_after_output() {
  let dir = tempfile::tempdir().unwrap();
  let job = r#"{"images":[{"id":1,"path":"a.jpg"}],"results":[{"imageId":2,"data":{}}]}"#;
  let root = dir.path().to_str().unwrap();

  let output = detjob(&["--dataset-root", root, job]);
  assert_eq!(output.status.code(), Some(2));
  let out = stdout_json(&output);
  assert_eq!(out["results"][0]["data"], json!({}));

  let output = detjob(&["--dataset-root", root, "--on-unmatched", "drop", job]);
  assert_eq!(output.status.code(), Some(0));

  let output = detjob(&["--dataset-root", root, "--on-unmatched", "insert", job]);
  assert_eq!(output.status.code(), Some(0));
  let out = stdout_json(&output);
  assert_eq!(out["results"][1]["imageId"], 1);
}

#[test]
fn invalid_job_json_fails() {
  let output = detjob(&["not json"]);
  assert!(!output.status.success());
  assert!(output.stdout.is_empty());
}

#[cfg(unix)]
#[test]
fn weights_argument_runs_the_external_detector() {
  let dir = tempfile::tempdir().unwrap();
  let repo = common::stub_yolov5_repo(dir.path(), common::StubKind::Ok);
  let dataset = dir.path().join("dataset");
  std::fs::create_dir_all(&dataset).unwrap();
  common::write_test_image(&dataset.join("cat.png"), 4, 4);

  let job = r#"{"images":[{"id":"c","path":"cat.png"}],"results":[{"imageId":"c","data":{}}]}"#;
  let output = detjob(&[
    "--dataset-root",
    dataset.to_str().unwrap(),
    "--yolov5-repo",
    repo.to_str().unwrap(),
    "--python",
    "sh",
    job,
    "best.pt",
  ]);
  assert_eq!(output.status.code(), Some(0));

  let out = stdout_json(&output);
  let data = &out["results"][0]["data"];
  assert_eq!(data["finish"], true);
  let boxes = data["box"].as_array().unwrap();
  assert_eq!(boxes.len(), 2);
  assert_eq!(boxes[0]["class_id"], 1);
}
