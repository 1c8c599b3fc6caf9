// 该文件是 Detjob （检测作业） 项目的一部分。
// src/job.rs - 作业描述与结果对账
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

//! 作业对账
//!
//! 作业是一个 JSON 文档，包含图像列表 `images` 与结果槽列表 `results`。
//! 每张图像推理后得到一个 [`DetectionOutcome`]，按 `id == imageId`
//! 浅合并进对应结果槽的 `data`。单张图像的失败只写入它自己的结果，
//! 不会中断整个作业。

use std::{fmt::Display, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  bbox::BoundingBox,
  model::{DetectResult, Model},
};

/// 作业中的一张图像，`path` 相对于数据集根目录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEntry {
  pub id: Value,
  pub path: String,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// 结果槽，按 `imageId` 对应一张图像
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSlot {
  #[serde(rename = "imageId")]
  pub image_id: Value,
  /// 缺省时保持缺省，直到有结果合并进来
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<Map<String, Value>>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// 作业文档；未知的顶层字段原样保留
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
  pub images: Vec<ImageEntry>,
  pub results: Vec<ResultSlot>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl ResultSlot {
  /// 取得 `data`，不存在时创建空对象
  pub fn data_mut(&mut self) -> &mut Map<String, Value> {
    self.data.get_or_insert_with(Map::new)
  }
}

impl FromStr for Job {
  type Err = serde_json::Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    serde_json::from_str(s)
  }
}

impl Job {
  pub fn to_json(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string(self)
  }
}

/// 单张图像的推理结果，创建后合并进结果槽，不再修改
///
/// `start` 表示处理中，写入结果槽时处理已经结束，因此总为 `false`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionOutcome {
  pub error: Option<String>,
  pub start: bool,
  pub finish: bool,
  #[serde(rename = "box")]
  pub boxes: Vec<BoundingBox>,
}

impl DetectionOutcome {
  pub fn success(result: DetectResult) -> Self {
    DetectionOutcome {
      error: None,
      start: false,
      finish: true,
      boxes: result.into_vec(),
    }
  }

  pub fn failure(message: impl Into<String>) -> Self {
    DetectionOutcome {
      error: Some(message.into()),
      start: false,
      finish: false,
      boxes: Vec::new(),
    }
  }

  pub fn is_success(&self) -> bool {
    self.error.is_none()
  }

  /// 浅合并：同名键被覆盖，其余键保留
  pub fn merge_into(&self, data: &mut Map<String, Value>) -> Result<(), serde_json::Error> {
    if let Value::Object(fields) = serde_json::to_value(self)? {
      data.extend(fields);
    }
    Ok(())
  }
}

/// 图像找不到唯一结果槽时的处理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum UnmatchedPolicy {
  /// 丢弃结果，仅记录警告
  Drop,
  /// 追加一个新的结果槽
  Insert,
  /// 记入报告，由调用者判定为对账错误
  #[default]
  Error,
}

#[derive(Error, Debug, PartialEq)]
pub enum ReconcileError {
  #[error("以下图像没有对应的结果槽: {}", join_ids(.0))]
  Unmatched(Vec<Value>),
  #[error("以下图像对应多个结果槽: {}", join_ids(.0))]
  Ambiguous(Vec<Value>),
}

fn join_ids(ids: &[Value]) -> String {
  ids
    .iter()
    .map(Value::to_string)
    .collect::<Vec<_>>()
    .join(", ")
}

/// 对账统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
  pub processed: usize,
  pub failed: usize,
  pub inserted: usize,
  pub unmatched: Vec<Value>,
  pub ambiguous: Vec<Value>,
}

impl ReconcileReport {
  /// 每张图像都恰好对应一个结果槽时返回 Ok
  pub fn ensure_consistent(&self) -> Result<(), ReconcileError> {
    if !self.unmatched.is_empty() {
      return Err(ReconcileError::Unmatched(self.unmatched.clone()));
    }
    if !self.ambiguous.is_empty() {
      return Err(ReconcileError::Ambiguous(self.ambiguous.clone()));
    }
    Ok(())
  }
}

/// 对一张图像运行模型；文件不存在或模型出错都转换为失败结果
pub fn detect_image<M>(model: &M, path: &Path) -> DetectionOutcome
where
  M: Model<Path, Output = DetectResult> + ?Sized,
  M::Error: Display,
{
  if !path.exists() {
    warn!("图像不存在: {}", path.display());
    return DetectionOutcome::failure(format!("Image not found: {}", path.display()));
  }

  match model.infer(path) {
    Ok(result) => {
      debug!("{}: 检测到 {} 个物体", path.display(), result.len());
      DetectionOutcome::success(result)
    }
    Err(e) => {
      warn!("图像推理失败 {}: {}", path.display(), e);
      DetectionOutcome::failure(e.to_string())
    }
  }
}

/// 判断两个图像标识是否相同；数字按数值比较，`1` 与 `1.0` 相同
pub fn ids_match(a: &Value, b: &Value) -> bool {
  match (a, b) {
    (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
      (Some(x), Some(y)) => x == y,
      _ => x == y,
    },
    _ => a == b,
  }
}

/// 将一张图像的结果合并进作业
fn merge_outcome(
  job: &mut Job,
  image_id: &Value,
  outcome: &DetectionOutcome,
  policy: UnmatchedPolicy,
  report: &mut ReconcileReport,
) -> Result<(), serde_json::Error> {
  let matched: Vec<usize> = job
    .results
    .iter()
    .enumerate()
    .filter(|(_, slot)| ids_match(&slot.image_id, image_id))
    .map(|(idx, _)| idx)
    .collect();

  match (matched.len(), policy) {
    (0, UnmatchedPolicy::Drop) => {
      warn!("图像 {} 没有对应的结果槽, 结果已丢弃", image_id);
    }
    (0, UnmatchedPolicy::Insert) => {
      warn!("图像 {} 没有对应的结果槽, 追加新结果槽", image_id);
      let mut data = Map::new();
      outcome.merge_into(&mut data)?;
      job.results.push(ResultSlot {
        image_id: image_id.clone(),
        data: Some(data),
        extra: Map::new(),
      });
      report.inserted += 1;
    }
    (0, UnmatchedPolicy::Error) => {
      warn!("图像 {} 没有对应的结果槽", image_id);
      report.unmatched.push(image_id.clone());
    }
    (n, policy) => {
      if n > 1 {
        warn!("图像 {} 对应 {} 个结果槽", image_id, n);
        if policy == UnmatchedPolicy::Error {
          report.ambiguous.push(image_id.clone());
        }
      }
      for idx in matched {
        outcome.merge_into(job.results[idx].data_mut())?;
      }
    }
  }
  Ok(())
}

/// 对作业中的每张图像推理，并把结果合并进对应的结果槽
///
/// 图像路径为 `dataset_root.join(path)`。单张图像失败不会中断对账；
/// 未匹配的图像按 `policy` 处理，`Error` 策略下由
/// [`ReconcileReport::ensure_consistent`] 报告。
pub fn reconcile<M>(
  job: &mut Job,
  model: &M,
  dataset_root: &Path,
  policy: UnmatchedPolicy,
) -> Result<ReconcileReport, serde_json::Error>
where
  M: Model<Path, Output = DetectResult> + ?Sized,
  M::Error: Display,
{
  info!(
    "开始对账: {} 张图像, {} 个结果槽",
    job.images.len(),
    job.results.len()
  );
  let mut report = ReconcileReport::default();

  // 先取出图像标识，避免合并时借用冲突
  let images: Vec<(Value, String)> = job
    .images
    .iter()
    .map(|image| (image.id.clone(), image.path.clone()))
    .collect();

  for (image_id, image_path) in images {
    let path = dataset_root.join(&image_path);
    let outcome = detect_image(model, &path);
    report.processed += 1;
    if !outcome.is_success() {
      report.failed += 1;
    }
    merge_outcome(job, &image_id, &outcome, policy, &mut report)?;
  }

  info!(
    "对账完成: 处理 {} 张, 失败 {} 张, 未匹配 {} 张",
    report.processed,
    report.failed,
    report.unmatched.len()
  );
  Ok(report)
}
