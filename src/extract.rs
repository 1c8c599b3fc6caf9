// 该文件是 Detjob （检测作业） 项目的一部分。
// src/extract.rs - 批量检测并保存标注图像
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

use std::{
  fmt::Display,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
  draw::Draw,
  frame::ImageFrame,
  label::LabelTable,
  model::{DetectResult, Model},
};

/// 默认绘制阈值，置信度需严格大于该值
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.3;

#[derive(Error, Debug)]
pub enum ExtractError {
  #[error("无法读取输入目录 {}: {source}", path.display())]
  InputDir {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("无法创建输出目录 {}: {source}", path.display())]
  OutputDir {
    path: PathBuf,
    source: std::io::Error,
  },
}

/// 单张图像的失败原因
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractFailure {
  pub path: PathBuf,
  pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractReport {
  /// 成功写出的标注图像
  pub written: Vec<PathBuf>,
  pub failed: Vec<ExtractFailure>,
  /// 绘制的检测框总数
  pub drawn: usize,
}

/// 借用一个检测模型，对目录中的全部图像推理并输出标注后的副本
pub struct Extractor<'a, M: ?Sized> {
  model: &'a M,
  labels: &'a LabelTable,
  draw: Draw,
  threshold: f32,
}

impl<'a, M> Extractor<'a, M>
where
  M: Model<ImageFrame, Output = DetectResult> + ?Sized,
  M::Error: Display,
{
  pub fn new(model: &'a M, labels: &'a LabelTable, draw: Draw) -> Self {
    Self {
      model,
      labels,
      draw,
      threshold: DEFAULT_SCORE_THRESHOLD,
    }
  }

  pub fn with_threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  fn list_images(input_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let input_err = |source| ExtractError::InputDir {
      path: input_dir.to_path_buf(),
      source,
    };
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(input_dir).map_err(input_err)? {
      let path = entry.map_err(input_err)?.path();
      if path.is_file() {
        paths.push(path);
      }
    }
    paths.sort();
    Ok(paths)
  }

  pub fn extract(
    &self,
    input_dir: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
  ) -> Result<ExtractReport, ExtractError> {
    let (input_dir, output_dir) = (input_dir.as_ref(), output_dir.as_ref());
    let paths = Self::list_images(input_dir)?;
    std::fs::create_dir_all(output_dir).map_err(|source| ExtractError::OutputDir {
      path: output_dir.to_path_buf(),
      source,
    })?;
    info!(
      "开始提取: {} 个文件, 输出到 {}",
      paths.len(),
      output_dir.display()
    );

    let mut report = ExtractReport::default();
    let mut frames = Vec::with_capacity(paths.len());
    for path in paths {
      match ImageFrame::open(&path) {
        Ok(frame) => frames.push(frame),
        Err(e) => {
          warn!("图像解码失败 {}: {}", path.display(), e);
          report.failed.push(ExtractFailure {
            path,
            reason: e.to_string(),
          });
        }
      }
    }

    let now = std::time::Instant::now();
    let results = self.model.infer_batch(&frames);
    info!("批量推理完成, {} 张, 耗时: {:.2?}", frames.len(), now.elapsed());

    for (frame, result) in frames.into_iter().zip(results) {
      let result = match result {
        Ok(result) => result,
        Err(e) => {
          error!("推理失败 {}: {}", frame.path.display(), e);
          report.failed.push(ExtractFailure {
            path: frame.path,
            reason: e.to_string(),
          });
          continue;
        }
      };

      let Some(file_name) = frame.file_name() else {
        continue;
      };
      let target = output_dir.join(file_name);
      let mut image = frame.image.clone();
      let drawn = self
        .draw
        .draw_detections(&mut image, &result, self.labels, self.threshold);

      match image.save(&target) {
        Ok(()) => {
          info!("保存图像到文件: {} ({} 个检测框)", target.display(), drawn);
          report.drawn += drawn;
          report.written.push(target);
        }
        Err(e) => {
          error!("保存图像失败 {}: {}", target.display(), e);
          report.failed.push(ExtractFailure {
            path: frame.path,
            reason: e.to_string(),
          });
        }
      }
    }

    Ok(report)
  }
}
