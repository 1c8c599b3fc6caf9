// 该文件是 Detjob （检测作业） 项目的一部分。
// src/model/simulate.rs - 模拟检测器
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::ImageFrame,
  model::{DetectResult, Model},
};

#[derive(Error, Debug)]
pub enum SimulateError {
  #[error("Image not found: {}", .0.display())]
  NotFound(PathBuf),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
}

/// 不运行任何网络的检测器：文件存在即视为成功，不产生检测框
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedModel;

impl FromUrlWithScheme for SimulatedModel {
  const SCHEME: &'static str = "simulate";
}

impl FromUrl for SimulatedModel {
  type Error = SimulateError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(SimulateError::SchemeMismatch);
    }
    Ok(SimulatedModel)
  }
}

impl Model<Path> for SimulatedModel {
  type Output = DetectResult;
  type Error = SimulateError;

  fn infer(&self, input: &Path) -> Result<Self::Output, Self::Error> {
    if !input.exists() {
      return Err(SimulateError::NotFound(input.to_path_buf()));
    }
    debug!("模拟推理: {}", input.display());
    Ok(DetectResult::default())
  }
}

impl Model<ImageFrame> for SimulatedModel {
  type Output = DetectResult;
  type Error = SimulateError;

  fn infer(&self, input: &ImageFrame) -> Result<Self::Output, Self::Error> {
    debug!("模拟推理: {}", input.path.display());
    Ok(DetectResult::default())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn existing_file_succeeds_without_boxes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.jpg");
    std::fs::write(&path, b"").unwrap();

    let result = SimulatedModel.infer(path.as_path()).unwrap();
    assert!(result.is_empty());
  }

  #[test]
  fn missing_file_reports_path() {
    let err = SimulatedModel
      .infer(Path::new("/nonexistent/missing.jpg"))
      .unwrap_err();
    assert!(err.to_string().contains("missing.jpg"));
  }

  #[test]
  fn rejects_other_schemes() {
    assert!(SimulatedModel::from_url(&Url::parse("simulate:").unwrap()).is_ok());
    assert!(matches!(
      SimulatedModel::from_url(&Url::parse("yolov5:///w.pt").unwrap()),
      Err(SimulateError::SchemeMismatch)
    ));
  }
}
