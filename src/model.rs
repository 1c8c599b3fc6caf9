// 该文件是 Detjob （检测作业） 项目的一部分。
// src/model.rs - 模型
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

use std::path::Path;

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, bbox::BoundingBox, frame::ImageFrame};

/// 检测模型
///
/// 输入类型作为泛型参数，同一个后端可以同时接受图像路径（作业对账）
/// 和解码后的图像帧（批量标注）。
pub trait Model<Input: ?Sized> {
  type Output;
  type Error;

  fn infer(&self, input: &Input) -> Result<Self::Output, Self::Error>;

  /// 逐个推理，每张图像的失败互不影响
  fn infer_batch(&self, inputs: &[Input]) -> Vec<Result<Self::Output, Self::Error>>
  where
    Input: Sized,
  {
    inputs.iter().map(|input| self.infer(input)).collect()
  }
}

/// 单张图像的检测结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[BoundingBox]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  /// 置信度严格大于阈值的检测框
  pub fn above(&self, threshold: f32) -> impl Iterator<Item = &BoundingBox> {
    self
      .items
      .iter()
      .filter(move |item| item.confidence > threshold)
  }

  pub fn into_vec(self) -> Vec<BoundingBox> {
    self.items.into_vec()
  }
}

impl From<Vec<BoundingBox>> for DetectResult {
  fn from(items: Vec<BoundingBox>) -> Self {
    DetectResult {
      items: items.into_boxed_slice(),
    }
  }
}

mod simulate;
pub use self::simulate::{SimulateError, SimulatedModel};

mod yolov5;
pub use self::yolov5::{Yolov5Builder, Yolov5Error, Yolov5Process, Yolov5Run};

#[cfg(feature = "rknn")]
mod rknn;
#[cfg(feature = "rknn")]
pub use self::rknn::{RknnError, RknnModel, RknnModelBuilder};

#[derive(Error, Debug)]
pub enum ModelError {
  #[error(transparent)]
  SimulateError(#[from] SimulateError),
  #[error(transparent)]
  Yolov5Error(#[from] Yolov5Error),
  #[cfg(feature = "rknn")]
  #[error(transparent)]
  RknnError(#[from] RknnError),
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
}

/// 按 URL 方案选择的检测后端，由调用者构造一次后以引用传递
pub enum ModelWrapper {
  Simulated(SimulatedModel),
  Yolov5(Yolov5Process),
  #[cfg(feature = "rknn")]
  Rknn(RknnModel),
}

impl FromUrl for ModelWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      SimulatedModel::SCHEME => Ok(ModelWrapper::Simulated(SimulatedModel::from_url(url)?)),
      Yolov5Builder::SCHEME => Ok(ModelWrapper::Yolov5(Yolov5Builder::from_url(url)?.build())),
      #[cfg(feature = "rknn")]
      RknnModelBuilder::SCHEME => Ok(ModelWrapper::Rknn(RknnModelBuilder::from_url(url)?.build()?)),
      other => Err(ModelError::SchemeMismatch(other.to_string())),
    }
  }
}

impl ModelWrapper {
  pub fn kind(&self) -> &'static str {
    match self {
      ModelWrapper::Simulated(_) => "simulate",
      ModelWrapper::Yolov5(_) => "yolov5",
      #[cfg(feature = "rknn")]
      ModelWrapper::Rknn(_) => "rknn",
    }
  }
}

impl Model<Path> for ModelWrapper {
  type Output = DetectResult;
  type Error = ModelError;

  fn infer(&self, input: &Path) -> Result<Self::Output, Self::Error> {
    match self {
      ModelWrapper::Simulated(model) => model.infer(input).map_err(ModelError::from),
      ModelWrapper::Yolov5(model) => model.infer(input).map_err(ModelError::from),
      #[cfg(feature = "rknn")]
      ModelWrapper::Rknn(model) => model.infer(input).map_err(ModelError::from),
    }
  }
}

impl Model<ImageFrame> for ModelWrapper {
  type Output = DetectResult;
  type Error = ModelError;

  fn infer(&self, input: &ImageFrame) -> Result<Self::Output, Self::Error> {
    match self {
      ModelWrapper::Simulated(model) => model.infer(input).map_err(ModelError::from),
      ModelWrapper::Yolov5(model) => model.infer(input).map_err(ModelError::from),
      #[cfg(feature = "rknn")]
      ModelWrapper::Rknn(model) => model.infer(input).map_err(ModelError::from),
    }
  }
}
