// 该文件是 Detjob （检测作业） 项目的一部分。
// src/model/rknn.rs - 进程内 RKNN 检测模型
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

use image::imageops::{FilterType, resize};
use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  bbox::BoundingBox,
  frame::{FrameError, ImageFrame},
  model::{DetectResult, Model},
};

const RKNN_NUM_INPUTS: u32 = 1;
const RKNN_NUM_OUTPUTS: u32 = 6;
const RKNN_CLASS_NUM: usize = 80;
const RKNN_INPUT_W: u32 = 640;
const RKNN_INPUT_H: u32 = 640;
const RKNN_HEAD_SIZES: [(usize, usize); 3] = [(80, 80), (40, 40), (20, 20)];
const RKNN_STRIDES: [f32; 3] = [8.0, 16.0, 32.0];
const RKNN_OBJECT_THRESH: f32 = 0.25;

#[derive(Error, Debug)]
pub enum RknnError {
  #[error("model load error: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("invalid model: {0}, error: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN error: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("image read error: {0}")]
  FrameError(#[from] FrameError),
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
}

impl RknnError {
  fn invalid(msg: &str, e: rknpu::Error) -> Self {
    RknnError::ModelInvalid(msg.to_string(), e)
  }
}

pub struct RknnModelBuilder {
  model_path: String,
  flags: InitFlags,
}

impl FromUrlWithScheme for RknnModelBuilder {
  const SCHEME: &'static str = "rknn";
}

impl FromUrl for RknnModelBuilder {
  type Error = RknnError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RknnError::SchemeMismatch(format!(
        "model path must use the {} scheme",
        Self::SCHEME
      )));
    }

    Ok(RknnModelBuilder {
      model_path: url.path().to_string(),
      flags: InitFlags::default(),
    })
  }
}

impl RknnModelBuilder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn build(self) -> Result<RknnModel, RknnError> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    let context = Context::new(&model_data, self.flags)?;

    let num_inputs = context
      .num_inputs()
      .map_err(|e| RknnError::invalid("cannot query input count", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| RknnError::invalid("cannot query output count", e))?;
    if num_inputs != RKNN_NUM_INPUTS || num_outputs != RKNN_NUM_OUTPUTS {
      let msg = format!(
        "expected {}/{} model inputs/outputs, got {}/{}",
        RKNN_NUM_INPUTS, RKNN_NUM_OUTPUTS, num_inputs, num_outputs
      );
      error!("{}", msg);
      return Err(RknnError::invalid(&msg, rknpu::Error::InvalidModel));
    }

    info!("模型加载完成");
    Ok(RknnModel { context })
  }
}

/// 进程内检测模型，输出为输入图像上的绝对像素角点，
/// 在返回前转换为归一化中心点坐标
pub struct RknnModel {
  context: Context,
}

/// 按张量大小区分回归与分类输出，顺序可能因模型转换而交换
fn match_reg_cls<'a>(
  tensor1: &'a [f32],
  tensor2: &'a [f32],
  reg_expected: usize,
  cls_expected: usize,
) -> Option<(&'a [f32], &'a [f32])> {
  if tensor1.len() == reg_expected && tensor2.len() == cls_expected {
    Some((tensor1, tensor2))
  } else if tensor1.len() == cls_expected && tensor2.len() == reg_expected {
    Some((tensor2, tensor1))
  } else {
    None
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 解码检测头输出，返回 (class_id, score, [x1, y1, x2, y2])，坐标为模型输入像素
fn decode_heads(output: &rknpu::Output) -> Vec<(u32, f32, [f32; 4])> {
  let (in_w, in_h) = (RKNN_INPUT_W as f32, RKNN_INPUT_H as f32);
  let mut items = Vec::new();

  for (head_idx, (&(map_h, map_w), stride)) in
    RKNN_HEAD_SIZES.iter().zip(RKNN_STRIDES).enumerate()
  {
    let spatial = map_h * map_w;
    let (tensor1, tensor2) = match (output.get_f32(head_idx * 2), output.get_f32(head_idx * 2 + 1)) {
      (Ok(t1), Ok(t2)) => (t1, t2),
      (Err(e), _) | (_, Err(e)) => {
        error!("检测头 {} 输出获取失败: {}", head_idx, e);
        continue;
      }
    };

    let Some((reg, cls)) = match_reg_cls(tensor1, tensor2, 4 * spatial, RKNN_CLASS_NUM * spatial)
    else {
      error!(
        "检测头 {}: 输出大小不匹配 {}/{}",
        head_idx,
        tensor1.len(),
        tensor2.len()
      );
      continue;
    };

    for h in 0..map_h {
      for w in 0..map_w {
        let idx = h * map_w + w;
        let (class_id, logit) = (0..RKNN_CLASS_NUM)
          .map(|c| (c, cls[c * spatial + idx]))
          .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
        let score = sigmoid(logit);
        if score <= RKNN_OBJECT_THRESH {
          continue;
        }

        let grid_x = w as f32 + 0.5;
        let grid_y = h as f32 + 0.5;
        let corners = [
          ((grid_x - reg[idx]) * stride).clamp(0.0, in_w),
          ((grid_y - reg[spatial + idx]) * stride).clamp(0.0, in_h),
          ((grid_x + reg[2 * spatial + idx]) * stride).clamp(0.0, in_w),
          ((grid_y + reg[3 * spatial + idx]) * stride).clamp(0.0, in_h),
        ];
        items.push((class_id as u32, score, corners));
      }
    }
  }
  items
}

impl Model<ImageFrame> for RknnModel {
  type Output = DetectResult;
  type Error = RknnError;

  fn infer(&self, input: &ImageFrame) -> Result<Self::Output, Self::Error> {
    let (orig_w, orig_h) = (input.width(), input.height());
    let resized = resize(&input.image, RKNN_INPUT_W, RKNN_INPUT_H, FilterType::Triangle);

    debug!("设置模型输入");
    self
      .context
      .set_input(0, resized.as_raw(), TensorFormat::NHWC, TensorType::UInt8)?;
    debug!("执行模型推理");
    self.context.run()?;
    let output = self.context.get_outputs()?;

    // 模型输入像素 -> 原图像素 -> 归一化中心点
    let scale_x = orig_w as f32 / RKNN_INPUT_W as f32;
    let scale_y = orig_h as f32 / RKNN_INPUT_H as f32;
    let boxes: Vec<BoundingBox> = decode_heads(&output)
      .into_iter()
      .map(|(class_id, score, [x1, y1, x2, y2])| {
        BoundingBox::from_corners(
          class_id,
          score,
          [x1 * scale_x, y1 * scale_y, x2 * scale_x, y2 * scale_y],
          orig_w,
          orig_h,
        )
      })
      .collect();
    debug!("检测到 {} 个物体", boxes.len());

    Ok(DetectResult::from(boxes))
  }
}

impl Model<Path> for RknnModel {
  type Output = DetectResult;
  type Error = RknnError;

  fn infer(&self, input: &Path) -> Result<Self::Output, Self::Error> {
    let frame = ImageFrame::open(input)?;
    Model::<ImageFrame>::infer(self, &frame)
  }
}
