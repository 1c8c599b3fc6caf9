// 该文件是 Detjob （检测作业） 项目的一部分。
// src/bbox.rs - 边界框与结果文件解析
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

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 结果文件每行的字段数: class_id x_center y_center width height confidence
const RESULT_LINE_FIELDS: usize = 6;

/// 检测到的单个目标
///
/// 所有后端统一使用归一化的中心点坐标：`x_center`, `y_center`, `width`,
/// `height` 都是相对图像宽高的比例，取值在 [0, 1]。
/// 输出绝对像素角点的后端需在边界处通过 [`BoundingBox::from_corners`] 转换。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
  pub class_id: u32,
  pub confidence: f32,
  pub x_center: f32,
  pub y_center: f32,
  pub width: f32,
  pub height: f32,
}

#[derive(Error, Debug, PartialEq)]
pub enum BoxParseError {
  #[error("line {line}: expected {RESULT_LINE_FIELDS} fields, found {found}")]
  FieldCount { line: usize, found: usize },
  #[error("line {line}: invalid number '{value}'")]
  InvalidNumber { line: usize, value: String },
  #[error("line {line}: invalid class id {value}")]
  InvalidClassId { line: usize, value: f64 },
}

impl BoundingBox {
  /// 由绝对像素角点 [x1, y1, x2, y2] 构造，image_w/image_h 为图像尺寸
  pub fn from_corners(
    class_id: u32,
    confidence: f32,
    corners: [f32; 4],
    image_w: u32,
    image_h: u32,
  ) -> Self {
    let (w, h) = (image_w.max(1) as f32, image_h.max(1) as f32);
    let [x1, y1, x2, y2] = corners;
    let (x1, x2) = (x1.min(x2), x1.max(x2));
    let (y1, y2) = (y1.min(y2), y1.max(y2));

    BoundingBox {
      class_id,
      confidence,
      x_center: (x1 + x2) / 2.0 / w,
      y_center: (y1 + y2) / 2.0 / h,
      width: (x2 - x1) / w,
      height: (y2 - y1) / h,
    }
  }

  /// 转换为像素角点 [x_min, y_min, x_max, y_max]，并限制在图像范围内
  pub fn to_pixel_corners(&self, image_w: u32, image_h: u32) -> [i32; 4] {
    let (w, h) = (image_w as f32, image_h as f32);
    let max_x = (image_w as i32 - 1).max(0);
    let max_y = (image_h as i32 - 1).max(0);

    let x_min = ((self.x_center - self.width / 2.0) * w).floor() as i32;
    let y_min = ((self.y_center - self.height / 2.0) * h).floor() as i32;
    let x_max = ((self.x_center + self.width / 2.0) * w).ceil() as i32;
    let y_max = ((self.y_center + self.height / 2.0) * h).ceil() as i32;

    [
      x_min.clamp(0, max_x),
      y_min.clamp(0, max_y),
      x_max.clamp(0, max_x),
      y_max.clamp(0, max_y),
    ]
  }
}

fn parse_number(line: usize, value: &str) -> Result<f64, BoxParseError> {
  value
    .parse::<f64>()
    .ok()
    .filter(|v| v.is_finite())
    .ok_or_else(|| BoxParseError::InvalidNumber {
      line,
      value: value.to_string(),
    })
}

/// 解析结果文件中的一行，`line` 为从 1 开始的行号
pub fn parse_line(line: usize, text: &str) -> Result<BoundingBox, BoxParseError> {
  let fields: Vec<&str> = text.split_whitespace().collect();
  if fields.len() != RESULT_LINE_FIELDS {
    return Err(BoxParseError::FieldCount {
      line,
      found: fields.len(),
    });
  }

  let mut values = [0f64; RESULT_LINE_FIELDS];
  for (slot, field) in values.iter_mut().zip(&fields) {
    *slot = parse_number(line, field)?;
  }

  let [class_id, x_center, y_center, width, height, confidence] = values;
  // YOLOv5 写整数，旧工具会写 `1.0`
  if class_id < 0.0 || class_id.fract() != 0.0 || class_id > u32::MAX as f64 {
    return Err(BoxParseError::InvalidClassId {
      line,
      value: class_id,
    });
  }

  Ok(BoundingBox {
    class_id: class_id as u32,
    confidence: confidence as f32,
    x_center: x_center as f32,
    y_center: y_center as f32,
    width: width as f32,
    height: height as f32,
  })
}

/// 解析整个结果文件，空行会被跳过
pub fn parse_results(text: &str) -> Result<Vec<BoundingBox>, BoxParseError> {
  text
    .lines()
    .enumerate()
    .filter(|(_, line)| !line.trim().is_empty())
    .map(|(idx, line)| parse_line(idx + 1, line))
    .collect()
}
