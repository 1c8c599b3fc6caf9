// 该文件是 Detjob （检测作业） 项目的一部分。
// src/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::{bbox::BoundingBox, label::LabelTable, model::DetectResult};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_OFFSET_Y: i32 = 10; // 标签位于边框上方
const BOX_THICKNESS: i32 = 3;
const BOX_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("字体文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

pub struct Draw {
  color: Rgb<u8>,
  thickness: i32,
  font_scale: PxScale,
  font: Option<FontVec>,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      color: Rgb(BOX_COLOR),
      thickness: BOX_THICKNESS,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      font: None,
    }
  }
}

impl Draw {
  /// 加载用于标签文本的字体；未加载字体时只绘制边框
  pub fn with_font_file(mut self, path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    self.font = Some(FontVec::try_from_vec(data)?);
    info!("加载字体: {}", path.display());
    Ok(self)
  }

  pub fn with_color(mut self, color: [u8; 3]) -> Self {
    self.color = Rgb(color);
    self
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, bbox: &BoundingBox, label: &str) {
    let [x_min, y_min, x_max, y_max] = bbox.to_pixel_corners(image.width(), image.height());
    if x_min >= x_max || y_min >= y_max {
      debug!("跳过退化的检测框: {:?}", bbox);
      return;
    }

    // 向内加粗
    for t in 0..self.thickness {
      let (w, h) = (x_max - x_min - 2 * t, y_max - y_min - 2 * t);
      if w <= 0 || h <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(w as u32 + 1, h as u32 + 1);
      draw_hollow_rect_mut(image, rect, self.color);
    }

    if let Some(font) = &self.font {
      let text = format!("{} {:.2}", label, bbox.confidence);
      let text_y = (y_min - LABEL_OFFSET_Y - self.font_scale.y as i32).max(0);
      draw_text_mut(image, self.color, x_min, text_y, self.font_scale, font, &text);
    }
  }

  /// 绘制置信度大于阈值的检测框，返回绘制数量
  pub fn draw_detections(
    &self,
    image: &mut RgbImage,
    result: &DetectResult,
    labels: &LabelTable,
    threshold: f32,
  ) -> usize {
    let mut drawn = 0;
    for bbox in result.above(threshold) {
      self.draw_bbox_with_label(image, bbox, &labels.display(bbox.class_id));
      drawn += 1;
    }
    drawn
  }
}
