// 该文件是 Duizhao （对照） 项目的一部分。
// src/detection.rs - 检测结果定义与重叠度计算
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

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, PartialEq)]
pub enum DetectionError {
  #[error("字段 {field} 不是有限数值: {value}")]
  NonFinite { field: &'static str, value: f64 },
  #[error("类别编号不能为负数: {0}")]
  NegativeClassId(i64),
  #[error("类别编号超出范围: {0}")]
  ClassIdOverflow(i64),
}

/// 归一化的轴对齐边界框，`(x, y)` 为左上角，所有字段均为图像尺寸的比例
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BoundingBox {
  pub x: f64,
  pub y: f64,
  pub width: f64,
  pub height: f64,
}

impl BoundingBox {
  pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  /// 右下角 x 坐标
  pub fn x_max(&self) -> f64 {
    self.x + self.width
  }

  /// 右下角 y 坐标
  pub fn y_max(&self) -> f64 {
    self.y + self.height
  }

  pub fn area(&self) -> f64 {
    self.width * self.height
  }

  /// 交集面积，不相交时为 0
  pub fn intersect(&self, other: &BoundingBox) -> f64 {
    let left = self.x.max(other.x);
    let right = self.x_max().min(other.x_max());
    let top = self.y.max(other.y);
    let bottom = self.y_max().min(other.y_max());
    (right - left).max(0.0) * (bottom - top).max(0.0)
  }

  pub fn union(&self, other: &BoundingBox) -> f64 {
    self.area() + other.area() - self.intersect(other)
  }

  /// 交并比；并集面积为 0（退化框）时返回 0
  pub fn iou(&self, other: &BoundingBox) -> f64 {
    let union = self.union(other);
    if union > 0.0 {
      self.intersect(other) / union
    } else {
      0.0
    }
  }
}

/// 单个检测目标
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
  pub class_id: u32,
  pub confidence: f64,
  #[serde(flatten)]
  pub bbox: BoundingBox,
}

impl Detection {
  pub fn new(class_id: u32, confidence: f64, bbox: BoundingBox) -> Self {
    Self {
      class_id,
      confidence,
      bbox,
    }
  }

  /// 从外部数据构造检测结果。
  ///
  /// 非有限数值和负类别编号直接拒绝；超出 [0, 1] 的有限数值被截断到该区间，
  /// 并记录一条警告。`x + width <= 1` 不做强制要求。
  pub fn validated(
    class_id: i64,
    confidence: f64,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
  ) -> Result<Self, DetectionError> {
    if class_id < 0 {
      return Err(DetectionError::NegativeClassId(class_id));
    }
    let class_id = u32::try_from(class_id).map_err(|_| DetectionError::ClassIdOverflow(class_id))?;

    let confidence = unit_interval("confidence", confidence)?;
    let x = unit_interval("x", x)?;
    let y = unit_interval("y", y)?;
    let width = unit_interval("width", width)?;
    let height = unit_interval("height", height)?;

    Ok(Self::new(
      class_id,
      confidence,
      BoundingBox::new(x, y, width, height),
    ))
  }
}

fn unit_interval(field: &'static str, value: f64) -> Result<f64, DetectionError> {
  if !value.is_finite() {
    return Err(DetectionError::NonFinite { field, value });
  }
  if !(0.0..=1.0).contains(&value) {
    warn!("字段 {} 超出 [0, 1] 范围: {}，已截断", field, value);
  }
  Ok(value.clamp(0.0, 1.0))
}

/// 计算两个检测框的交并比，结果位于 [0, 1]
pub fn iou(a: &Detection, b: &Detection) -> f64 {
  a.bbox.iou(&b.bbox)
}

/// 某个后端针对一次（模型、图像、置信度阈值）输入给出的全部检测结果。
/// 顺序仅影响匹配时的遍历顺序。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DetectionSet {
  items: Box<[Detection]>,
}

impl DetectionSet {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&Detection> {
    self.items.get(index)
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
    self.items.iter()
  }

  pub fn as_slice(&self) -> &[Detection] {
    &self.items
  }
}

impl From<Vec<Detection>> for DetectionSet {
  fn from(items: Vec<Detection>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

impl FromIterator<Detection> for DetectionSet {
  fn from_iter<I: IntoIterator<Item = Detection>>(iter: I) -> Self {
    iter.into_iter().collect::<Vec<_>>().into()
  }
}

impl std::ops::Index<usize> for DetectionSet {
  type Output = Detection;

  fn index(&self, index: usize) -> &Self::Output {
    &self.items[index]
  }
}

impl<'a> IntoIterator for &'a DetectionSet {
  type Item = &'a Detection;
  type IntoIter = std::slice::Iter<'a, Detection>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.iter()
  }
}
