// 该文件是 Shanan （山南西风） 项目的一部分。
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

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayD, Axis, Ix1, Ix2, Slice};
use thiserror::Error;
use tracing::debug;

pub const NUM_DETECTIONS: &str = "num_detections";
pub const DETECTION_BOXES: &str = "detection_boxes";
pub const DETECTION_CLASSES: &str = "detection_classes";
pub const DETECTION_SCORES: &str = "detection_scores";

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 模型的一个命名输出，保留原始元素类型
#[derive(Debug, Clone, PartialEq)]
pub enum RawTensor {
  F32(ArrayD<f32>),
  I64(ArrayD<i64>),
}

impl RawTensor {
  pub fn shape(&self) -> &[usize] {
    match self {
      RawTensor::F32(a) => a.shape(),
      RawTensor::I64(a) => a.shape(),
    }
  }

  pub fn to_f32(&self) -> ArrayD<f32> {
    match self {
      RawTensor::F32(a) => a.clone(),
      RawTensor::I64(a) => a.mapv(|v| v as f32),
    }
  }

  /// 转为整数，浮点值向零截断
  pub fn to_i64(&self) -> ArrayD<i64> {
    match self {
      RawTensor::F32(a) => a.mapv(|v| v as i64),
      RawTensor::I64(a) => a.clone(),
    }
  }

  fn first_value(&self) -> Option<f64> {
    match self {
      RawTensor::F32(a) => a.iter().next().map(|&v| v as f64),
      RawTensor::I64(a) => a.iter().next().map(|&v| v as f64),
    }
  }

  /// 取第 0 个批次元素的前 `rows` 行
  fn slice_batch(&self, name: &str, rows: usize) -> Result<RawTensor, PostprocessError> {
    fn slice<T: Clone>(
      a: &ArrayD<T>,
      name: &str,
      rows: usize,
    ) -> Result<ArrayD<T>, PostprocessError> {
      let shape = a.shape();
      if shape.len() < 2 || shape[0] == 0 || shape[1] < rows {
        return Err(PostprocessError::ShapeMismatch {
          name: name.to_string(),
          shape: shape.to_vec(),
          rows,
        });
      }
      Ok(
        a.index_axis(Axis(0), 0)
          .slice_axis(Axis(0), Slice::from(..rows))
          .to_owned(),
      )
    }

    Ok(match self {
      RawTensor::F32(a) => RawTensor::F32(slice(a, name, rows)?),
      RawTensor::I64(a) => RawTensor::I64(slice(a, name, rows)?),
    })
  }
}

impl From<ArrayD<f32>> for RawTensor {
  fn from(array: ArrayD<f32>) -> Self {
    RawTensor::F32(array)
  }
}

impl From<ArrayD<i64>> for RawTensor {
  fn from(array: ArrayD<i64>) -> Self {
    RawTensor::I64(array)
  }
}

/// 检测模型的原始输出：输出名到带批次维度的张量
pub type RawOutputs = BTreeMap<String, RawTensor>;

#[derive(Error, Debug)]
pub enum PostprocessError {
  #[error("模型输出缺少 '{0}'")]
  MissingOutput(&'static str),
  #[error("检测数量无效: {0}")]
  InvalidCount(f64),
  #[error("输出 '{name}' 的形状 {shape:?} 无法截取前 {rows} 个检测")]
  ShapeMismatch {
    name: String,
    shape: Vec<usize>,
    rows: usize,
  },
  #[error("输出 '{name}' 维度错误: {source}")]
  Dimension {
    name: &'static str,
    #[source]
    source: ndarray::ShapeError,
  },
}

/// 去掉批次维度并截取到 `num_detections` 的检测结果
///
/// `boxes`、`classes`、`scores` 按下标一一对应，长度都等于 `num_detections`。
/// 框坐标顺序为 `[y_min, x_min, y_max, x_max]`。
#[derive(Debug, Clone, PartialEq)]
pub struct DetectResult {
  pub num_detections: usize,
  pub boxes: Array2<f32>,
  pub classes: Array1<i64>,
  pub scores: Array1<f32>,
  /// 其余输出，同样已截取
  pub extras: BTreeMap<String, RawTensor>,
}

impl DetectResult {
  pub fn empty() -> Self {
    Self {
      num_detections: 0,
      boxes: Array2::zeros((0, 4)),
      classes: Array1::zeros(0),
      scores: Array1::zeros(0),
      extras: BTreeMap::new(),
    }
  }

  pub fn len(&self) -> usize {
    self.num_detections
  }

  pub fn is_empty(&self) -> bool {
    self.num_detections == 0
  }

  pub fn from_raw(mut raw: RawOutputs) -> Result<Self, PostprocessError> {
    let count = raw
      .remove(NUM_DETECTIONS)
      .ok_or(PostprocessError::MissingOutput(NUM_DETECTIONS))?
      .first_value()
      .ok_or(PostprocessError::MissingOutput(NUM_DETECTIONS))?;
    if !count.is_finite() || count < 0.0 {
      return Err(PostprocessError::InvalidCount(count));
    }
    let num_detections = count as usize;
    debug!("检测数量: {}", num_detections);

    let mut trimmed = raw
      .iter()
      .map(|(name, tensor)| Ok((name.clone(), tensor.slice_batch(name, num_detections)?)))
      .collect::<Result<BTreeMap<_, _>, PostprocessError>>()?;

    let mut take = |name: &'static str| {
      trimmed
        .remove(name)
        .ok_or(PostprocessError::MissingOutput(name))
    };

    let boxes = take(DETECTION_BOXES)?
      .to_f32()
      .into_dimensionality::<Ix2>()
      .map_err(|source| PostprocessError::Dimension {
        name: DETECTION_BOXES,
        source,
      })?;
    let classes = take(DETECTION_CLASSES)?
      .to_i64()
      .into_dimensionality::<Ix1>()
      .map_err(|source| PostprocessError::Dimension {
        name: DETECTION_CLASSES,
        source,
      })?;
    let scores = take(DETECTION_SCORES)?
      .to_f32()
      .into_dimensionality::<Ix1>()
      .map_err(|source| PostprocessError::Dimension {
        name: DETECTION_SCORES,
        source,
      })?;

    if boxes.ncols() != 4 {
      return Err(PostprocessError::ShapeMismatch {
        name: DETECTION_BOXES.to_string(),
        shape: boxes.shape().to_vec(),
        rows: num_detections,
      });
    }

    Ok(Self {
      num_detections,
      boxes,
      classes,
      scores,
      extras: trimmed,
    })
  }
}

mod onnx;
pub use self::onnx::{OnnxDetector, OnnxDetectorBuilder, OnnxDetectorError};
