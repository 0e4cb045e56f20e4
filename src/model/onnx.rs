// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/onnx.rs - ONNX 检测模型
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

use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::TensorRef;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{Model, RawOutputs, RawTensor};

/// 模型目录中默认的模型文件名
pub const DEFAULT_MODEL_FILE: &str = "model.onnx";

#[derive(Error, Debug)]
pub enum OnnxDetectorError {
  #[error("模型文件不存在: {0}")]
  ModelNotFound(PathBuf),
  #[error("模型没有输入")]
  NoInput,
  #[error("创建推理会话失败（{operation}）: {message}")]
  Session {
    operation: &'static str,
    message: String,
  },
  #[error("ONNX Runtime 错误: {0}")]
  Ort(#[from] ort::Error),
  #[error("输出 '{0}' 的元素类型不受支持")]
  UnsupportedOutput(String),
}

/// 检测模型构建器
///
/// 路径为目录时读取其中的 `model.onnx`，否则直接作为模型文件。
pub struct OnnxDetectorBuilder {
  model_path: PathBuf,
  intra_threads: Option<usize>,
}

impl OnnxDetectorError {
  fn session(operation: &'static str, err: impl std::fmt::Display) -> Self {
    OnnxDetectorError::Session {
      operation,
      message: err.to_string(),
    }
  }
}

impl OnnxDetectorBuilder {
  pub fn new(path: impl AsRef<Path>) -> Self {
    let path = path.as_ref();
    let model_path = if path.is_dir() {
      path.join(DEFAULT_MODEL_FILE)
    } else {
      path.to_path_buf()
    };

    Self {
      model_path,
      intra_threads: None,
    }
  }

  pub fn intra_threads(mut self, threads: Option<usize>) -> Self {
    self.intra_threads = threads;
    self
  }

  pub fn model_path(&self) -> &Path {
    &self.model_path
  }

  pub fn build(self) -> Result<OnnxDetector, OnnxDetectorError> {
    if !self.model_path.is_file() {
      return Err(OnnxDetectorError::ModelNotFound(self.model_path));
    }

    info!("加载模型文件: {}", self.model_path.display());
    let mut builder = Session::builder()
      .map_err(|e| OnnxDetectorError::session("初始化会话构建器", e))?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(|e| OnnxDetectorError::session("设置图优化级别", e))?;

    if let Some(threads) = self.intra_threads {
      builder = builder
        .with_intra_threads(threads)
        .map_err(|e| OnnxDetectorError::session("设置线程数", e))?;
    }

    #[cfg(feature = "cuda")]
    {
      use ort::execution_providers::CUDAExecutionProvider;
      builder = builder
        .with_execution_providers([CUDAExecutionProvider::default().build()])
        .map_err(|e| OnnxDetectorError::session("注册 CUDA 执行后端", e))?;
    }

    let session = builder
      .commit_from_file(&self.model_path)
      .map_err(|e| OnnxDetectorError::session("读取模型文件", e))?;

    let input_name = session
      .inputs
      .first()
      .map(|input| input.name.clone())
      .ok_or(OnnxDetectorError::NoInput)?;
    let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();

    debug!("模型输入: {}", input_name);
    debug!("模型输出: {:?}", output_names);

    Ok(OnnxDetector {
      session: Mutex::new(session),
      input_name,
      output_names,
    })
  }
}

/// 以 ONNX Runtime 执行的检测模型，输入为 (1, H, W, 3) 的 uint8 张量
pub struct OnnxDetector {
  session: Mutex<Session>,
  input_name: String,
  output_names: Vec<String>,
}

impl OnnxDetector {
  pub fn input_name(&self) -> &str {
    &self.input_name
  }

  pub fn output_names(&self) -> &[String] {
    &self.output_names
  }
}

impl Model for OnnxDetector {
  type Input = Array4<u8>;
  type Output = RawOutputs;
  type Error = OnnxDetectorError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("模型输入形状: {:?}", input.shape());
    let input = input.as_standard_layout();
    let tensor = TensorRef::from_array_view(&input)?;

    let mut session = self.session.lock();
    let outputs = session.run(ort::inputs![self.input_name.as_str() => tensor])?;

    let mut raw = RawOutputs::new();
    for name in &self.output_names {
      let Some(value) = outputs.get(name.as_str()) else {
        continue;
      };

      // 检测类别在不同导出方式下可能是浮点或整数
      let tensor = if let Ok(array) = value.try_extract_array::<f32>() {
        RawTensor::F32(array.to_owned())
      } else if let Ok(array) = value.try_extract_array::<i64>() {
        RawTensor::I64(array.to_owned())
      } else if let Ok(array) = value.try_extract_array::<i32>() {
        RawTensor::I64(array.mapv(i64::from))
      } else if let Ok(array) = value.try_extract_array::<f64>() {
        RawTensor::F32(array.mapv(|v| v as f32))
      } else {
        return Err(OnnxDetectorError::UnsupportedOutput(name.clone()));
      };

      debug!("输出 {}: {:?}", name, tensor.shape());
      raw.insert(name.clone(), tensor);
    }
    Ok(raw)
  }
}
