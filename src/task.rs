// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 批量推理任务
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

use std::time::{Duration, Instant};

use anyhow::Context;
use ndarray::Array4;
use tracing::{debug, info};

use crate::{
  frame::ImageFrame,
  model::{DetectResult, Model, RawOutputs},
  output::Render,
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: &M, output: &O) -> Result<Self::Output, Self::Error>;
}

/// 一次任务的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSummary {
  pub images: usize,
  pub detections: usize,
  pub elapsed: Duration,
}

/// 依次处理每一张图像：推理、截取检测结果、绘制并保存
///
/// 任意一张图像出错都会中止整个任务，已经保存的结果保留在磁盘上。
#[derive(Default, Debug)]
pub struct DirectoryTask;

/// 第一个检测框在原图中的像素坐标，只用于调试输出
fn first_box_in_pixels(frame: &ImageFrame, result: &DetectResult) -> Option<[f32; 4]> {
  if result.is_empty() {
    return None;
  }
  let (w, h) = (frame.width() as f32, frame.height() as f32);
  let row = result.boxes.row(0);
  Some([row[1] * w, row[0] * h, row[3] * w, row[2] * h])
}

impl<I, M, O, IE, ME, RE> Task<I, M, O> for DirectoryTask
where
  I: Iterator<Item = Result<ImageFrame, IE>>,
  M: Model<Input = Array4<u8>, Output = RawOutputs, Error = ME>,
  O: Render<ImageFrame, DetectResult, Error = RE>,
  IE: std::error::Error + Send + Sync + 'static,
  ME: std::error::Error + Send + Sync + 'static,
  RE: std::error::Error + Send + Sync + 'static,
{
  type Output = TaskSummary;
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: &M, output: &O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let start = Instant::now();
    let mut summary = TaskSummary::default();

    for frame in input {
      let frame = frame?;
      let path = frame.path().display().to_string();
      info!("正在推理 {}", path);

      let now = Instant::now();
      let batch = frame
        .to_batch()
        .with_context(|| format!("无法构造输入张量: {}", path))?;
      let raw = model
        .infer(&batch)
        .with_context(|| format!("推理失败: {}", path))?;
      let result =
        DetectResult::from_raw(raw).with_context(|| format!("无法解析模型输出: {}", path))?;
      info!(
        "推理完成，检测到 {} 个对象，耗时: {:.2?}",
        result.len(),
        now.elapsed()
      );

      if let Some([x_min, y_min, x_max, y_max]) = first_box_in_pixels(&frame, &result) {
        debug!(
          "图像 {}x{}，首个检测框像素坐标: ({:.1}, {:.1}) - ({:.1}, {:.1})",
          frame.width(),
          frame.height(),
          x_min,
          y_min,
          x_max,
          y_max
        );
      }

      output
        .render_result(&frame, &result)
        .with_context(|| format!("保存结果失败: {}", path))?;

      summary.images += 1;
      summary.detections += result.len();
    }

    summary.elapsed = start.elapsed();
    info!(
      "任务完成，共处理 {} 张图像，{} 个检测，耗时: {:.2?}",
      summary.images, summary.detections, summary.elapsed
    );
    Ok(summary)
  }
}
