// 该文件是 Shanan （山南西风） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use clap::Parser;

use crate::output::draw::{
  DEFAULT_LINE_THICKNESS, DEFAULT_MAX_BOXES_TO_DRAW, DEFAULT_MIN_SCORE_THRESH, VisualizeOptions,
};

/// 目标检测批量推理
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 导出的模型路径（模型文件或包含 model.onnx 的目录）
  #[arg(
    short = 'm',
    long = "saved_model_dir",
    value_name = "PATH",
    default_value = "exported_models/my_model/saved_model"
  )]
  pub saved_model_dir: PathBuf,

  /// 标签映射文件路径
  #[arg(
    short = 'l',
    long = "labels_path",
    value_name = "FILE",
    default_value = "annotations/label_map.pbtxt"
  )]
  pub labels_path: PathBuf,

  /// 输入图像目录，只处理其中的 .jpg 文件
  #[arg(
    short = 'i',
    long = "images_dir",
    value_name = "DIR",
    default_value = "images/test"
  )]
  pub images_dir: PathBuf,

  /// 输出目录，需要事先存在
  #[arg(
    short = 'o',
    long = "output_inference_result",
    value_name = "DIR",
    default_value = "inference_result/"
  )]
  pub output_inference_result: PathBuf,

  /// 绘制阈值，分数严格大于该值的检测才会被绘制
  #[arg(long = "min_score_thresh", value_name = "THRESHOLD", default_value_t = DEFAULT_MIN_SCORE_THRESH)]
  pub min_score_thresh: f32,

  /// 每张图像最多绘制的检测数
  #[arg(long = "max_boxes_to_draw", value_name = "COUNT", default_value_t = DEFAULT_MAX_BOXES_TO_DRAW)]
  pub max_boxes_to_draw: usize,

  /// 检测框线宽（像素）
  #[arg(long = "line_thickness", value_name = "PIXELS", default_value_t = DEFAULT_LINE_THICKNESS)]
  pub line_thickness: u32,

  /// 标签字体文件，缺省时使用内置的 DejaVu Sans
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 在输出图像旁写入同名 JSON 检测记录
  #[arg(long)]
  pub record: bool,

  /// 推理线程数
  #[arg(long = "intra_threads", value_name = "COUNT")]
  pub intra_threads: Option<usize>,
}

impl Args {
  pub fn visualize_options(&self) -> VisualizeOptions {
    VisualizeOptions {
      max_boxes_to_draw: self.max_boxes_to_draw,
      min_score_thresh: self.min_score_thresh,
      line_thickness: self.line_thickness,
      ..VisualizeOptions::default()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_training_layout() {
    let args = Args::parse_from(["shanan-detect"]);
    assert_eq!(
      args.saved_model_dir,
      PathBuf::from("exported_models/my_model/saved_model")
    );
    assert_eq!(args.labels_path, PathBuf::from("annotations/label_map.pbtxt"));
    assert_eq!(args.images_dir, PathBuf::from("images/test"));
    assert_eq!(
      args.output_inference_result,
      PathBuf::from("inference_result/")
    );
    assert!(!args.record);
    assert!(args.font.is_none());
    assert!(args.intra_threads.is_none());
    assert_eq!(args.visualize_options(), VisualizeOptions::default());
  }

  #[test]
  fn short_and_long_flags() {
    let args = Args::parse_from([
      "shanan-detect",
      "-m",
      "model.onnx",
      "-l",
      "labels.pbtxt",
      "--images_dir",
      "photos",
      "-o",
      "out",
      "--min_score_thresh",
      "0.5",
      "--line_thickness",
      "2",
      "--record",
    ]);
    assert_eq!(args.saved_model_dir, PathBuf::from("model.onnx"));
    assert_eq!(args.labels_path, PathBuf::from("labels.pbtxt"));
    assert_eq!(args.images_dir, PathBuf::from("photos"));
    assert_eq!(args.output_inference_result, PathBuf::from("out"));
    assert!(args.record);

    let options = args.visualize_options();
    assert_eq!(options.min_score_thresh, 0.5);
    assert_eq!(options.line_thickness, 2);
    assert_eq!(options.max_boxes_to_draw, DEFAULT_MAX_BOXES_TO_DRAW);
  }
}
