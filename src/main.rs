// 该文件是 Shanan （山南西风） 项目的一部分。
// src/main.rs - 项目主程序
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

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shanan_detect::{
  args::Args,
  input::ImageDirInput,
  label::load_category_index,
  model::OnnxDetectorBuilder,
  output::{
    Record, SaveImageFileOutput,
    draw::{Visualizer, resolve_font},
  },
  task::{DirectoryTask, Task},
};

fn main() -> Result<()> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,ort=warn"));
  tracing_subscriber::fmt().with_env_filter(filter).init();

  let args = Args::parse();

  info!("模型路径: {}", args.saved_model_dir.display());
  info!("标签映射: {}", args.labels_path.display());
  info!("输入目录: {}", args.images_dir.display());
  info!("输出目录: {}", args.output_inference_result.display());

  info!("正在加载模型...");
  let now = std::time::Instant::now();
  let model = OnnxDetectorBuilder::new(&args.saved_model_dir)
    .intra_threads(args.intra_threads)
    .build()?;
  info!("模型加载完成，耗时: {:.2?}", now.elapsed());

  let category_index = load_category_index(&args.labels_path, true)
    .with_context(|| format!("无法加载标签映射: {}", args.labels_path.display()))?;

  let mut visualizer = Visualizer::new(args.visualize_options());
  if let Some(font) = resolve_font(args.font.as_deref())? {
    visualizer = visualizer.with_font(font);
  }
  let output = SaveImageFileOutput::new(&args.output_inference_result, visualizer, &category_index)
    .with_record(args.record.then(Record::default));

  let input = ImageDirInput::open(&args.images_dir)?;

  DirectoryTask.run_task(input, &model, &output)?;

  Ok(())
}
