//! 同步错误分类
//!
//! 库函数统一返回 `anyhow::Result`，致命错误以 [`SyncError`] 作为上下文附加，
//! 调用方可用 `downcast_ref::<SyncError>()` 判断类别。

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// 读取时必须存在的目录缺失
    #[error("目录不存在: {}", .0.display())]
    MissingDirectory(PathBuf),
    /// 基岩版世界缺少或无法读取 levelname.txt
    #[error("无法读取世界名称: {}", .0.display())]
    LevelName(PathBuf),
    #[error("打包失败: {0}")]
    Build(String),
    #[error("解压失败: {0}")]
    Extract(String),
    #[error("转移归档失败: {0}")]
    Relocate(String),
}
