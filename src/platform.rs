//! 宿主环境相关：临时暂存目录与需要忽略的系统文件

use std::path::PathBuf;

/// macOS 在目录中生成的元数据文件
pub const DS_STORE: &str = ".DS_Store";

fn is_finder_metadata(name: &str) -> bool {
    name == DS_STORE
}

/// 同步运行环境
#[derive(Debug, Clone)]
pub struct SyncEnv {
    /// 暂存根目录，每个配置在其下有独立子目录
    pub staging_root: PathBuf,
    /// 判断目录项是否为应忽略的平台文件
    pub is_platform_artifact: fn(&str) -> bool,
}

impl Default for SyncEnv {
    fn default() -> Self {
        Self::with_staging_root(std::env::temp_dir().join("minecraft-syncer"))
    }
}

impl SyncEnv {
    pub fn with_staging_root(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_root: staging_root.into(),
            is_platform_artifact: is_finder_metadata,
        }
    }

    pub fn staging_dir(&self, config_name: &str) -> PathBuf {
        self.staging_root.join(config_name)
    }

    pub fn ignores(&self, name: &str) -> bool {
        (self.is_platform_artifact)(name)
    }
}
