//! 配置文件加载与管理

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 需要同步的世界集合，按顺序处理
    pub worlds: Vec<SyncConfiguration>,
}

/// 游戏版本，决定命名规则与归档扩展名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edition {
    Bedrock,
    Java,
}

/// 存储中已存在同名归档时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    Ask,
    #[default]
    OverwriteStorage,
    OverwriteLocal,
}

/// 单个世界集合（一个游戏安装）的同步配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfiguration {
    #[serde(alias = "type")]
    pub edition: Edition,
    /// 显示名称，同时用作临时目录名
    pub name: String,
    /// 存放世界的目录，每个子目录是一个世界
    #[serde(alias = "worldsFolder")]
    pub worlds_dir: PathBuf,
    /// 归档的持久存储目录
    #[serde(alias = "storageFolder")]
    pub storage_dir: PathBuf,
    #[serde(default, alias = "excludeWorlds")]
    pub exclude_worlds: Vec<String>,
    /// 预留：服务器排除列表
    #[serde(default, alias = "excludeServers")]
    pub exclude_servers: Vec<String>,
    #[serde(default, alias = "conflictResolution")]
    pub conflict_resolution: ConflictPolicy,
    /// 附加文件，相对于 `worlds_dir` 的上一级目录
    #[serde(default, alias = "additionalFiles")]
    pub additional_files: Vec<String>,
}

impl SyncConfiguration {
    /// `worlds_dir` 的上一级目录，附加文件以此为根
    pub fn minecraft_root(&self) -> PathBuf {
        match self.worlds_dir.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => self.worlds_dir.join(".."),
        }
    }

    pub fn is_world_excluded(&self, dir_name: &str) -> bool {
        self.exclude_worlds.iter().any(|name| name == dir_name)
    }
}

// ============== 配置加载 ==============

/// 旧版 sync.json 是一个裸数组
#[derive(Deserialize)]
#[serde(untagged)]
enum JsonLayout {
    Legacy(Vec<SyncConfiguration>),
    Wrapped(Config),
}

fn is_json(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "json")
}

impl Config {
    /// 从文件加载配置，`.json` 按 JSON 解析，其余按 TOML
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("无法读取配置: {}", path.display()))?;

        if is_json(path) {
            let layout: JsonLayout = serde_json::from_str(&content)
                .with_context(|| format!("无效的配置: {}", path.display()))?;
            return Ok(match layout {
                JsonLayout::Legacy(worlds) => Config { worlds },
                JsonLayout::Wrapped(config) => config,
            });
        }

        let config: Config =
            toml::from_str(&content).with_context(|| format!("无效的配置: {}", path.display()))?;
        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            toml::to_string_pretty(self)?
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// 获取默认配置文件路径
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("minecraft-syncer").join("sync.toml"))
    }

    /// 加载配置；文件不存在时先写入一个空配置
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("创建空配置: {}", path.display());
            Self::default().save_to_file(path)?;
        }
        Self::load_from_file(path)
    }

    /// 示例配置（Java 版与基岩版各一个）
    pub fn example() -> Self {
        let java_root = dirs::home_dir().unwrap_or_default().join(".minecraft");
        let storage_root = dirs::home_dir()
            .unwrap_or_default()
            .join("minecraft-backups");

        Self {
            worlds: vec![
                SyncConfiguration {
                    edition: Edition::Java,
                    name: "java".to_string(),
                    worlds_dir: java_root.join("saves"),
                    storage_dir: storage_root.join("java"),
                    exclude_worlds: vec![],
                    exclude_servers: vec![],
                    conflict_resolution: ConflictPolicy::OverwriteStorage,
                    additional_files: vec!["options.txt".to_string(), "servers.dat".to_string()],
                },
                SyncConfiguration {
                    edition: Edition::Bedrock,
                    name: "bedrock".to_string(),
                    worlds_dir: PathBuf::from("com.mojang").join("minecraftWorlds"),
                    storage_dir: storage_root.join("bedrock"),
                    exclude_worlds: vec![],
                    exclude_servers: vec![],
                    conflict_resolution: ConflictPolicy::OverwriteStorage,
                    additional_files: vec![],
                },
            ],
        }
    }
}
