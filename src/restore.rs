//! 从存储目录还原世界

use crate::config::SyncConfiguration;
use crate::container::{extract_all, extract_selected};
use crate::error::SyncError;
use crate::naming::{self, ADDITIONAL_FILES_ARCHIVE};
use crate::platform::SyncEnv;
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// 一次导入的结果
#[derive(Debug, Default)]
pub struct RestoreReport {
    /// 还原出的世界目录
    pub worlds: Vec<PathBuf>,
    /// 还原出的附加文件
    pub additional_files: Vec<PathBuf>,
}

/// 列出存储目录中的世界归档（不含附加文件归档与排除项）
pub fn list_containers(config: &SyncConfiguration, env: &SyncEnv) -> Result<Vec<PathBuf>> {
    if !config.storage_dir.is_dir() {
        return Err(SyncError::MissingDirectory(config.storage_dir.clone()).into());
    }

    let mut containers = Vec::new();
    for entry in fs::read_dir(&config.storage_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if env.ignores(&name)
            || !naming::is_container_file(&name)
            || naming::is_additional_files_archive(&name)
        {
            continue;
        }
        // 归档名包含任一排除名即跳过
        if config
            .exclude_worlds
            .iter()
            .any(|excluded| !excluded.is_empty() && name.contains(excluded.as_str()))
        {
            log::debug!("[{}] 排除归档: {}", config.name, name);
            continue;
        }
        containers.push(entry.path());
    }
    containers.sort();
    Ok(containers)
}

/// 导入一个配置下的所有世界与附加文件
pub fn restore_worlds(config: &SyncConfiguration, env: &SyncEnv) -> Result<RestoreReport> {
    let containers = list_containers(config, env)?;
    let mut report = RestoreReport::default();

    log::info!("[{}] 还原 {} 个世界", config.name, containers.len());

    for container in &containers {
        let file_name = container
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dest = config
            .worlds_dir
            .join(naming::world_dir_name(config.edition, &file_name));

        let count =
            extract_all(container, &dest).with_context(|| SyncError::Extract(file_name.clone()))?;

        log::info!("  完成 {} -> {} ({} 个文件)", file_name, dest.display(), count);
        report.worlds.push(dest);
    }

    if !config.additional_files.is_empty() {
        let container = config.storage_dir.join(ADDITIONAL_FILES_ARCHIVE);
        if container.is_file() {
            report.additional_files = extract_selected(
                &container,
                &config.minecraft_root(),
                &config.additional_files,
            )
            .with_context(|| SyncError::Extract(ADDITIONAL_FILES_ARCHIVE.to_string()))?;
            log::info!("  还原 {} 个附加文件", report.additional_files.len());
        } else {
            log::debug!("[{}] 没有附加文件归档", config.name);
        }
    }

    Ok(report)
}
