//! 将世界目录打包为归档并转移到存储目录

use crate::config::{ConflictPolicy, SyncConfiguration};
use crate::container::build_container;
use crate::error::SyncError;
use crate::naming::{self, ADDITIONAL_FILES_ARCHIVE};
use crate::platform::SyncEnv;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// 一次导出的结果
#[derive(Debug, Default)]
pub struct ArchiveReport {
    /// 已存入存储目录的归档
    pub containers: Vec<PathBuf>,
    /// 归档名与附加文件归档保留名冲突而跳过的世界目录
    pub skipped: Vec<String>,
}

/// 列出需要打包的世界目录（按名称排序）
pub fn list_worlds(config: &SyncConfiguration, env: &SyncEnv) -> Result<Vec<(String, PathBuf)>> {
    if !config.worlds_dir.is_dir() {
        return Err(SyncError::MissingDirectory(config.worlds_dir.clone()).into());
    }

    let mut worlds = Vec::new();
    for entry in fs::read_dir(&config.worlds_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if env.ignores(&name) {
            continue;
        }
        if config.is_world_excluded(&name) {
            log::debug!("[{}] 排除世界: {}", config.name, name);
            continue;
        }
        worlds.push((name, entry.path()));
    }
    worlds.sort();
    Ok(worlds)
}

/// 导出一个配置下的所有世界
///
/// 世界逐个打包到暂存目录，全部成功后再转移到存储目录。
pub fn archive_worlds(config: &SyncConfiguration, env: &SyncEnv) -> Result<ArchiveReport> {
    let worlds = list_worlds(config, env)?;

    let staging_dir = env.staging_dir(&config.name);
    fs::create_dir_all(&staging_dir)
        .with_context(|| format!("无法创建暂存目录: {}", staging_dir.display()))?;

    log::info!("[{}] 打包 {} 个世界", config.name, worlds.len());

    let mut staged = Vec::new();
    let mut skipped = Vec::new();
    for (dir_name, world_path) in &worlds {
        let container_name = naming::container_name(config.edition, world_path, dir_name)?;
        if naming::is_additional_files_archive(&container_name) {
            log::warn!(
                "[{}] 世界 {} 的归档名 {} 与保留名冲突，跳过",
                config.name,
                dir_name,
                container_name
            );
            skipped.push(dir_name.clone());
            continue;
        }
        let dest = staging_dir.join(&container_name);

        let container = build_container(&dest, |writer| {
            writer.add_tree(world_path, Path::new(""))
        })
        .with_context(|| SyncError::Build(container_name.clone()))?;

        log::info!("  完成 {}", container_name);
        staged.push(container);
    }

    if !config.additional_files.is_empty() {
        let container = archive_additional_files(config, &staging_dir)
            .with_context(|| SyncError::Build(ADDITIONAL_FILES_ARCHIVE.to_string()))?;
        log::info!("  完成 {}", ADDITIONAL_FILES_ARCHIVE);
        staged.push(container);
    }

    let containers = relocate(&staged, &config.storage_dir, config.conflict_resolution)?;
    Ok(ArchiveReport {
        containers,
        skipped,
    })
}

/// 打包附加文件，条目路径即配置中的相对路径
fn archive_additional_files(config: &SyncConfiguration, staging_dir: &Path) -> Result<PathBuf> {
    let root = config.minecraft_root();

    build_container(&staging_dir.join(ADDITIONAL_FILES_ARCHIVE), |writer| {
        for relative in &config.additional_files {
            let full_path = root.join(relative);
            let metadata = match fs::metadata(&full_path) {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    log::warn!("[{}] 附加文件不存在: {}", config.name, full_path.display());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if metadata.is_dir() {
                writer.add_directory(Path::new(relative), metadata.modified().ok())?;
                writer.add_tree(&full_path, Path::new(relative))?;
            } else {
                writer.add_file(&full_path, Path::new(relative))?;
            }
        }
        Ok(())
    })
}

/// 将暂存的归档复制到存储目录（覆盖同名文件）并删除暂存副本
pub fn relocate(
    staged: &[PathBuf],
    storage_dir: &Path,
    policy: ConflictPolicy,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(storage_dir)
        .with_context(|| SyncError::Relocate(storage_dir.display().to_string()))?;

    let mut stored = Vec::with_capacity(staged.len());
    for path in staged {
        let file_name = path
            .file_name()
            .with_context(|| SyncError::Relocate(path.display().to_string()))?;
        let target = storage_dir.join(file_name);

        if target.exists() {
            match policy {
                ConflictPolicy::Ask => {
                    log::warn!("无法交互确认，覆盖: {}", target.display())
                }
                ConflictPolicy::OverwriteStorage | ConflictPolicy::OverwriteLocal => {
                    log::debug!("覆盖: {}", target.display())
                }
            }
        }

        fs::copy(path, &target)
            .and_then(|_| fs::remove_file(path))
            .with_context(|| SyncError::Relocate(target.display().to_string()))?;
        stored.push(target);
    }
    Ok(stored)
}
