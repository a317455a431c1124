//! Minecraft 存档备份与还原工具

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;

use mcsync::{archive_worlds, restore_worlds, Config, SyncConfiguration, SyncEnv};

/// Minecraft 存档备份与还原工具
#[derive(Parser)]
#[command(name = "mcsync", version, about)]
struct Cli {
    /// 配置文件路径（.toml 或 .json）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 打包世界并存入存储目录
    #[command(visible_alias = "e")]
    Export {
        /// 只处理指定名称的配置
        #[arg(long)]
        only: Vec<String>,
    },
    /// 从存储目录还原世界
    #[command(visible_alias = "i")]
    Import {
        /// 只处理指定名称的配置
        #[arg(long)]
        only: Vec<String>,
    },
    /// 生成示例配置文件
    Config {
        /// 输出路径（默认: 用户配置目录）
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// 覆盖已存在的文件
        #[arg(long)]
        force: bool,
    },
}

fn config_path(config_path: Option<PathBuf>) -> Result<PathBuf> {
    config_path
        .or_else(Config::default_config_path)
        .context("无法确定配置目录，请使用 --config 指定")
}

fn selected<'a>(config: &'a Config, only: &[String]) -> Vec<&'a SyncConfiguration> {
    config
        .worlds
        .iter()
        .filter(|world| only.is_empty() || only.contains(&world.name))
        .collect()
}

/// 逐个处理配置；单个失败不影响后续配置
fn run_each<F>(worlds: &[&SyncConfiguration], action: &str, mut run: F) -> Result<()>
where
    F: FnMut(&SyncConfiguration) -> Result<()>,
{
    let mut failed = Vec::new();
    for world in worlds {
        let start = Instant::now();
        match run(world) {
            Ok(()) => log::info!(
                "[{}] {}完成，耗时 {:.2}s",
                world.name,
                action,
                start.elapsed().as_secs_f64()
            ),
            Err(e) => {
                log::error!("[{}] {}失败: {:#}", world.name, action, e);
                failed.push(world.name.as_str());
            }
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("{}失败的配置: {}", action, failed.join(", "));
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let path = config_path(cli.config)?;

    if let Commands::Config { output, force } = &cli.command {
        let output = output.clone().unwrap_or(path);
        if output.exists() && !force {
            anyhow::bail!("文件已存在: {:?}\n使用 --force 覆盖", output);
        }
        Config::example().save_to_file(&output)?;
        println!("已生成配置文件: {:?}", output);
        return Ok(());
    }

    let config = Config::load_or_create(&path)?;
    log::info!("已加载配置: {}", path.display());

    if config.worlds.is_empty() {
        println!("没有需要同步的世界，请编辑 {}", path.display());
        return Ok(());
    }
    log::debug!("{:#?}", config.worlds);

    let env = SyncEnv::default();

    match cli.command {
        Commands::Export { only } => run_each(&selected(&config, &only), "导出", |world| {
            let report = archive_worlds(world, &env)?;
            log::info!("[{}] 存入 {} 个归档", world.name, report.containers.len());
            Ok(())
        }),
        Commands::Import { only } => run_each(&selected(&config, &only), "导入", |world| {
            let report = restore_worlds(world, &env)?;
            log::info!("[{}] 还原 {} 个世界", world.name, report.worlds.len());
            Ok(())
        }),
        Commands::Config { .. } => Ok(()),
    }
}
