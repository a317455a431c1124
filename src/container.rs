//! 归档容器（zip）的打包与解压

use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Local, NaiveDate, TimeZone, Timelike};
use filetime::FileTime;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;
use zip::extra_fields::ExtraField;
use zip::write::FullFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// 最高压缩等级
pub const COMPRESSION_LEVEL: i64 = 9;

/// 解压单个归档时的并发线程数
pub const EXTRACT_WORKERS: usize = 5;

/// 未完成归档的后缀
const PARTIAL_SUFFIX: &str = ".part";

// ============== 时间戳 ==============

/// 扩展时间戳字段（Unix 秒）
const EXTENDED_TIMESTAMP_ID: u16 = 0x5455;
/// NTFS 时间字段（100ns 精度）
const NTFS_TIMESTAMP_ID: u16 = 0x000a;
const NTFS_TIMES_TAG: u16 = 0x0001;
/// 1601-01-01 到 1970-01-01 的秒数
const FILETIME_UNIX_OFFSET: i64 = 11_644_473_600;
const FILETIME_TICKS_PER_SECOND: i64 = 10_000_000;

/// 文件修改时间 -> zip 条目时间（本地时间，2 秒精度）
pub fn to_zip_datetime(time: SystemTime) -> Option<zip::DateTime> {
    let local: chrono::DateTime<Local> = time.into();
    zip::DateTime::from_date_and_time(
        u16::try_from(local.year()).ok()?,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .ok()
}

/// zip 条目时间 -> 文件修改时间
///
/// 夏令时回拨的重复时段无法区分，取较早的时刻。
pub fn from_zip_datetime(time: zip::DateTime) -> Option<FileTime> {
    let naive = NaiveDate::from_ymd_opt(
        i32::from(time.year()),
        u32::from(time.month()),
        u32::from(time.day()),
    )?
    .and_hms_opt(
        u32::from(time.hour()),
        u32::from(time.minute()),
        u32::from(time.second()),
    )?;
    let local = Local.from_local_datetime(&naive).earliest()?;
    Some(FileTime::from_unix_time(local.timestamp(), 0))
}

fn to_ntfs_ticks(time: FileTime) -> Option<u64> {
    let ticks = time
        .unix_seconds()
        .checked_add(FILETIME_UNIX_OFFSET)?
        .checked_mul(FILETIME_TICKS_PER_SECOND)?
        .checked_add(i64::from(time.nanoseconds() / 100))?;
    u64::try_from(ticks).ok()
}

fn from_ntfs_ticks(ticks: u64) -> Option<FileTime> {
    let ticks = i64::try_from(ticks).ok()?;
    let nanos = ticks.rem_euclid(FILETIME_TICKS_PER_SECOND) * 100;
    Some(FileTime::from_unix_time(
        ticks.div_euclid(FILETIME_TICKS_PER_SECOND) - FILETIME_UNIX_OFFSET,
        nanos as u32,
    ))
}

/// 扩展时间戳字段内容：标志位 + 修改时间
fn extended_timestamp_field(time: FileTime) -> Option<Box<[u8]>> {
    let seconds = i32::try_from(time.unix_seconds()).ok()?;
    let mut data = Vec::with_capacity(5);
    data.push(0x01);
    data.extend_from_slice(&seconds.to_le_bytes());
    Some(data.into_boxed_slice())
}

/// NTFS 时间字段内容：保留位 + 属性 1（修改、访问、创建时间）
fn ntfs_timestamp_field(time: FileTime) -> Option<Box<[u8]>> {
    let ticks = to_ntfs_ticks(time)?;
    let mut data = Vec::with_capacity(32);
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&NTFS_TIMES_TAG.to_le_bytes());
    data.extend_from_slice(&24u16.to_le_bytes());
    for _ in 0..3 {
        data.extend_from_slice(&ticks.to_le_bytes());
    }
    Some(data.into_boxed_slice())
}

/// 条目修改时间：NTFS 字段优先，其次扩展时间戳，最后 DOS 时间
fn entry_mtime<'a>(
    fields: impl Iterator<Item = &'a ExtraField>,
    dos: Option<zip::DateTime>,
) -> Option<FileTime> {
    let mut unix_seconds = None;
    for field in fields {
        match field {
            ExtraField::Ntfs(ntfs) => {
                if let Some(time) = from_ntfs_ticks(ntfs.mtime()) {
                    return Some(time);
                }
            }
            ExtraField::ExtendedTimestamp(timestamp) => {
                unix_seconds = timestamp
                    .mod_time()
                    .map(|seconds| FileTime::from_unix_time(i64::from(seconds), 0));
            }
            #[allow(unreachable_patterns)]
            _ => {}
        }
    }
    unix_seconds.or_else(|| dos.and_then(from_zip_datetime))
}

// ============== 路径 ==============

/// 规范化相对路径：去掉 `.`、根与盘符，`..` 回退一级
pub fn normalize_relative(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::ParentDir => {
                normalized.pop();
            }
            _ => {}
        }
    }
    normalized
}

/// zip 内部统一使用 `/` 分隔
fn entry_name(path: &Path) -> String {
    normalize_relative(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

// ============== 打包 ==============

/// 正在写入的归档
pub struct ContainerWriter {
    zip: ZipWriter<BufWriter<File>>,
    entries: usize,
}

impl ContainerWriter {
    fn new(file: File) -> Self {
        Self {
            zip: ZipWriter::new(BufWriter::new(file)),
            entries: 0,
        }
    }

    /// 条目选项：最高压缩，DOS 时间之外再写入精确的时间字段
    fn options(modified: Option<SystemTime>) -> Result<FullFileOptions<'static>> {
        let mut options = FullFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(COMPRESSION_LEVEL));
        let Some(modified) = modified else {
            return Ok(options);
        };

        if let Some(time) = to_zip_datetime(modified) {
            options = options.last_modified_time(time);
        }
        let time = FileTime::from_system_time(modified);
        if let Some(data) = extended_timestamp_field(time) {
            options.add_extra_data(EXTENDED_TIMESTAMP_ID, data, false)?;
        }
        if let Some(data) = ntfs_timestamp_field(time) {
            options.add_extra_data(NTFS_TIMESTAMP_ID, data, false)?;
        }
        Ok(options)
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    /// 添加单个文件，保留修改时间；文件在此期间消失只记警告
    pub fn add_file(&mut self, source: &Path, name: &Path) -> Result<()> {
        let mut file = match File::open(source) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("文件已不存在，跳过: {}", source.display());
                return Ok(());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("无法打开: {}", source.display()));
            }
        };
        let modified = file.metadata()?.modified().ok();

        self.zip
            .start_file(entry_name(name), Self::options(modified)?)?;
        io::copy(&mut file, &mut self.zip)
            .with_context(|| format!("写入失败: {}", source.display()))?;
        self.entries += 1;
        Ok(())
    }

    pub fn add_directory(&mut self, name: &Path, modified: Option<SystemTime>) -> Result<()> {
        self.zip
            .add_directory(entry_name(name), Self::options(modified)?)?;
        self.entries += 1;
        Ok(())
    }

    /// 递归添加目录内容，条目路径为 `prefix/相对路径`
    pub fn add_tree(&mut self, source_dir: &Path, prefix: &Path) -> Result<()> {
        let walker = WalkDir::new(source_dir)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    if e.io_error().map_or(false, |err| err.kind() == io::ErrorKind::NotFound) {
                        log::warn!("遍历时文件消失: {}", e);
                        continue;
                    }
                    return Err(e).with_context(|| format!("遍历失败: {}", source_dir.display()));
                }
            };

            let relative = entry.path().strip_prefix(source_dir)?;
            let name = prefix.join(relative);

            if entry.file_type().is_dir() {
                let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
                self.add_directory(&name, modified)?;
            } else {
                self.add_file(entry.path(), &name)?;
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<()> {
        let mut writer = self.zip.finish()?;
        writer.flush()?;
        Ok(())
    }
}

/// 打包一个归档：成功返回归档路径，失败时不留下任何文件
///
/// 内容先写入 `<dest>.part`，完成后才重命名为 `dest`。
pub fn build_container<F>(dest: &Path, fill: F) -> Result<PathBuf>
where
    F: FnOnce(&mut ContainerWriter) -> Result<()>,
{
    let mut partial = dest.as_os_str().to_owned();
    partial.push(PARTIAL_SUFFIX);
    let partial = PathBuf::from(partial);

    if let Err(e) = write_partial(&partial, fill) {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }

    fs::rename(&partial, dest).with_context(|| format!("无法写入: {}", dest.display()))?;
    Ok(dest.to_path_buf())
}

fn write_partial<F>(partial: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut ContainerWriter) -> Result<()>,
{
    let file = File::create(partial).with_context(|| format!("无法创建: {}", partial.display()))?;
    let mut writer = ContainerWriter::new(file);
    fill(&mut writer)?;
    log::debug!("写入 {} 个条目", writer.entries());
    writer.finish()
}

// ============== 解压 ==============

type ContainerReader = ZipArchive<BufReader<File>>;

fn open_container(path: &Path) -> Result<ContainerReader> {
    let file = File::open(path).with_context(|| format!("无法打开: {}", path.display()))?;
    ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("无效或损坏的归档: {}", path.display()))
}

fn set_mtime(path: &Path, modified: Option<FileTime>) -> Result<()> {
    if let Some(time) = modified {
        filetime::set_file_mtime(path, time)
            .with_context(|| format!("无法设置修改时间: {}", path.display()))?;
    }
    Ok(())
}

/// 将单个条目写到 `target`
fn write_entry(archive: &mut ContainerReader, index: usize, target: &Path) -> Result<()> {
    let mut entry = archive.by_index(index)?;
    let modified = entry_mtime(entry.extra_data_fields(), entry.last_modified());

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut output =
        File::create(target).with_context(|| format!("无法创建: {}", target.display()))?;
    io::copy(&mut entry, &mut output)
        .with_context(|| format!("解压条目失败: {}", entry.name()))?;
    drop(output);

    set_mtime(target, modified)
}

/// 解压整个归档到 `dest`，返回写出的文件数
///
/// 文件条目在固定大小的线程池中解压，每个线程持有独立的读取器；
/// 同一路径只保留最后一个条目，保证不同线程不会写同一文件。
pub fn extract_all(container: &Path, dest: &Path) -> Result<usize> {
    let mut archive = open_container(container)?;

    let mut files: HashMap<PathBuf, usize> = HashMap::new();
    let mut dirs: Vec<(PathBuf, Option<FileTime>)> = Vec::new();

    fs::create_dir_all(dest).with_context(|| format!("无法创建目录: {}", dest.display()))?;

    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index)?;
        let relative = match entry.enclosed_name() {
            Some(path) => normalize_relative(&path.to_path_buf()),
            None => {
                log::warn!("跳过不安全的条目: {}", entry.name());
                continue;
            }
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        if entry.is_dir() {
            let target = dest.join(&relative);
            fs::create_dir_all(&target)?;
            dirs.push((target, entry_mtime(entry.extra_data_fields(), entry.last_modified())));
        } else {
            files.insert(relative, index);
        }
    }

    let mut jobs: Vec<(usize, PathBuf)> = files
        .into_iter()
        .map(|(relative, index)| (index, dest.join(relative)))
        .collect();
    jobs.sort();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(EXTRACT_WORKERS)
        .build()?;

    pool.install(|| {
        jobs.par_iter().try_for_each_init(
            || open_container(container),
            |reader, (index, target)| -> Result<()> {
                let archive = reader.as_mut().map_err(|e| anyhow!("{:#}", e))?;
                write_entry(archive, *index, target)
            },
        )
    })?;

    // 子目录先设置，避免写入子项后又改动父目录时间
    dirs.sort_by_key(|(path, _)| std::cmp::Reverse(path.components().count()));
    for (path, modified) in &dirs {
        set_mtime(path, *modified)?;
    }

    Ok(jobs.len())
}

/// 逐条读取归档，只写出路径在 `allowed` 中的条目，其余条目读完丢弃
///
/// 返回写出的文件路径。
pub fn extract_selected(
    container: &Path,
    dest_root: &Path,
    allowed: &[String],
) -> Result<Vec<PathBuf>> {
    let allowed: HashSet<PathBuf> = allowed
        .iter()
        .map(|path| normalize_relative(Path::new(path)))
        .collect();

    let mut archive = open_container(container)?;
    let mut written = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let relative = entry
            .enclosed_name()
            .map(|path| normalize_relative(&path.to_path_buf()));

        match relative {
            Some(relative) if !entry.is_dir() && allowed.contains(&relative) => {
                let target = dest_root.join(&relative);
                let modified = entry_mtime(entry.extra_data_fields(), entry.last_modified());
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut output = File::create(&target)
                    .with_context(|| format!("无法创建: {}", target.display()))?;
                io::copy(&mut entry, &mut output)
                    .with_context(|| format!("解压条目失败: {}", entry.name()))?;
                drop(output);
                set_mtime(&target, modified)?;
                written.push(target);
            }
            _ => {
                io::copy(&mut entry, &mut io::sink())
                    .with_context(|| format!("读取条目失败: {}", entry.name()))?;
            }
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mtime(path: &Path) -> FileTime {
        FileTime::from_last_modification_time(&fs::metadata(path).unwrap())
    }

    #[test]
    fn normalize_drops_dots_and_roots() {
        assert_eq!(
            normalize_relative(Path::new("./mods/../mods/foo.jar")),
            PathBuf::from("mods/foo.jar")
        );
        assert_eq!(entry_name(Path::new("/a/./b")), "a/b");
    }

    #[test]
    fn datetime_round_trip_at_even_seconds() {
        let time = FileTime::from_unix_time(1_700_000_000, 0);
        let system = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
        let zipped = to_zip_datetime(system).unwrap();
        assert_eq!(from_zip_datetime(zipped), Some(time));
    }

    #[test]
    fn ntfs_ticks_keep_sub_second_precision() {
        let time = FileTime::from_unix_time(1_650_000_001, 123_456_700);
        assert_eq!(from_ntfs_ticks(to_ntfs_ticks(time).unwrap()), Some(time));

        let field = ntfs_timestamp_field(time).unwrap();
        assert_eq!(field.len(), 32);
        assert_eq!(&field[4..8], &[0x01, 0x00, 24, 0x00]);
    }

    #[test]
    fn exact_fields_win_over_dos_time() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("level.dat");
        fs::write(&source, b"level").unwrap();
        let stamp = FileTime::from_unix_time(1_650_000_001, 500_000_000);
        filetime::set_file_mtime(&source, stamp).unwrap();

        let dest = dir.path().join("world.zip");
        build_container(&dest, |w| w.add_file(&source, Path::new("level.dat"))).unwrap();

        let mut archive = open_container(&dest).unwrap();
        let entry = archive.by_index(0).unwrap();
        // DOS 时间只有 2 秒精度，且夏令时回拨时有歧义
        let skewed = zip::DateTime::from_date_and_time(1999, 10, 31, 1, 30, 0).unwrap();
        assert_eq!(entry_mtime(entry.extra_data_fields(), Some(skewed)), Some(stamp));
        assert_eq!(entry_mtime(entry.extra_data_fields(), None), Some(stamp));
    }

    #[test]
    fn failed_build_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("broken.zip");

        let result = build_container(&dest, |_| Err(anyhow!("boom")));
        assert!(result.is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn tree_round_trip_keeps_content_and_mtime() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("world");
        fs::create_dir_all(source.join("region")).unwrap();
        fs::create_dir_all(source.join("empty")).unwrap();
        fs::write(source.join("level.dat"), b"level").unwrap();
        fs::write(source.join("region").join("r.0.0.mca"), vec![7u8; 10_000]).unwrap();
        let stamp = FileTime::from_unix_time(1_600_000_001, 500_000_000);
        filetime::set_file_mtime(source.join("level.dat"), stamp).unwrap();

        let dest = dir.path().join("world.zip");
        build_container(&dest, |w| w.add_tree(&source, Path::new(""))).unwrap();
        assert!(!dir.path().join("world.zip.part").exists());

        let restored = dir.path().join("restored");
        assert_eq!(extract_all(&dest, &restored).unwrap(), 2);
        assert_eq!(fs::read(restored.join("level.dat")).unwrap(), b"level");
        assert_eq!(
            fs::read(restored.join("region").join("r.0.0.mca")).unwrap(),
            vec![7u8; 10_000]
        );
        assert!(restored.join("empty").is_dir());
        assert_eq!(mtime(&restored.join("level.dat")), stamp);
    }

    #[test]
    fn vanished_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("bundle.zip");

        build_container(&dest, |w| {
            w.add_file(&dir.path().join("missing.txt"), Path::new("missing.txt"))?;
            assert_eq!(w.entries(), 0);
            Ok(())
        })
        .unwrap();
        assert!(dest.exists());
    }

    #[test]
    fn selected_extraction_drains_others() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(root.join("mods")).unwrap();
        fs::write(root.join("options.txt"), b"fov:70").unwrap();
        fs::write(root.join("mods").join("foo.jar"), b"jar").unwrap();
        fs::write(root.join("server.log"), b"log").unwrap();

        let dest = dir.path().join("bundle.zip");
        build_container(&dest, |w| {
            for name in ["options.txt", "mods/foo.jar", "server.log"] {
                w.add_file(&root.join(name), Path::new(name))?;
            }
            Ok(())
        })
        .unwrap();

        let out = dir.path().join("out");
        let allowed = vec!["./options.txt".to_string(), "mods/foo.jar".to_string()];
        let written = extract_selected(&dest, &out, &allowed).unwrap();

        assert_eq!(written.len(), 2);
        assert_eq!(fs::read(out.join("mods").join("foo.jar")).unwrap(), b"jar");
        assert!(out.join("options.txt").exists());
        assert!(!out.join("server.log").exists());
    }
}
