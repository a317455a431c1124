//! 归档命名规则

use crate::config::Edition;
use crate::error::SyncError;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// 基岩版世界目录中存放世界显示名称的文件
pub const LEVEL_NAME_FILE: &str = "levelname.txt";

/// 附加文件归档的保留名称
pub const ADDITIONAL_FILES_ARCHIVE: &str = "_additional-files.zip";
const ADDITIONAL_FILES_PREFIX: &str = "_additional-files";

/// 基岩版归档名中显示名称与目录名之间的分隔符
pub const NAME_SEPARATOR: char = '-';

const ZIP_EXTENSION: &str = "zip";
const MCWORLD_EXTENSION: &str = "mcworld";

impl Edition {
    pub fn extension(self) -> &'static str {
        match self {
            Edition::Bedrock => MCWORLD_EXTENSION,
            Edition::Java => ZIP_EXTENSION,
        }
    }
}

/// 读取基岩版世界的显示名称（levelname.txt 第一行）
pub fn read_level_name(world_dir: &Path) -> Result<String> {
    let path = world_dir.join(LEVEL_NAME_FILE);
    let content = fs::read_to_string(&path).with_context(|| SyncError::LevelName(path.clone()))?;
    let name = content.lines().next().unwrap_or_default();
    Ok(sanitize_level_name(name.trim_end_matches(['\r', '\n'])))
}

/// 显示名称会成为文件名的一部分，路径分隔符替换为 `_`
fn sanitize_level_name(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

/// 世界对应的归档文件名
///
/// - 基岩版: `<显示名称>-<目录名>.mcworld`
/// - Java 版: `<目录名>.zip`
pub fn container_name(edition: Edition, world_dir: &Path, dir_name: &str) -> Result<String> {
    let stem = match edition {
        Edition::Bedrock => format!(
            "{}{}{}",
            read_level_name(world_dir)?,
            NAME_SEPARATOR,
            dir_name
        ),
        Edition::Java => dir_name.to_string(),
    };
    Ok(format!("{}.{}", stem, edition.extension()))
}

/// 由归档文件名推导还原目录名
///
/// 基岩版取最后一个分隔符之后的部分；显示名称本身含分隔符时依然取最后一段。
pub fn world_dir_name(edition: Edition, file_name: &str) -> String {
    let stem = strip_extension(file_name, ZIP_EXTENSION);
    match edition {
        Edition::Java => stem.to_string(),
        Edition::Bedrock => {
            let stem = strip_extension(stem, MCWORLD_EXTENSION);
            match stem.rfind(NAME_SEPARATOR) {
                Some(index) => stem[index + NAME_SEPARATOR.len_utf8()..].to_string(),
                None => stem.to_string(),
            }
        }
    }
}

fn strip_extension<'a>(name: &'a str, extension: &str) -> &'a str {
    name.strip_suffix(extension)
        .and_then(|rest| rest.strip_suffix('.'))
        .unwrap_or(name)
}

pub fn is_container_file(file_name: &str) -> bool {
    [ZIP_EXTENSION, MCWORLD_EXTENSION]
        .iter()
        .any(|ext| strip_extension(file_name, ext) != file_name)
}

pub fn is_additional_files_archive(file_name: &str) -> bool {
    file_name.starts_with(ADDITIONAL_FILES_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn bedrock_name_embeds_level_name() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(LEVEL_NAME_FILE), "My Base\r\n").unwrap();

        let name = container_name(Edition::Bedrock, dir.path(), "abc123").unwrap();
        assert_eq!(name, "My Base-abc123.mcworld");
        assert_eq!(world_dir_name(Edition::Bedrock, &name), "abc123");
    }

    #[test]
    fn path_separators_in_level_name_are_replaced() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(LEVEL_NAME_FILE), "Nether/Overworld\\Hub").unwrap();

        let name = container_name(Edition::Bedrock, dir.path(), "k9Zx").unwrap();
        assert_eq!(name, "Nether_Overworld_Hub-k9Zx.mcworld");
        assert_eq!(Path::new(&name).file_name().unwrap(), name.as_str());
        assert_eq!(world_dir_name(Edition::Bedrock, &name), "k9Zx");
    }

    #[test]
    fn java_name_is_directory_name() {
        let name = container_name(Edition::Java, Path::new("/nowhere"), "A").unwrap();
        assert_eq!(name, "A.zip");
        assert_eq!(world_dir_name(Edition::Java, &name), "A");
    }

    #[test]
    fn bedrock_split_uses_last_separator() {
        assert_eq!(
            world_dir_name(Edition::Bedrock, "Sky-Block-Xy7+AA==.mcworld"),
            "Xy7+AA=="
        );
        assert_eq!(world_dir_name(Edition::Bedrock, "plain.mcworld"), "plain");
    }

    #[test]
    fn missing_level_name_is_classified() {
        let dir = TempDir::new().unwrap();
        let err = container_name(Edition::Bedrock, dir.path(), "abc").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::LevelName(_))
        ));
    }

    #[test]
    fn container_detection() {
        assert!(is_container_file("A.zip"));
        assert!(is_container_file("x-y.mcworld"));
        assert!(!is_container_file("notes.txt"));
        assert!(!is_container_file("zip"));
        assert!(is_additional_files_archive(ADDITIONAL_FILES_ARCHIVE));
        assert!(!is_additional_files_archive("additional.zip"));
    }
}
