//! 通用工具模块
//!
//! 日志初始化、输入源识别、文本计数与输出文件命名等辅助函数

// 标准库导入
use std::path::{Path, PathBuf};

// 第三方crate导入
use anyhow::Context;
use regex::Regex;
use url::Url;

// 本地模块导入
use crate::api_constants::crawler_config;
use crate::error::{Result, TranslationError};

/// 输入源类型枚举
#[derive(Debug, Clone)]
pub enum InputSource {
    /// 本地资源文件路径
    File(PathBuf),
    /// 网站起始URL
    Url(Url),
}

/// 初始化日志系统
pub fn init_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        tracing::Level::ERROR
    } else if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    // 测试或重复初始化时忽略已存在的全局订阅者
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// 验证输入源
/// 用于判断输入是资源文件路径还是网站URL，并返回相应的类型
pub fn validate_input_source(input: &str) -> Result<InputSource> {
    if let Ok(url) = Url::parse(input) {
        if url.scheme() == "http" || url.scheme() == "https" {
            return Ok(InputSource::Url(url));
        }
    }

    let path = PathBuf::from(input);
    let absolute_path = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()?.join(path)
    };

    if !absolute_path.is_file() {
        return Err(TranslationError::InputValidation {
            input: input.to_string(),
            reason: "既不是http(s)地址，也不是存在的文件".to_string(),
        });
    }

    Ok(InputSource::File(absolute_path))
}

/// 编译正则表达式
pub fn compile_regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .with_context(|| format!("编译正则表达式失败: {}", pattern))
        .map_err(TranslationError::from)
}

/// 统计以空白分隔的非空词数
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// 检查文本是否值得翻译
///
/// 去除首尾空白后长度需超过最小长度，且不能全部由标点和空白组成。
pub fn is_translatable_text(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.chars().count() > crawler_config::MIN_TEXT_LENGTH
        && !trimmed
            .chars()
            .all(|c| c.is_whitespace() || c.is_ascii_punctuation())
}

/// 整站归档的输出文件名，例如 `example.com_es.zip`
pub fn site_archive_filename(url: &Url, lang: &str) -> String {
    let host = url.host_str().unwrap_or("website");
    let filename = format!("{}_{}.zip", host, lang);

    // 清理文件名中的非法字符
    filename
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' { c } else { '_' })
        .collect()
}

/// 资源文件翻译结果的输出路径
pub fn resource_output_path(output_dir: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != "..")
        .fold(output_dir.to_path_buf(), |path, segment| path.join(segment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_input_source_url() {
        match validate_input_source("https://example.com/docs").unwrap() {
            InputSource::Url(url) => assert_eq!(url.host_str(), Some("example.com")),
            other => panic!("unexpected source: {:?}", other),
        }
    }

    #[test]
    fn test_validate_input_source_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("en.json");
        std::fs::write(&file, "{}").unwrap();

        match validate_input_source(file.to_str().unwrap()).unwrap() {
            InputSource::File(path) => assert_eq!(path, file),
            other => panic!("unexpected source: {:?}", other),
        }
        assert!(validate_input_source("ftp://example.com").is_err());
        assert!(validate_input_source("/definitely/not/here.json").is_err());
    }

    #[test]
    fn test_count_words() {
        assert_eq!(count_words("  Hello   wide\n world \t"), 3);
        assert_eq!(count_words(""), 0);
    }

    #[test]
    fn test_is_translatable_text() {
        assert!(is_translatable_text("  Welcome "));
        assert!(!is_translatable_text("Hi!"));
        assert!(!is_translatable_text("....!!"));
        assert!(!is_translatable_text("   "));
    }

    #[test]
    fn test_output_naming() {
        let url = Url::parse("https://docs.example.com:8080/a").unwrap();
        assert_eq!(site_archive_filename(&url, "es"), "docs.example.com_es.zip");

        let path = resource_output_path(Path::new("/out"), "values-es/strings.xml");
        assert_eq!(path, PathBuf::from("/out/values-es/strings.xml"));
        let path = resource_output_path(Path::new("/out"), "../escape.json");
        assert_eq!(path, PathBuf::from("/out/escape.json"));
    }
}
