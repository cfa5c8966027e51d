//! 配置管理模块
//!
//! 提供CLI参数解析和翻译服务配置管理功能

// 标准库导入
use std::path::PathBuf;

// 第三方crate导入
use clap::Parser;

// 本地模块导入
use crate::api_constants::{self, crawler_config, service_config};
use crate::error::Result;
use crate::web_crawler::WebCrawlerConfig;

/// 翻译服务配置结构体
///
/// 描述翻译源链（DeepL 优先，其后为通用HTTP接口）以及重试、并发参数。
/// 支持Builder模式进行链式配置。
///
/// # Examples
///
/// ```rust
/// use site_translator::config::TranslatorConfig;
///
/// let config = TranslatorConfig::new()
///     .with_http_api_url("http://localhost:1188/translate")
///     .with_max_retries(5)
///     .with_max_concurrency(4);
/// assert_eq!(config.max_concurrency(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct TranslatorConfig {
    /// DeepL API 密钥
    deepl_api_key: Option<String>,
    /// 覆盖 DeepL API 地址（测试或代理）
    deepl_api_url: Option<String>,
    /// 通用HTTP翻译接口地址
    http_api_url: Option<String>,
    /// 请求超时（秒）
    timeout_secs: u64,
    /// 单个翻译源的最大重试次数
    max_retries: usize,
    /// 并发翻译请求数
    max_concurrency: usize,
}

impl TranslatorConfig {
    /// 创建新的配置实例
    ///
    /// 默认不配置任何翻译源，超时30秒，重试3次，并发1。
    pub fn new() -> Self {
        Self {
            deepl_api_key: None,
            deepl_api_url: None,
            http_api_url: None,
            timeout_secs: service_config::REQUEST_TIMEOUT_SECONDS,
            max_retries: service_config::DEFAULT_MAX_RETRIES,
            max_concurrency: service_config::DEFAULT_CONCURRENCY,
        }
    }

    /// 获取 DeepL 密钥
    pub fn deepl_api_key(&self) -> Option<&str> {
        self.deepl_api_key.as_deref()
    }

    /// 获取 DeepL API 地址，未覆盖时按密钥类型选择
    pub fn deepl_api_url(&self) -> Option<&str> {
        match (&self.deepl_api_url, &self.deepl_api_key) {
            (Some(url), _) => Some(url),
            (None, Some(key)) => Some(api_constants::deepl_base_url(key)),
            (None, None) => None,
        }
    }

    /// 获取通用HTTP接口地址
    pub fn http_api_url(&self) -> Option<&str> {
        self.http_api_url.as_deref()
    }

    /// 获取请求超时
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// 获取最大重试次数
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// 获取并发数
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// 设置 DeepL 密钥，空白密钥视为未配置
    pub fn with_deepl_key(mut self, key: &str) -> Self {
        let key = key.trim();
        self.deepl_api_key = (!key.is_empty()).then(|| key.to_string());
        self
    }

    /// 覆盖 DeepL API 地址
    pub fn with_deepl_api_url(mut self, url: &str) -> Self {
        self.deepl_api_url = Some(url.trim_end_matches('/').to_string());
        self
    }

    /// 设置通用HTTP接口地址
    pub fn with_http_api_url(mut self, url: &str) -> Self {
        self.http_api_url = Some(url.to_string());
        self
    }

    /// 设置请求超时
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_secs = seconds;
        self
    }

    /// 设置最大重试次数
    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    /// 设置并发数（至少为1）
    pub fn with_max_concurrency(mut self, concurrency: usize) -> Self {
        self.max_concurrency = concurrency.max(1);
        self
    }

    /// 是否至少配置了一个翻译源
    pub fn has_provider(&self) -> bool {
        self.deepl_api_key.is_some() || self.http_api_url.is_some()
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.http_api_url {
            if !api_constants::is_valid_api_url(url) {
                return Err(crate::translation_error!(
                    config,
                    "http_api_url",
                    format!("无效的API地址: {}", url)
                ));
            }
        }
        if let Some(url) = &self.deepl_api_url {
            if !api_constants::is_valid_api_url(url) {
                return Err(crate::translation_error!(
                    config,
                    "deepl_api_url",
                    format!("无效的DeepL地址: {}", url)
                ));
            }
        }
        if !self.has_provider() {
            return Err(crate::translation_error!(
                config,
                "providers",
                "未配置任何翻译源，请设置 DEEPL_API_KEY 或 --api"
            ));
        }
        Ok(())
    }
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// CLI参数结构
#[derive(Parser, Debug)]
#[command(author, version, about = "整站与本地化文件翻译工具 - 爬取网站、提取文本、多翻译源翻译并打包", long_about = None)]
pub struct Cli {
    /// 网站起始URL或本地化资源文件路径
    #[arg(short, long, value_name = "URL_OR_FILE")]
    pub input: String,

    /// 输出目录
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output: PathBuf,

    /// 源语言代码 (auto 表示自动检测)
    #[arg(short, long, default_value = service_config::DEFAULT_SOURCE_LANG)]
    pub source_lang: String,

    /// 目标语言代码，逗号分隔 (如: es,fr,de)
    #[arg(short, long, value_delimiter = ',', default_value = service_config::DEFAULT_TARGET_LANG)]
    pub target_langs: Vec<String>,

    /// 最大爬取页面数
    #[arg(long, default_value_t = crawler_config::DEFAULT_PAGE_LIMIT)]
    pub pages: usize,

    /// 通用翻译API地址
    #[arg(short, long, env = "TRANSLATION_API_URL")]
    pub api: Option<String>,

    /// DeepL API 密钥
    #[arg(long, env = "DEEPL_API_KEY", hide_env_values = true)]
    pub deepl_key: Option<String>,

    /// 覆盖 DeepL API 地址
    #[arg(long, env = "DEEPL_API_URL")]
    pub deepl_url: Option<String>,

    /// 使用本地API (localhost:1188)
    #[arg(long)]
    pub local_api: bool,

    /// 页面请求间隔（毫秒）
    #[arg(long, default_value_t = crawler_config::DEFAULT_DELAY_MS)]
    pub delay_ms: u64,

    /// 爬取超时时间（秒）
    #[arg(long, default_value_t = crawler_config::DEFAULT_CRAWL_TIMEOUT, help = "网页爬取的超时时间（秒）")]
    pub crawl_timeout: u64,

    /// 自定义User-Agent
    #[arg(long, help = "自定义User-Agent字符串")]
    pub user_agent: Option<String>,

    /// 并发翻译请求数
    #[arg(long, default_value_t = service_config::DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// 最大重试次数
    #[arg(long, default_value_t = service_config::DEFAULT_MAX_RETRIES)]
    pub max_retries: usize,

    /// 详细输出模式
    #[arg(short, long)]
    pub verbose: bool,

    /// 静默模式 (仅输出错误)
    #[arg(short, long)]
    pub quiet: bool,

    /// 显示统计信息
    #[arg(long)]
    pub stats: bool,

    /// 额外生成多语言 sitemap.xml
    #[arg(long)]
    pub sitemap: bool,
}

impl Cli {
    /// 由命令行参数构建翻译服务配置
    pub fn translator_config(&self) -> TranslatorConfig {
        let mut config = TranslatorConfig::new()
            .with_max_retries(self.max_retries)
            .with_max_concurrency(self.concurrency);

        if let Some(key) = &self.deepl_key {
            config = config.with_deepl_key(key);
        }
        if let Some(url) = &self.deepl_url {
            config = config.with_deepl_api_url(url);
        }
        if let Some(url) = api_constants::get_api_url(self.local_api, self.api.as_deref()) {
            config = config.with_http_api_url(url);
        }
        config
    }

    /// 由命令行参数构建爬虫配置
    pub fn crawler_config(&self) -> WebCrawlerConfig {
        let mut config = WebCrawlerConfig::default()
            .timeout(self.crawl_timeout)
            .delay_ms(self.delay_ms);
        if let Some(user_agent) = &self.user_agent {
            config = config.user_agent(user_agent);
        }
        config
    }

    /// 规范化后的目标语言列表（去空白、去重、保持顺序）
    pub fn target_languages(&self) -> Vec<String> {
        let mut langs: Vec<String> = Vec::new();
        for lang in &self.target_langs {
            let lang = lang.trim();
            if !lang.is_empty() && !langs.iter().any(|l| l == lang) {
                langs.push(lang.to_string());
            }
        }
        langs
    }
}
