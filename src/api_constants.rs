/// 翻译服务与爬虫常量配置
///
/// 该文件定义了翻译源、爬虫、任务进度相关的常量，方便统一管理和维护

/// 翻译API配置
pub mod api_config {
    /// 本地开发API地址
    pub const LOCAL_API_URL: &str = "http://localhost:1188/translate";

    /// DeepL 免费版API地址
    pub const DEEPL_FREE_API_URL: &str = "https://api-free.deepl.com";

    /// DeepL 专业版API地址
    pub const DEEPL_PRO_API_URL: &str = "https://api.deepl.com";

    /// DeepL 免费版密钥后缀
    pub const DEEPL_FREE_KEY_SUFFIX: &str = ":fx";

    /// DeepL 翻译源标识
    pub const DEEPL_PROVIDER_ID: &str = "deepl";

    /// 通用HTTP翻译源标识
    pub const HTTP_PROVIDER_ID: &str = "http_api";
}

/// 翻译服务配置
pub mod service_config {
    /// 默认源语言（自动检测）
    pub const DEFAULT_SOURCE_LANG: &str = "auto";

    /// 默认目标语言
    pub const DEFAULT_TARGET_LANG: &str = "zh";

    /// 默认最大重试次数（仅在单个翻译源内部重试）
    pub const DEFAULT_MAX_RETRIES: usize = 3;

    /// 重试延迟基数（秒），第 n 次重试前等待 n * 基数
    pub const RETRY_DELAY_BASE_SECS: u64 = 2;

    /// 默认并发翻译请求数
    pub const DEFAULT_CONCURRENCY: usize = 1;

    /// 请求超时时间（秒）
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    /// 全部翻译源失败时的原因
    pub const ALL_PROVIDERS_FAILED: &str = "All translation providers failed";

    /// 空文本原因
    pub const EMPTY_TEXT: &str = "Empty text provided";

    /// 每字符估算成本（美元）
    pub const COST_PER_CHARACTER_USD: f64 = 0.00002;
}

/// 网页爬取配置
pub mod crawler_config {
    /// 默认爬取超时时间（秒）
    pub const DEFAULT_CRAWL_TIMEOUT: u64 = 30;

    /// 默认User-Agent
    pub const DEFAULT_USER_AGENT: &str =
        "Mozilla/5.0 (compatible; SiteTranslator/0.1; +https://github.com/site-translator)";

    /// 两次请求之间的礼貌延迟（毫秒）
    pub const DEFAULT_DELAY_MS: u64 = 500;

    /// 默认最大页面数
    pub const DEFAULT_PAGE_LIMIT: usize = 50;

    /// 可翻译文本的最小长度（不含），短于等于该长度的文本不提取
    pub const MIN_TEXT_LENGTH: usize = 3;

    /// 承载可翻译文本的标签
    pub const TRANSLATABLE_TAGS: &[&str] = &[
        "p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "span", "div", "a",
    ];

    /// 计算可见文本时排除的标签
    pub const INVISIBLE_TAGS: &[&str] = &["script", "style", "noscript", "template"];

    /// 跳过的资源扩展名
    pub const SKIP_EXTENSIONS: &[&str] = &[
        "jpg", "jpeg", "png", "gif", "svg", "webp", "ico", "bmp", "pdf", "doc", "docx", "xls",
        "xlsx", "ppt", "pptx", "zip", "tar", "gz", "rar", "7z", "mp3", "mp4", "avi", "mov",
        "webm", "wav", "css", "js", "json", "xml", "woff", "woff2", "ttf",
    ];

    /// 跳过的社交媒体站点
    pub const SOCIAL_MEDIA_HOSTS: &[&str] = &[
        "facebook.com",
        "twitter.com",
        "x.com",
        "linkedin.com",
        "instagram.com",
        "youtube.com",
        "tiktok.com",
        "pinterest.com",
    ];
}

/// 任务进度配置（百分比）
pub mod progress_config {
    /// 开始处理
    pub const STARTED: u8 = 0;
    /// 爬取开始
    pub const CRAWL_STARTED: u8 = 5;
    /// 爬取完成
    pub const CRAWL_DONE: u8 = 15;
    /// 提取完成
    pub const EXTRACT_DONE: u8 = 35;
    /// 翻译完成
    pub const TRANSLATE_DONE: u8 = 85;
    /// 重建与打包完成
    pub const PACKAGE_DONE: u8 = 95;
    /// 任务完成
    pub const COMPLETED: u8 = 100;
    /// 每翻译多少个元素上报一次进度
    pub const DEFAULT_REPORT_INTERVAL: usize = 10;
}

/// 结果存储配置
pub mod storage_config {
    /// 整站归档的内容类型
    pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

    /// 站点地图的内容类型
    pub const SITEMAP_CONTENT_TYPE: &str = "application/xml";

    /// 整站归档在对象存储中的键
    pub fn archive_key(job_id: &str) -> String {
        format!("jobs/{}/translated-site.zip", job_id)
    }

    /// 站点地图在对象存储中的键
    pub fn sitemap_key(job_id: &str) -> String {
        format!("jobs/{}/sitemap.xml", job_id)
    }
}

/// 实用工具函数
/// 获取通用翻译API地址，根据本地模式标志选择
pub fn get_api_url(local_api: bool, custom_api: Option<&str>) -> Option<&str> {
    if let Some(custom) = custom_api {
        if !custom.trim().is_empty() {
            return Some(custom);
        }
    }

    if local_api {
        Some(api_config::LOCAL_API_URL)
    } else {
        None
    }
}

/// 根据密钥选择 DeepL API 地址
pub fn deepl_base_url(api_key: &str) -> &'static str {
    if api_key.ends_with(api_config::DEEPL_FREE_KEY_SUFFIX) {
        api_config::DEEPL_FREE_API_URL
    } else {
        api_config::DEEPL_PRO_API_URL
    }
}

/// 验证API URL是否有效
pub fn is_valid_api_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// 验证语言代码格式（2-5个字符，字母与连字符）
pub fn is_valid_language_code(lang: &str) -> bool {
    (2..=5).contains(&lang.len()) && lang.chars().all(|c| c.is_ascii_alphabetic() || c == '-')
}
