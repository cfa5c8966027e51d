//! Web爬取模块 - 同域名广度优先整站爬取
//!
//! 此模块负责：
//! - 从起始URL开始按广度优先顺序抓取同一主机下的页面
//! - URL规范化、去重与链接过滤（非http协议、锚点、静态资源、社交媒体）
//! - 为每个页面生成 PageRecord（可见文本、元数据、链接、可翻译元素）
//! - 单页失败仅记录日志并跳过，起始页不可达时整体失败

// 标准库导入
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

// 第三方crate导入
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

// 本地模块导入
use crate::api_constants::crawler_config;
use crate::error::{Result, TranslationError};
use crate::html_processor::{extract_page, parse_html, TranslatableElement};

/// Web爬虫配置结构体
#[derive(Debug, Clone)]
pub struct WebCrawlerConfig {
    /// 用户代理字符串
    pub user_agent: String,
    /// 单次请求超时时间（秒）
    pub timeout: u64,
    /// 两次请求之间的礼貌延迟（毫秒）
    pub delay_ms: u64,
}

impl Default for WebCrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: crawler_config::DEFAULT_USER_AGENT.to_string(),
            timeout: crawler_config::DEFAULT_CRAWL_TIMEOUT,
            delay_ms: crawler_config::DEFAULT_DELAY_MS,
        }
    }
}

impl WebCrawlerConfig {
    /// 设置用户代理
    pub fn user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    /// 设置请求超时
    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    /// 设置请求间隔
    pub fn delay_ms(mut self, millis: u64) -> Self {
        self.delay_ms = millis;
        self
    }
}

/// 一次抓取的原始响应
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// HTTP状态码
    pub status: u16,
    /// Content-Type 响应头
    pub content_type: Option<String>,
    /// 响应正文
    pub body: String,
}

impl FetchedPage {
    /// 构造一个 200 的HTML响应
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: Some("text/html; charset=utf-8".to_string()),
            body: body.into(),
        }
    }

    fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
            .unwrap_or(false)
    }
}

/// 页面抓取能力
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// 抓取一个URL。网络错误返回 Err，HTTP错误以状态码形式返回
    async fn fetch(&self, url: &Url) -> Result<FetchedPage>;
}

/// 基于 reqwest 的HTTP抓取实现
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    /// 根据爬虫配置创建HTTP客户端
    pub fn new(config: &WebCrawlerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;
        Ok(FetchedPage {
            status,
            content_type,
            body,
        })
    }
}

/// 爬取得到的页面记录，生成后不再修改
#[derive(Debug, Clone, Serialize)]
pub struct PageRecord {
    /// 规范化URL
    pub url: String,
    /// 输出文件相对路径，例如 `about/team.html`
    pub url_path: String,
    /// 原始HTML
    pub raw_html: String,
    /// 拼接后的可见文本
    pub extracted_text: String,
    /// 可见文本词数
    pub word_count: usize,
    /// 页面标题
    pub title: Option<String>,
    /// 页面描述
    pub meta_description: Option<String>,
    /// 页面中的同域链接（规范化、去重）
    pub outbound_links: Vec<String>,
    /// 可翻译元素
    pub translatable_elements: Vec<TranslatableElement>,
}

/// 整站爬取结果
#[derive(Debug, Clone, Serialize)]
pub struct CrawlResult {
    /// 按发现顺序排列的页面
    pub pages: Vec<PageRecord>,
    /// 页面数量
    pub pages_count: usize,
    /// 全部页面词数之和
    pub total_word_count: usize,
    /// 规范化的起始URL
    pub base_url: String,
}

/// 规范化URL：去掉片段与末尾斜杠（根路径保留 `/`），保留协议、主机、端口、路径与查询
pub fn normalize_url(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_fragment(None);

    let trimmed = normalized.path().trim_end_matches('/').to_string();
    if trimmed.is_empty() {
        normalized.set_path("/");
    } else {
        normalized.set_path(&trimmed);
    }
    normalized
}

/// 同一主机判断：主机与端口完全一致，不折叠子域名
pub fn is_same_domain(url: &Url, base: &Url) -> bool {
    url.host_str() == base.host_str() && url.port_or_known_default() == base.port_or_known_default()
}

/// 判断原始链接是否应被跳过
///
/// 非http(s)协议、纯锚点、静态资源扩展名与社交媒体站点都会被过滤。
pub fn should_skip_url(raw: &str, resolved: &Url) -> bool {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') {
        return true;
    }
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return true;
    }

    let path = resolved.path().to_ascii_lowercase();
    if let Some((_, extension)) = path.rsplit_once('.') {
        if !extension.contains('/') && crawler_config::SKIP_EXTENSIONS.contains(&extension) {
            return true;
        }
    }

    match resolved.host_str() {
        Some(host) => {
            let host = host.to_ascii_lowercase();
            crawler_config::SOCIAL_MEDIA_HOSTS
                .iter()
                .any(|social| host == *social || host.ends_with(&format!(".{}", social)))
        }
        None => true,
    }
}

/// 由URL生成输出文件名
///
/// `/about/team` → `about/team.html`，`/` 与 `/index.html` → `index.html`，已有 `.html` 后缀时不重复添加。
/// 查询串编码进文件名：`/list?page=1` → `list__page-1.html`。
pub fn url_path_for(url: &Url) -> String {
    let path = url.path().trim_end_matches('/');
    let mut stem = if path.is_empty() {
        "index".to_string()
    } else {
        path.trim_start_matches('/').to_string()
    };
    if let Some(trimmed) = stem.strip_suffix(".html") {
        stem = trimmed.to_string();
    }

    if let Some(query) = url.query().filter(|q| !q.is_empty()) {
        let encoded: String = query
            .chars()
            .map(|c| match c {
                c if c.is_ascii_alphanumeric() || c == '-' || c == '.' => c,
                '&' => '_',
                _ => '-',
            })
            .collect();
        stem.push_str("__");
        stem.push_str(&encoded);
    }
    format!("{}.html", stem)
}

/// 在已分配集合中为文件名去重，冲突时追加 `-2`、`-3`…
pub fn unique_url_path(candidate: String, assigned: &mut HashSet<String>) -> String {
    if assigned.insert(candidate.clone()) {
        return candidate;
    }
    let stem = candidate.strip_suffix(".html").unwrap_or(&candidate);
    let mut n = 2usize;
    loop {
        let next = format!("{}-{}.html", stem, n);
        if assigned.insert(next.clone()) {
            return next;
        }
        n += 1;
    }
}

/// Web爬虫主要结构体
///
/// 单个在途请求，按广度优先顺序抓取，页面顺序即发现顺序。
/// 每次爬取拥有独立的队列与已访问集合，不共享可变状态。
pub struct WebCrawler {
    config: WebCrawlerConfig,
    fetcher: Box<dyn PageFetcher>,
}

impl WebCrawler {
    /// 使用指定抓取实现创建爬虫
    pub fn new(config: WebCrawlerConfig, fetcher: Box<dyn PageFetcher>) -> Self {
        Self { config, fetcher }
    }

    /// 使用HTTP抓取实现创建爬虫
    pub fn with_http(config: WebCrawlerConfig) -> Result<Self> {
        let fetcher = HttpPageFetcher::new(&config)?;
        Ok(Self::new(config, Box::new(fetcher)))
    }

    /// 当前配置
    pub fn config(&self) -> &WebCrawlerConfig {
        &self.config
    }

    /// 验证起始URL
    pub fn validate_url(start_url: &str) -> Result<Url> {
        if start_url.trim().is_empty() {
            return Err(crate::translation_error!(input_validation, start_url, "URL不能为空"));
        }
        let url = Url::parse(start_url).map_err(|e| {
            crate::translation_error!(input_validation, start_url, format!("URL格式错误: {}", e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(crate::translation_error!(
                input_validation,
                start_url,
                "URL必须以http://或https://开头"
            ));
        }
        if url.host_str().is_none() {
            return Err(crate::translation_error!(input_validation, start_url, "URL缺少主机名"));
        }
        Ok(url)
    }

    /// 执行整站爬取
    pub async fn crawl(&self, start_url: &str, max_pages: usize) -> Result<CrawlResult> {
        let start = normalize_url(&Self::validate_url(start_url)?);
        info!("🕷️ 开始爬取站点: {} (最多 {} 页)", start, max_pages);

        let mut frontier: VecDeque<Url> = VecDeque::from([start.clone()]);
        let mut queued: HashSet<String> = HashSet::from([start.to_string()]);
        let mut visited: HashSet<String> = HashSet::new();
        let mut pages: Vec<PageRecord> = Vec::new();
        let mut assigned_paths: HashSet<String> = HashSet::new();
        let mut fetched_any = false;

        while let Some(url) = frontier.pop_front() {
            if pages.len() >= max_pages {
                break;
            }
            if !visited.insert(url.to_string()) {
                continue;
            }

            if fetched_any && self.config.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.delay_ms)).await;
            }
            let is_start = !fetched_any;
            fetched_any = true;

            let html = match self.fetch_html(&url).await {
                Ok(html) => html,
                Err(e) if is_start => {
                    warn!("❌ 起始页抓取失败: {}", e);
                    return Err(TranslationError::Crawl(format!("无法访问起始页 {}: {}", url, e)));
                }
                Err(e) => {
                    warn!("❌ 页面抓取失败，已跳过: {}", e);
                    continue;
                }
            };

            let mut record = match self.build_record(&url, &start, html) {
                Ok(record) => record,
                Err(e) if is_start => {
                    return Err(TranslationError::Crawl(format!("起始页解析失败 {}: {}", url, e)));
                }
                Err(e) => {
                    warn!("❌ 页面解析失败，已跳过 {}: {}", url, e);
                    continue;
                }
            };

            record.url_path = unique_url_path(std::mem::take(&mut record.url_path), &mut assigned_paths);

            for link in &record.outbound_links {
                if !visited.contains(link) && queued.insert(link.clone()) {
                    if let Ok(parsed) = Url::parse(link) {
                        frontier.push_back(parsed);
                    }
                }
            }

            info!(
                "📄 已爬取 [{}/{}] {} ({} 词, {} 个可翻译元素)",
                pages.len() + 1,
                max_pages,
                record.url,
                record.word_count,
                record.translatable_elements.len()
            );
            pages.push(record);
        }

        let total_word_count = pages.iter().map(|p| p.word_count).sum();
        info!("✅ 爬取完成: {} 个页面, {} 词", pages.len(), total_word_count);

        Ok(CrawlResult {
            pages_count: pages.len(),
            total_word_count,
            base_url: start.to_string(),
            pages,
        })
    }

    /// 抓取并检查状态码与内容类型
    async fn fetch_html(&self, url: &Url) -> Result<String> {
        debug!("抓取页面: {}", url);
        let page = self.fetcher.fetch(url).await?;

        if !(200..300).contains(&page.status) {
            return Err(crate::translation_error!(
                fetch,
                url,
                format!("HTTP状态码 {}", page.status),
                page.status
            ));
        }
        if !page.is_html() {
            return Err(crate::translation_error!(
                fetch,
                url,
                format!("非HTML内容: {}", page.content_type.as_deref().unwrap_or("未知"))
            ));
        }
        Ok(page.body)
    }

    /// 解析页面并生成页面记录
    fn build_record(&self, url: &Url, base: &Url, html: String) -> Result<PageRecord> {
        let dom = parse_html(&html)?;
        let page_url = url.to_string();
        let content = extract_page(&dom, &page_url);

        let mut seen: HashSet<String> = HashSet::new();
        let outbound_links = content
            .links
            .iter()
            .filter_map(|raw| {
                let resolved = url.join(raw.trim()).ok()?;
                if should_skip_url(raw, &resolved) || !is_same_domain(&resolved, base) {
                    return None;
                }
                let normalized = normalize_url(&resolved).to_string();
                seen.insert(normalized.clone()).then_some(normalized)
            })
            .collect();

        Ok(PageRecord {
            url: page_url,
            url_path: url_path_for(url),
            raw_html: html,
            extracted_text: content.extracted_text,
            word_count: content.word_count,
            title: content.title,
            meta_description: content.meta_description,
            outbound_links,
            translatable_elements: content.elements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// 内存中的站点，记录每次抓取
    struct MockFetcher {
        pages: HashMap<String, FetchedPage>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl MockFetcher {
        fn new(pages: &[(&str, FetchedPage)]) -> (Self, Arc<Mutex<Vec<String>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let fetcher = Self {
                pages: pages.iter().map(|(u, p)| (u.to_string(), p.clone())).collect(),
                calls: calls.clone(),
            };
            (fetcher, calls)
        }
    }

    #[async_trait]
    impl PageFetcher for MockFetcher {
        async fn fetch(&self, url: &Url) -> Result<FetchedPage> {
            self.calls.lock().unwrap().push(url.to_string());
            self.pages
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| crate::translation_error!(fetch, url, "connection refused"))
        }
    }

    fn crawler(pages: &[(&str, FetchedPage)]) -> (WebCrawler, Arc<Mutex<Vec<String>>>) {
        let (fetcher, calls) = MockFetcher::new(pages);
        let config = WebCrawlerConfig::default().delay_ms(0);
        (WebCrawler::new(config, Box::new(fetcher)), calls)
    }

    fn page(title: &str, links: &[&str]) -> FetchedPage {
        let anchors: String = links
            .iter()
            .map(|href| format!(r#"<a href="{}">Link to {}</a>"#, href, href))
            .collect();
        FetchedPage::html(format!(
            "<html><head><title>{}</title></head><body><p>Some page content here</p>{}</body></html>",
            title, anchors
        ))
    }

    #[test]
    fn test_web_crawler_config_builder() {
        let config = WebCrawlerConfig::default()
            .user_agent("test-agent")
            .timeout(60)
            .delay_ms(10);
        assert_eq!(config.user_agent, "test-agent");
        assert_eq!(config.timeout, 60);
        assert_eq!(config.delay_ms, 10);
        assert_eq!(WebCrawlerConfig::default().delay_ms, 500);
    }

    #[test]
    fn test_normalize_url() {
        let cases = [
            ("https://example.com", "https://example.com/"),
            ("https://example.com/", "https://example.com/"),
            ("https://example.com/about/", "https://example.com/about"),
            ("https://example.com/about#team", "https://example.com/about"),
            ("https://example.com/search/?q=1#x", "https://example.com/search?q=1"),
            ("http://example.com:8080/a//", "http://example.com:8080/a"),
        ];
        for (input, expected) in cases {
            let url = Url::parse(input).unwrap();
            assert_eq!(normalize_url(&url).as_str(), expected, "input {}", input);
        }
    }

    #[test]
    fn test_same_domain_is_exact_host() {
        let base = Url::parse("https://example.com/").unwrap();
        assert!(is_same_domain(&Url::parse("https://example.com/a").unwrap(), &base));
        assert!(!is_same_domain(&Url::parse("https://blog.example.com/").unwrap(), &base));
        assert!(!is_same_domain(&Url::parse("https://example.org/").unwrap(), &base));
        assert!(!is_same_domain(&Url::parse("https://example.com:8443/").unwrap(), &base));
    }

    #[test]
    fn test_should_skip_url() {
        let base = Url::parse("https://example.com/").unwrap();
        let skipped = [
            "mailto:hi@example.com",
            "tel:+123",
            "javascript:void(0)",
            "#top",
            "/files/report.pdf",
            "/img/logo.PNG",
            "/static/app.js",
            "/static/site.css",
            "https://www.facebook.com/page",
            "https://twitter.com/acct",
        ];
        for raw in skipped {
            let resolved = base.join(raw).unwrap();
            assert!(should_skip_url(raw, &resolved), "should skip {}", raw);
        }
        for raw in ["/about", "/blog/post-1", "/v1.2/docs", "page.html"] {
            let resolved = base.join(raw).unwrap();
            assert!(!should_skip_url(raw, &resolved), "should keep {}", raw);
        }
    }

    #[test]
    fn test_url_path_for() {
        let cases = [
            ("https://example.com/", "index.html"),
            ("https://example.com/about", "about.html"),
            ("https://example.com/about/team", "about/team.html"),
            ("https://example.com/contact.html", "contact.html"),
            ("https://example.com/index.html", "index.html"),
            ("https://example.com/list?page=1", "list__page-1.html"),
            ("https://example.com/list?page=2&sort=asc", "list__page-2_sort-asc.html"),
            ("https://example.com/docs.html?v=1.2", "docs__v-1.2.html"),
        ];
        for (input, expected) in cases {
            assert_eq!(url_path_for(&Url::parse(input).unwrap()), expected);
        }
    }

    #[test]
    fn test_unique_url_path_suffixes_collisions() {
        let mut assigned = HashSet::new();
        assert_eq!(unique_url_path("index.html".to_string(), &mut assigned), "index.html");
        assert_eq!(unique_url_path("index.html".to_string(), &mut assigned), "index-2.html");
        assert_eq!(unique_url_path("index.html".to_string(), &mut assigned), "index-3.html");
        assert_eq!(unique_url_path("about.html".to_string(), &mut assigned), "about.html");
    }

    #[tokio::test]
    async fn test_crawl_assigns_distinct_url_paths() {
        let (crawler, _) = crawler(&[
            (
                "https://example.com/",
                page("Home", &["/index.html", "/list?page=1", "/list?page=2"]),
            ),
            ("https://example.com/index.html", page("Home again", &[])),
            ("https://example.com/list?page=1", page("First", &[])),
            ("https://example.com/list?page=2", page("Second", &[])),
        ]);

        let result = crawler.crawl("https://example.com/", 50).await.unwrap();
        let paths: Vec<&str> = result.pages.iter().map(|p| p.url_path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["index.html", "index-2.html", "list__page-1.html", "list__page-2.html"]
        );
    }

    #[test]
    fn test_url_validation() {
        assert!(WebCrawler::validate_url("").is_err());
        assert!(WebCrawler::validate_url("ftp://example.com").is_err());
        assert!(WebCrawler::validate_url("example.com").is_err());
        assert!(WebCrawler::validate_url("https://example.com").is_ok());
    }

    #[tokio::test]
    async fn test_crawl_two_page_site() {
        let (crawler, _) = crawler(&[
            ("https://example.com/", page("Home", &["/about", "/about/", "#top"])),
            ("https://example.com/about", page("About", &["/"])),
        ]);

        let result = crawler.crawl("https://example.com", 50).await.unwrap();
        assert_eq!(result.pages_count, 2);
        assert_eq!(result.base_url, "https://example.com/");
        assert_eq!(result.pages[0].url, "https://example.com/");
        assert_eq!(result.pages[0].url_path, "index.html");
        assert_eq!(result.pages[1].url_path, "about.html");
        assert_eq!(result.pages[0].outbound_links, vec!["https://example.com/about".to_string()]);
        assert_eq!(result.pages[1].title.as_deref(), Some("About"));
        assert_eq!(
            result.total_word_count,
            result.pages.iter().map(|p| p.word_count).sum::<usize>()
        );
    }

    #[tokio::test]
    async fn test_crawl_bfs_order_limit_and_dedup() {
        let (crawler, calls) = crawler(&[
            ("https://example.com/", page("Home", &["/a", "/b"])),
            ("https://example.com/a", page("A", &["/c", "/b", "/"])),
            ("https://example.com/b", page("B", &["/d", "/a"])),
            ("https://example.com/c", page("C", &[])),
            ("https://example.com/d", page("D", &[])),
        ]);

        let result = crawler.crawl("https://example.com/", 3).await.unwrap();
        let urls: Vec<&str> = result.pages.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://example.com/", "https://example.com/a", "https://example.com/b"]
        );
        assert_eq!(calls.lock().unwrap().len(), 3);

        let result = crawler.crawl("https://example.com/", 50).await.unwrap();
        let urls: Vec<&str> = result.pages.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls.len(), 5);
        assert_eq!(urls[3], "https://example.com/c");
        assert_eq!(urls[4], "https://example.com/d");
    }

    #[tokio::test]
    async fn test_crawl_filters_assets_and_foreign_links() {
        let (crawler, calls) = crawler(&[(
            "https://example.com/",
            page(
                "Home",
                &[
                    "/doc.pdf",
                    "/pic.png",
                    "/photo.jpg",
                    "/style.css",
                    "/app.js",
                    "mailto:a@example.com",
                    "tel:123",
                    "https://other.com/page",
                    "https://linkedin.com/in/x",
                ],
            ),
        )]);

        let result = crawler.crawl("https://example.com/", 50).await.unwrap();
        assert_eq!(result.pages_count, 1);
        assert!(result.pages[0].outbound_links.is_empty());
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_crawl_skips_failed_and_non_html_pages() {
        let (crawler, _) = crawler(&[
            ("https://example.com/", page("Home", &["/missing", "/feed", "/broken", "/ok"])),
            (
                "https://example.com/feed",
                FetchedPage {
                    status: 200,
                    content_type: Some("application/rss+xml".to_string()),
                    body: "<rss/>".to_string(),
                },
            ),
            (
                "https://example.com/broken",
                FetchedPage {
                    status: 500,
                    content_type: Some("text/html".to_string()),
                    body: String::new(),
                },
            ),
            ("https://example.com/ok", page("Ok", &["/never-linked-from-failures"])),
        ]);

        let result = crawler.crawl("https://example.com/", 50).await.unwrap();
        let urls: Vec<&str> = result.pages.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/", "https://example.com/ok"]);
    }

    #[tokio::test]
    async fn test_crawl_fails_when_start_unreachable() {
        let (crawler, _) = crawler(&[]);
        let result = crawler.crawl("https://unreachable.example/", 10).await;
        assert!(matches!(result, Err(TranslationError::Crawl(_))));
    }
}
